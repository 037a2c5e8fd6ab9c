use async_trait::async_trait;

use super::DatabaseError;
use super::models::{ChannelMapping, ThreadRecord, UserMapping};

/// Slack channel <-> IRC channel relation. `create` upserts on the Slack id and
/// fails with `ConstraintViolation` when the IRC channel belongs to another mapping.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get_by_slack_channel(
        &self,
        slack_channel_id: &str,
    ) -> Result<Option<ChannelMapping>, DatabaseError>;
    async fn get_by_irc_channel(
        &self,
        irc_channel: &str,
    ) -> Result<Option<ChannelMapping>, DatabaseError>;
    async fn create(&self, slack_channel_id: &str, irc_channel: &str) -> Result<(), DatabaseError>;
    async fn delete(&self, slack_channel_id: &str) -> Result<(), DatabaseError>;
    async fn list_all(&self) -> Result<Vec<ChannelMapping>, DatabaseError>;
}

/// Slack user <-> IRC nick relation, same semantics as [`ChannelStore`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_slack_user(
        &self,
        slack_user_id: &str,
    ) -> Result<Option<UserMapping>, DatabaseError>;
    async fn get_by_irc_nick(&self, irc_nick: &str) -> Result<Option<UserMapping>, DatabaseError>;
    async fn create(&self, slack_user_id: &str, irc_nick: &str) -> Result<(), DatabaseError>;
    async fn delete(&self, slack_user_id: &str) -> Result<(), DatabaseError>;
    async fn list_all(&self) -> Result<Vec<UserMapping>, DatabaseError>;
}

#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn get(&self, thread_ts: &str) -> Result<Option<ThreadRecord>, DatabaseError>;
    async fn get_by_thread_id(
        &self,
        thread_id: &str,
    ) -> Result<Option<ThreadRecord>, DatabaseError>;
    async fn upsert(&self, record: &ThreadRecord) -> Result<(), DatabaseError>;
    /// Removes every record whose `last_message_time` is before `cutoff_ms`.
    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize, DatabaseError>;
}
