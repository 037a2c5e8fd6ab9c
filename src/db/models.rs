use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Links one Slack channel to one IRC channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMapping {
    pub id: i64,
    pub slack_channel_id: String,
    pub irc_channel: String,
    pub created_at: DateTime<Utc>,
}

/// Links one Slack user to one IRC nick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMapping {
    pub id: i64,
    pub slack_user_id: String,
    pub irc_nick: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    /// Slack `thread_ts` of the root message.
    pub thread_ts: String,
    /// Short identifier shown on IRC.
    pub thread_id: String,
    pub slack_channel_id: String,
    /// Unix epoch milliseconds of the latest reply.
    pub last_message_time: i64,
}
