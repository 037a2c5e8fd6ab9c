use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::db::{DatabaseError, ThreadRecord, ThreadStore};

use super::avatars::identity_hash_abs;

const THREAD_ID_LEN: usize = 5;
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Short, stable id for a Slack thread root. At most five lowercase base-36
/// characters; collisions between roots are possible and not resolved.
pub fn generate_thread_id(thread_ts: &str) -> String {
    let mut value = identity_hash_abs(thread_ts);
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits
        .iter()
        .rev()
        .take(THREAD_ID_LEN)
        .map(|&d| d as char)
        .collect()
}

/// Maps Slack thread roots onto short ids IRC users can type, and expires
/// threads that have been quiet for two timeout windows.
pub struct ThreadMapper {
    store: Arc<dyn ThreadStore>,
    timeout: Duration,
}

impl ThreadMapper {
    pub fn new(store: Arc<dyn ThreadStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn is_first_message(&self, thread_ts: &str) -> Result<bool, DatabaseError> {
        Ok(self.store.get(thread_ts).await?.is_none())
    }

    /// Records activity on a thread and returns its short id.
    pub async fn touch(
        &self,
        thread_ts: &str,
        slack_channel_id: &str,
    ) -> Result<String, DatabaseError> {
        self.touch_at(thread_ts, slack_channel_id, Utc::now().timestamp_millis())
            .await
    }

    pub(crate) async fn touch_at(
        &self,
        thread_ts: &str,
        slack_channel_id: &str,
        now_ms: i64,
    ) -> Result<String, DatabaseError> {
        let thread_id = generate_thread_id(thread_ts);
        self.store
            .upsert(&ThreadRecord {
                thread_ts: thread_ts.to_string(),
                thread_id: thread_id.clone(),
                slack_channel_id: slack_channel_id.to_string(),
                last_message_time: now_ms,
            })
            .await?;
        debug!(
            "thread touched thread_ts={} thread_id={} channel={}",
            thread_ts, thread_id, slack_channel_id
        );
        Ok(thread_id)
    }

    pub async fn resolve(&self, thread_id: &str) -> Result<Option<ThreadRecord>, DatabaseError> {
        self.store.get_by_thread_id(thread_id).await
    }

    pub async fn sweep(&self) -> Result<usize, DatabaseError> {
        self.sweep_at(Utc::now().timestamp_millis()).await
    }

    pub(crate) async fn sweep_at(&self, now_ms: i64) -> Result<usize, DatabaseError> {
        let window_ms = i64::try_from(self.timeout.as_millis()).unwrap_or(i64::MAX / 2);
        let cutoff = now_ms.saturating_sub(window_ms.saturating_mul(2));
        self.store.delete_older_than(cutoff).await
    }
}
