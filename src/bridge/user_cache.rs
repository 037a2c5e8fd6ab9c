use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub real_name: String,
}

impl UserInfo {
    pub fn from_display_name(display_name: &str) -> Self {
        Self {
            name: display_name.to_string(),
            real_name: display_name.to_string(),
        }
    }

    /// Best human-readable label: real name, then handle.
    pub fn label(&self) -> Option<&str> {
        [self.real_name.as_str(), self.name.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|value| !value.is_empty())
    }
}

/// A place display names can be fetched from. `Ok(None)` means the user is
/// unknown to this source; `Err` means the source itself is unavailable.
#[async_trait]
pub trait DisplayNameSource: Send + Sync {
    fn source_name(&self) -> &'static str;
    async fn lookup(&self, user_id: &str) -> Result<Option<UserInfo>>;
}

struct CachedUserInfo {
    info: UserInfo,
    fetched_at: Instant,
}

pub struct UserInfoCache {
    sources: Vec<Arc<dyn DisplayNameSource>>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedUserInfo>>,
}

impl UserInfoCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sources: Vec::new(),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Sources are consulted in the order they are added.
    pub fn with_source(mut self, source: Arc<dyn DisplayNameSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub async fn get_user_info(
        &self,
        user_id: &str,
        inline_display_name: Option<&str>,
    ) -> Option<UserInfo> {
        if let Some(info) = self.fresh_entry(user_id) {
            return Some(info);
        }

        if let Some(display_name) = inline_display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            let info = UserInfo::from_display_name(display_name);
            self.insert(user_id, info.clone());
            return Some(info);
        }

        for source in &self.sources {
            match source.lookup(user_id).await {
                Ok(Some(info)) => {
                    debug!(
                        "user info fetched user_id={} source={}",
                        user_id,
                        source.source_name()
                    );
                    self.insert(user_id, info.clone());
                    return Some(info);
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        "user info lookup failed user_id={} source={} error={}",
                        user_id,
                        source.source_name(),
                        err
                    );
                }
            }
        }

        None
    }

    pub fn insert(&self, user_id: &str, info: UserInfo) {
        self.entries.lock().insert(
            user_id.to_string(),
            CachedUserInfo {
                info,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, cached| cached.fetched_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn fresh_entry(&self, user_id: &str) -> Option<UserInfo> {
        let entries = self.entries.lock();
        entries
            .get(user_id)
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.info.clone())
    }
}
