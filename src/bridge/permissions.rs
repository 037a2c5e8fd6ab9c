use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Who owns or manages a Slack channel.
#[async_trait]
pub trait ChannelRoleSource: Send + Sync {
    async fn channel_creator(&self, channel_id: &str) -> Result<Option<String>>;
    /// Empty when the workspace admin API is not configured.
    async fn channel_managers(&self, channel_id: &str) -> Result<Vec<String>>;
}

pub struct PermissionChecker {
    admins: HashSet<String>,
    roles: Arc<dyn ChannelRoleSource>,
}

impl PermissionChecker {
    pub fn new<I>(admins: I, roles: Arc<dyn ChannelRoleSource>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            admins: admins
                .into_iter()
                .map(|admin| admin.trim().to_string())
                .filter(|admin| !admin.is_empty())
                .collect(),
            roles,
        }
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.contains(user_id)
    }

    /// Bridge admins, the channel creator and channel managers may manage a
    /// channel. Lookup failures deny.
    pub async fn can_manage_channel(&self, user_id: &str, channel_id: &str) -> bool {
        if self.is_admin(user_id) {
            return true;
        }

        match self.roles.channel_creator(channel_id).await {
            Ok(Some(creator)) if creator == user_id => return true,
            Ok(_) => {}
            Err(err) => {
                warn!(
                    "channel creator lookup failed channel={} error={}",
                    channel_id, err
                );
            }
        }

        match self.roles.channel_managers(channel_id).await {
            Ok(managers) => {
                let allowed = managers.iter().any(|manager| manager == user_id);
                debug!(
                    "channel manager check channel={} user={} allowed={}",
                    channel_id, user_id, allowed
                );
                allowed
            }
            Err(err) => {
                warn!(
                    "channel manager lookup failed channel={} error={}",
                    channel_id, err
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    use super::{ChannelRoleSource, PermissionChecker};

    struct Roles {
        creator: Option<&'static str>,
        managers: Vec<&'static str>,
        broken: bool,
    }

    #[async_trait]
    impl ChannelRoleSource for Roles {
        async fn channel_creator(&self, _channel_id: &str) -> Result<Option<String>> {
            if self.broken {
                return Err(anyhow!("slack unavailable"));
            }
            Ok(self.creator.map(str::to_string))
        }

        async fn channel_managers(&self, _channel_id: &str) -> Result<Vec<String>> {
            if self.broken {
                return Err(anyhow!("slack unavailable"));
            }
            Ok(self.managers.iter().map(|m| m.to_string()).collect())
        }
    }

    fn checker(roles: Roles) -> PermissionChecker {
        PermissionChecker::new(vec![" UADMIN ".to_string()], Arc::new(roles))
    }

    #[tokio::test]
    async fn admins_creator_and_managers_are_allowed() {
        let permissions = checker(Roles {
            creator: Some("UCREATOR"),
            managers: vec!["UMANAGER"],
            broken: false,
        });

        assert!(permissions.can_manage_channel("UADMIN", "C1").await);
        assert!(permissions.can_manage_channel("UCREATOR", "C1").await);
        assert!(permissions.can_manage_channel("UMANAGER", "C1").await);
        assert!(!permissions.can_manage_channel("URANDOM", "C1").await);
    }

    #[tokio::test]
    async fn lookup_failures_deny_everyone_but_admins() {
        let permissions = checker(Roles {
            creator: Some("UCREATOR"),
            managers: Vec::new(),
            broken: true,
        });

        assert!(permissions.can_manage_channel("UADMIN", "C1").await);
        assert!(!permissions.can_manage_channel("UCREATOR", "C1").await);
    }
}
