use thiserror::Error;

use super::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Config {
    /// Checks every required setting and reports all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.slack.bot_token.trim().is_empty() {
            problems.push("slack.bot_token (SLACK_BOT_TOKEN) is required");
        }
        if self.slack.signing_secret.trim().is_empty() {
            problems.push("slack.signing_secret (SLACK_SIGNING_SECRET) is required");
        }
        if self.bridge.admins.iter().all(|admin| admin.trim().is_empty()) {
            problems.push("bridge.admins (ADMINS) needs at least one Slack user id");
        }
        if self.irc.nick.trim().is_empty() {
            problems.push("irc.nick (IRC_NICK) is required");
        }
        if self.irc.host.trim().is_empty() {
            problems.push("irc.host cannot be empty");
        }
        if self.bridge.port == 0 {
            problems.push("bridge.port must be between 1 and 65535");
        }
        if self.database.filename.trim().is_empty() {
            problems.push("database.filename cannot be empty");
        }
        if self.cdn.enabled && self.cdn.token.trim().is_empty() {
            problems.push("cdn.token (CDN_TOKEN) is required when cdn.enabled is set");
        }
        if self.avatars.pool.is_empty() {
            problems.push("avatars.pool cannot be empty");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidConfig(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigError;
    use crate::config::Config;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.slack.bot_token = "xoxb-test".to_string();
        config.slack.signing_secret = "secret".to_string();
        config.bridge.admins = vec!["U0ADMIN".to_string()];
        config.irc.nick = "slackbridge".to_string();
        config
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_reports_every_missing_setting() {
        let config = Config::default();
        let Err(ConfigError::InvalidConfig(message)) = config.validate() else {
            panic!("default config should be rejected");
        };
        assert!(message.contains("SLACK_BOT_TOKEN"));
        assert!(message.contains("SLACK_SIGNING_SECRET"));
        assert!(message.contains("ADMINS"));
        assert!(message.contains("IRC_NICK"));
    }

    #[test]
    fn validate_requires_cdn_token_when_enabled() {
        let mut config = valid_config();
        config.cdn.enabled = true;
        let err = config.validate().expect_err("cdn without token");
        assert!(err.to_string().contains("CDN_TOKEN"));
    }

    #[test]
    fn validate_rejects_empty_avatar_pool() {
        let mut config = valid_config();
        config.avatars.pool.clear();
        assert!(config.validate().is_err());
    }
}
