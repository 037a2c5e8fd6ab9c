use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub irc: IrcConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub cdn: CdnConfig,
    #[serde(default)]
    pub threads: ThreadConfig,
    #[serde(default)]
    pub user_cache: UserCacheConfig,
    #[serde(default)]
    pub avatars: AvatarConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Slack user ids allowed to manage any bridge.
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            admins: Vec::new(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub signing_secret: String,
    #[serde(default = "default_slack_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub user_token: Option<String>,
    #[serde(default)]
    pub user_cookie: Option<String>,
    /// Workspace host (`https://<team>.slack.com`) serving the admin roles API.
    #[serde(default)]
    pub workspace_url: Option<String>,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            signing_secret: String::new(),
            api_url: default_slack_api_url(),
            user_token: None,
            user_cookie: None,
            workspace_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IrcConfig {
    #[serde(default = "default_irc_host")]
    pub host: String,
    #[serde(default = "default_irc_port")]
    pub port: u16,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_irc_realname")]
    pub realname: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl IrcConfig {
    pub fn username(&self) -> &str {
        self.username
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.nick)
    }
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            host: default_irc_host(),
            port: default_irc_port(),
            nick: String::new(),
            username: None,
            realname: default_irc_realname(),
            password: None,
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_filename")]
    pub filename: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            filename: default_database_filename(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_directory_base_url")]
    pub base_url: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_directory_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdnConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cdn_url")]
    pub url: String,
    #[serde(default)]
    pub token: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_cdn_url(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThreadConfig {
    #[serde(default = "default_thread_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_thread_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserCacheConfig {
    #[serde(default = "default_user_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for UserCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_user_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AvatarConfig {
    #[serde(default = "default_avatar_pool")]
    pub pool: Vec<String>,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            pool: default_avatar_pool(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new("config.yaml"));
        let mut config = if path.exists() {
            Self::parse_file(path)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SLACK_BOT_TOKEN") {
            self.slack.bot_token = value;
        }
        if let Some(value) = lookup("SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = value;
        }
        if let Some(value) = lookup("SLACK_API_URL") {
            self.slack.workspace_url = Some(value);
        }
        if let Some(value) = lookup("SLACK_USER_TOKEN") {
            self.slack.user_token = Some(value);
        }
        if let Some(value) = lookup("SLACK_USER_COOKIE") {
            self.slack.user_cookie = Some(value);
        }
        if let Some(value) = lookup("ADMINS") {
            self.bridge.admins = value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
        if let Some(port) = lookup("PORT").and_then(|value| value.parse().ok()) {
            self.bridge.port = port;
        }
        if let Some(value) = lookup("IRC_NICK") {
            self.irc.nick = value;
        }
        if let Some(value) = lookup("IRC_HOST") {
            self.irc.host = value;
        }
        if let Some(port) = lookup("IRC_PORT").and_then(|value| value.parse().ok()) {
            self.irc.port = port;
        }
        if let Some(value) = lookup("DATABASE_PATH") {
            self.database.filename = value;
        }
        if let Some(value) = lookup("CDN_TOKEN") {
            self.cdn.enabled = !value.is_empty();
            self.cdn.token = value;
        }
        if let Some(value) = lookup("CACHET_ENABLED") {
            self.directory.enabled = value == "true";
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_slack_api_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_irc_host() -> String {
    "irc.hackclub.com".to_string()
}

fn default_irc_port() -> u16 {
    6667
}

fn default_irc_realname() -> String {
    "Slack IRC Bridge".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    4
}

fn default_database_filename() -> String {
    "bridge.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_directory_base_url() -> String {
    "https://cachet.dunkirk.sh".to_string()
}

fn default_cdn_url() -> String {
    "https://cdn.hackclub.com/api/v3/new".to_string()
}

fn default_thread_timeout_secs() -> u64 {
    600
}

fn default_user_cache_ttl_secs() -> u64 {
    3600
}

fn default_avatar_pool() -> Vec<String> {
    [
        "https://hc-cdn.hel1.your-objectstorage.com/s/v3/4183627c4d26c56c915e104a8a7374f43acd1733_pfp__1_.png",
        "https://hc-cdn.hel1.your-objectstorage.com/s/v3/389b1e6bd4248a7e5dd88e14c1adb8eb01267080_pfp__2_.png",
        "https://hc-cdn.hel1.your-objectstorage.com/s/v3/03011a5e59548191de058f33ccd1d1cb1d64f2a0_pfp__3_.png",
        "https://hc-cdn.hel1.your-objectstorage.com/s/v3/f9c57b88fbd4633114c1864bcc2968db555dbd2a_pfp__4_.png",
        "https://hc-cdn.hel1.your-objectstorage.com/s/v3/e61a8cabee5a749588125242747b65122fb94205_pfp.png",
    ]
    .into_iter()
    .map(ToOwned::to_owned)
    .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::Config;

    #[test]
    fn yaml_sections_fall_back_to_defaults() {
        let mut file = NamedTempFile::new().expect("temp config file");
        writeln!(
            file,
            "slack:\n  bot_token: xoxb-1\n  signing_secret: s3cret\nbridge:\n  admins: [U1]\nirc:\n  nick: bridgebot\n  port: 6697"
        )
        .expect("write config");

        let config = Config::parse_file(file.path()).expect("parse config");

        assert_eq!(config.slack.bot_token, "xoxb-1");
        assert_eq!(config.irc.port, 6697);
        assert_eq!(config.irc.host, "irc.hackclub.com");
        assert_eq!(config.irc.username(), "bridgebot");
        assert_eq!(config.bridge.port, 3000);
        assert_eq!(config.threads.timeout_secs, 600);
        assert_eq!(config.user_cache.ttl_secs, 3600);
        assert_eq!(config.avatars.pool.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SLACK_BOT_TOKEN", "xoxb-env"),
            ("ADMINS", "U1, U2 ,,U3"),
            ("PORT", "8080"),
            ("CACHET_ENABLED", "true"),
            ("CDN_TOKEN", "cdn-token"),
        ]);
        let mut config = Config::default();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.slack.bot_token, "xoxb-env");
        assert_eq!(config.bridge.admins, vec!["U1", "U2", "U3"]);
        assert_eq!(config.bridge.port, 8080);
        assert!(config.directory.enabled);
        assert!(config.cdn.enabled);
        assert_eq!(config.cdn.token, "cdn-token");
    }

    #[test]
    fn unparseable_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.bridge.port, 3000);
    }
}
