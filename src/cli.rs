use std::path::PathBuf;

use clap::Parser;

/// Bridges Slack channels and IRC channels.
#[derive(Debug, Parser)]
#[command(name = "slack-irc-bridge", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn config_flag_is_optional() {
        assert!(Cli::try_parse_from(["slack-irc-bridge"]).is_ok());
    }

    #[test]
    fn config_flag_accepts_path() {
        let cli = Cli::try_parse_from(["slack-irc-bridge", "--config", "/etc/bridge.yaml"])
            .expect("parse with config");
        assert_eq!(
            cli.config.as_deref(),
            Some(std::path::Path::new("/etc/bridge.yaml"))
        );
    }
}
