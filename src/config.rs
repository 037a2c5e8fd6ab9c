pub use self::parser::{Config, DatabaseConfig, IrcConfig, LoggingConfig, SlackConfig};
pub use self::validator::ConfigError;

mod parser;
mod validator;
