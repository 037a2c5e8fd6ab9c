pub mod common;
pub mod irc_parser;
pub mod slack_parser;

pub use irc_parser::irc_to_slack;
pub use slack_parser::slack_to_irc;
