use crate::db::{ChannelMapping, UserMapping};

pub const BRIDGE_CHANNEL: &str = "/irc-bridge-channel";
pub const UNBRIDGE_CHANNEL: &str = "/irc-unbridge-channel";
pub const BRIDGE_USER: &str = "/irc-bridge-user";
pub const UNBRIDGE_USER: &str = "/irc-unbridge-user";
pub const BRIDGE_LIST: &str = "/irc-bridge-list";

pub const NO_PERMISSION_REPLY: &str = "❌ You don't have permission to manage this channel. You must be the channel creator, a channel manager, or an admin.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackCommandOutcome {
    Ignored,
    Reply(String),
    BridgeChannelRequested { irc_channel: String },
    UnbridgeChannelRequested,
    BridgeUserRequested { irc_nick: String },
    UnbridgeUserRequested,
    ListRequested,
}

/// Parses `/irc-*` slash commands. Anything that needs the stores or Slack is
/// returned as a request for the bridge to carry out.
#[derive(Debug, Default, Clone)]
pub struct SlackCommandHandler;

impl SlackCommandHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn is_command(&self, command: &str) -> bool {
        matches!(
            command.trim(),
            BRIDGE_CHANNEL | UNBRIDGE_CHANNEL | BRIDGE_USER | UNBRIDGE_USER | BRIDGE_LIST
        )
    }

    pub fn handle(&self, command: &str, text: &str) -> SlackCommandOutcome {
        let argument = text.split_whitespace().next().unwrap_or_default();
        match command.trim() {
            BRIDGE_CHANNEL => {
                if argument.is_empty() {
                    return SlackCommandOutcome::Reply(format!(
                        "Usage: {BRIDGE_CHANNEL} #irc-channel"
                    ));
                }
                if !argument.starts_with('#') {
                    return SlackCommandOutcome::Reply(
                        "❌ IRC channel must start with #".to_string(),
                    );
                }
                SlackCommandOutcome::BridgeChannelRequested {
                    irc_channel: argument.to_string(),
                }
            }
            UNBRIDGE_CHANNEL => SlackCommandOutcome::UnbridgeChannelRequested,
            BRIDGE_USER => {
                if argument.is_empty() {
                    return SlackCommandOutcome::Reply("❌ IRC nickname is required".to_string());
                }
                SlackCommandOutcome::BridgeUserRequested {
                    irc_nick: argument.to_string(),
                }
            }
            UNBRIDGE_USER => SlackCommandOutcome::UnbridgeUserRequested,
            BRIDGE_LIST => SlackCommandOutcome::ListRequested,
            _ => SlackCommandOutcome::Ignored,
        }
    }
}

pub fn format_bridge_list(channels: &[ChannelMapping], users: &[UserMapping]) -> String {
    let mut lines = vec!["*IRC Bridge Status*".to_string(), "*Channel Bridges:*".to_string()];
    if channels.is_empty() {
        lines.push("_No channel bridges configured_".to_string());
    }
    lines.extend(
        channels
            .iter()
            .map(|map| format!("• <#{}> ↔️ *{}*", map.slack_channel_id, map.irc_channel)),
    );

    lines.push("*User Mappings:*".to_string());
    if users.is_empty() {
        lines.push("_No user mappings configured_".to_string());
    }
    lines.extend(
        users
            .iter()
            .map(|map| format!("• <@{}> ↔️ *{}*", map.slack_user_id, map.irc_nick)),
    );
    lines.join("\n")
}
