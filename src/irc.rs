use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use ::irc::client::prelude::{Client, Command, Config as ClientConfig, Message, Response, Sender};
use parking_lot::RwLock as SyncRwLock;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::bridge::BridgeCore;
use crate::bridge::message_flow::{IrcInboundMessage, IrcMessageTarget};
use crate::config::IrcConfig;

const MAX_LINE_BYTES: usize = 400;

pub struct IrcClient {
    config: IrcConfig,
    sender: SyncRwLock<Option<Sender>>,
    bridge: RwLock<Option<Arc<BridgeCore>>>,
}

impl IrcClient {
    pub fn new(config: IrcConfig) -> Self {
        Self {
            config,
            sender: SyncRwLock::new(None),
            bridge: RwLock::new(None),
        }
    }

    pub async fn set_bridge(&self, bridge: Arc<BridgeCore>) {
        *self.bridge.write().await = Some(bridge);
    }

    /// Connects and keeps reconnecting after a fixed delay. Never returns
    /// under normal operation.
    pub async fn start(&self) -> Result<()> {
        let delay = Duration::from_secs(self.config.reconnect_delay_secs.max(1));
        loop {
            match self.run_session().await {
                Ok(()) => warn!("irc connection closed by server"),
                Err(err) => error!("irc connection failed: {err:#}"),
            }
            *self.sender.write() = None;
            info!("reconnecting to irc in {} seconds", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_session(&self) -> Result<()> {
        let channels = self.mapped_channels().await;
        info!(
            "connecting to irc host={} port={} nick={} channels={}",
            self.config.host,
            self.config.port,
            self.config.nick,
            channels.len()
        );
        let mut client = Client::from_config(client_config(&self.config, channels))
            .await
            .with_context(|| format!("failed to connect to {}:{}", self.config.host, self.config.port))?;
        client.identify().context("failed to register with irc")?;
        let mut stream = client.stream().context("failed to open irc stream")?;
        *self.sender.write() = Some(client.sender());

        // Each message is handled to completion before the next is read.
        while let Some(message) = stream.next().await.transpose().context("irc stream failed")? {
            self.handle_message(&client, message).await;
        }
        Ok(())
    }

    async fn mapped_channels(&self) -> Vec<String> {
        let Some(bridge) = self.bridge.read().await.clone() else {
            warn!("irc connecting before bridge was attached, no channels joined");
            return Vec::new();
        };
        match bridge.mapped_irc_channels().await {
            Ok(channels) => channels,
            Err(err) => {
                error!("failed to load channel mappings: {}", err);
                Vec::new()
            }
        }
    }

    async fn handle_message(&self, client: &Client, message: Message) {
        match &message.command {
            Command::Response(Response::RPL_WELCOME, _) => {
                info!("registered with irc server nick={}", client.current_nickname());
            }
            Command::JOIN(channel, _, _)
                if message.source_nickname() == Some(client.current_nickname()) =>
            {
                info!("joined irc channel={}", channel);
            }
            Command::ERROR(reason) => warn!("irc server error: {}", reason),
            Command::PRIVMSG(..) => {
                let Some(inbound) = inbound_message(&message) else {
                    return;
                };
                let Some(bridge) = self.bridge.read().await.clone() else {
                    return;
                };
                if let Err(err) = bridge.handle_irc_message(&inbound).await {
                    error!(
                        "failed to handle irc message channel={} nick={}: {}",
                        inbound.channel, inbound.nick, err
                    );
                }
            }
            _ => {}
        }
    }

    fn sender(&self) -> Result<Sender> {
        self.sender
            .read()
            .clone()
            .ok_or_else(|| anyhow!("irc is not connected"))
    }
}

#[async_trait]
impl IrcMessageTarget for IrcClient {
    async fn say(&self, channel: &str, text: &str) -> Result<()> {
        let sender = self.sender()?;
        for line in outgoing_lines(text) {
            sender
                .send_privmsg(channel, line)
                .with_context(|| format!("failed to queue message for {channel}"))?;
        }
        Ok(())
    }

    async fn join(&self, channel: &str) -> Result<()> {
        self.sender()?
            .send_join(channel)
            .with_context(|| format!("failed to join {channel}"))
    }
}

fn client_config(config: &IrcConfig, channels: Vec<String>) -> ClientConfig {
    ClientConfig {
        nickname: Some(config.nick.clone()),
        alt_nicks: vec![format!("{}_", config.nick), format!("{}__", config.nick)],
        username: Some(config.username().to_string()),
        realname: Some(config.realname.clone()),
        server: Some(config.host.clone()),
        port: Some(config.port),
        password: config.password.clone().filter(|password| !password.is_empty()),
        use_tls: Some(false),
        channels,
        ..ClientConfig::default()
    }
}

/// Channel messages become bridge input; `/me` is relayed as `* nick text`.
/// Private messages and other CTCP requests are dropped.
fn inbound_message(message: &Message) -> Option<IrcInboundMessage> {
    let Command::PRIVMSG(target, text) = &message.command else {
        return None;
    };
    let nick = message.source_nickname()?;
    if !target.starts_with(['#', '&']) {
        debug!("irc private message ignored from={}", nick);
        return None;
    }
    let text = match ctcp_action(text) {
        Some(action) => format!("* {nick} {action}"),
        None if text.starts_with('\x01') => return None,
        None => text.clone(),
    };
    Some(IrcInboundMessage {
        nick: nick.to_string(),
        channel: target.clone(),
        text,
    })
}

fn ctcp_action(text: &str) -> Option<&str> {
    let body = text.strip_prefix("\x01ACTION")?;
    let body = body.strip_suffix('\x01').unwrap_or(body);
    Some(body.trim_start())
}

/// Splits text into IRC-safe lines: no CR/LF, no blanks, at most
/// [`MAX_LINE_BYTES`] bytes each.
fn outgoing_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.replace('\r', ""))
        .filter(|line| !line.trim().is_empty())
        .map(|line| truncate_to_char_boundary(&line, MAX_LINE_BYTES).to_string())
        .collect()
}

fn truncate_to_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::{
        IrcClient, Message, client_config, inbound_message, outgoing_lines, truncate_to_char_boundary,
    };
    use crate::bridge::message_flow::IrcMessageTarget;
    use crate::config::IrcConfig;

    fn parse(line: &str) -> Message {
        line.parse().expect("irc message")
    }

    #[test]
    fn channel_messages_become_inbound() {
        let message = inbound_message(&parse(":alice!~a@host.example PRIVMSG #lounge :hello: there\r\n"))
            .expect("channel message");
        assert_eq!(message.nick, "alice");
        assert_eq!(message.channel, "#lounge");
        assert_eq!(message.text, "hello: there");
    }

    #[test]
    fn actions_are_relayed_and_other_ctcp_dropped() {
        let action = inbound_message(&parse(":bob!b@h PRIVMSG #lounge :\x01ACTION waves\x01\r\n"))
            .expect("action");
        assert_eq!(action.text, "* bob waves");

        assert!(inbound_message(&parse(":bob!b@h PRIVMSG #lounge :\x01VERSION\x01\r\n")).is_none());
    }

    #[test]
    fn private_and_non_privmsg_lines_are_ignored() {
        assert!(inbound_message(&parse(":bob!b@h PRIVMSG bridgebot :psst\r\n")).is_none());
        assert!(inbound_message(&parse("PING :irc.example\r\n")).is_none());
        assert!(inbound_message(&parse(":bob!b@h JOIN #lounge\r\n")).is_none());
    }

    #[test]
    fn client_config_carries_identity_and_channels() {
        let config = IrcConfig {
            nick: "bridgebot".to_string(),
            password: Some(String::new()),
            ..IrcConfig::default()
        };
        let client = client_config(&config, vec!["#lounge".to_string()]);
        assert_eq!(client.nickname.as_deref(), Some("bridgebot"));
        assert_eq!(client.username.as_deref(), Some("bridgebot"));
        assert_eq!(client.alt_nicks, vec!["bridgebot_", "bridgebot__"]);
        assert_eq!(client.channels, vec!["#lounge"]);
        assert_eq!(client.password, None);
        assert_eq!(client.use_tls, Some(false));
    }

    #[tokio::test]
    async fn sending_before_connect_fails() {
        let client = IrcClient::new(IrcConfig::default());
        assert!(client.say("#lounge", "hi").await.is_err());
        assert!(client.join("#lounge").await.is_err());
    }

    #[test]
    fn outgoing_lines_drop_blanks_and_carriage_returns() {
        assert_eq!(
            outgoing_lines("one\r\n\n  \ntwo\r"),
            vec!["one".to_string(), "two".to_string()]
        );
        assert!(outgoing_lines("").is_empty());
    }

    #[test]
    fn long_lines_are_cut_on_char_boundary() {
        let line = format!("{}é", "a".repeat(399));
        let lines = outgoing_lines(&line);
        assert_eq!(lines[0], "a".repeat(399));

        assert_eq!(truncate_to_char_boundary("日本語", 4), "日");
        assert_eq!(truncate_to_char_boundary("short", 400), "short");
    }
}
