use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// A Slack message as the bridge sees it after event parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlackInboundMessage {
    pub channel: String,
    pub user: Option<String>,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub subtype: Option<String>,
    pub bot_id: Option<String>,
    /// `url_private` of every attached file.
    pub files: Vec<String>,
    pub user_display_name: Option<String>,
}

impl SlackInboundMessage {
    /// The thread root when this message is a reply; `None` for top-level
    /// messages and for the root itself.
    pub fn reply_thread_ts(&self) -> Option<&str> {
        self.thread_ts
            .as_deref()
            .filter(|thread_ts| *thread_ts != self.ts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcInboundMessage {
    pub nick: String,
    pub channel: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlackImageAttachment {
    pub image_url: String,
    pub fallback: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlackOutboundMessage {
    pub channel: String,
    pub text: String,
    pub username: String,
    pub icon_url: Option<String>,
    pub attachments: Vec<SlackImageAttachment>,
    pub thread_ts: Option<String>,
}

/// Author and text of a thread's first message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackThreadRoot {
    pub user: Option<String>,
    pub text: String,
}

#[async_trait]
pub trait SlackMessageTarget: Send + Sync {
    async fn post_message(&self, message: &SlackOutboundMessage) -> Result<()>;
    async fn thread_root(&self, channel: &str, thread_ts: &str) -> Result<Option<SlackThreadRoot>>;
    async fn join_channel(&self, channel: &str) -> Result<()>;
    async fn leave_channel(&self, channel: &str) -> Result<()>;
}

#[async_trait]
pub trait IrcMessageTarget: Send + Sync {
    async fn say(&self, channel: &str, text: &str) -> Result<()>;
    async fn join(&self, channel: &str) -> Result<()>;
}
