use serde::Deserialize;

use crate::bridge::message_flow::SlackInboundMessage;

/// Top-level Events API body.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        event: SlackEvent,
        #[serde(default)]
        event_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub files: Vec<SlackFile>,
    #[serde(default)]
    pub user_profile: Option<SlackUserProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackFile {
    #[serde(default)]
    pub url_private: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackUserProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
}

impl SlackUserProfile {
    fn best_name(&self) -> Option<String> {
        [self.display_name.as_deref(), self.real_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .map(str::to_string)
    }
}

impl SlackEvent {
    /// `None` for anything but channel messages.
    pub fn into_inbound(self) -> Option<SlackInboundMessage> {
        if self.event_type != "message" {
            return None;
        }
        let channel = self.channel?;
        let user_display_name = self.user_profile.as_ref().and_then(SlackUserProfile::best_name);
        Some(SlackInboundMessage {
            channel,
            user: self.user,
            text: self.text.unwrap_or_default(),
            ts: self.ts.unwrap_or_default(),
            thread_ts: self.thread_ts,
            subtype: self.subtype,
            bot_id: self.bot_id,
            files: self
                .files
                .into_iter()
                .filter_map(|file| file.url_private)
                .collect(),
            user_display_name,
        })
    }
}

/// Form-encoded slash command body.
#[derive(Debug, Clone, Deserialize)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
}

impl SlashCommandPayload {
    pub fn from_form(body: &[u8]) -> Result<Self, serde_json::Error> {
        let fields: serde_json::Map<String, serde_json::Value> = url::form_urlencoded::parse(body)
            .map(|(key, value)| (key.into_owned(), serde_json::Value::String(value.into_owned())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(fields))
    }
}
