use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::bridge::message_flow::{SlackMessageTarget, SlackOutboundMessage, SlackThreadRoot};
use crate::bridge::permissions::ChannelRoleSource;
use crate::bridge::user_cache::{DisplayNameSource, UserInfo};
use crate::config::SlackConfig;

pub mod events;

/// Result of `auth.test`.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub user_id: String,
    pub team_id: Option<String>,
}

/// Credentials for the workspace admin API, only present when fully configured.
struct AdminAccess {
    workspace_url: String,
    user_token: SecretString,
    cookie: SecretString,
}

pub struct SlackClient {
    http: Client,
    api_url: String,
    bot_token: SecretString,
    admin: Option<AdminAccess>,
}

impl SlackClient {
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to construct HTTP client")?;

        let admin = match (
            config.workspace_url.as_deref().map(str::trim),
            config.user_token.as_deref(),
            config.user_cookie.as_deref(),
        ) {
            (Some(url), Some(token), Some(cookie))
                if !url.is_empty() && !token.is_empty() && !cookie.is_empty() =>
            {
                Some(AdminAccess {
                    workspace_url: url.trim_end_matches('/').to_string(),
                    user_token: SecretString::from(token.to_string()),
                    cookie: SecretString::from(cookie.to_string()),
                })
            }
            _ => None,
        };

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: SecretString::from(config.bot_token.clone()),
            admin,
        })
    }

    pub async fn auth_test(&self) -> Result<AuthInfo> {
        let value = self.slack_api_post("auth.test", json!({})).await?;
        let auth = AuthInfo {
            user_id: value
                .get("user_id")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("auth.test missing user_id"))?
                .to_string(),
            team_id: value
                .get("team_id")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        };
        info!(
            "slack auth ok user_id={} team_id={:?}",
            auth.user_id, auth.team_id
        );
        Ok(auth)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserInfo>> {
        let value = match self.slack_api_form("users.info", &[("user", user_id)]).await {
            Ok(value) => value,
            Err(err) if err.to_string().contains("user_not_found") => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(value.get("user").map(user_info_from_value))
    }

    pub async fn conversation_creator(&self, channel_id: &str) -> Result<Option<String>> {
        let value = self
            .slack_api_form("conversations.info", &[("channel", channel_id)])
            .await?;
        Ok(value
            .pointer("/channel/creator")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned))
    }

    async fn chat_post_message(&self, message: &SlackOutboundMessage) -> Result<String> {
        let payload = chat_post_payload(message);
        let response = self.slack_api_post("chat.postMessage", payload).await?;
        response
            .get("ts")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow!("chat.postMessage missing ts"))
    }

    async fn slack_api_post(&self, method: &str, payload: Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/{method}", self.api_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("request to Slack API method {method} failed"))?;
        read_slack_response(method, response).await
    }

    /// Read methods only accept form-encoded arguments.
    async fn slack_api_form(&self, method: &str, params: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/{method}", self.api_url))
            .bearer_auth(self.bot_token.expose_secret())
            .form(params)
            .send()
            .await
            .with_context(|| format!("request to Slack API method {method} failed"))?;
        read_slack_response(method, response).await
    }
}

async fn read_slack_response(method: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let value: Value = response
        .json()
        .await
        .with_context(|| format!("Slack API method {method} returned non-JSON body"))?;

    if !status.is_success() {
        return Err(anyhow!(
            "Slack API {} failed status={} body={}",
            method,
            status,
            value
        ));
    }
    check_ok(method, value)
}

fn check_ok(method: &str, value: Value) -> Result<Value> {
    if !value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let code = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Err(anyhow!("Slack API {} returned ok=false: {}", method, code));
    }
    Ok(value)
}

fn chat_post_payload(message: &SlackOutboundMessage) -> Value {
    let mut payload = json!({
        "channel": message.channel,
        "text": message.text,
        "username": message.username,
        "unfurl_links": false,
        "unfurl_media": false
    });
    if let Some(icon_url) = &message.icon_url {
        payload["icon_url"] = json!(icon_url);
    }
    if let Some(thread_ts) = &message.thread_ts {
        payload["thread_ts"] = json!(thread_ts);
    }
    if !message.attachments.is_empty() {
        payload["attachments"] = json!(message.attachments);
    }
    payload
}

/// `name` falls back to `Unknown`, `real_name` to the name.
fn user_info_from_value(user: &Value) -> UserInfo {
    let non_empty = |key: &str| {
        user.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    };
    let name = non_empty("name").unwrap_or_else(|| "Unknown".to_string());
    let real_name = non_empty("real_name").unwrap_or_else(|| name.clone());
    UserInfo { name, real_name }
}

fn thread_root_from_replies(value: &Value) -> Option<SlackThreadRoot> {
    let root = value.get("messages")?.as_array()?.first()?;
    Some(SlackThreadRoot {
        user: root
            .get("user")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        text: root
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn managers_from_assignments(value: &Value) -> Vec<String> {
    value
        .pointer("/role_assignments/0/users")
        .and_then(Value::as_array)
        .map(|users| {
            users
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SlackMessageTarget for SlackClient {
    async fn post_message(&self, message: &SlackOutboundMessage) -> Result<()> {
        let ts = self.chat_post_message(message).await?;
        debug!("slack message posted channel={} ts={}", message.channel, ts);
        Ok(())
    }

    async fn thread_root(&self, channel: &str, thread_ts: &str) -> Result<Option<SlackThreadRoot>> {
        let value = self
            .slack_api_form(
                "conversations.replies",
                &[("channel", channel), ("ts", thread_ts), ("limit", "1")],
            )
            .await?;
        Ok(thread_root_from_replies(&value))
    }

    async fn join_channel(&self, channel: &str) -> Result<()> {
        self.slack_api_post("conversations.join", json!({ "channel": channel }))
            .await?;
        info!("joined slack channel={}", channel);
        Ok(())
    }

    async fn leave_channel(&self, channel: &str) -> Result<()> {
        self.slack_api_post("conversations.leave", json!({ "channel": channel }))
            .await?;
        info!("left slack channel={}", channel);
        Ok(())
    }
}

#[async_trait]
impl DisplayNameSource for SlackClient {
    fn source_name(&self) -> &'static str {
        "slack"
    }

    async fn lookup(&self, user_id: &str) -> Result<Option<UserInfo>> {
        self.get_user(user_id).await
    }
}

#[async_trait]
impl ChannelRoleSource for SlackClient {
    async fn channel_creator(&self, channel_id: &str) -> Result<Option<String>> {
        self.conversation_creator(channel_id).await
    }

    async fn channel_managers(&self, channel_id: &str) -> Result<Vec<String>> {
        let Some(admin) = &self.admin else {
            return Ok(Vec::new());
        };
        let response = self
            .http
            .post(format!(
                "{}/api/admin.roles.entity.listAssignments",
                admin.workspace_url
            ))
            .header(reqwest::header::COOKIE, admin.cookie.expose_secret())
            .form(&[
                ("token", admin.user_token.expose_secret()),
                ("entity_id", channel_id),
            ])
            .send()
            .await
            .context("request to admin.roles.entity.listAssignments failed")?;
        let value = read_slack_response("admin.roles.entity.listAssignments", response).await?;
        Ok(managers_from_assignments(&value))
    }
}
