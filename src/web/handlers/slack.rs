use chrono::Utc;
use salvo::prelude::*;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::bridge::logic::preview_text;
use crate::slack::events::{SlackEnvelope, SlashCommandPayload};
use crate::web::middleware::auth::verify_slack_signature;
use crate::web::{WebState, web_state};

fn render_error(res: &mut Response, status: StatusCode, message: &str) {
    res.status_code(status);
    res.render(Json(json!({ "error": message })));
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn ephemeral(res: &mut Response, text: &str) {
    res.render(Json(json!({
        "response_type": "ephemeral",
        "text": text,
    })));
}

/// Events API and slash command endpoint.
#[handler]
pub async fn slack_events(req: &mut Request, res: &mut Response) {
    let Some(state) = web_state() else {
        render_error(res, StatusCode::SERVICE_UNAVAILABLE, "bridge is starting");
        return;
    };

    let body = match req.payload().await {
        Ok(body) => body.to_vec(),
        Err(err) => {
            render_error(res, StatusCode::BAD_REQUEST, &format!("unreadable body: {err}"));
            return;
        }
    };
    let timestamp = header_value(req, "X-Slack-Request-Timestamp");
    let signature = header_value(req, "X-Slack-Signature");
    if let Err(err) = verify_slack_signature(
        state.signing_secret.expose_secret(),
        timestamp.as_deref(),
        signature.as_deref(),
        &body,
        Utc::now().timestamp(),
    ) {
        warn!("rejected slack request: {}", err);
        render_error(res, StatusCode::UNAUTHORIZED, "invalid signature");
        return;
    }

    if let Some(retry) = header_value(req, "X-Slack-Retry-Num") {
        debug!("slack retry acknowledged and dropped retry_num={}", retry);
        res.render("ok");
        return;
    }

    let is_form = header_value(req, "Content-Type")
        .is_some_and(|value| value.contains("application/x-www-form-urlencoded"));
    if is_form {
        handle_slash_command(state, &body, res).await;
    } else {
        handle_event_payload(state, &body, res).await;
    }
}

async fn handle_slash_command(state: &WebState, body: &[u8], res: &mut Response) {
    let payload = match SlashCommandPayload::from_form(body) {
        Ok(payload) => payload,
        Err(err) => {
            render_error(res, StatusCode::BAD_REQUEST, &format!("invalid command: {err}"));
            return;
        }
    };
    if !state.bridge.is_command(&payload.command) {
        ephemeral(res, &format!("❌ Unknown command {}", payload.command));
        return;
    }

    match state
        .bridge
        .handle_slash_command(
            &payload.command,
            &payload.text,
            &payload.user_id,
            &payload.channel_id,
        )
        .await
    {
        Ok(reply) => ephemeral(res, &reply),
        Err(err) => {
            error!(
                "slash command failed command={} user={}: {}",
                payload.command, payload.user_id, err
            );
            ephemeral(res, &format!("❌ Command failed: {err}"));
        }
    }
}

async fn handle_event_payload(state: &WebState, body: &[u8], res: &mut Response) {
    let envelope: SlackEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(
                "unparseable slack event body={}: {}",
                preview_text(&String::from_utf8_lossy(body)),
                err
            );
            render_error(res, StatusCode::BAD_REQUEST, "invalid event payload");
            return;
        }
    };

    match envelope {
        SlackEnvelope::UrlVerification { challenge } => {
            res.render(Json(json!({ "challenge": challenge })));
        }
        SlackEnvelope::EventCallback { event, event_id } => {
            let event_type = event.event_type.clone();
            match event.into_inbound() {
                Some(message) => {
                    if state.slack_events.send(message).await.is_err() {
                        error!("slack event worker is gone, event dropped event_id={:?}", event_id);
                    }
                }
                None => debug!(
                    "slack event ignored event_id={:?} type={}",
                    event_id, event_type
                ),
            }
            res.render("ok");
        }
        SlackEnvelope::Unknown => {
            debug!("unknown slack envelope acknowledged");
            res.render("ok");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use hmac::{Hmac, Mac};
    use parking_lot::Mutex;
    use salvo::prelude::*;
    use salvo::test::{ResponseExt, TestClient};
    use sha2::Sha256;
    use tempfile::NamedTempFile;
    use tokio::sync::{OnceCell, mpsc};

    use crate::bridge::BridgeCore;
    use crate::bridge::message_flow::{
        IrcMessageTarget, SlackInboundMessage, SlackMessageTarget, SlackOutboundMessage,
        SlackThreadRoot,
    };
    use crate::bridge::permissions::ChannelRoleSource;
    use crate::bridge::user_cache::UserInfoCache;
    use crate::config::{Config, DatabaseConfig};
    use crate::db::DatabaseManager;
    use crate::web::middleware::auth::create_router;
    use crate::web::{SLACK_EVENT_QUEUE, WebServer};

    const SECRET: &str = "web-test-signing-secret";
    const URL: &str = "http://127.0.0.1:5800/slack";

    struct Quiet;

    #[async_trait]
    impl SlackMessageTarget for Quiet {
        async fn post_message(&self, _message: &SlackOutboundMessage) -> Result<()> {
            Ok(())
        }

        async fn thread_root(&self, _channel: &str, _thread_ts: &str) -> Result<Option<SlackThreadRoot>> {
            Ok(None)
        }

        async fn join_channel(&self, _channel: &str) -> Result<()> {
            Ok(())
        }

        async fn leave_channel(&self, _channel: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl IrcMessageTarget for Quiet {
        async fn say(&self, _channel: &str, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn join(&self, _channel: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ChannelRoleSource for Quiet {
        async fn channel_creator(&self, _channel_id: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn channel_managers(&self, _channel_id: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    static QUEUE: OnceCell<Mutex<mpsc::Receiver<SlackInboundMessage>>> = OnceCell::const_new();

    /// Installs the process-wide web state once and hands back its event queue.
    async fn queue() -> &'static Mutex<mpsc::Receiver<SlackInboundMessage>> {
        QUEUE
            .get_or_init(|| async {
                // The database must outlive every test in this binary.
                let file = Box::leak(Box::new(NamedTempFile::new().expect("temp sqlite file")));
                let manager = DatabaseManager::new(&DatabaseConfig {
                    filename: file.path().to_string_lossy().to_string(),
                })
                .await
                .expect("db manager");
                manager.migrate().await.expect("migrate");
                manager
                    .channel_store()
                    .create("C1", "#lounge")
                    .await
                    .expect("channel mapping");

                let mut config = Config::default();
                config.slack.signing_secret = SECRET.to_string();
                let config = Arc::new(config);
                let quiet = Arc::new(Quiet);
                let bridge = Arc::new(BridgeCore::new(
                    config.clone(),
                    Arc::new(manager),
                    quiet.clone(),
                    quiet.clone(),
                    Arc::new(UserInfoCache::new(Duration::from_secs(60))),
                    quiet,
                ));
                let (tx, rx) = mpsc::channel(SLACK_EVENT_QUEUE);
                WebServer::new(config, bridge, tx);
                Mutex::new(rx)
            })
            .await
    }

    fn signed(body: &str) -> (String, String) {
        let timestamp = Utc::now().timestamp().to_string();
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).expect("hmac key");
        mac.update(format!("v0:{timestamp}:{body}").as_bytes());
        let signature = format!("v0={}", hex::encode(mac.finalize().into_bytes()));
        (timestamp, signature)
    }

    async fn post_json(body: &str, retry: Option<&str>) -> Response {
        let (timestamp, signature) = signed(body);
        let mut request = TestClient::post(URL)
            .add_header("X-Slack-Request-Timestamp", timestamp, true)
            .add_header("X-Slack-Signature", signature, true);
        if let Some(retry) = retry {
            request = request.add_header("X-Slack-Retry-Num", retry.to_string(), true);
        }
        request
            .raw_json(body.to_string())
            .send(&Service::new(create_router()))
            .await
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        queue().await;
        let body = r#"{"type":"url_verification","challenge":"abc"}"#;
        let (timestamp, _) = signed(body);

        let res = TestClient::post(URL)
            .add_header("X-Slack-Request-Timestamp", timestamp, true)
            .add_header("X-Slack-Signature", "v0=00ff", true)
            .raw_json(body)
            .send(&Service::new(create_router()))
            .await;
        assert_eq!(res.status_code, Some(StatusCode::UNAUTHORIZED));

        let unsigned = TestClient::post(URL)
            .raw_json(body)
            .send(&Service::new(create_router()))
            .await;
        assert_eq!(unsigned.status_code, Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn url_verification_echoes_challenge() {
        queue().await;
        let mut res = post_json(
            r#"{"token":"t","type":"url_verification","challenge":"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"}"#,
            None,
        )
        .await;

        let body: serde_json::Value = res.take_json().await.expect("json body");
        assert_eq!(
            body["challenge"],
            "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"
        );
    }

    #[tokio::test]
    async fn message_events_are_queued_and_retries_dropped() {
        let queue = queue().await;
        let event = |text: &str| {
            format!(
                r#"{{"type":"event_callback","event_id":"Ev{text}","event":{{"type":"message","channel":"C1","user":"U1","text":"{text}","ts":"1700000000.000100"}}}}"#
            )
        };

        let mut first = post_json(&event("fresh"), None).await;
        assert_eq!(first.take_string().await.expect("body"), "ok");
        let mut retried = post_json(&event("retried"), Some("1")).await;
        assert_eq!(retried.take_string().await.expect("body"), "ok");

        let mut rx = queue.lock();
        let queued = rx.try_recv().expect("queued message");
        assert_eq!(queued.channel, "C1");
        assert_eq!(queued.user.as_deref(), Some("U1"));
        assert_eq!(queued.text, "fresh");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn form_bodies_are_answered_as_slash_commands() {
        queue().await;
        let send = |body: &'static str| async move {
            let (timestamp, signature) = signed(body);
            TestClient::post(URL)
                .add_header("X-Slack-Request-Timestamp", timestamp, true)
                .add_header("X-Slack-Signature", signature, true)
                .raw_form(body)
                .send(&Service::new(create_router()))
                .await
        };

        let mut list = send("command=%2Firc-bridge-list&text=&user_id=U1&channel_id=C1").await;
        let reply: serde_json::Value = list.take_json().await.expect("json body");
        assert_eq!(reply["response_type"], "ephemeral");
        let text = reply["text"].as_str().expect("reply text");
        assert!(text.starts_with("*IRC Bridge Status*"), "{text}");
        assert!(text.contains("• <#C1> ↔️ *#lounge*"), "{text}");

        let mut unknown = send("command=%2Fnope&text=&user_id=U1&channel_id=C1").await;
        let reply: serde_json::Value = unknown.take_json().await.expect("json body");
        assert_eq!(reply["text"], "❌ Unknown command /nope");
    }
}
