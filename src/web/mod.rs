use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use salvo::prelude::*;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::bridge::BridgeCore;
use crate::bridge::message_flow::SlackInboundMessage;
use crate::config::Config;

pub mod handlers;
pub mod middleware;

use self::middleware::auth::create_router;

/// Bound on queued Slack messages waiting for the relay worker.
pub const SLACK_EVENT_QUEUE: usize = 256;

pub struct WebState {
    pub bridge: Arc<BridgeCore>,
    pub signing_secret: SecretString,
    pub slack_events: mpsc::Sender<SlackInboundMessage>,
}

static WEB_STATE: OnceCell<WebState> = OnceCell::new();

pub fn web_state() -> Option<&'static WebState> {
    WEB_STATE.get()
}

#[derive(Clone)]
pub struct WebServer {
    config: Arc<Config>,
}

impl WebServer {
    pub fn new(
        config: Arc<Config>,
        bridge: Arc<BridgeCore>,
        slack_events: mpsc::Sender<SlackInboundMessage>,
    ) -> Self {
        let state = WebState {
            bridge,
            signing_secret: SecretString::from(config.slack.signing_secret.clone()),
            slack_events,
        };
        if WEB_STATE.set(state).is_err() {
            warn!("web state already initialized, keeping the first one");
        }
        Self { config }
    }

    pub async fn start(&self) -> Result<()> {
        let bind_addr = format!(
            "{}:{}",
            self.config.bridge.bind_address, self.config.bridge.port
        );
        info!("starting web server on {}", bind_addr);

        let acceptor = TcpListener::new(bind_addr).bind().await;
        Server::new(acceptor).serve(create_router()).await;

        Ok(())
    }
}

/// Relays queued Slack messages one at a time so IRC sees them in the order
/// Slack delivered them.
pub async fn run_slack_event_worker(
    bridge: Arc<BridgeCore>,
    mut events: mpsc::Receiver<SlackInboundMessage>,
) -> Result<()> {
    while let Some(message) = events.recv().await {
        if let Err(err) = bridge.handle_slack_message(&message).await {
            error!(
                "failed to handle slack message channel={} ts={}: {}",
                message.channel, message.ts, err
            );
        }
    }
    info!("slack event queue closed");
    Ok(())
}
