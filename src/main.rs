#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod bridge;
mod cli;
mod config;
mod db;
mod directory;
mod irc;
mod media;
mod parsers;
mod slack;
mod utils;
mod web;

use bridge::BridgeCore;
use bridge::user_cache::UserInfoCache;
use cli::Cli;
use config::Config;
use db::DatabaseManager;
use directory::CachetDirectory;
use crate::irc::IrcClient;
use media::CdnUploader;
use slack::SlackClient;
use web::{SLACK_EVENT_QUEUE, WebServer, run_slack_event_worker};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(Config::load(cli.config.as_deref())?);
    utils::logging::init_tracing(&config.logging);
    info!(
        "slack-irc-bridge starting up version={}",
        env!("CARGO_PKG_VERSION")
    );

    let db_manager = Arc::new(DatabaseManager::new(&config.database).await?);
    db_manager.migrate().await?;

    let slack_client = Arc::new(SlackClient::new(&config.slack)?);
    let irc_client = Arc::new(IrcClient::new(config.irc.clone()));

    let mut user_cache = UserInfoCache::new(Duration::from_secs(config.user_cache.ttl_secs));
    if config.directory.enabled {
        info!("user directory enabled base_url={}", config.directory.base_url);
        user_cache =
            user_cache.with_source(Arc::new(CachetDirectory::new(&config.directory.base_url)));
    }
    let user_cache = Arc::new(user_cache.with_source(slack_client.clone()));

    let mut bridge = BridgeCore::new(
        config.clone(),
        db_manager.clone(),
        slack_client.clone(),
        irc_client.clone(),
        user_cache,
        slack_client.clone(),
    );
    if config.cdn.enabled {
        info!("file re-hosting enabled endpoint={}", config.cdn.url);
        bridge = bridge.with_uploader(Arc::new(CdnUploader::new(
            &config.cdn.url,
            SecretString::from(config.cdn.token.clone()),
            SecretString::from(config.slack.bot_token.clone()),
        )));
    }
    let bridge = Arc::new(bridge);

    match slack_client.auth_test().await {
        Ok(auth) => bridge.set_bot_user_id(auth.user_id),
        Err(err) => warn!(
            "slack auth.test failed, own messages are only filtered by bot_id: {}",
            err
        ),
    }
    irc_client.set_bridge(bridge.clone()).await;

    info!(
        "loaded mappings channels={} users={}",
        db_manager.channel_store().list_all().await?.len(),
        db_manager.user_store().list_all().await?.len()
    );

    let (event_tx, event_rx) = mpsc::channel(SLACK_EVENT_QUEUE);
    let web_server = WebServer::new(config.clone(), bridge.clone(), event_tx);

    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("web server error: {}", e);
        }
    });

    let irc_handle = tokio::spawn(async move {
        if let Err(e) = irc_client.start().await {
            error!("irc client error: {}", e);
        }
    });

    let worker_bridge = bridge.clone();
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = run_slack_event_worker(worker_bridge, event_rx).await {
            error!("slack event worker error: {}", e);
        }
    });

    let bridge_handle = tokio::spawn(async move {
        if let Err(e) = bridge.start().await {
            error!("bridge error: {}", e);
        }
    });

    tokio::select! {
        _ = web_handle => {},
        _ = irc_handle => {},
        _ = worker_handle => {},
        _ = bridge_handle => {},
    }

    info!("slack-irc-bridge shutting down");
    Ok(())
}
