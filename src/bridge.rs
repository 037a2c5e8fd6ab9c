use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{DatabaseError, DatabaseManager};
use crate::directory;
use crate::media::FileUploader;

pub mod avatars;
pub mod commands;
pub mod logic;
pub mod mentions;
pub mod message_flow;
pub mod permissions;
pub mod threads;
pub mod translation;
pub mod user_cache;

use self::avatars::AvatarSelector;
use self::commands::{
    NO_PERMISSION_REPLY, SlackCommandHandler, SlackCommandOutcome, format_bridge_list,
};
use self::logic::{
    extract_image_attachments, format_irc_lines, format_thread_quote, irc_sender_display,
    parse_thread_reference, preview_text, should_ignore_irc_nick, slack_skip_reason,
};
use self::mentions::MentionResolver;
use self::message_flow::{
    IrcInboundMessage, IrcMessageTarget, SlackInboundMessage, SlackMessageTarget,
    SlackOutboundMessage,
};
use self::permissions::{ChannelRoleSource, PermissionChecker};
use self::threads::ThreadMapper;
use self::translation::MessageTranslator;
use self::user_cache::UserInfoCache;

const UNKNOWN_SENDER: &str = "Unknown";

#[derive(Clone)]
pub struct BridgeCore {
    config: Arc<Config>,
    db_manager: Arc<DatabaseManager>,
    slack: Arc<dyn SlackMessageTarget>,
    irc: Arc<dyn IrcMessageTarget>,
    translator: Arc<MessageTranslator>,
    thread_mapper: Arc<ThreadMapper>,
    user_cache: Arc<UserInfoCache>,
    avatars: AvatarSelector,
    permissions: Arc<PermissionChecker>,
    command_handler: SlackCommandHandler,
    uploader: Option<Arc<dyn FileUploader>>,
    bot_user_id: Arc<RwLock<Option<String>>>,
}

impl BridgeCore {
    pub fn new(
        config: Arc<Config>,
        db_manager: Arc<DatabaseManager>,
        slack: Arc<dyn SlackMessageTarget>,
        irc: Arc<dyn IrcMessageTarget>,
        user_cache: Arc<UserInfoCache>,
        roles: Arc<dyn ChannelRoleSource>,
    ) -> Self {
        let mentions = Arc::new(MentionResolver::new(
            db_manager.user_store(),
            user_cache.clone(),
        ));
        Self {
            translator: Arc::new(MessageTranslator::new(mentions)),
            thread_mapper: Arc::new(ThreadMapper::new(
                db_manager.thread_store(),
                Duration::from_secs(config.threads.timeout_secs),
            )),
            avatars: AvatarSelector::new(config.avatars.pool.clone()),
            permissions: Arc::new(PermissionChecker::new(
                config.bridge.admins.iter().cloned(),
                roles,
            )),
            command_handler: SlackCommandHandler::new(),
            uploader: None,
            bot_user_id: Arc::new(RwLock::new(None)),
            config,
            db_manager,
            slack,
            irc,
            user_cache,
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn FileUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn set_bot_user_id(&self, user_id: String) {
        info!("slack bot user resolved user_id={}", user_id);
        *self.bot_user_id.write() = Some(user_id);
    }

    /// Runs the periodic sweeper. Only returns if the ticker does.
    pub async fn start(&self) -> Result<()> {
        let interval_secs = self.config.bridge.sweep_interval_secs.max(1);
        info!("bridge core started sweep_interval_secs={}", interval_secs);

        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep().await {
                warn!("periodic sweep failed: {}", err);
            }
        }
    }

    pub async fn sweep(&self) -> Result<()> {
        let threads = self.thread_mapper.sweep().await?;
        let users = self.user_cache.sweep();
        debug!(
            "sweep finished threads_removed={} users_evicted={} users_cached={}",
            threads,
            users,
            self.user_cache.len()
        );
        Ok(())
    }

    pub async fn mapped_irc_channels(&self) -> Result<Vec<String>> {
        let mappings = self.db_manager.channel_store().list_all().await?;
        Ok(mappings
            .into_iter()
            .map(|mapping| mapping.irc_channel)
            .collect())
    }

    pub async fn handle_slack_message(&self, message: &SlackInboundMessage) -> Result<()> {
        debug!(
            "slack inbound message channel={} user={:?} ts={} thread_ts={:?} subtype={:?} files={} text_preview={}",
            message.channel,
            message.user,
            message.ts,
            message.thread_ts,
            message.subtype,
            message.files.len(),
            preview_text(&message.text)
        );

        let bot_user_id = self.bot_user_id.read().clone();
        if let Some(reason) = slack_skip_reason(message, bot_user_id.as_deref()) {
            debug!(
                "slack inbound dropped channel={} ts={} reason={:?}",
                message.channel, message.ts, reason
            );
            return Ok(());
        }
        let Some(user_id) = message.user.as_deref() else {
            return Ok(());
        };

        let Some(mapping) = self
            .db_manager
            .channel_store()
            .get_by_slack_channel(&message.channel)
            .await?
        else {
            info!(
                "no irc mapping for slack channel, leaving channel={}",
                message.channel
            );
            if let Err(err) = self.slack.leave_channel(&message.channel).await {
                warn!("failed to leave channel={}: {}", message.channel, err);
            }
            return Ok(());
        };

        let sender = self
            .slack_sender_name(user_id, message.user_display_name.as_deref())
            .await?;
        let mut text = self.translator.transform_inbound(&message.text).await;
        for url in self.rehost_files(&message.files).await {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&url);
        }

        let thread_id = match message.reply_thread_ts() {
            Some(thread_ts) => {
                self.prepare_irc_thread(&message.channel, thread_ts, &mapping.irc_channel)
                    .await
            }
            None => None,
        };

        let lines = format_irc_lines(&sender, thread_id.as_deref(), &text);
        debug!(
            "slack->irc outbound prepared channel={} irc_channel={} sender={} thread_id={:?} lines={}",
            message.channel,
            mapping.irc_channel,
            sender,
            thread_id,
            lines.len()
        );
        for line in lines {
            self.irc.say(&mapping.irc_channel, &line).await?;
        }
        Ok(())
    }

    pub async fn handle_irc_message(&self, message: &IrcInboundMessage) -> Result<()> {
        debug!(
            "irc inbound message channel={} nick={} text_preview={}",
            message.channel,
            message.nick,
            preview_text(&message.text)
        );

        if should_ignore_irc_nick(&message.nick, &self.config.irc.nick) {
            return Ok(());
        }

        let Some(mapping) = self
            .db_manager
            .channel_store()
            .get_by_irc_channel(&message.channel)
            .await?
        else {
            debug!(
                "irc inbound dropped channel={} reason=no_slack_mapping",
                message.channel
            );
            return Ok(());
        };

        let (thread_ts, body) = self
            .resolve_irc_thread(&message.text, &mapping.slack_channel_id)
            .await;
        let text = self.translator.transform_outbound(body).await;

        let user_mapping = self
            .db_manager
            .user_store()
            .get_by_irc_nick(&message.nick)
            .await?;
        let icon_url = match user_mapping {
            Some(user) if self.config.directory.enabled => Some(directory::avatar_url(
                &self.config.directory.base_url,
                &user.slack_user_id,
            )),
            _ => Some(self.avatars.avatar_for_identity(&message.nick).to_string()),
        };

        let outbound = SlackOutboundMessage {
            channel: mapping.slack_channel_id.clone(),
            text,
            username: irc_sender_display(&message.nick),
            icon_url,
            attachments: extract_image_attachments(body),
            thread_ts,
        };
        debug!(
            "irc->slack outbound prepared slack_channel={} username={} thread_ts={:?} attachments={} text_preview={}",
            outbound.channel,
            outbound.username,
            outbound.thread_ts,
            outbound.attachments.len(),
            preview_text(&outbound.text)
        );
        if let Err(err) = self.slack.post_message(&outbound).await {
            error!(
                "failed to post to slack channel={} nick={}: {}",
                outbound.channel, message.nick, err
            );
        }
        Ok(())
    }

    /// Executes an `/irc-*` slash command and returns the ephemeral reply.
    pub async fn handle_slash_command(
        &self,
        command: &str,
        text: &str,
        user_id: &str,
        channel_id: &str,
    ) -> Result<String> {
        debug!(
            "slack command received command={} user={} channel={} text_preview={}",
            command,
            user_id,
            channel_id,
            preview_text(text)
        );
        let outcome = self.command_handler.handle(command, text);
        self.handle_command_outcome(outcome, command, user_id, channel_id)
            .await
    }

    pub fn is_command(&self, command: &str) -> bool {
        self.command_handler.is_command(command)
    }

    async fn handle_command_outcome(
        &self,
        outcome: SlackCommandOutcome,
        command: &str,
        user_id: &str,
        channel_id: &str,
    ) -> Result<String> {
        let reply = match outcome {
            SlackCommandOutcome::Ignored => format!("❌ Unknown command {command}"),
            SlackCommandOutcome::Reply(reply) => reply,
            SlackCommandOutcome::BridgeChannelRequested { irc_channel } => {
                match self.bridge_channel(user_id, channel_id, &irc_channel).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        error!("failed to bridge channel={}: {}", channel_id, err);
                        format!("❌ Failed to bridge channel: {err}")
                    }
                }
            }
            SlackCommandOutcome::UnbridgeChannelRequested => {
                match self.unbridge_channel(user_id, channel_id).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        error!("failed to unbridge channel={}: {}", channel_id, err);
                        format!("❌ Failed to remove bridge: {err}")
                    }
                }
            }
            SlackCommandOutcome::BridgeUserRequested { irc_nick } => {
                match self.bridge_user(user_id, &irc_nick).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        error!("failed to link user={}: {}", user_id, err);
                        format!("❌ Failed to link user: {err}")
                    }
                }
            }
            SlackCommandOutcome::UnbridgeUserRequested => {
                match self.unbridge_user(user_id).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        error!("failed to unlink user={}: {}", user_id, err);
                        format!("❌ Failed to remove link: {err}")
                    }
                }
            }
            SlackCommandOutcome::ListRequested => {
                let channels = self.db_manager.channel_store().list_all().await?;
                let users = self.db_manager.user_store().list_all().await?;
                format_bridge_list(&channels, &users)
            }
        };
        Ok(reply)
    }

    async fn bridge_channel(
        &self,
        user_id: &str,
        slack_channel_id: &str,
        irc_channel: &str,
    ) -> Result<String> {
        if !self
            .permissions
            .can_manage_channel(user_id, slack_channel_id)
            .await
        {
            return Ok(NO_PERMISSION_REPLY.to_string());
        }

        let channels = self.db_manager.channel_store();
        if let Some(existing) = channels.get_by_irc_channel(irc_channel).await? {
            return Ok(format!(
                "❌ IRC channel {} is already bridged to <#{}>",
                irc_channel, existing.slack_channel_id
            ));
        }
        if let Some(existing) = channels.get_by_slack_channel(slack_channel_id).await? {
            return Ok(format!(
                "❌ This channel is already bridged to {}",
                existing.irc_channel
            ));
        }

        match channels.create(slack_channel_id, irc_channel).await {
            Ok(()) => {}
            Err(DatabaseError::ConstraintViolation(_)) => {
                return Ok(format!("❌ IRC channel {irc_channel} is already bridged"));
            }
            Err(err) => return Err(err.into()),
        }
        info!(
            "channel mapping created slack_channel={} irc_channel={} by={}",
            slack_channel_id, irc_channel, user_id
        );

        if let Err(err) = self.irc.join(irc_channel).await {
            warn!("failed to join irc channel={}: {}", irc_channel, err);
        }
        if let Err(err) = self.slack.join_channel(slack_channel_id).await {
            warn!("failed to join slack channel={}: {}", slack_channel_id, err);
        }

        Ok(format!(
            "✅ Successfully bridged <#{slack_channel_id}> to {irc_channel}"
        ))
    }

    async fn unbridge_channel(&self, user_id: &str, slack_channel_id: &str) -> Result<String> {
        let channels = self.db_manager.channel_store();
        let Some(mapping) = channels.get_by_slack_channel(slack_channel_id).await? else {
            return Ok("❌ This channel is not bridged to IRC".to_string());
        };
        if !self
            .permissions
            .can_manage_channel(user_id, slack_channel_id)
            .await
        {
            return Ok(NO_PERMISSION_REPLY.to_string());
        }

        channels.delete(slack_channel_id).await?;
        info!(
            "channel mapping removed slack_channel={} irc_channel={} by={}",
            slack_channel_id, mapping.irc_channel, user_id
        );
        Ok(format!("✅ Removed bridge to {}", mapping.irc_channel))
    }

    async fn bridge_user(&self, user_id: &str, irc_nick: &str) -> Result<String> {
        let users = self.db_manager.user_store();
        if let Some(existing) = users.get_by_irc_nick(irc_nick).await? {
            return Ok(format!(
                "❌ IRC nick *{}* is already linked to <@{}>",
                irc_nick, existing.slack_user_id
            ));
        }
        if let Some(existing) = users.get_by_slack_user(user_id).await? {
            return Ok(format!(
                "❌ You are already linked to IRC nick *{}*",
                existing.irc_nick
            ));
        }

        match users.create(user_id, irc_nick).await {
            Ok(()) => {}
            Err(DatabaseError::ConstraintViolation(_)) => {
                return Ok(format!("❌ IRC nick *{irc_nick}* is already linked"));
            }
            Err(err) => return Err(err.into()),
        }
        info!("user mapping created slack_user={} irc_nick={}", user_id, irc_nick);
        Ok(format!(
            "✅ Successfully linked your account to IRC nick: *{irc_nick}*"
        ))
    }

    async fn unbridge_user(&self, user_id: &str) -> Result<String> {
        let users = self.db_manager.user_store();
        let Some(mapping) = users.get_by_slack_user(user_id).await? else {
            return Ok("❌ You don't have an IRC nick mapping".to_string());
        };
        users.delete(user_id).await?;
        info!(
            "user mapping removed slack_user={} irc_nick={}",
            user_id, mapping.irc_nick
        );
        Ok(format!("✅ Removed link to IRC nick: {}", mapping.irc_nick))
    }

    /// Mapped IRC nick, then directory/Slack name, then `Unknown`.
    async fn slack_sender_name(&self, user_id: &str, inline_name: Option<&str>) -> Result<String> {
        if let Some(mapping) = self
            .db_manager
            .user_store()
            .get_by_slack_user(user_id)
            .await?
        {
            return Ok(mapping.irc_nick);
        }
        Ok(self
            .user_cache
            .get_user_info(user_id, inline_name)
            .await
            .and_then(|info| info.label().map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string()))
    }

    async fn rehost_files(&self, files: &[String]) -> Vec<String> {
        if files.is_empty() {
            return Vec::new();
        }
        let Some(uploader) = &self.uploader else {
            debug!("slack files dropped count={} reason=no_uploader", files.len());
            return Vec::new();
        };
        match uploader.rehost(files).await {
            Ok(urls) => urls,
            Err(err) => {
                warn!("file re-hosting failed count={}: {}", files.len(), err);
                Vec::new()
            }
        }
    }

    /// Records the reply and, on the first one, sends the quote line.
    /// Thread failures degrade to an unthreaded message.
    async fn prepare_irc_thread(
        &self,
        slack_channel_id: &str,
        thread_ts: &str,
        irc_channel: &str,
    ) -> Option<String> {
        let first = match self.thread_mapper.is_first_message(thread_ts).await {
            Ok(first) => first,
            Err(err) => {
                warn!("thread lookup failed thread_ts={}: {}", thread_ts, err);
                return None;
            }
        };
        let thread_id = match self.thread_mapper.touch(thread_ts, slack_channel_id).await {
            Ok(thread_id) => thread_id,
            Err(err) => {
                warn!("thread update failed thread_ts={}: {}", thread_ts, err);
                return None;
            }
        };

        if first {
            match self.slack.thread_root(slack_channel_id, thread_ts).await {
                Ok(Some(root)) => {
                    let author = match root.user.as_deref() {
                        Some(user) => self
                            .slack_sender_name(user, None)
                            .await
                            .unwrap_or_else(|_| UNKNOWN_SENDER.to_string()),
                        None => UNKNOWN_SENDER.to_string(),
                    };
                    let root_text = self.translator.transform_inbound(&root.text).await;
                    let quote = format_thread_quote(&thread_id, &author, &root_text);
                    if let Err(err) = self.irc.say(irc_channel, &quote).await {
                        warn!("failed to send thread quote channel={}: {}", irc_channel, err);
                    }
                }
                Ok(None) => {
                    debug!("thread root not found thread_ts={}", thread_ts);
                }
                Err(err) => {
                    warn!("thread root fetch failed thread_ts={}: {}", thread_ts, err);
                }
            }
        }
        Some(thread_id)
    }

    /// A leading `@id` that names a live thread in the same Slack channel
    /// routes the message into that thread.
    async fn resolve_irc_thread<'a>(
        &self,
        text: &'a str,
        slack_channel_id: &str,
    ) -> (Option<String>, &'a str) {
        let Some((thread_id, rest)) = parse_thread_reference(text) else {
            return (None, text);
        };
        if rest.trim().is_empty() {
            return (None, text);
        }

        let record = match self.thread_mapper.resolve(thread_id).await {
            Ok(Some(record)) if record.slack_channel_id == slack_channel_id => record,
            Ok(_) => return (None, text),
            Err(err) => {
                warn!("thread resolve failed thread_id={}: {}", thread_id, err);
                return (None, text);
            }
        };
        if let Err(err) = self
            .thread_mapper
            .touch(&record.thread_ts, slack_channel_id)
            .await
        {
            warn!("thread update failed thread_ts={}: {}", record.thread_ts, err);
        }
        (Some(record.thread_ts), rest)
    }
}
