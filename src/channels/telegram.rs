//! Telegram Channel Implementation
//!
//! This module provides a Telegram bot channel for ClawGate using the teloxide library.
//!
//! ```text
//! ┌──────────────────┐         ┌──────────────────┐
//! │   Telegram API   │ <─────> │ TelegramChannel  │
//! │   (Bot Father)   │ ──────> │   (teloxide)     │
//! └──────────────────┘         └────────┬─────────┘
//!                                       │ handle_message
//!                                       v
//!                              ┌──────────────────┐
//!                              │    MessageBus    │
//!                              └──────────────────┘
//! ```
//!
//! `start` verifies the token with a single `getMe` call, clears any webhook
//! and spawns a manual `getUpdates` long-polling task. Updates are handled one
//! at a time in arrival order.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use clawgate::bus::MessageBus;
//! use clawgate::config::TelegramConfig;
//! use clawgate::channels::TelegramChannel;
//!
//! let config = TelegramConfig {
//!     enabled: true,
//!     token: "BOT_TOKEN".to_string(),
//!     allow_from: vec![],
//!     ..Default::default()
//! };
//! let bus = Arc::new(MessageBus::new());
//! let channel = TelegramChannel::new(config, bus)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, ChatId, MediaKind, MessageId, MessageKind, ReplyParameters, UpdateKind, UserId,
};
use teloxide::{ApiError, RequestError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{MessageBus, OutboundMessage};
use crate::config::TelegramConfig;
use crate::error::{GatewayError, Result};

use super::{BaseChannel, Channel};

/// Long-poll timeout passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

/// HTTP client timeout; must exceed the long-poll timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(45);

/// Pause after a failed `getUpdates` call.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How long `stop` waits for the polling task before aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A Telegram message reduced to what the base channel consumes.
#[derive(Debug, PartialEq)]
struct TelegramInbound {
    sender_id: String,
    chat_id: String,
    content: String,
    media_paths: Vec<String>,
    metadata: HashMap<String, String>,
}

struct PollingTask {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Telegram channel implementation using teloxide.
pub struct TelegramChannel {
    base: Arc<BaseChannel>,
    config: TelegramConfig,
    bot: Bot,
    polling: Mutex<Option<PollingTask>>,
}

impl TelegramChannel {
    /// Creates a new Telegram channel.
    ///
    /// # Errors
    ///
    /// `Config` if the HTTP client for the bot cannot be built.
    pub fn new(config: TelegramConfig, bus: Arc<MessageBus>) -> Result<Self> {
        let base = BaseChannel::new("telegram", bus, config.allow_from.as_slice())
            .with_send_timeout(Duration::from_secs(config.send_timeout_secs));
        let bot = Self::build_bot(config.token.trim())?;

        Ok(Self {
            base: Arc::new(base),
            config,
            bot,
            polling: Mutex::new(None),
        })
    }

    /// Returns a reference to the Telegram configuration.
    pub fn telegram_config(&self) -> &TelegramConfig {
        &self.config
    }

    /// Returns whether the channel is enabled in configuration.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Build a Telegram bot client with explicit proxy behavior.
    ///
    /// Automatic system proxy detection is disabled; it crashes in some
    /// sandboxed macOS environments.
    fn build_bot(token: &str) -> Result<Bot> {
        let client = teloxide::net::default_reqwest_settings()
            .no_proxy()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                GatewayError::Config(format!("Failed to build Telegram HTTP client: {}", e))
            })?;
        Ok(Bot::with_client(token.to_string(), client))
    }

    /// Reduces a Telegram message to the fields the base channel needs.
    ///
    /// Returns `None` for the bot's own messages and for messages without a
    /// sender (channel posts). Allowlist and empty-content rules are applied
    /// later by the base.
    fn parse_message(msg: &Message, bot_id: UserId) -> Option<TelegramInbound> {
        let user = msg.from.as_ref()?;
        if user.id == bot_id {
            return None;
        }

        let sender_id = user.id.0.to_string();
        let chat_id = msg.chat.id.0.to_string();
        let username = user.username.clone().unwrap_or_default();
        let full_name = match &user.last_name {
            Some(last) => format!("{} {}", user.first_name, last),
            None => user.first_name.clone(),
        };
        let display_name = match full_name.trim() {
            "" => username.clone(),
            name => name.to_string(),
        };

        let (content, media_paths) = Self::extract_content(msg);

        let mut metadata = HashMap::new();
        metadata.insert("message_id".to_string(), msg.id.0.to_string());
        metadata.insert("user_id".to_string(), sender_id.clone());
        metadata.insert("username".to_string(), username);
        metadata.insert("display_name".to_string(), display_name);
        metadata.insert("chat_id".to_string(), chat_id.clone());
        metadata.insert("is_dm".to_string(), msg.chat.is_private().to_string());

        Some(TelegramInbound {
            sender_id,
            chat_id,
            content,
            media_paths,
            metadata,
        })
    }

    /// Text (or caption) plus `tg://file/<id>` references for attached media.
    fn extract_content(msg: &Message) -> (String, Vec<String>) {
        let MessageKind::Common(common) = &msg.kind else {
            return (String::new(), Vec::new());
        };

        let file_ref = |id: &dyn std::fmt::Display| format!("tg://file/{}", id);
        let (text, media) = match &common.media_kind {
            MediaKind::Text(t) => (Some(t.text.clone()), None),
            MediaKind::Photo(p) => (
                p.caption.clone(),
                p.photo.last().map(|ps| file_ref(&ps.file.id)),
            ),
            MediaKind::Document(d) => (d.caption.clone(), Some(file_ref(&d.document.file.id))),
            MediaKind::Audio(a) => (a.caption.clone(), Some(file_ref(&a.audio.file.id))),
            MediaKind::Voice(v) => (v.caption.clone(), Some(file_ref(&v.voice.file.id))),
            MediaKind::Video(v) => (v.caption.clone(), Some(file_ref(&v.video.file.id))),
            MediaKind::Sticker(s) => (None, Some(file_ref(&s.sticker.file.id))),
            _ => (None, None),
        };

        (text.unwrap_or_default(), media.into_iter().collect())
    }

    /// Manual long-polling loop. Exits on shutdown or on errors that polling
    /// cannot recover from (revoked token, another poller on the same token).
    async fn run_polling_loop(
        base: Arc<BaseChannel>,
        bot: Bot,
        bot_id: UserId,
        shutdown: CancellationToken,
    ) {
        let mut offset: i32 = 0;
        info!("Telegram polling loop started");

        loop {
            let request = bot
                .get_updates()
                .offset(offset)
                .timeout(POLL_TIMEOUT_SECS)
                .allowed_updates(vec![AllowedUpdate::Message]);

            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = request.send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "Got Telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        if let UpdateKind::Message(msg) = update.kind {
                            if let Some(inbound) = Self::parse_message(&msg, bot_id) {
                                base.handle_message(
                                    &inbound.sender_id,
                                    &inbound.chat_id,
                                    &inbound.content,
                                    inbound.media_paths,
                                    inbound.metadata,
                                );
                            }
                        }
                    }
                }
                Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                    error!("Telegram: another instance is polling with this token");
                    break;
                }
                Err(RequestError::Api(ApiError::InvalidToken)) => {
                    error!("Telegram: bot token rejected");
                    break;
                }
                Err(e) => {
                    warn!("Telegram getUpdates failed: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }

        if base.set_running(false) {
            warn!("Telegram channel is no longer running");
        }
        info!("Telegram polling task stopped");
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    /// Returns the channel name ("telegram").
    fn name(&self) -> &str {
        self.base.name()
    }

    /// Verifies the token and spawns the polling task.
    ///
    /// # Errors
    ///
    /// `Config` for an empty token, `ConnectionFailed` if `getMe` fails.
    async fn start(&self, cancel: &CancellationToken) -> Result<()> {
        let mut polling = self.polling.lock().await;
        if self.base.is_running() {
            info!("Telegram channel already running");
            return Ok(());
        }

        if self.config.token.trim().is_empty() {
            return Err(GatewayError::Config("Telegram bot token is empty".into()));
        }

        if let Some(stale) = polling.take() {
            stale.shutdown.cancel();
        }

        info!("Starting Telegram channel");
        let me = tokio::select! {
            result = self.bot.get_me().send() => {
                result.map_err(|e| GatewayError::connection(self.base.name(), e))?
            }
            _ = cancel.cancelled() => {
                return Err(GatewayError::Cancelled(self.base.name().to_string()));
            }
        };

        if let Err(e) = self.bot.delete_webhook().send().await {
            warn!("Telegram: failed to clear webhook: {}", e);
        }

        info!(
            username = ?me.username,
            user_id = me.id.0,
            "Telegram bot connected"
        );

        let shutdown = cancel.child_token();
        self.base.set_running(true);
        let task = tokio::spawn(Self::run_polling_loop(
            Arc::clone(&self.base),
            self.bot.clone(),
            me.id,
            shutdown.clone(),
        ));
        *polling = Some(PollingTask { shutdown, task });

        Ok(())
    }

    /// Stops the polling task.
    async fn stop(&self, cancel: &CancellationToken) -> Result<()> {
        let mut polling = self.polling.lock().await;
        let was_running = self.base.set_running(false);

        let Some(mut poller) = polling.take() else {
            if !was_running {
                debug!("Telegram channel already stopped");
            }
            return Ok(());
        };

        info!("Stopping Telegram channel");
        poller.shutdown.cancel();
        tokio::select! {
            joined = tokio::time::timeout(STOP_TIMEOUT, &mut poller.task) => {
                if joined.is_err() {
                    warn!("Telegram polling task did not exit in time, aborting");
                    poller.task.abort();
                }
            }
            _ = cancel.cancelled() => poller.task.abort(),
        }

        info!("Telegram channel stopped");
        Ok(())
    }

    /// Sends an outbound message to a Telegram chat as plain text.
    ///
    /// # Errors
    ///
    /// `InvalidDestination` if `chat_id` is not an integer, in addition to
    /// the errors every channel reports.
    async fn send(&self, cancel: &CancellationToken, msg: OutboundMessage) -> Result<()> {
        self.base.ensure_deliverable(&msg)?;

        let chat_id: i64 = msg.chat_id.trim().parse().map_err(|_| {
            GatewayError::InvalidDestination(format!("Invalid Telegram chat ID: {}", msg.chat_id))
        })?;

        let mut request = self.bot.send_message(ChatId(chat_id), msg.content);
        if let Some(reply_id) = msg.reply_to.as_deref().and_then(|id| id.parse::<i32>().ok()) {
            request = request.reply_parameters(ReplyParameters::new(MessageId(reply_id)));
        }

        self.base
            .send_bounded(cancel, async move { request.send().await })
            .await?;

        debug!(chat_id, "Telegram: message sent");
        Ok(())
    }

    /// Returns whether the channel is currently running.
    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    fn is_allowed(&self, user_id: &str) -> bool {
        self.base.is_allowed(user_id)
    }
}
