//! Discord channel implementation.
//!
//! Connects to Discord via the Gateway WebSocket API (v10) for inbound messages
//! and uses the REST API for outbound messaging. Uses raw `tokio-tungstenite`
//! and `reqwest` -- no third-party Discord SDK crate required.
//!
//! # Gateway flow
//!
//! 1. GET `/gateway` to obtain the WebSocket URL.
//! 2. Connect via `tokio-tungstenite`.
//! 3. Receive opcode 10 (HELLO) -- extract `heartbeat_interval`.
//! 4. Send opcode 2 (IDENTIFY) with bot token and intents.
//! 5. Wait for the `READY` dispatch to learn the bot's own user id.
//! 6. Hand the socket to the connection task: periodic heartbeats (opcode 1)
//!    and opcode 0 (DISPATCH) events, specifically `MESSAGE_CREATE`.
//!
//! Steps 1-5 happen inside `start`; any failure there is reported as
//! `ConnectionFailed`. A connection lost afterwards ends the task and clears
//! the running flag. There is no automatic reconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{MessageBus, OutboundMessage};
use crate::config::DiscordConfig;
use crate::error::{BoxError, GatewayError, Result};
use crate::utils::string::truncate_chars;

use super::{BaseChannel, Channel};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Discord Gateway intents bitmask.
/// GUILDS (1 << 0) | GUILD_MESSAGES (1 << 9) | DIRECT_MESSAGES (1 << 12) | MESSAGE_CONTENT (1 << 15)
const GATEWAY_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 12) | (1 << 15);

/// Discord message content length limit.
const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;

/// Upper bound on the HELLO / IDENTIFY / READY exchange.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `stop` waits for the connection task before aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Gateway payload types (deserialization)
// ---------------------------------------------------------------------------

/// Top-level Discord Gateway payload.
#[derive(Debug, Deserialize)]
struct GatewayPayload {
    /// Gateway opcode.
    op: u8,
    /// Event data (shape depends on opcode / event name).
    #[serde(default)]
    d: Option<Value>,
    /// Sequence number (used for heartbeats).
    #[serde(default)]
    s: Option<u64>,
    /// Event name (only present for opcode 0 / DISPATCH).
    #[serde(default)]
    t: Option<String>,
}

/// The `d` field of a HELLO (opcode 10) payload.
#[derive(Debug, Deserialize)]
struct HelloData {
    heartbeat_interval: u64,
}

/// The `d` field of a READY dispatch event.
#[derive(Debug, Deserialize)]
struct ReadyData {
    user: ReadyUser,
}

#[derive(Debug, Deserialize)]
struct ReadyUser {
    id: String,
    #[serde(default)]
    username: String,
}

/// The `d` field of a MESSAGE_CREATE dispatch event.
#[derive(Debug, Deserialize)]
struct MessageCreateData {
    /// The unique message ID.
    id: String,
    /// The Discord channel ID this message was sent in.
    channel_id: String,
    /// Absent for direct messages.
    #[serde(default)]
    guild_id: Option<String>,
    /// The message text content.
    #[serde(default)]
    content: String,
    /// The message author.
    author: MessageAuthor,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

/// Author of a Discord message.
#[derive(Debug, Deserialize)]
struct MessageAuthor {
    /// The user's snowflake ID.
    id: String,
    #[serde(default)]
    username: String,
    /// Legacy 4-digit tag; `"0"` for accounts on the new username system.
    #[serde(default)]
    discriminator: String,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    url: String,
}

/// Response from GET /gateway.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    url: String,
}

/// A MESSAGE_CREATE event reduced to what the base channel consumes.
#[derive(Debug, PartialEq)]
struct DiscordInbound {
    sender_id: String,
    chat_id: String,
    content: String,
    media_paths: Vec<String>,
    metadata: HashMap<String, String>,
}

/// Result of the start-time handshake.
struct GatewaySession {
    ws: WsStream,
    heartbeat_interval: Duration,
    bot_user_id: String,
    sequence: Option<u64>,
}

/// A live gateway connection owned by a running channel.
struct GatewayConnection {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// DiscordChannel
// ---------------------------------------------------------------------------

/// Discord channel implementation backed by the Discord Gateway WebSocket API
/// (inbound) and REST API (outbound).
pub struct DiscordChannel {
    base: Arc<BaseChannel>,
    config: DiscordConfig,
    http_client: reqwest::Client,
    api_base: String,
    connection: Mutex<Option<GatewayConnection>>,
}

impl DiscordChannel {
    /// Creates a new Discord channel.
    pub fn new(config: DiscordConfig, bus: Arc<MessageBus>) -> Self {
        let base = BaseChannel::new("discord", bus, config.allow_from.as_slice())
            .with_send_timeout(Duration::from_secs(config.send_timeout_secs));

        Self {
            base: Arc::new(base),
            config,
            http_client: reqwest::Client::new(),
            api_base: DISCORD_API_BASE.to_string(),
            connection: Mutex::new(None),
        }
    }

    /// Points REST and gateway discovery calls at another base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns a reference to the Discord configuration.
    pub fn discord_config(&self) -> &DiscordConfig {
        &self.config
    }

    /// Returns whether the channel is enabled in configuration.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn token(&self) -> Result<&str> {
        let token = self.config.token.trim();
        if token.is_empty() {
            return Err(GatewayError::Config("Discord bot token is empty".to_string()));
        }
        Ok(token)
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    /// Fetches the Gateway WebSocket URL from the Discord REST API.
    async fn fetch_gateway_url(
        client: &reqwest::Client,
        api_base: &str,
        token: &str,
    ) -> std::result::Result<String, BoxError> {
        let response = client
            .get(format!("{}/gateway", api_base))
            .header("Authorization", format!("Bot {}", token))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(format!("Discord Gateway HTTP {}: {}", status, body).into());
        }

        let parsed: GatewayResponse = serde_json::from_str(&body)?;
        let url = parsed.url.trim();
        if url.is_empty() {
            return Err("Discord Gateway response missing URL".into());
        }

        Ok(format!("{}/?v=10&encoding=json", url))
    }

    /// Reads the next text frame as a gateway payload, skipping other frames.
    async fn next_payload(ws: &mut WsStream) -> std::result::Result<GatewayPayload, BoxError> {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(raw))) => {
                    return Ok(serde_json::from_str::<GatewayPayload>(raw.as_str())?)
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    return Err(format!("gateway closed during handshake: {:?}", frame).into())
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("gateway stream ended during handshake".into()),
            }
        }
    }

    /// GET /gateway, connect, HELLO, IDENTIFY, READY.
    async fn open_session(
        client: &reqwest::Client,
        api_base: &str,
        token: &str,
    ) -> std::result::Result<GatewaySession, BoxError> {
        let url = Self::fetch_gateway_url(client, api_base, token).await?;
        let (mut ws, _) = connect_async(url.as_str()).await?;
        debug!("Discord gateway WebSocket connected");

        let heartbeat_interval = loop {
            let payload = Self::next_payload(&mut ws).await?;
            if payload.op == 10 {
                break Self::extract_heartbeat_interval(payload.d.as_ref())?;
            }
            debug!("Discord: ignoring pre-HELLO payload op {}", payload.op);
        };
        debug!("Discord HELLO: heartbeat_interval = {:?}", heartbeat_interval);

        ws.send(WsMessage::Text(Self::build_identify_payload(token).into()))
            .await?;

        let mut sequence = None;
        let bot_user_id = loop {
            let payload = Self::next_payload(&mut ws).await?;
            if payload.s.is_some() {
                sequence = payload.s;
            }
            match (payload.op, payload.t.as_deref()) {
                (0, Some("READY")) => {
                    let ready: ReadyData =
                        serde_json::from_value(payload.d.unwrap_or(Value::Null))?;
                    info!(
                        "Discord gateway READY as {} ({})",
                        ready.user.username, ready.user.id
                    );
                    break ready.user.id;
                }
                (1, _) => {
                    ws.send(WsMessage::Text(
                        Self::build_heartbeat_payload(sequence).into(),
                    ))
                    .await?;
                }
                (9, _) => return Err("Discord rejected IDENTIFY (invalid session)".into()),
                (op, t) => debug!("Discord: ignoring pre-READY payload op {} {:?}", op, t),
            }
        };

        Ok(GatewaySession {
            ws,
            heartbeat_interval,
            bot_user_id,
            sequence,
        })
    }

    // -----------------------------------------------------------------------
    // Gateway payload helpers
    // -----------------------------------------------------------------------

    /// Builds the IDENTIFY payload (opcode 2).
    fn build_identify_payload(token: &str) -> String {
        json!({
            "op": 2,
            "d": {
                "token": token,
                "intents": GATEWAY_INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "clawgate",
                    "device": "clawgate"
                }
            }
        })
        .to_string()
    }

    /// Builds a heartbeat payload (opcode 1).
    fn build_heartbeat_payload(sequence: Option<u64>) -> String {
        json!({
            "op": 1,
            "d": sequence
        })
        .to_string()
    }

    /// Extracts the heartbeat interval from a HELLO payload.
    fn extract_heartbeat_interval(data: Option<&Value>) -> std::result::Result<Duration, BoxError> {
        let data = data.ok_or("Discord HELLO without data")?;
        let hello = HelloData::deserialize(data)?;
        if hello.heartbeat_interval == 0 {
            return Err("Discord HELLO with zero heartbeat interval".into());
        }
        Ok(Duration::from_millis(hello.heartbeat_interval))
    }

    /// Reduces a MESSAGE_CREATE event to the fields the base channel needs.
    ///
    /// Returns `None` for the bot's own messages and for malformed events.
    /// Allowlist and empty-content rules are applied later by the base.
    fn parse_message_create(data: &Value, bot_user_id: &str) -> Option<DiscordInbound> {
        let msg = MessageCreateData::deserialize(data).ok()?;

        let sender_id = msg.author.id.trim().to_string();
        if sender_id.is_empty() || sender_id == bot_user_id {
            return None;
        }

        let chat_id = msg.channel_id.trim().to_string();
        if chat_id.is_empty() {
            return None;
        }

        let display_name = Self::display_name(&msg.author);
        let guild_id = msg.guild_id.unwrap_or_default();

        let mut metadata = HashMap::new();
        metadata.insert("message_id".to_string(), msg.id);
        metadata.insert("user_id".to_string(), sender_id.clone());
        metadata.insert("username".to_string(), msg.author.username);
        metadata.insert("display_name".to_string(), display_name);
        metadata.insert("is_dm".to_string(), guild_id.is_empty().to_string());
        metadata.insert("guild_id".to_string(), guild_id);
        metadata.insert("channel_id".to_string(), chat_id.clone());

        Some(DiscordInbound {
            sender_id,
            chat_id,
            content: msg.content,
            media_paths: msg.attachments.into_iter().map(|a| a.url).collect(),
            metadata,
        })
    }

    /// `username#discriminator` for legacy tags, plain username otherwise.
    fn display_name(author: &MessageAuthor) -> String {
        match author.discriminator.as_str() {
            "" | "0" => author.username.clone(),
            tag => format!("{}#{}", author.username, tag),
        }
    }

    // -----------------------------------------------------------------------
    // Outbound payload construction
    // -----------------------------------------------------------------------

    /// Builds the JSON body for a channel message POST request.
    fn build_send_payload(msg: &OutboundMessage) -> Value {
        // Truncate content to Discord's 2000-character limit.
        let content = if msg.content.chars().count() > DISCORD_MAX_MESSAGE_LENGTH {
            format!(
                "{}...",
                truncate_chars(&msg.content, DISCORD_MAX_MESSAGE_LENGTH - 3)
            )
        } else {
            msg.content.clone()
        };

        let mut payload = json!({ "content": content });

        if let Some(ref reply_id) = msg.reply_to {
            if let Some(map) = payload.as_object_mut() {
                map.insert(
                    "message_reference".to_string(),
                    json!({ "message_id": reply_id }),
                );
            }
        }

        payload
    }

    // -----------------------------------------------------------------------
    // Gateway event loop
    // -----------------------------------------------------------------------

    /// Connection task: heartbeats and in-order event dispatch until the
    /// shutdown token fires or the connection drops.
    async fn run_gateway_loop(
        base: Arc<BaseChannel>,
        session: GatewaySession,
        shutdown: CancellationToken,
    ) {
        let GatewaySession {
            ws,
            heartbeat_interval,
            bot_user_id,
            mut sequence,
        } = session;
        let (mut ws_writer, mut ws_reader) = ws.split();
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + heartbeat_interval,
            heartbeat_interval,
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = ws_writer.send(WsMessage::Close(None)).await;
                    debug!("Discord gateway shutdown requested");
                    break;
                }

                _ = heartbeat.tick() => {
                    let payload = Self::build_heartbeat_payload(sequence);
                    if let Err(e) = ws_writer.send(WsMessage::Text(payload.into())).await {
                        warn!("Discord: heartbeat send failed: {}", e);
                        break;
                    }
                }

                msg = ws_reader.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(raw))) => {
                            let payload = match serde_json::from_str::<GatewayPayload>(raw.as_str()) {
                                Ok(payload) => payload,
                                Err(e) => {
                                    debug!("Discord: failed to parse gateway payload: {}", e);
                                    continue;
                                }
                            };
                            if payload.s.is_some() {
                                sequence = payload.s;
                            }

                            match payload.op {
                                // DISPATCH
                                0 => match (payload.t.as_deref(), payload.d.as_ref()) {
                                    (Some("MESSAGE_CREATE"), Some(data)) => {
                                        if let Some(inbound) =
                                            Self::parse_message_create(data, &bot_user_id)
                                        {
                                            base.handle_message(
                                                &inbound.sender_id,
                                                &inbound.chat_id,
                                                &inbound.content,
                                                inbound.media_paths,
                                                inbound.metadata,
                                            );
                                        }
                                    }
                                    (Some(event_name), _) => {
                                        debug!("Discord: ignoring event {}", event_name);
                                    }
                                    (None, _) => {}
                                },
                                // HEARTBEAT request from server
                                1 => {
                                    let hb = Self::build_heartbeat_payload(sequence);
                                    if let Err(e) = ws_writer.send(WsMessage::Text(hb.into())).await {
                                        warn!("Discord: heartbeat response send failed: {}", e);
                                        break;
                                    }
                                }
                                // RECONNECT
                                7 => {
                                    warn!("Discord: server requested reconnect, closing connection");
                                    break;
                                }
                                // INVALID SESSION
                                9 => {
                                    warn!("Discord: invalid session, closing connection");
                                    break;
                                }
                                // HEARTBEAT ACK
                                11 => {
                                    debug!("Discord: heartbeat ACK received");
                                }
                                _ => {
                                    debug!("Discord: unhandled opcode {}", payload.op);
                                }
                            }
                        }
                        Some(Ok(WsMessage::Ping(payload))) => {
                            if let Err(e) = ws_writer.send(WsMessage::Pong(payload)).await {
                                warn!("Discord: pong send failed: {}", e);
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            warn!("Discord: WebSocket closed by server: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Discord: WebSocket stream error: {}", e);
                            break;
                        }
                        None => {
                            warn!("Discord: WebSocket stream ended");
                            break;
                        }
                    }
                }
            }
        }

        if base.set_running(false) {
            warn!("Discord channel is no longer running");
        }
    }
}

// ---------------------------------------------------------------------------
// Channel trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, cancel: &CancellationToken) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if self.base.is_running() {
            info!("Discord channel already running");
            return Ok(());
        }

        let token = self.token()?;

        // A task left over from a dropped connection has already exited.
        if let Some(stale) = connection.take() {
            stale.shutdown.cancel();
        }

        info!("Starting Discord channel with Gateway WebSocket");
        let handshake = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            Self::open_session(&self.http_client, &self.api_base, token),
        );
        let session = tokio::select! {
            result = handshake => match result {
                Ok(Ok(session)) => session,
                Ok(Err(e)) => return Err(GatewayError::connection(self.base.name(), e)),
                Err(_) => {
                    return Err(GatewayError::connection(
                        self.base.name(),
                        "timed out waiting for Discord READY",
                    ))
                }
            },
            _ = cancel.cancelled() => {
                return Err(GatewayError::Cancelled(self.base.name().to_string()));
            }
        };

        let shutdown = cancel.child_token();
        self.base.set_running(true);
        let task = tokio::spawn(Self::run_gateway_loop(
            Arc::clone(&self.base),
            session,
            shutdown.clone(),
        ));
        *connection = Some(GatewayConnection { shutdown, task });

        info!("Discord channel started");
        Ok(())
    }

    async fn stop(&self, cancel: &CancellationToken) -> Result<()> {
        let mut connection = self.connection.lock().await;
        let was_running = self.base.set_running(false);

        let Some(mut conn) = connection.take() else {
            if !was_running {
                debug!("Discord channel already stopped");
            }
            return Ok(());
        };

        conn.shutdown.cancel();
        tokio::select! {
            joined = tokio::time::timeout(STOP_TIMEOUT, &mut conn.task) => {
                if joined.is_err() {
                    warn!("Discord connection task did not exit in time, aborting");
                    conn.task.abort();
                }
            }
            _ = cancel.cancelled() => conn.task.abort(),
        }

        info!("Discord channel stopped");
        Ok(())
    }

    async fn send(&self, cancel: &CancellationToken, msg: OutboundMessage) -> Result<()> {
        self.base.ensure_deliverable(&msg)?;
        let token = self.token()?;

        let url = format!(
            "{}/channels/{}/messages",
            self.api_base,
            msg.chat_id.trim()
        );
        let request = self
            .http_client
            .post(url)
            .header("Authorization", format!("Bot {}", token))
            .json(&Self::build_send_payload(&msg));

        self.base
            .send_bounded(cancel, async move {
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(BoxError::from(format!(
                        "Discord API returned HTTP {}: {}",
                        status, body
                    )));
                }
                Ok::<(), BoxError>(())
            })
            .await?;

        debug!(chat_id = %msg.chat_id, "Discord: message sent");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    fn is_allowed(&self, user_id: &str) -> bool {
        self.base.is_allowed(user_id)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
