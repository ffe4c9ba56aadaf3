//! Message Bus Module
//!
//! The `MessageBus` is the routing hub between channel adapters and the
//! downstream consumer:
//!
//! - **Inbound**: adapters hand normalized messages to [`MessageBus::publish`],
//!   a non-blocking enqueue. The consumer drains them with
//!   [`MessageBus::consume_inbound`] (or [`consumer::run_inbound_loop`]).
//! - **Outbound**: replies are routed by channel name with
//!   [`MessageBus::dispatch`], which calls the registered channel's `send`
//!   and relays its result unchanged. Consumers that prefer fire-and-forget
//!   can queue replies with [`MessageBus::publish_outbound`] and let the
//!   `ChannelManager` dispatcher drain them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐ publish ┌─────────────┐ consume ┌─────────────┐
//! │   Channel   │────────>│  MessageBus │────────>│  Consumer   │
//! │  (Discord)  │         │  (inbound)  │         │   (agent)   │
//! └─────────────┘         └─────────────┘         └──────┬──────┘
//!        ▲                                               │
//!        │ send           ┌─────────────┐   dispatch     │
//!        └────────────────│  MessageBus │<───────────────┘
//!                         │ (registry)  │
//!                         └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use clawgate::bus::{MessageBus, InboundMessage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = MessageBus::new();
//!
//!     let msg = InboundMessage::new("discord", "user123", "chan456", "Hello");
//!     bus.publish(msg).unwrap();
//!
//!     if let Some(received) = bus.consume_inbound().await {
//!         println!("Received: {}", received.content);
//!     }
//! }
//! ```

pub mod consumer;
pub mod message;

pub use consumer::{run_inbound_loop, InboundHandler};
pub use message::{InboundMessage, OutboundMessage};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channels::Channel;
use crate::error::{GatewayError, Result};

/// Default buffer size for message queues
pub const DEFAULT_BUFFER_SIZE: usize = 100;

type ChannelMap = HashMap<String, Arc<dyn Channel>>;

/// Sending half of a queue; `None` once the bus is closed.
type QueueSender<T> = Arc<RwLock<Option<mpsc::Sender<T>>>>;

/// The central message bus for routing messages between channels and the consumer.
///
/// Holds two bounded MPSC queues (inbound and outbound) and the
/// name → channel registration table used by [`MessageBus::dispatch`].
/// The registration table is guarded by a read-write lock that is never
/// held across an `.await`, so lookups stay in-memory and non-blocking.
///
/// Adapters hold an `Arc<MessageBus>` and the registry holds an
/// `Arc<dyn Channel>`, so a registered channel and its bus keep each other
/// alive. Call [`MessageBus::unregister`] (or [`MessageBus::close`], which
/// also empties the registry) to release them when the bus does not live
/// for the whole process.
pub struct MessageBus {
    /// Sender for inbound messages
    inbound_tx: QueueSender<InboundMessage>,
    /// Receiver for inbound messages (wrapped in Arc<Mutex> for shared access)
    inbound_rx: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    /// Sender for queued outbound messages
    outbound_tx: QueueSender<OutboundMessage>,
    /// Receiver for queued outbound messages
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
    /// Registered channels by name
    channels: Arc<RwLock<ChannelMap>>,
}

impl MessageBus {
    /// Creates a new `MessageBus` with default buffer sizes.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a new `MessageBus` with a custom buffer size.
    ///
    /// # Example
    /// ```
    /// use clawgate::bus::MessageBus;
    ///
    /// let bus = MessageBus::with_buffer_size(500);
    /// assert_eq!(bus.channel_count(), 0);
    /// ```
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        // tokio panics on a zero-capacity channel
        let buffer_size = buffer_size.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size);

        Self {
            inbound_tx: Arc::new(RwLock::new(Some(inbound_tx))),
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx: Arc::new(RwLock::new(Some(outbound_tx))),
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Hands an inbound message to the consumer queue without blocking.
    ///
    /// Safe to call from any thread or task, including a platform SDK's
    /// event callback: it never waits on the consumer.
    ///
    /// # Errors
    /// - `GatewayError::BusFull` if the inbound queue is at capacity
    /// - `GatewayError::BusClosed` after [`MessageBus::close`]
    pub fn publish(&self, msg: InboundMessage) -> Result<()> {
        let tx = self.inbound_tx.read().unwrap_or_else(|e| e.into_inner());
        let tx = tx.as_ref().ok_or(GatewayError::BusClosed)?;
        tx.try_send(msg).map_err(map_try_send_error)
    }

    /// Consumes the next inbound message from the bus.
    ///
    /// Returns `None` once the bus is closed and the queue drained.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Associates `name` with a channel for later dispatch.
    ///
    /// Re-registering a name replaces the prior association (last write
    /// wins); the replaced channel is returned. Intended for startup wiring.
    pub fn register(&self, name: &str, channel: Arc<dyn Channel>) -> Option<Arc<dyn Channel>> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let previous = channels.insert(name.to_string(), channel);
        if previous.is_some() {
            warn!(channel = name, "Channel re-registered, replacing previous instance");
        } else {
            info!(channel = name, "Registered channel");
        }
        previous
    }

    /// Looks up a registered channel by name.
    pub fn channel(&self, name: &str) -> Option<Arc<dyn Channel>> {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels.get(name).cloned()
    }

    /// Returns a snapshot of all registered channels, sorted by name.
    pub fn registered(&self) -> Vec<(String, Arc<dyn Channel>)> {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<_> = channels
            .iter()
            .map(|(name, ch)| (name.clone(), Arc::clone(ch)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Returns the names of all registered channels, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        self.registered().into_iter().map(|(name, _)| name).collect()
    }

    /// Returns the number of registered channels.
    pub fn channel_count(&self) -> usize {
        self.channels.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Checks if a channel with the given name is registered.
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Routes an outbound message to the channel named by `msg.channel`.
    ///
    /// The channel's `send` result is returned unchanged; the bus never
    /// retries.
    ///
    /// # Errors
    /// `GatewayError::UnknownChannel` if no channel is registered under the
    /// name (no adapter is invoked), otherwise whatever `send` returns.
    pub async fn dispatch(&self, cancel: &CancellationToken, msg: OutboundMessage) -> Result<()> {
        let channel = self
            .channel(&msg.channel)
            .ok_or_else(|| GatewayError::UnknownChannel(msg.channel.clone()))?;
        debug!(channel = %msg.channel, chat_id = %msg.chat_id, "Dispatching outbound message");
        channel.send(cancel, msg).await
    }

    /// Queues an outbound message for the background dispatcher.
    ///
    /// Waits for queue capacity; use [`MessageBus::try_publish_outbound`]
    /// when waiting is not acceptable.
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        let tx = self
            .outbound_tx
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(GatewayError::BusClosed)?;
        tx.send(msg).await.map_err(|_| GatewayError::BusClosed)
    }

    /// Tries to queue an outbound message without blocking.
    pub fn try_publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        let tx = self.outbound_tx.read().unwrap_or_else(|e| e.into_inner());
        let tx = tx.as_ref().ok_or(GatewayError::BusClosed)?;
        tx.try_send(msg).map_err(map_try_send_error)
    }

    /// Consumes the next queued outbound message.
    ///
    /// Returns `None` once the bus is closed and the queue drained.
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Removes the channel registered under `name`, returning it.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Channel>> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let removed = channels.remove(name);
        if removed.is_some() {
            info!(channel = name, "Unregistered channel");
        }
        removed
    }

    /// Closes both queues and empties the registry.
    ///
    /// Later publishes fail with `BusClosed`. Consumers still receive what
    /// was queued before the close, then `None`. Idempotent; clones share
    /// the same state.
    pub fn close(&self) {
        let inbound = self.inbound_tx.write().unwrap_or_else(|e| e.into_inner()).take();
        let outbound = self.outbound_tx.write().unwrap_or_else(|e| e.into_inner()).take();
        self.channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        if inbound.is_some() || outbound.is_some() {
            info!("Message bus closed");
        }
    }

    /// True once [`MessageBus::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inbound_tx
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

fn map_try_send_error<T>(e: mpsc::error::TrySendError<T>) -> GatewayError {
    match e {
        mpsc::error::TrySendError::Full(_) => GatewayError::BusFull,
        mpsc::error::TrySendError::Closed(_) => GatewayError::BusClosed,
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    /// Clones the message bus, sharing the same queues and registry.
    fn clone(&self) -> Self {
        Self {
            inbound_tx: Arc::clone(&self.inbound_tx),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: Arc::clone(&self.outbound_tx),
            outbound_rx: Arc::clone(&self.outbound_rx),
            channels: Arc::clone(&self.channels),
        }
    }
}
