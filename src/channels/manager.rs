//! Channel Manager for ClawGate
//!
//! This module provides the `ChannelManager` which is responsible for:
//! - Registering channels on the message bus
//! - Starting and stopping all channels, reporting each outcome
//! - Draining the bus's outbound queue into the right channel

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::Result;
use crate::log_component;

use super::Channel;

/// How long `stop_all` waits for the outbound dispatcher to exit.
const DISPATCHER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Running state of one registered channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub name: String,
    pub running: bool,
}

struct Dispatcher {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// The `ChannelManager` manages the lifecycle of all communication channels.
///
/// Channels live in the bus's registry, so replies routed through
/// [`MessageBus::dispatch`] and the manager's background dispatcher reach the
/// same instances.
///
/// # Architecture
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                     ChannelManager                          │
/// │        ┌─────────┐               ┌─────────┐                │
/// │        │Telegram │               │ Discord │                │
/// │        └────┬────┘               └────┬────┘                │
/// │             └───────────┬─────────────┘                     │
/// │                         │ register / start / stop           │
/// │                   ┌─────┴─────┐      ┌────────────┐         │
/// │                   │MessageBus │<─────│ dispatcher │         │
/// │                   └───────────┘      └────────────┘         │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use clawgate::bus::MessageBus;
/// use clawgate::channels::ChannelManager;
///
/// let bus = Arc::new(MessageBus::new());
/// let manager = ChannelManager::new(bus);
/// assert_eq!(manager.channel_count(), 0);
/// ```
pub struct ChannelManager {
    bus: Arc<MessageBus>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl ChannelManager {
    /// Creates a new `ChannelManager` over the given message bus.
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            bus,
            dispatcher: Mutex::new(None),
        }
    }

    /// Registers a channel on the bus under `channel.name()`.
    ///
    /// A channel already registered under that name is replaced.
    pub fn register(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        self.bus.register(&name, channel);
    }

    /// Returns a sorted list of all registered channel names.
    pub fn channels(&self) -> Vec<String> {
        self.bus.channel_names()
    }

    /// Returns the number of registered channels.
    pub fn channel_count(&self) -> usize {
        self.bus.channel_count()
    }

    /// Checks if a channel with the given name is registered.
    pub fn has_channel(&self, name: &str) -> bool {
        self.bus.has_channel(name)
    }

    /// Starts all registered channels and the outbound dispatcher.
    ///
    /// Every channel is attempted; a failed start is logged and reported in
    /// the returned list without preventing the others. Calling this again
    /// while the dispatcher is alive does not spawn a second one.
    pub async fn start_all(&self, cancel: &CancellationToken) -> Vec<(String, Result<()>)> {
        let mut results = Vec::new();
        for (name, channel) in self.bus.registered() {
            info!("Starting channel: {}", name);
            let result = channel.start(cancel).await;
            if let Err(ref e) = result {
                error!("Failed to start channel {}: {}", name, e);
            }
            results.push((name, result));
        }

        let mut dispatcher = self.dispatcher.lock().await;
        match dispatcher.as_ref() {
            Some(running) if !running.handle.is_finished() => {
                warn!("Dispatcher already running, skipping start");
            }
            _ => {
                let shutdown = cancel.child_token();
                let handle = tokio::spawn(dispatch_outbound(
                    Arc::clone(&self.bus),
                    shutdown.clone(),
                ));
                *dispatcher = Some(Dispatcher { shutdown, handle });
            }
        }

        results
    }

    /// Stops the outbound dispatcher, then every registered channel.
    ///
    /// Errors from individual channels are logged and reported but do not
    /// prevent other channels from stopping.
    pub async fn stop_all(&self, cancel: &CancellationToken) -> Vec<(String, Result<()>)> {
        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            info!("Signaling dispatcher to stop");
            dispatcher.shutdown.cancel();
            match tokio::time::timeout(DISPATCHER_STOP_TIMEOUT, dispatcher.handle).await {
                Ok(_) => info!("Dispatcher stopped cleanly"),
                Err(_) => warn!("Dispatcher did not stop within timeout"),
            }
        }

        let mut results = Vec::new();
        for (name, channel) in self.bus.registered() {
            info!("Stopping channel: {}", name);
            let result = channel.stop(cancel).await;
            if let Err(ref e) = result {
                error!("Failed to stop channel {}: {}", name, e);
            }
            results.push((name, result));
        }
        results
    }

    /// Sends a message through the bus to the channel it names.
    ///
    /// # Errors
    ///
    /// `UnknownChannel` if no such channel is registered, otherwise whatever
    /// the channel's `send` returns.
    pub async fn send(&self, cancel: &CancellationToken, msg: OutboundMessage) -> Result<()> {
        self.bus.dispatch(cancel, msg).await
    }

    /// Running state of every registered channel, sorted by name.
    pub fn status(&self) -> Vec<ChannelStatus> {
        self.bus
            .registered()
            .into_iter()
            .map(|(name, channel)| ChannelStatus {
                running: channel.is_running(),
                name,
            })
            .collect()
    }

    /// Returns a reference to the message bus.
    pub fn bus(&self) -> Arc<MessageBus> {
        Arc::clone(&self.bus)
    }
}

/// Background task that drains queued outbound messages into channels.
///
/// Replies fan out to one worker per channel name, so a platform stuck in a
/// send only holds up its own queue. Replies to the same channel keep their
/// queue order. Stops when `shutdown` fires or the queue closes; on a closed
/// queue the workers finish what they already hold.
async fn dispatch_outbound(bus: Arc<MessageBus>, shutdown: CancellationToken) {
    log_component!(info, "dispatcher", "Outbound dispatcher started");
    let mut workers: HashMap<String, mpsc::UnboundedSender<OutboundMessage>> = HashMap::new();
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log_component!(info, "dispatcher", "Outbound dispatcher received shutdown signal");
                break;
            }
            msg = bus.consume_outbound() => {
                let Some(msg) = msg else {
                    log_component!(info, "dispatcher", "Outbound queue closed");
                    break;
                };
                let queue = workers.entry(msg.channel.clone()).or_insert_with_key(|name| {
                    let (tx, rx) = mpsc::unbounded_channel();
                    tasks.spawn(deliver_for_channel(
                        Arc::clone(&bus),
                        name.clone(),
                        rx,
                        shutdown.clone(),
                    ));
                    tx
                });
                if let Err(mpsc::error::SendError(msg)) = queue.send(msg) {
                    log_component!(
                        error,
                        "dispatcher",
                        "Channel worker gone, dropping outbound message",
                        channel = msg.channel.as_str(),
                        chat_id = msg.chat_id.as_str(),
                    );
                    workers.remove(&msg.channel);
                }
            }
        }
    }

    drop(workers);
    while tasks.join_next().await.is_some() {}
    log_component!(info, "dispatcher", "Outbound dispatcher stopped");
}

/// Delivers one channel's replies in order until its queue closes or
/// `shutdown` fires. A failed delivery is logged and dropped.
async fn deliver_for_channel(
    bus: Arc<MessageBus>,
    channel: String,
    mut queue: mpsc::UnboundedReceiver<OutboundMessage>,
    shutdown: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = queue.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        let chat_id = msg.chat_id.clone();
        if let Err(e) = bus.dispatch(&shutdown, msg).await {
            log_component!(
                error,
                "dispatcher",
                "Failed to deliver outbound message",
                channel = channel.as_str(),
                chat_id = chat_id.as_str(),
                error = tracing::field::display(&e),
            );
        }
    }
}
