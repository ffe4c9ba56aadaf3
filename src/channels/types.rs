//! Channel trait for ClawGate
//!
//! This module defines the `Channel` trait that every platform adapter
//! (Telegram, Discord, ...) implements.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::bus::OutboundMessage;
use crate::error::Result;

/// Upper bound on a single platform send call.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// The `Channel` trait defines the interface for all communication channels.
///
/// Channels are responsible for:
/// - Receiving messages from users and publishing them to the message bus
/// - Sending outbound messages back to users
/// - Managing their connection lifecycle (start/stop)
/// - Enforcing access control via allowlists
///
/// Every method takes `&self`: adapters keep their lifecycle state behind
/// interior mutability so that a channel shared as `Arc<dyn Channel>` can be
/// started, stopped and sent through concurrently without serializing
/// unrelated sends.
///
/// Lifecycle: `Created → Running` (successful `start`) `→ Stopped` (`stop`)
/// `→ Running` again on a later `start`. Starting a running channel and
/// stopping a stopped one are both no-ops returning `Ok(())`.
///
/// # Example Implementation
///
/// ```ignore
/// use async_trait::async_trait;
/// use clawgate::channels::{BaseChannel, Channel};
/// use clawgate::bus::OutboundMessage;
/// use clawgate::error::Result;
/// use tokio_util::sync::CancellationToken;
///
/// struct MyChannel {
///     base: BaseChannel,
/// }
///
/// #[async_trait]
/// impl Channel for MyChannel {
///     fn name(&self) -> &str {
///         self.base.name()
///     }
///
///     async fn start(&self, _cancel: &CancellationToken) -> Result<()> {
///         self.base.set_running(true);
///         Ok(())
///     }
///
///     async fn stop(&self, _cancel: &CancellationToken) -> Result<()> {
///         self.base.set_running(false);
///         Ok(())
///     }
///
///     async fn send(&self, cancel: &CancellationToken, msg: OutboundMessage) -> Result<()> {
///         self.base.ensure_deliverable(&msg)?;
///         self.base
///             .send_bounded(cancel, async move { my_api_call(msg).await })
///             .await
///     }
///
///     fn is_running(&self) -> bool {
///         self.base.is_running()
///     }
///
///     fn is_allowed(&self, sender_id: &str) -> bool {
///         self.base.is_allowed(sender_id)
///     }
/// }
/// ```
#[async_trait]
pub trait Channel: Send + Sync {
    /// Returns the unique name of this channel (e.g., "telegram", "discord").
    ///
    /// This name is used for routing messages and logging purposes.
    fn name(&self) -> &str;

    /// Establishes the platform connection and starts delivering events.
    ///
    /// The running flag is set only once the connection succeeded. Cancelling
    /// `cancel` aborts an in-progress connect and, afterwards, tears the
    /// connection down.
    ///
    /// # Errors
    ///
    /// `ConnectionFailed` if the platform could not be reached or rejected
    /// the credentials; `Config` if required settings are missing.
    async fn start(&self, cancel: &CancellationToken) -> Result<()>;

    /// Tears down the platform connection.
    ///
    /// The running flag is cleared before teardown, so a teardown error never
    /// leaves the channel reporting "running".
    async fn stop(&self, cancel: &CancellationToken) -> Result<()>;

    /// Delivers an outbound message.
    ///
    /// # Errors
    ///
    /// - `NotRunning` if the channel is not running (no platform call)
    /// - `InvalidDestination` if `chat_id` is empty (no platform call)
    /// - `Timeout` / `Cancelled` if the send bound or `cancel` fires first
    /// - `DeliveryFailed` wrapping the platform error otherwise
    async fn send(&self, cancel: &CancellationToken, msg: OutboundMessage) -> Result<()>;

    /// Returns whether the channel is currently running.
    fn is_running(&self) -> bool;

    /// True iff the allowlist is empty or contains `sender_id`.
    fn is_allowed(&self, sender_id: &str) -> bool;
}
