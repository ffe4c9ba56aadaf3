//! Shared channel state.
//!
//! [`BaseChannel`] is embedded in every adapter. It owns the channel name,
//! the running flag, the allowlist and the bus handle, and implements the
//! two routines every adapter needs: normalize-and-publish for inbound
//! events and the bounded send used for outbound platform calls.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::error::{BoxError, GatewayError, Result};
use crate::utils::logging::AUDIT_TARGET;
use crate::utils::string::preview;

use super::allowlist::Allowlist;
use super::types::DEFAULT_SEND_TIMEOUT;

/// Content substituted when a message carries media but no text.
pub const MEDIA_ONLY_PLACEHOLDER: &str = "[media only]";

/// Characters of content shown in debug logs.
const LOG_PREVIEW_CHARS: usize = 50;

/// Applies the empty-content and media placeholder rules.
///
/// Returns `None` when there is neither text nor media (the message must be
/// dropped). Otherwise each media reference is appended as an
/// `[attachment: <ref>]` line in arrival order; with no text at all the
/// content becomes [`MEDIA_ONLY_PLACEHOLDER`].
///
/// # Example
///
/// ```
/// use clawgate::channels::normalize_content;
///
/// assert_eq!(normalize_content("", &[]), None);
/// assert_eq!(
///     normalize_content("", &["http://x/img.png".to_string()]).as_deref(),
///     Some("[media only]")
/// );
/// assert_eq!(
///     normalize_content("hi", &["http://x/img.png".to_string()]).as_deref(),
///     Some("hi\n[attachment: http://x/img.png]")
/// );
/// ```
pub fn normalize_content(content: &str, media_paths: &[String]) -> Option<String> {
    let has_text = !content.trim().is_empty();
    match (has_text, media_paths.is_empty()) {
        (false, true) => None,
        (false, false) => Some(MEDIA_ONLY_PLACEHOLDER.to_string()),
        (true, true) => Some(content.to_string()),
        (true, false) => {
            let mut out = content.to_string();
            for path in media_paths {
                out.push('\n');
                out.push_str(&format!("[attachment: {}]", path));
            }
            Some(out)
        }
    }
}

/// State and behavior shared by every channel adapter.
pub struct BaseChannel {
    name: String,
    running: AtomicBool,
    allowlist: Allowlist,
    bus: Arc<MessageBus>,
    send_timeout: Duration,
}

impl BaseChannel {
    /// Creates the shared state for a channel named `name`.
    pub fn new(name: &str, bus: Arc<MessageBus>, allowlist: impl Into<Allowlist>) -> Self {
        Self {
            name: name.to_string(),
            running: AtomicBool::new(false),
            allowlist: allowlist.into(),
            bus,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Overrides the per-send bound (builder pattern).
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stores the running flag, returning the previous value.
    pub fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::SeqCst)
    }

    pub fn is_allowed(&self, sender_id: &str) -> bool {
        self.allowlist.is_allowed(sender_id)
    }

    /// Filters, normalizes and publishes one inbound platform event.
    ///
    /// Called from the adapter's event handler on whatever task the platform
    /// connection runs on. It never waits on the consumer. Returns `true` if
    /// the message was handed to the bus.
    pub fn handle_message(
        &self,
        sender_id: &str,
        chat_id: &str,
        content: &str,
        media_paths: Vec<String>,
        metadata: HashMap<String, String>,
    ) -> bool {
        if !self.is_allowed(sender_id) {
            info!(
                target: AUDIT_TARGET,
                channel = %self.name,
                sender_id,
                "Message rejected by allowlist"
            );
            return false;
        }

        let Some(content) = normalize_content(content, &media_paths) else {
            debug!(channel = %self.name, sender_id, "Dropping empty message");
            return false;
        };

        debug!(
            channel = %self.name,
            sender_id,
            chat_id,
            preview = %preview(&content, LOG_PREVIEW_CHARS),
            "Received message"
        );

        let msg = InboundMessage::new(&self.name, sender_id, chat_id, &content)
            .with_media_paths(media_paths)
            .with_metadata_map(metadata);

        match self.bus.publish(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = %self.name, chat_id, "Failed to publish inbound message: {}", e);
                false
            }
        }
    }

    /// Pre-flight checks for `send`: running flag, then destination.
    pub fn ensure_deliverable(&self, msg: &OutboundMessage) -> Result<()> {
        if !self.is_running() {
            return Err(GatewayError::NotRunning(self.name.clone()));
        }
        if msg.chat_id.trim().is_empty() {
            return Err(GatewayError::InvalidDestination(format!(
                "{}: chat ID is empty",
                self.name
            )));
        }
        Ok(())
    }

    /// Runs a platform call under the send bound and the caller's token.
    ///
    /// The call is spawned on its own task; whichever of completion, the
    /// send timeout, or `cancel` fires first decides the result. A call that
    /// loses the race keeps running detached and its outcome is discarded.
    pub async fn send_bounded<F, T, E>(&self, cancel: &CancellationToken, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled(self.name.clone()));
        }

        let handle = tokio::spawn(call);
        tokio::select! {
            joined = handle => match joined {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(GatewayError::delivery(&self.name, e)),
                Err(join_err) => Err(GatewayError::delivery(&self.name, join_err)),
            },
            _ = tokio::time::sleep(self.send_timeout) => {
                warn!(channel = %self.name, timeout = ?self.send_timeout, "Platform send timed out");
                Err(GatewayError::Timeout {
                    channel: self.name.clone(),
                    after: self.send_timeout,
                })
            }
            _ = cancel.cancelled() => Err(GatewayError::Cancelled(self.name.clone())),
        }
    }
}

impl std::fmt::Debug for BaseChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseChannel")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("allowlist", &self.allowlist)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}
