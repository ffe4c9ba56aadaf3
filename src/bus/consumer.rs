//! Downstream consumer seam.
//!
//! The consumer (an agent, an echo bot, a test harness) implements
//! [`InboundHandler`]; [`run_inbound_loop`] drains the bus and hands each
//! message to it on its own task so a slow handler never backs up the
//! inbound queue.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{InboundMessage, MessageBus};

/// Single entry point of the downstream consumer.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    /// Processes one normalized inbound message.
    async fn handle(&self, msg: InboundMessage);
}

/// Drains inbound messages until `cancel` fires or the bus closes.
///
/// Every message is handled on a freshly spawned task. Returns the number of
/// messages handed to the handler.
pub async fn run_inbound_loop(
    bus: Arc<MessageBus>,
    handler: Arc<dyn InboundHandler>,
    cancel: CancellationToken,
) -> usize {
    info!("Inbound loop started");
    let mut handled = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Inbound loop received shutdown signal");
                break;
            }
            msg = bus.consume_inbound() => {
                let Some(msg) = msg else {
                    info!("Inbound queue closed");
                    break;
                };
                debug!(channel = %msg.channel, chat_id = %msg.chat_id, "Handing inbound message to consumer");
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handler.handle(msg).await;
                });
                handled += 1;
            }
        }
    }
    info!(handled, "Inbound loop stopped");
    handled
}
