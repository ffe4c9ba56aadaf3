//! Gateway command handler (multi-channel bot server).

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use clawgate::bus::{run_inbound_loop, InboundHandler, InboundMessage, MessageBus, OutboundMessage};
use clawgate::channels::{register_configured_channels, ChannelManager};
use clawgate::config::Config;
use clawgate::utils::string::preview;

/// Replies to every message with its own content.
pub(crate) struct EchoHandler {
    bus: Arc<MessageBus>,
    cancel: CancellationToken,
}

impl EchoHandler {
    pub(crate) fn new(bus: Arc<MessageBus>, cancel: CancellationToken) -> Self {
        Self { bus, cancel }
    }

    /// Builds the echo reply, quoting the original message when its id is known.
    pub(crate) fn reply_for(msg: &InboundMessage) -> OutboundMessage {
        let reply = OutboundMessage::reply_to(msg, &msg.content);
        match msg.metadata.get("message_id") {
            Some(id) if !id.is_empty() => reply.with_reply(id),
            _ => reply,
        }
    }
}

#[async_trait]
impl InboundHandler for EchoHandler {
    async fn handle(&self, msg: InboundMessage) {
        let reply = Self::reply_for(&msg);
        if let Err(e) = self.bus.dispatch(&self.cancel, reply).await {
            warn!(
                channel = %msg.channel,
                chat_id = %msg.chat_id,
                error = %e,
                "Echo reply failed"
            );
        }
    }
}

/// Logs each message and sends nothing back.
pub(crate) struct LoggingHandler;

#[async_trait]
impl InboundHandler for LoggingHandler {
    async fn handle(&self, msg: InboundMessage) {
        info!(
            channel = %msg.channel,
            sender_id = %msg.sender_id,
            chat_id = %msg.chat_id,
            media = msg.media_paths.len(),
            "Inbound: {}",
            preview(&msg.content, 80)
        );
    }
}

/// Start multi-channel gateway.
pub(crate) async fn cmd_gateway(config: Config, echo: bool) -> Result<()> {
    println!("Starting ClawGate...");

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  {}", problem);
        }
        bail!("Invalid configuration ({} problem(s))", problems.len());
    }

    let bus = Arc::new(MessageBus::with_buffer_size(config.bus.buffer_size));
    let manager = ChannelManager::new(Arc::clone(&bus));

    let registered = register_configured_channels(&manager, &config);
    if registered == 0 {
        bail!(
            "No channels configured. Enable discord or telegram in {}",
            Config::path().display()
        );
    }

    let cancel = CancellationToken::new();
    let results = manager.start_all(&cancel).await;
    let started = results.iter().filter(|(_, r)| r.is_ok()).count();
    for (name, result) in &results {
        match result {
            Ok(()) => println!("  [OK] {}", name),
            Err(e) => println!("  [FAILED] {}: {}", name, e),
        }
    }
    if started == 0 {
        cancel.cancel();
        manager.stop_all(&CancellationToken::new()).await;
        bail!("No channel could be started");
    }

    let handler: Arc<dyn InboundHandler> = if echo {
        Arc::new(EchoHandler::new(Arc::clone(&bus), cancel.child_token()))
    } else {
        Arc::new(LoggingHandler)
    };
    let consumer = tokio::spawn(run_inbound_loop(
        Arc::clone(&bus),
        handler,
        cancel.child_token(),
    ));

    println!();
    println!(
        "Gateway is running with {}/{} channel(s). Press Ctrl+C to stop.",
        started, registered
    );
    println!();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }

    println!();
    println!("Shutting down...");

    for (name, result) in manager.stop_all(&CancellationToken::new()).await {
        if let Err(e) = result {
            warn!("Channel {} did not stop cleanly: {}", name, e);
        }
    }
    bus.close();
    match consumer.await {
        Ok(handled) => info!(handled, "Consumer stopped"),
        Err(e) => error!("Consumer task failed: {}", e),
    }
    cancel.cancel();

    println!("Gateway stopped.");
    Ok(())
}
