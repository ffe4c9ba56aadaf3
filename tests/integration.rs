//! Integration tests for ClawGate
//!
//! These tests drive the full message flow through the public API: a mock
//! adapter built on `BaseChannel` publishes into the bus, a consumer drains
//! it, and replies are routed back by channel name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clawgate::{
    bus::{run_inbound_loop, InboundHandler, InboundMessage, MessageBus, OutboundMessage},
    channels::{BaseChannel, Channel, ChannelManager, DEFAULT_SEND_TIMEOUT},
    GatewayError, Result,
};
use tokio_util::sync::CancellationToken;

/// How the mock platform answers a send.
#[derive(Clone, Copy)]
enum Platform {
    Accept,
    Reject,
    Hang,
}

struct MockChannel {
    base: BaseChannel,
    platform: Platform,
    /// Platform calls made, counted before the platform answers.
    calls: Arc<AtomicUsize>,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl MockChannel {
    fn new(name: &str, bus: Arc<MessageBus>, allow_from: Vec<String>, platform: Platform) -> Self {
        Self {
            base: BaseChannel::new(name, bus, allow_from),
            platform,
            calls: Arc::new(AtomicUsize::new(0)),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Simulates an event arriving from the platform.
    fn receive(&self, sender: &str, chat: &str, content: &str, media: &[&str]) -> bool {
        let mut metadata = HashMap::new();
        metadata.insert("message_id".to_string(), format!("m-{}", chat));
        self.base.handle_message(
            sender,
            chat,
            content,
            media.iter().map(|m| m.to_string()).collect(),
            metadata,
        )
    }

    fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, _cancel: &CancellationToken) -> Result<()> {
        self.base.set_running(true);
        Ok(())
    }

    async fn stop(&self, _cancel: &CancellationToken) -> Result<()> {
        self.base.set_running(false);
        Ok(())
    }

    async fn send(&self, cancel: &CancellationToken, msg: OutboundMessage) -> Result<()> {
        self.base.ensure_deliverable(&msg)?;
        let platform = self.platform;
        let calls = Arc::clone(&self.calls);
        self.base
            .send_bounded(cancel, async move {
                calls.fetch_add(1, Ordering::SeqCst);
                match platform {
                    Platform::Accept => Ok(()),
                    Platform::Reject => Err(std::io::Error::other("HTTP 403")),
                    Platform::Hang => std::future::pending().await,
                }
            })
            .await?;
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        self.base.is_allowed(sender_id)
    }
}

async fn started(name: &str, bus: &Arc<MessageBus>, platform: Platform) -> Arc<MockChannel> {
    let channel = Arc::new(MockChannel::new(name, Arc::clone(bus), Vec::new(), platform));
    channel.start(&CancellationToken::new()).await.unwrap();
    bus.register(name, Arc::clone(&channel) as Arc<dyn Channel>);
    channel
}

// ============================================================================
// Inbound Flow
// ============================================================================

#[tokio::test]
async fn test_inbound_message_reaches_consumer() {
    let bus = Arc::new(MessageBus::new());
    let channel = started("mock", &bus, Platform::Accept).await;

    assert!(channel.receive("u1", "c1", "hello", &[]));

    let msg = bus.consume_inbound().await.unwrap();
    assert_eq!(msg.channel, "mock");
    assert_eq!(msg.sender_id, "u1");
    assert_eq!(msg.chat_id, "c1");
    assert_eq!(msg.content, "hello");
    assert_eq!(msg.session_key, "mock:c1");
    assert_eq!(msg.metadata.get("message_id").map(String::as_str), Some("m-c1"));
}

#[tokio::test]
async fn test_allowlist_rejects_unknown_sender() {
    let bus = Arc::new(MessageBus::new());
    let channel = MockChannel::new(
        "mock",
        Arc::clone(&bus),
        vec!["owner".to_string()],
        Platform::Accept,
    );

    assert!(!channel.is_allowed("stranger"));
    assert!(!channel.receive("stranger", "c1", "let me in", &[]));
    assert!(channel.receive("owner", "c1", "hi", &[]));

    let msg = bus.consume_inbound().await.unwrap();
    assert_eq!(msg.sender_id, "owner");
    assert!(
        tokio::time::timeout(Duration::from_millis(50), bus.consume_inbound())
            .await
            .is_err(),
        "rejected message must not be published"
    );
}

#[tokio::test]
async fn test_media_only_and_attachment_content() {
    let bus = Arc::new(MessageBus::new());
    let channel = started("mock", &bus, Platform::Accept).await;

    assert!(channel.receive("u1", "c1", "", &["https://cdn/x.png"]));
    assert!(channel.receive("u1", "c1", "look", &["https://cdn/a.png", "https://cdn/b.pdf"]));
    assert!(!channel.receive("u1", "c1", "   ", &[]));

    let media_only = bus.consume_inbound().await.unwrap();
    assert_eq!(media_only.content, "[media only]");
    assert_eq!(media_only.media_paths, vec!["https://cdn/x.png".to_string()]);

    let with_text = bus.consume_inbound().await.unwrap();
    assert_eq!(
        with_text.content,
        "look\n[attachment: https://cdn/a.png]\n[attachment: https://cdn/b.pdf]"
    );
    assert_eq!(with_text.media_paths.len(), 2);
}

#[tokio::test]
async fn test_full_bus_drops_message() {
    let bus = Arc::new(MessageBus::with_buffer_size(1));
    let channel = started("mock", &bus, Platform::Accept).await;

    assert!(channel.receive("u1", "c1", "first", &[]));
    assert!(!channel.receive("u1", "c1", "second", &[]));
    assert!(matches!(
        bus.publish(InboundMessage::new("mock", "u1", "c1", "third")),
        Err(GatewayError::BusFull)
    ));
}

// ============================================================================
// Outbound Routing
// ============================================================================

#[tokio::test]
async fn test_dispatch_delivers_to_named_channel() {
    let bus = Arc::new(MessageBus::new());
    let discord = started("discord", &bus, Platform::Accept).await;
    let telegram = started("telegram", &bus, Platform::Accept).await;

    bus.dispatch(
        &CancellationToken::new(),
        OutboundMessage::new("telegram", "42", "pong").with_reply("7"),
    )
    .await
    .unwrap();

    assert!(discord.sent().is_empty());
    let sent = telegram.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].content, "pong");
    assert_eq!(sent[0].reply_to.as_deref(), Some("7"));
}

#[tokio::test]
async fn test_dispatch_to_unknown_channel() {
    let bus = Arc::new(MessageBus::new());
    let err = bus
        .dispatch(
            &CancellationToken::new(),
            OutboundMessage::new("slack", "c1", "hi"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UnknownChannel(ref name) if name == "slack"));
}

#[tokio::test]
async fn test_send_on_stopped_channel_fails() {
    let bus = Arc::new(MessageBus::new());
    let channel = started("mock", &bus, Platform::Accept).await;
    channel.stop(&CancellationToken::new()).await.unwrap();

    let err = bus
        .dispatch(&CancellationToken::new(), OutboundMessage::new("mock", "c1", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotRunning(_)));
    assert_eq!(channel.calls(), 0);
}

#[tokio::test]
async fn test_send_to_empty_chat_fails() {
    let bus = Arc::new(MessageBus::new());
    let channel = started("mock", &bus, Platform::Accept).await;

    let err = bus
        .dispatch(&CancellationToken::new(), OutboundMessage::new("mock", "  ", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidDestination(_)));
    assert_eq!(channel.calls(), 0);
}

#[tokio::test]
async fn test_platform_error_is_delivery_failure() {
    let bus = Arc::new(MessageBus::new());
    let channel = started("mock", &bus, Platform::Reject).await;

    let err = bus
        .dispatch(&CancellationToken::new(), OutboundMessage::new("mock", "c1", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::DeliveryFailed { .. }));
    assert!(err.to_string().contains("HTTP 403"));
    assert_eq!(channel.calls(), 1);
    assert!(channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hung_platform_times_out() {
    let bus = Arc::new(MessageBus::new());
    started("mock", &bus, Platform::Hang).await;

    let start = tokio::time::Instant::now();
    let err = bus
        .dispatch(&CancellationToken::new(), OutboundMessage::new("mock", "c1", "hi"))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(start.elapsed() >= DEFAULT_SEND_TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_send_returns_early() {
    let bus = Arc::new(MessageBus::new());
    started("mock", &bus, Platform::Hang).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let start = tokio::time::Instant::now();
    let err = bus
        .dispatch(&cancel, OutboundMessage::new("mock", "c1", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Cancelled(_)));
    assert!(start.elapsed() < DEFAULT_SEND_TIMEOUT);
}

// ============================================================================
// Manager and Consumer
// ============================================================================

struct EchoBack {
    bus: Arc<MessageBus>,
}

#[async_trait]
impl InboundHandler for EchoBack {
    async fn handle(&self, msg: InboundMessage) {
        let reply = OutboundMessage::reply_to(&msg, &format!("echo: {}", msg.content));
        let _ = self.bus.dispatch(&CancellationToken::new(), reply).await;
    }
}

#[tokio::test]
async fn test_echo_round_trip_through_manager() {
    let bus = Arc::new(MessageBus::new());
    let manager = ChannelManager::new(Arc::clone(&bus));
    let channel = Arc::new(MockChannel::new(
        "mock",
        Arc::clone(&bus),
        Vec::new(),
        Platform::Accept,
    ));
    manager.register(Arc::clone(&channel) as Arc<dyn Channel>);

    let cancel = CancellationToken::new();
    let results = manager.start_all(&cancel).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].1.is_ok());
    assert!(manager.status()[0].running);

    let consumer = tokio::spawn(run_inbound_loop(
        Arc::clone(&bus),
        Arc::new(EchoBack {
            bus: Arc::clone(&bus),
        }),
        cancel.child_token(),
    ));

    assert!(channel.receive("u1", "c9", "ping", &[]));

    let mut delivered = Vec::new();
    for _ in 0..100 {
        delivered = channel.sent();
        if !delivered.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].chat_id, "c9");
    assert_eq!(delivered[0].content, "echo: ping");

    manager.stop_all(&CancellationToken::new()).await;
    cancel.cancel();
    assert_eq!(consumer.await.unwrap(), 1);
    assert!(!channel.is_running());
}

#[tokio::test]
async fn test_queued_outbound_drained_by_dispatcher() {
    let bus = Arc::new(MessageBus::new());
    let manager = ChannelManager::new(Arc::clone(&bus));
    let channel = Arc::new(MockChannel::new(
        "mock",
        Arc::clone(&bus),
        Vec::new(),
        Platform::Accept,
    ));
    manager.register(Arc::clone(&channel) as Arc<dyn Channel>);

    let cancel = CancellationToken::new();
    manager.start_all(&cancel).await;
    bus.publish_outbound(OutboundMessage::new("mock", "c1", "queued"))
        .await
        .unwrap();

    let mut delivered = Vec::new();
    for _ in 0..100 {
        delivered = channel.sent();
        if !delivered.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].content, "queued");

    manager.stop_all(&cancel).await;
}

async fn wait_for_sent(channel: &MockChannel, count: usize) -> Vec<OutboundMessage> {
    for _ in 0..100 {
        let sent = channel.sent();
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    channel.sent()
}

#[tokio::test(start_paused = true)]
async fn test_hung_channel_does_not_delay_other_replies() {
    let bus = Arc::new(MessageBus::new());
    let manager = ChannelManager::new(Arc::clone(&bus));
    let discord = Arc::new(MockChannel::new(
        "discord",
        Arc::clone(&bus),
        Vec::new(),
        Platform::Hang,
    ));
    let telegram = Arc::new(MockChannel::new(
        "telegram",
        Arc::clone(&bus),
        Vec::new(),
        Platform::Accept,
    ));
    manager.register(Arc::clone(&discord) as Arc<dyn Channel>);
    manager.register(Arc::clone(&telegram) as Arc<dyn Channel>);

    let cancel = CancellationToken::new();
    manager.start_all(&cancel).await;

    let start = tokio::time::Instant::now();
    bus.publish_outbound(OutboundMessage::new("discord", "c1", "stuck"))
        .await
        .unwrap();
    bus.publish_outbound(OutboundMessage::new("telegram", "42", "fast"))
        .await
        .unwrap();

    let delivered = wait_for_sent(&telegram, 1).await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].content, "fast");
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "telegram reply waited {:?} behind discord",
        start.elapsed()
    );
    assert_eq!(discord.calls(), 1);
    assert!(discord.sent().is_empty());

    manager.stop_all(&CancellationToken::new()).await;
}

#[tokio::test]
async fn test_queued_replies_keep_order_per_channel() {
    let bus = Arc::new(MessageBus::new());
    let manager = ChannelManager::new(Arc::clone(&bus));
    let channel = Arc::new(MockChannel::new(
        "mock",
        Arc::clone(&bus),
        Vec::new(),
        Platform::Accept,
    ));
    manager.register(Arc::clone(&channel) as Arc<dyn Channel>);
    manager.start_all(&CancellationToken::new()).await;

    for i in 0..5 {
        bus.publish_outbound(OutboundMessage::new("mock", "c1", &format!("part {}", i)))
            .await
            .unwrap();
    }

    let contents: Vec<String> = wait_for_sent(&channel, 5)
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["part 0", "part 1", "part 2", "part 3", "part 4"]);

    manager.stop_all(&CancellationToken::new()).await;
}

#[tokio::test]
async fn test_concurrent_sends_on_one_channel() {
    let bus = Arc::new(MessageBus::new());
    let channel = started("mock", &bus, Platform::Accept).await;

    let cancel = CancellationToken::new();
    let sends = (0..8).map(|i| {
        let bus = Arc::clone(&bus);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            bus.dispatch(&cancel, OutboundMessage::new("mock", &i.to_string(), "hi"))
                .await
        })
    });
    for handle in sends.collect::<Vec<_>>() {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(channel.calls(), 8);
    assert_eq!(channel.sent().len(), 8);
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_unregister_releases_channel_and_bus() {
    let bus = Arc::new(MessageBus::new());
    let channel = started("mock", &bus, Platform::Accept).await;
    let weak_channel = Arc::downgrade(&channel);
    drop(channel);

    // The registry keeps the channel alive, and the channel keeps the bus.
    assert!(weak_channel.upgrade().is_some());
    assert_eq!(Arc::strong_count(&bus), 2);

    bus.unregister("mock");
    assert!(weak_channel.upgrade().is_none());
    assert_eq!(Arc::strong_count(&bus), 1);
}

#[tokio::test]
async fn test_closed_bus_stops_dispatcher_and_consumer() {
    let bus = Arc::new(MessageBus::new());
    let manager = ChannelManager::new(Arc::clone(&bus));
    let cancel = CancellationToken::new();
    manager.start_all(&cancel).await;

    let consumer = tokio::spawn(run_inbound_loop(
        Arc::clone(&bus),
        Arc::new(EchoBack {
            bus: Arc::clone(&bus),
        }),
        cancel.child_token(),
    ));
    bus.close();

    let handled = tokio::time::timeout(Duration::from_secs(5), consumer)
        .await
        .expect("consumer should exit once the bus closes")
        .unwrap();
    assert_eq!(handled, 0);
    manager.stop_all(&cancel).await;
}
