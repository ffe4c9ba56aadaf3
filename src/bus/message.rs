//! Message types for the ClawGate message bus
//!
//! This module defines the two message shapes that cross the bus: normalized
//! inbound messages produced by channel adapters, and outbound replies
//! produced by the downstream consumer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A normalized message received from a chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Name of the originating channel instance (e.g., "discord")
    pub channel: String,
    /// Platform-scoped identifier of the author
    pub sender_id: String,
    /// Platform-scoped identifier of the conversation
    pub chat_id: String,
    /// The text content of the message (never empty once published)
    pub content: String,
    /// Opaque references (URLs or file refs) to attached media, in arrival order
    #[serde(default)]
    pub media_paths: Vec<String>,
    /// Session key for routing (format: "channel:chat_id")
    pub session_key: String,
    /// Platform-specific context; never interpreted by the bus
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A reply to be delivered through a named channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The channel to send this message through
    pub channel: String,
    /// The chat/conversation to send to
    pub chat_id: String,
    /// The text content to send
    pub content: String,
    /// Optional platform message ID to reply to
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl InboundMessage {
    /// Creates a new inbound message with the required fields.
    ///
    /// The session key is automatically generated as "channel:chat_id".
    ///
    /// # Example
    /// ```
    /// use clawgate::bus::message::InboundMessage;
    ///
    /// let msg = InboundMessage::new("discord", "user123", "chan456", "Hello, bot!");
    /// assert_eq!(msg.session_key, "discord:chan456");
    /// assert!(msg.media_paths.is_empty());
    /// ```
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            media_paths: Vec::new(),
            session_key: format!("{}:{}", channel, chat_id),
            metadata: HashMap::new(),
        }
    }

    /// Sets the media references (builder pattern).
    pub fn with_media_paths(mut self, media_paths: Vec<String>) -> Self {
        self.media_paths = media_paths;
        self
    }

    /// Replaces the metadata map (builder pattern).
    pub fn with_metadata_map(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Adds a metadata key-value pair to the message (builder pattern).
    ///
    /// # Example
    /// ```
    /// use clawgate::bus::message::InboundMessage;
    ///
    /// let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello")
    ///     .with_metadata("message_id", "12345")
    ///     .with_metadata("is_dm", "true");
    /// assert_eq!(msg.metadata.get("message_id"), Some(&"12345".to_string()));
    /// ```
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Checks if this message has any media attached.
    pub fn has_media(&self) -> bool {
        !self.media_paths.is_empty()
    }
}

impl OutboundMessage {
    /// Creates a new outbound message.
    ///
    /// # Example
    /// ```
    /// use clawgate::bus::message::OutboundMessage;
    ///
    /// let msg = OutboundMessage::new("telegram", "chat456", "Hello from the bot!");
    /// assert_eq!(msg.channel, "telegram");
    /// assert!(msg.reply_to.is_none());
    /// ```
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            reply_to: None,
        }
    }

    /// Sets the message ID to reply to (builder pattern).
    pub fn with_reply(mut self, message_id: &str) -> Self {
        self.reply_to = Some(message_id.to_string());
        self
    }

    /// Creates an outbound message as a response to an inbound message.
    ///
    /// # Example
    /// ```
    /// use clawgate::bus::message::{InboundMessage, OutboundMessage};
    ///
    /// let inbound = InboundMessage::new("discord", "user123", "chan456", "Hello");
    /// let response = OutboundMessage::reply_to(&inbound, "Hello back!");
    /// assert_eq!(response.channel, "discord");
    /// assert_eq!(response.chat_id, "chan456");
    /// ```
    pub fn reply_to(msg: &InboundMessage, content: &str) -> Self {
        Self::new(&msg.channel, &msg.chat_id, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_creation() {
        let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello");
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.sender_id, "user123");
        assert_eq!(msg.chat_id, "chat456");
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.session_key, "telegram:chat456");
        assert!(!msg.has_media());
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_inbound_message_with_media_paths() {
        let msg = InboundMessage::new("discord", "user1", "channel1", "Check this")
            .with_media_paths(vec![
                "http://x/a.png".to_string(),
                "http://x/b.png".to_string(),
            ]);

        assert!(msg.has_media());
        assert_eq!(msg.media_paths, vec!["http://x/a.png", "http://x/b.png"]);
    }

    #[test]
    fn test_inbound_metadata_map_then_key() {
        let mut map = HashMap::new();
        map.insert("guild_id".to_string(), "g1".to_string());
        let msg = InboundMessage::new("discord", "u", "c", "hi")
            .with_metadata_map(map)
            .with_metadata("is_dm", "false");

        assert_eq!(msg.metadata.len(), 2);
        assert_eq!(msg.metadata.get("guild_id"), Some(&"g1".to_string()));
        assert_eq!(msg.metadata.get("is_dm"), Some(&"false".to_string()));
    }

    #[test]
    fn test_outbound_message_with_reply() {
        let msg = OutboundMessage::new("discord", "chan", "This is a reply").with_reply("m-1");
        assert_eq!(msg.reply_to, Some("m-1".to_string()));
    }

    #[test]
    fn test_inbound_deserialize_without_optional_fields() {
        let json = r#"{
            "channel": "discord",
            "sender_id": "u1",
            "chat_id": "c1",
            "content": "hello",
            "session_key": "discord:c1"
        }"#;
        let msg: InboundMessage = serde_json::from_str(json).expect("deserialize");
        assert!(msg.media_paths.is_empty());
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_outbound_deserialize_without_reply() {
        let json = r#"{"channel":"telegram","chat_id":"42","content":"yo"}"#;
        let msg: OutboundMessage = serde_json::from_str(json).expect("deserialize");
        assert_eq!(msg.chat_id, "42");
        assert!(msg.reply_to.is_none());
    }
}
