//! Channels module - Communication channels (Telegram, Discord, etc.)
//!
//! This module provides the infrastructure for connecting chat platforms to
//! the message bus. Channels receive messages from users, normalize them and
//! publish them to the bus, and send replies back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ChannelManager                          │
//! │                                                             │
//! │        ┌─────────┐                    ┌─────────┐           │
//! │        │Telegram │                    │ Discord │    ...    │
//! │        └────┬────┘                    └────┬────┘           │
//! │             │  implements Channel,         │                │
//! │             │  embeds BaseChannel          │                │
//! │             └──────────────┬───────────────┘                │
//! │                            │                                │
//! │                      ┌─────┴─────┐                          │
//! │                      │MessageBus │                          │
//! │                      │ (inbound/ │                          │
//! │                      │ registry) │                          │
//! │                      └───────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Implementing a New Channel
//!
//! Embed a [`BaseChannel`] and forward the shared parts of the [`Channel`]
//! trait to it. Inbound events go through [`BaseChannel::handle_message`];
//! outbound calls go through [`BaseChannel::ensure_deliverable`] and
//! [`BaseChannel::send_bounded`] so every adapter reports the same errors.

mod allowlist;
mod base;
pub mod discord;
mod factory;
mod manager;
pub mod telegram;
mod types;

pub use allowlist::Allowlist;
pub use base::{normalize_content, BaseChannel, MEDIA_ONLY_PLACEHOLDER};
pub use discord::DiscordChannel;
pub use factory::register_configured_channels;
pub use manager::{ChannelManager, ChannelStatus};
pub use telegram::TelegramChannel;
pub use types::{Channel, DEFAULT_SEND_TIMEOUT};
