//! ClawGate - Multi-platform chat gateway core
//!
//! Connects chat platforms (Discord, Telegram) to a single downstream
//! consumer through a message bus: adapters normalize inbound events and
//! publish them, the consumer reads them off the bus and routes replies back
//! by channel name.

pub mod bus;
pub mod channels;
pub mod config;
pub mod error;
pub mod utils;

pub use bus::{run_inbound_loop, InboundHandler, InboundMessage, MessageBus, OutboundMessage};
pub use channels::{Allowlist, BaseChannel, Channel, ChannelManager};
pub use config::Config;
pub use error::{GatewayError, Result};
