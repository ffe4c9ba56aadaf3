//! Error types for ClawGate
//!
//! This module defines the error taxonomy shared by the message bus and every
//! channel adapter. Uses `thiserror` for ergonomic error handling with
//! automatic `Display` and `Error` trait implementations.

use std::time::Duration;
use thiserror::Error;

/// Boxed platform error carried as the source of delivery/connection failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The primary error type for ClawGate operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Operation attempted on a channel whose running flag is false.
    #[error("Channel {0} is not running")]
    NotRunning(String),

    /// Outbound message has no usable destination (empty or malformed chat ID).
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// A bounded platform call exceeded its deadline.
    #[error("Channel {channel} timed out after {after:?}")]
    Timeout {
        /// Channel whose call timed out
        channel: String,
        /// The bound that elapsed
        after: Duration,
    },

    /// The caller's cancellation token fired before the platform call finished.
    #[error("Channel {0}: operation cancelled")]
    Cancelled(String),

    /// The platform call completed with an error.
    #[error("Channel {channel}: delivery failed: {source}")]
    DeliveryFailed {
        /// Channel that attempted the delivery
        channel: String,
        /// Underlying platform error
        #[source]
        source: BoxError,
    },

    /// Bus dispatch addressed a channel name nobody registered.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// `start` could not establish the platform connection.
    #[error("Channel {channel}: connection failed: {source}")]
    ConnectionFailed {
        /// Channel that failed to connect
        channel: String,
        /// Underlying platform error
        #[source]
        source: BoxError,
    },

    /// Configuration-related errors (missing token, invalid values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Message bus receiver dropped
    #[error("Bus error: channel closed")]
    BusClosed,

    /// Message bus queue is at capacity; the message was not enqueued
    #[error("Bus error: queue full")]
    BusFull,

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Builds a `DeliveryFailed` for `channel` from any platform error.
    pub fn delivery(channel: &str, source: impl Into<BoxError>) -> Self {
        GatewayError::DeliveryFailed {
            channel: channel.to_string(),
            source: source.into(),
        }
    }

    /// Builds a `ConnectionFailed` for `channel` from any platform error.
    pub fn connection(channel: &str, source: impl Into<BoxError>) -> Self {
        GatewayError::ConnectionFailed {
            channel: channel.to_string(),
            source: source.into(),
        }
    }

    /// Returns `true` for the timeout class: an elapsed bound or a cancelled caller.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Cancelled(_)
        )
    }
}

/// A specialized `Result` type for ClawGate operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::Config("missing token".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing token");

        let err = GatewayError::NotRunning("discord".to_string());
        assert_eq!(err.to_string(), "Channel discord is not running");

        let err = GatewayError::UnknownChannel("slack".to_string());
        assert_eq!(err.to_string(), "Unknown channel: slack");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GatewayError = io_err.into();
        assert!(matches!(err, GatewayError::Io(_)));
    }

    #[test]
    fn test_delivery_failed_keeps_source() {
        use std::error::Error;

        let err = GatewayError::delivery("telegram", "HTTP 403: forbidden");
        assert!(err.to_string().contains("delivery failed"));
        assert!(err.to_string().contains("HTTP 403"));
        let source = err.source().expect("source preserved");
        assert_eq!(source.to_string(), "HTTP 403: forbidden");
    }

    #[test]
    fn test_connection_failed_display() {
        let err = GatewayError::connection("discord", "gateway unreachable");
        assert_eq!(
            err.to_string(),
            "Channel discord: connection failed: gateway unreachable"
        );
    }

    #[test]
    fn test_timeout_class() {
        let timeout = GatewayError::Timeout {
            channel: "discord".into(),
            after: Duration::from_secs(10),
        };
        assert!(timeout.is_timeout());
        assert!(timeout.to_string().contains("10s"));
        assert!(GatewayError::Cancelled("discord".into()).is_timeout());
        assert!(!GatewayError::BusFull.is_timeout());
        assert!(!GatewayError::delivery("x", "boom").is_timeout());
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
