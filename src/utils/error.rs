//! Error types used within `rabbitpub`.
//!
//! Errors are layered the same way the component is:
//!
//! - [`TransportError`]: a single broker operation failed (dial, channel,
//!   declare, publish, close).
//! - [`ConnectionError`]: one connect-and-setup attempt failed. Always
//!   transient; the reconnection loop absorbs it and retries.
//! - [`PublishError`]: what a caller of `publish` sees.
//! - [`SettingsError`]: a configuration source could not be read or parsed.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single operation against the broker.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Error reported by the AMQP client.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The operation did not finish within its time bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The broker negatively acknowledged a publish.
    #[error("broker rejected the message")]
    Rejected,

    /// The channel or connection is no longer usable.
    #[error("channel is closed")]
    ChannelClosed,

    /// Any other broker-side failure.
    #[error("{0}")]
    Other(String),
}

/// Failure of one connect-and-setup attempt.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to broker: {0}")]
    Connect(#[source] TransportError),

    #[error("failed to open channel: {0}")]
    Channel(#[source] TransportError),

    #[error("failed to declare exchange '{exchange}': {source}")]
    Declare {
        exchange: String,
        #[source]
        source: TransportError,
    },

    /// Shutdown was signalled while the attempt was in flight; the new
    /// handles were released instead of installed.
    #[error("connection attempt aborted by shutdown")]
    Aborted,
}

/// Error returned to callers of `EventPublisher::publish`.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The payload could not be serialized. Never retried.
    #[error("failed to encode payload: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Every attempt failed or found the channel closed.
    #[error("publish failed after {attempts} attempt(s)")]
    MaxRetriesExceeded { attempts: u32 },

    /// The publisher was closed.
    #[error("publisher is closed")]
    Closed,
}

/// A configuration source could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type TransportResult<T> = Result<T, TransportError>;
