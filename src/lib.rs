//! # rabbitpub
//!
//! `rabbitpub` is a resilient event publisher for AMQP topic exchanges. It
//! keeps one broker connection alive in the background, reconnecting with
//! exponential backoff and jitter, and publishes JSON envelopes with bounded
//! retry from any number of concurrent callers.
//!
//! ## Core Modules
//!
//! - `publisher`: the [`EventPublisher`] handle (`start`, `is_ready`,
//!   `publish`, `close`).
//! - `connection`: shared connection state, the connect-and-setup step, the
//!   backoff arithmetic and the reconnection loop.
//! - `transport`: the broker seam and its `lapin` implementation.
//! - `config`: loading [`ConnectionConfig`] from files and environment.
//! - `utils`: error types and logging setup.
//!
//! ```no_run
//! # async fn demo() -> Result<(), rabbitpub::PublishError> {
//! use rabbitpub::{ConnectionConfig, EventPublisher};
//!
//! let publisher = EventPublisher::start(ConnectionConfig::default());
//! publisher
//!     .publish("orders.created", &serde_json::json!({ "id": 42 }))
//!     .await?;
//! publisher.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod publisher;
pub mod transport;
pub mod utils;

pub use crate::config::{ConnectionConfig, load_config};
pub use connection::LinkPhase;
pub use publisher::EventPublisher;
pub use utils::error::{ConnectionError, PublishError, SettingsError, TransportError};
