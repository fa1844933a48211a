//! The `transport` module is the seam between the publisher and the broker.
//!
//! The connection manager and the publisher only talk to the three traits
//! below. [`amqp`] implements them on top of `lapin`; the test suite swaps in
//! a scripted in-memory broker.

pub mod amqp;
pub mod message;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use std::sync::Arc;

use crate::utils::error::TransportResult;

pub use amqp::AmqpTransport;
pub use message::PublishProperties;

/// Opens connections to a broker.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> TransportResult<Arc<dyn BrokerConnection>>;
}

/// A live transport connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    async fn open_channel(&self) -> TransportResult<Arc<dyn BrokerChannel>>;

    /// Resolves once the broker reports the connection lost, with the reason.
    async fn closed(&self) -> String;

    async fn close(&self) -> TransportResult<()>;
}

/// A logical channel multiplexed on a connection.
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Declares a durable, non-auto-delete topic exchange.
    async fn declare_topic_exchange(&self, name: &str) -> TransportResult<()>;

    /// Publishes `body` to `exchange`, non-mandatory and non-immediate.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: &PublishProperties,
    ) -> TransportResult<()>;

    async fn close(&self) -> TransportResult<()>;
}
