//! AMQP 0-9-1 transport backed by `lapin`.
//!
//! `lapin` reports connection loss through a callback. The callback stores
//! the reason in a `watch` channel so `closed()` can be awaited any number of
//! times, including after the loss already happened.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::{BrokerChannel, BrokerConnection, PublishProperties, Transport};
use crate::utils::error::{TransportError, TransportResult};

const REPLY_SUCCESS: u16 = 200;

/// Production transport that dials a RabbitMQ (or any AMQP 0-9-1) broker.
#[derive(Debug, Default, Clone, Copy)]
pub struct AmqpTransport;

#[async_trait]
impl Transport for AmqpTransport {
    async fn connect(&self, url: &str) -> TransportResult<Arc<dyn BrokerConnection>> {
        let properties = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        let connection = Connection::connect(url, properties).await?;

        let (lost_tx, _) = watch::channel(None);
        let lost = Arc::new(lost_tx);
        let notifier = lost.clone();
        connection.on_error(move |err| {
            notifier.send_replace(Some(err.to_string()));
        });

        Ok(Arc::new(AmqpConnection {
            inner: connection,
            lost,
        }))
    }
}

struct AmqpConnection {
    inner: Connection,
    lost: Arc<watch::Sender<Option<String>>>,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> TransportResult<Arc<dyn BrokerChannel>> {
        let channel = self.inner.create_channel().await?;
        Ok(Arc::new(AmqpChannel { inner: channel }))
    }

    async fn closed(&self) -> String {
        let mut rx = self.lost.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or_default(),
            Err(_) => "connection notifier dropped".to_string(),
        };
        reason
    }

    async fn close(&self) -> TransportResult<()> {
        if !self.inner.status().connected() {
            debug!("connection already closed");
            return Ok(());
        }
        self.inner.close(REPLY_SUCCESS, "publisher shutdown").await?;
        Ok(())
    }
}

struct AmqpChannel {
    inner: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_topic_exchange(&self, name: &str) -> TransportResult<()> {
        let options = ExchangeDeclareOptions {
            durable: true,
            auto_delete: false,
            ..ExchangeDeclareOptions::default()
        };
        self.inner
            .exchange_declare(name, ExchangeKind::Topic, options, FieldTable::default())
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: &PublishProperties,
    ) -> TransportResult<()> {
        if !self.inner.status().connected() {
            return Err(TransportError::ChannelClosed);
        }

        let amqp_properties = BasicProperties::default()
            .with_content_type(properties.content_type.into())
            .with_message_id(properties.message_id.clone().into())
            .with_timestamp(properties.timestamp.max(0) as u64);

        let options = BasicPublishOptions {
            mandatory: false,
            immediate: false,
        };

        let sent = async {
            self.inner
                .basic_publish(exchange, routing_key, options, body, amqp_properties)
                .await?
                .await
        }
        .await;

        let confirmation = match sent {
            Ok(confirmation) => confirmation,
            // A channel-level exception (e.g. the exchange was deleted) closes
            // the channel but not the connection.
            Err(err) if !self.inner.status().connected() => {
                debug!(error = %err, "channel closed by broker during publish");
                return Err(TransportError::ChannelClosed);
            }
            Err(err) => return Err(err.into()),
        };

        match confirmation {
            Confirmation::Nack(_) => Err(TransportError::Rejected),
            _ => Ok(()),
        }
    }

    async fn close(&self) -> TransportResult<()> {
        if !self.inner.status().connected() {
            return Ok(());
        }
        self.inner.close(REPLY_SUCCESS, "publisher shutdown").await?;
        Ok(())
    }
}
