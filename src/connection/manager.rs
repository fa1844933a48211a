use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::state::{ConnectionState, Released};
use crate::config::ConnectionConfig;
use crate::transport::{BrokerConnection, Transport};
use crate::utils::error::{ConnectionError, TransportError, TransportResult};

/// Performs one connect-and-setup attempt and publishes the result into the
/// shared [`ConnectionState`].
///
/// Retrying is the reconnection loop's job; a failed attempt here only
/// guarantees that nothing it opened is left behind.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    config: Arc<ConnectionConfig>,
    state: Arc<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<ConnectionConfig>,
        state: Arc<ConnectionState>,
    ) -> Self {
        Self {
            transport,
            config,
            state,
        }
    }

    /// Dial, open a channel, declare the topic exchange, then install.
    ///
    /// Returns the live connection so the caller can wait for its loss.
    pub async fn connect_and_setup(&self) -> Result<Arc<dyn BrokerConnection>, ConnectionError> {
        let limit = self.config.connect_timeout();

        let connection = bounded(limit, self.transport.connect(&self.config.url))
            .await
            .map_err(ConnectionError::Connect)?;

        let channel = match bounded(limit, connection.open_channel()).await {
            Ok(channel) => channel,
            Err(err) => {
                self.release(Released {
                    connection: Some(connection),
                    channel: None,
                })
                .await;
                return Err(ConnectionError::Channel(err));
            }
        };

        if let Err(err) = bounded(limit, channel.declare_topic_exchange(&self.config.exchange)).await
        {
            self.release(Released {
                connection: Some(connection),
                channel: Some(channel),
            })
            .await;
            return Err(ConnectionError::Declare {
                exchange: self.config.exchange.clone(),
                source: err,
            });
        }

        match self.state.install(connection.clone(), channel) {
            Ok(()) => {
                debug!(exchange = %self.config.exchange, "connection installed");
                Ok(connection)
            }
            Err(released) => {
                self.release(released).await;
                Err(ConnectionError::Aborted)
            }
        }
    }

    pub async fn release(&self, released: Released) {
        close_handles(released, self.config.connect_timeout()).await;
    }
}

/// Closes released handles, channel first. Failures are logged only.
pub async fn close_handles(released: Released, limit: Duration) {
    if let Some(channel) = released.channel {
        if let Err(err) = bounded(limit, channel.close()).await {
            warn!(error = %err, "failed to close channel");
        }
    }
    if let Some(connection) = released.connection {
        if let Err(err) = bounded(limit, connection.close()).await {
            warn!(error = %err, "failed to close connection");
        }
    }
}

/// Runs `op` with a deadline; a timeout becomes [`TransportError::Timeout`].
pub(crate) async fn bounded<T, F>(limit: Duration, op: F) -> TransportResult<T>
where
    F: Future<Output = TransportResult<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(limit)),
    }
}
