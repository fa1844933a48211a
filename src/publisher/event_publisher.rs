//! Event publisher handle.
//!
//! Concurrency and usage notes:
//! - `EventPublisher` is `Send + Sync`; share it behind an `Arc` and call
//!   `publish` from as many tasks as needed. Publishing only reads the shared
//!   connection state.
//! - Construction spawns the reconnection loop on the current tokio runtime.
//! - `close()` is idempotent and does not wait for the loop; `shutdown()`
//!   does. Dropping the handle signals the loop to stop; the loop closes the
//!   broker connection on its way out.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::envelope::Envelope;
use crate::config::ConnectionConfig;
use crate::connection::manager::{bounded, close_handles};
use crate::connection::{Backoff, ConnectionManager, ConnectionState, LinkPhase, ReconnectionLoop};
use crate::transport::{AmqpTransport, PublishProperties, Transport};
use crate::utils::error::{PublishError, TransportError};

/// Wait before retrying when the channel is not open.
pub const NOT_READY_WAIT: Duration = Duration::from_millis(200);

/// Linear step for retrying a failed publish: attempt `n` waits `n * RETRY_STEP`.
pub const RETRY_STEP: Duration = Duration::from_millis(150);

pub struct EventPublisher {
    config: Arc<ConnectionConfig>,
    state: Arc<ConnectionState>,
    phase: watch::Receiver<LinkPhase>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventPublisher {
    /// Starts a publisher connected to an AMQP broker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: ConnectionConfig) -> Self {
        Self::start_with_transport(config, Arc::new(AmqpTransport))
    }

    pub fn start_with_transport(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let config = Arc::new(config);
        let state = Arc::new(ConnectionState::new());
        let backoff = Backoff::from_config(&config);

        info!(
            url = %config.redacted_url(),
            exchange = %config.exchange,
            retry_seconds = config.retry_seconds,
            max_retry_seconds = config.max_retry_seconds,
            backoff_factor = backoff.factor(),
            jitter = config.jitter_enabled,
            max_publish_retry = config.publish_attempts(),
            "starting event publisher"
        );

        let manager = ConnectionManager::new(transport, config.clone(), state.clone());
        let (reconnect, phase) = ReconnectionLoop::new(manager, backoff, state.clone());
        let task = reconnect.spawn();

        Self {
            config,
            state,
            phase,
            task: Mutex::new(Some(task)),
        }
    }

    /// True while a channel is open and the exchange is declared.
    pub fn is_ready(&self) -> bool {
        self.state.is_open()
    }

    pub fn phase(&self) -> LinkPhase {
        *self.phase.borrow()
    }

    /// Waits up to `limit` for the connection to become ready.
    pub async fn wait_ready(&self, limit: Duration) -> bool {
        let mut phase = self.phase.clone();
        let reached = tokio::time::timeout(
            limit,
            phase.wait_for(|p| matches!(p, LinkPhase::Connected | LinkPhase::Stopped)),
        )
        .await
        .is_ok();
        reached && self.is_ready()
    }

    /// Publishes `data` wrapped in an envelope to the configured exchange.
    ///
    /// Tries up to `max_publish_retry` times (at least once). An attempt that
    /// finds the channel closed waits [`NOT_READY_WAIT`]; a failed attempt `n`
    /// waits `n * RETRY_STEP`. Serialization failures are returned at once.
    pub async fn publish<T>(&self, routing_key: &str, data: &T) -> Result<(), PublishError>
    where
        T: Serialize + ?Sized,
    {
        let (body, properties) = {
            let envelope = Envelope::new(data);
            (
                envelope.to_json()?,
                PublishProperties::json(envelope.sent_at.timestamp()),
            )
        };

        let attempts = self.config.publish_attempts();
        let shutdown = self.state.shutdown_token();

        for attempt in 1..=attempts {
            if shutdown.is_cancelled() {
                return Err(PublishError::Closed);
            }

            let wait = match self.state.channel() {
                None => {
                    debug!(attempt, routing_key, "channel not open, waiting");
                    NOT_READY_WAIT
                }
                Some(channel) => {
                    let sent = bounded(
                        self.config.publish_timeout(),
                        channel.publish(&self.config.exchange, routing_key, &body, &properties),
                    )
                    .await;
                    match sent {
                        Ok(()) => {
                            debug!(
                                attempt,
                                routing_key,
                                message_id = %properties.message_id,
                                bytes = body.len(),
                                "event published"
                            );
                            return Ok(());
                        }
                        Err(err) => {
                            warn!(attempt, routing_key, error = %err, "publish attempt failed");
                            if matches!(err, TransportError::ChannelClosed) {
                                self.state.report_channel_closed(&channel);
                            }
                            RETRY_STEP * attempt
                        }
                    }
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(PublishError::Closed),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        error!(routing_key, attempts, "publish retries exhausted");
        Err(PublishError::MaxRetriesExceeded { attempts })
    }

    /// Signals the reconnection loop to stop and closes the live handles.
    ///
    /// Safe to call any number of times. Does not wait for the loop to exit.
    pub async fn close(&self) {
        let token = self.state.shutdown_token();
        if !token.is_cancelled() {
            info!("closing event publisher");
            token.cancel();
        }
        let released = self.state.release();
        close_handles(released, self.config.connect_timeout()).await;
    }

    /// `close()`, then waits for the reconnection loop to exit.
    pub async fn shutdown(&self) {
        self.close().await;
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "reconnection task ended abnormally");
            }
        }
    }
}

impl Drop for EventPublisher {
    fn drop(&mut self) {
        self.state.shutdown_token().cancel();
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("exchange", &self.config.exchange)
            .field("phase", &self.phase())
            .field("state", &self.state)
            .finish()
    }
}
