//! The reconnection loop.
//!
//! ```text
//! Idle -> Connecting -> Connected -> Disconnected -> Connecting ...
//!            ^   |                                      |
//!            +---+ (failure: backoff)                   |
//! any phase --(shutdown)--> ShuttingDown -> Stopped <---+
//! ```
//!
//! Both waits (the backoff sleep and the wait for connection loss) race the
//! shutdown token, so `close()` never waits out a 60s backoff. While
//! connected the loop also watches for channel faults reported by publishers
//! and redoes the whole setup when one arrives.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backoff::Backoff;
use super::manager::ConnectionManager;
use super::state::ConnectionState;
use crate::utils::error::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    ShuttingDown,
    Stopped,
}

pub struct ReconnectionLoop {
    manager: ConnectionManager,
    backoff: Backoff,
    state: Arc<ConnectionState>,
    phase: watch::Sender<LinkPhase>,
}

impl ReconnectionLoop {
    /// Returns the loop and a receiver tracking its phase.
    pub fn new(
        manager: ConnectionManager,
        backoff: Backoff,
        state: Arc<ConnectionState>,
    ) -> (Self, watch::Receiver<LinkPhase>) {
        let (phase, phase_rx) = watch::channel(LinkPhase::Idle);
        (
            Self {
                manager,
                backoff,
                state,
                phase,
            },
            phase_rx,
        )
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let shutdown = self.state.shutdown_token().clone();
        let mut attempt: u32 = 0;

        while !shutdown.is_cancelled() {
            self.phase.send_replace(LinkPhase::Connecting);
            let mut channel_faults = self.state.channel_faults();

            let connection = match self.manager.connect_and_setup().await {
                Ok(connection) => connection,
                Err(ConnectionError::Aborted) => break,
                Err(err) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "broker connection failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            };

            attempt = 0;
            self.phase.send_replace(LinkPhase::Connected);
            info!("broker connection ready");

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                reason = connection.closed() => {
                    warn!(%reason, "broker connection lost");
                    // The connection is already gone; dropping the stale
                    // handles is all that is left to do.
                    drop(self.state.release());
                    self.phase.send_replace(LinkPhase::Disconnected);
                }
                _ = channel_faults.changed() => {
                    warn!("broker closed the channel, setting up again");
                    self.manager.release(self.state.release()).await;
                    self.phase.send_replace(LinkPhase::Disconnected);
                }
            }
        }

        self.phase.send_replace(LinkPhase::ShuttingDown);
        info!("reconnection loop stopping");
        // Empty when close() already ran; otherwise the handle was dropped
        // and the live connection is still installed.
        self.manager.release(self.state.release()).await;
        self.phase.send_replace(LinkPhase::Stopped);
    }
}
