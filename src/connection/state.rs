//! Shared connection record.
//!
//! One writer (the reconnection loop, plus `close()` for teardown) and any
//! number of readers (publish calls). The lock only ever guards copying `Arc`
//! handles in or out; no caller holds it across I/O.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::transport::{BrokerChannel, BrokerConnection};

#[derive(Default)]
struct Handles {
    connection: Option<Arc<dyn BrokerConnection>>,
    channel: Option<Arc<dyn BrokerChannel>>,
    open: bool,
}

/// Handles removed from the state, to be closed by the caller outside the lock.
#[derive(Default)]
pub struct Released {
    pub connection: Option<Arc<dyn BrokerConnection>>,
    pub channel: Option<Arc<dyn BrokerChannel>>,
}

pub struct ConnectionState {
    handles: RwLock<Handles>,
    shutdown: CancellationToken,
    // Bumped whenever a publisher finds the installed channel closed.
    channel_faults: watch::Sender<u64>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(Handles::default()),
            shutdown: CancellationToken::new(),
            channel_faults: watch::Sender::new(0),
        }
    }

    // Every write replaces the record wholesale, so a poisoned lock still
    // guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, Handles> {
        self.handles.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Handles> {
        self.handles.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.read().open
    }

    /// The channel to publish on, or `None` while the connection is not open.
    pub fn channel(&self) -> Option<Arc<dyn BrokerChannel>> {
        let handles = self.read();
        if handles.open {
            handles.channel.clone()
        } else {
            None
        }
    }

    /// Installs freshly set-up handles and marks the state open.
    ///
    /// Refused once shutdown has been signalled; the handles are handed back
    /// so the caller can release them.
    pub fn install(
        &self,
        connection: Arc<dyn BrokerConnection>,
        channel: Arc<dyn BrokerChannel>,
    ) -> Result<(), Released> {
        let mut handles = self.write();
        if self.shutdown.is_cancelled() {
            return Err(Released {
                connection: Some(connection),
                channel: Some(channel),
            });
        }
        *handles = Handles {
            connection: Some(connection),
            channel: Some(channel),
            open: true,
        };
        Ok(())
    }

    /// Marks the state closed and takes the stale handles out.
    pub fn release(&self) -> Released {
        let mut handles = self.write();
        let old = std::mem::take(&mut *handles);
        Released {
            connection: old.connection,
            channel: old.channel,
        }
    }

    /// Marks the state closed if `channel` is still the installed one.
    ///
    /// Used when the broker closed the channel but left the connection up,
    /// which the connection's loss notification never reports. Returns
    /// whether the report was accepted; reports about stale channels are
    /// ignored.
    pub fn report_channel_closed(&self, channel: &Arc<dyn BrokerChannel>) -> bool {
        let mut handles = self.write();
        let installed = handles.open
            && handles
                .channel
                .as_ref()
                .is_some_and(|current| same_channel(current, channel));
        if !installed {
            return false;
        }
        handles.open = false;
        drop(handles);
        self.channel_faults.send_modify(|n| *n = n.wrapping_add(1));
        true
    }

    /// Receiver that changes on every accepted channel fault reported after
    /// this call.
    pub fn channel_faults(&self) -> watch::Receiver<u64> {
        self.channel_faults.subscribe()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

fn same_channel(a: &Arc<dyn BrokerChannel>, b: &Arc<dyn BrokerChannel>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handles = self.read();
        f.debug_struct("ConnectionState")
            .field("open", &handles.open)
            .field("connection", &handles.connection.is_some())
            .field("channel", &handles.channel.is_some())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}
