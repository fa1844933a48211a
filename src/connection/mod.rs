//! Connection management for the broker link.
//!
//! - [`ConnectionState`]: the shared, lock-guarded handles and `open` flag.
//! - [`ConnectionManager`]: one connect-and-setup attempt.
//! - [`Backoff`]: reconnect delay arithmetic.
//! - [`ReconnectionLoop`]: the background task tying them together.

pub mod backoff;
pub mod manager;
pub mod reconnect;
pub mod state;

pub use backoff::Backoff;
pub use manager::ConnectionManager;
pub use reconnect::{LinkPhase, ReconnectionLoop};
pub use state::ConnectionState;
