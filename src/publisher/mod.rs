//! The `publisher` module is the public face of the crate: the
//! [`EventPublisher`] handle that owns a reconnection loop and publishes
//! JSON envelopes with bounded retry.

pub mod envelope;
pub mod event_publisher;

pub use envelope::Envelope;
pub use event_publisher::{EventPublisher, NOT_READY_WAIT, RETRY_STEP};
