//! Wire envelope for published events.
//!
//! ```json
//! { "data": <caller value>, "sent_at": "2024-05-01T12:00:00.123456Z" }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<'a, T: ?Sized + Serialize> {
    pub data: &'a T,
    pub sent_at: DateTime<Utc>,
}

impl<'a, T: ?Sized + Serialize> Envelope<'a, T> {
    /// Wraps `data`, stamping the current time.
    pub fn new(data: &'a T) -> Self {
        Self {
            data,
            sent_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
