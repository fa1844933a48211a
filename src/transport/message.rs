use uuid::Uuid;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Message properties attached to every publish.
///
/// `timestamp` is unix seconds and matches the envelope's `sent_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishProperties {
    pub content_type: &'static str,
    pub message_id: String,
    pub timestamp: i64,
}

impl PublishProperties {
    /// JSON properties with a fresh message id.
    pub fn json(timestamp: i64) -> Self {
        Self {
            content_type: CONTENT_TYPE_JSON,
            message_id: Uuid::new_v4().to_string(),
            timestamp,
        }
    }
}
