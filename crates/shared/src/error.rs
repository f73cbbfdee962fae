use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("malformed payload on '{topic}': {reason}")]
    MalformedPayload { topic: String, reason: String },
}

impl ProtocolError {
    pub fn malformed_payload(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}
