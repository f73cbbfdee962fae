use shared::error::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("invalid topic pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("malformed payload on '{topic}': {reason}")]
    MalformedPayload { topic: String, reason: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("connection already opened (state: {0})")]
    AlreadyOpen(&'static str),
}

impl From<ProtocolError> for BusError {
    fn from(value: ProtocolError) -> Self {
        match value {
            ProtocolError::MalformedFrame(reason) => Self::MalformedFrame(reason),
            ProtocolError::MalformedPayload { topic, reason } => {
                Self::MalformedPayload { topic, reason }
            }
        }
    }
}
