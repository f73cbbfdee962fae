use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// One raw JSON object as carried by a single bus text frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusFrame {
    #[serde(rename = "type")]
    pub topic: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Topic is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    topic: String,
    payload: Value,
    received_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(
        topic: impl Into<String>,
        payload: Value,
        received_at: DateTime<Utc>,
    ) -> Result<Self, ProtocolError> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(ProtocolError::MalformedFrame(
                "frame has an empty `type`".to_string(),
            ));
        }
        Ok(Self {
            topic,
            payload,
            received_at,
        })
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Self::decode_at(raw, Utc::now())
    }

    pub fn decode_at(raw: &str, received_at: DateTime<Utc>) -> Result<Self, ProtocolError> {
        let frame = serde_json::from_str::<BusFrame>(raw)
            .map_err(|err| ProtocolError::MalformedFrame(err.to_string()))?;
        Self::new(frame.topic, frame.data, received_at)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.payload)
            .map_err(|err| ProtocolError::malformed_payload(&self.topic, err.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakPayload {
    pub utterance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtterancePayload {
    pub utterances: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConversationPayload {
    pub view: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub data: Value,
}
