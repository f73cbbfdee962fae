use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    domain::{Speaker, SPEAK_TOPIC},
    error::ProtocolError,
    protocol::{Envelope, SpeakPayload, UtterancePayload},
};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    bounded::BoundedLog,
    error::BusError,
    registry::{Attachment, SubscriptionRegistry},
    topic::TopicPatterns,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

pub type Transcript = BoundedLog<TranscriptEntry>;

pub fn entry_from_envelope(envelope: &Envelope) -> Result<TranscriptEntry, ProtocolError> {
    let topic = envelope.topic();
    let speaker = Speaker::for_topic(topic);
    let text = match speaker {
        Speaker::Assistant => envelope.payload_as::<SpeakPayload>()?.utterance,
        Speaker::User => envelope
            .payload_as::<UtterancePayload>()?
            .utterances
            .into_iter()
            .next()
            .ok_or_else(|| ProtocolError::malformed_payload(topic, "empty `utterances` list"))?,
    };
    if text.trim().is_empty() {
        return Err(ProtocolError::malformed_payload(topic, "empty utterance text"));
    }

    Ok(TranscriptEntry {
        speaker,
        text,
        timestamp: envelope.received_at(),
    })
}

pub struct TranscriptAccumulator {
    patterns: TopicPatterns,
    transcript: Arc<watch::Sender<Transcript>>,
    attachment: Attachment,
}

impl TranscriptAccumulator {
    pub fn new(patterns: TopicPatterns, cap: usize) -> Self {
        let (transcript, _) = watch::channel(Transcript::new(cap));
        Self {
            patterns,
            transcript: Arc::new(transcript),
            attachment: Attachment::default(),
        }
    }

    pub fn activate(&self, registry: &SubscriptionRegistry) -> Result<(), BusError> {
        self.attachment.attach(registry, |registry| {
            let transcript = Arc::clone(&self.transcript);
            registry.subscribe(&self.patterns, move |envelope| {
                match entry_from_envelope(envelope) {
                    Ok(entry) => {
                        debug!(topic = envelope.topic(), speaker = ?entry.speaker, "transcript: entry added");
                        transcript.send_modify(|log| log.push(entry));
                    }
                    Err(err) => warn!(
                        projector = "transcript",
                        topic = envelope.topic(),
                        error = %err,
                        "transcript: dropping malformed payload"
                    ),
                }
                Ok(())
            })
        })?;
        Ok(())
    }

    pub fn deactivate(&self) -> bool {
        self.attachment.detach()
    }

    pub fn is_active(&self) -> bool {
        self.attachment.is_attached()
    }

    pub fn cap(&self) -> usize {
        self.transcript.borrow().cap()
    }

    /// Newest entry first.
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.transcript.borrow().to_vec()
    }

    pub fn watch(&self) -> watch::Receiver<Transcript> {
        self.transcript.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/transcript_tests.rs"]
mod tests;
