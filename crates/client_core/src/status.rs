use std::sync::Arc;

use shared::domain::Status;
use tokio::sync::watch;
use tracing::debug;

use crate::{
    error::BusError,
    registry::{Attachment, SubscriptionRegistry},
    topic::TopicPatterns,
};

pub fn transition(topic: &str) -> Option<Status> {
    let (_, action) = topic.split_once(':')?;
    match action {
        "wakeword" => Some(Status::Listening),
        "utterance" => Some(Status::Thinking),
        "audio_output_start" => Some(Status::Speaking),
        "audio_output_end" => Some(Status::Resting),
        _ => None,
    }
}

pub struct StatusProjector {
    patterns: TopicPatterns,
    status: Arc<watch::Sender<Status>>,
    attachment: Attachment,
}

impl StatusProjector {
    pub fn new(patterns: TopicPatterns) -> Self {
        let (status, _) = watch::channel(Status::default());
        Self {
            patterns,
            status: Arc::new(status),
            attachment: Attachment::default(),
        }
    }

    pub fn activate(&self, registry: &SubscriptionRegistry) -> Result<(), BusError> {
        self.attachment.attach(registry, |registry| {
            let status = Arc::clone(&self.status);
            registry.subscribe(&self.patterns, move |envelope| {
                if let Some(next) = transition(envelope.topic()) {
                    let previous = status.send_replace(next);
                    debug!(topic = envelope.topic(), %previous, %next, "status: transition");
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

    pub fn current(&self) -> Status {
        *self.status.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/status_tests.rs"]
mod tests;
