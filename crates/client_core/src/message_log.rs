use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    bounded::BoundedLog,
    error::BusError,
    registry::{Attachment, SubscriptionRegistry},
    topic::TopicPatterns,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub topic: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

pub type MessageLog = BoundedLog<LogRecord>;

pub struct MessageLogProjector {
    patterns: TopicPatterns,
    log: Arc<watch::Sender<MessageLog>>,
    attachment: Attachment,
}

impl MessageLogProjector {
    pub fn new(patterns: TopicPatterns, cap: usize) -> Self {
        let (log, _) = watch::channel(MessageLog::new(cap));
        Self {
            patterns,
            log: Arc::new(log),
            attachment: Attachment::default(),
        }
    }

    pub fn activate(&self, registry: &SubscriptionRegistry) -> Result<(), BusError> {
        self.attachment.attach(registry, |registry| {
            let log = Arc::clone(&self.log);
            registry.subscribe(&self.patterns, move |envelope| {
                let record = LogRecord {
                    topic: envelope.topic().to_string(),
                    payload: envelope.payload().clone(),
                    received_at: envelope.received_at(),
                };
                log.send_modify(|log| log.push(record));
                Ok(())
            })
        })?;
        Ok(())
    }

    pub fn deactivate(&self) -> bool {
        self.attachment.detach()
    }

    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.log.borrow().to_vec()
    }

    pub fn watch(&self) -> watch::Receiver<MessageLog> {
        self.log.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use crate::transport::Connection;

    use super::*;

    #[test]
    fn records_everything_except_excluded_topics() {
        let registry = SubscriptionRegistry::new(Connection::new("ws://bus.test/core"));
        let projector =
            MessageLogProjector::new(TopicPatterns::exclude(["^mycroft-date-time.*$"]), 2);
        projector.activate(&registry).expect("activate");

        registry.dispatch_frame(r#"{"type":"speak","data":{"utterance":"hi"}}"#);
        registry.dispatch_frame(r#"{"type":"mycroft-date-time.mycroftai:tick","data":{}}"#);
        registry.dispatch_frame(r#"{"type":"recognizer_loop:wakeword","data":{}}"#);
        registry.dispatch_frame(r#"{"type":"enclosure.eyes.blink","data":{"side":"b"}}"#);

        let topics: Vec<_> = projector.snapshot().into_iter().map(|r| r.topic).collect();
        assert_eq!(topics, vec!["enclosure.eyes.blink", "recognizer_loop:wakeword"]);
    }
}
