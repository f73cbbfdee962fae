use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

pub mod bounded;
pub mod error;
pub mod message_log;
pub mod registry;
pub mod skill;
pub mod status;
pub mod topic;
pub mod transcript;
pub mod transport;
pub mod types;

pub use error::BusError;
pub use message_log::{LogRecord, MessageLog, MessageLogProjector};
pub use registry::{Attachment, SubscriptionRegistry};
pub use skill::{SkillSelector, SkillStateFeed, ViewDescriptor, ViewKind};
pub use status::StatusProjector;
pub use topic::{TopicFilter, TopicPatterns};
pub use transcript::{Transcript, TranscriptAccumulator, TranscriptEntry};
pub use transport::{
    BusConnector, Connection, ConnectionState, MemoryConnector, MemoryFeed, WebSocketConnector,
};
pub use types::{ListenerId, SessionConfig, SubscriptionId};

/// Handlers run to completion, so a poisoned lock still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct BusSession {
    connector: Arc<dyn BusConnector>,
    connection: Arc<Connection>,
    registry: SubscriptionRegistry,
    status: StatusProjector,
    transcript: TranscriptAccumulator,
    message_log: MessageLogProjector,
    skills: SkillSelector,
    skill_feed: SkillStateFeed,
}

impl BusSession {
    pub fn new(config: SessionConfig, connector: Arc<dyn BusConnector>) -> Self {
        let connection = Connection::new(config.bus_url);
        let registry = SubscriptionRegistry::new(Arc::clone(&connection));
        let skills = SkillSelector::new();
        Self {
            connector,
            connection,
            registry,
            status: StatusProjector::new(config.status_patterns),
            transcript: TranscriptAccumulator::new(config.transcript_patterns, config.transcript_cap),
            message_log: MessageLogProjector::new(
                config.message_log_patterns,
                config.transcript_cap,
            ),
            skill_feed: SkillStateFeed::new(config.skill_feed_patterns, skills.clone()),
            skills,
        }
    }

    pub fn websocket(config: SessionConfig) -> Self {
        Self::new(config, Arc::new(WebSocketConnector))
    }

    pub fn activate_all(&self) -> Result<(), BusError> {
        self.status.activate(&self.registry)?;
        self.transcript.activate(&self.registry)?;
        self.message_log.activate(&self.registry)?;
        self.skill_feed.activate(&self.registry)?;
        Ok(())
    }

    pub fn deactivate_all(&self) {
        self.status.deactivate();
        self.transcript.deactivate();
        self.message_log.deactivate();
        self.skill_feed.deactivate();
    }

    pub async fn open(&self) -> Result<(), BusError> {
        self.connection.open(self.connector.as_ref()).await?;
        info!(url = self.connection.url(), "bus: session open");
        Ok(())
    }

    pub async fn run(&self) -> Result<(), BusError> {
        self.connection.run().await
    }

    pub fn close(&self) {
        self.connection.close();
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn status(&self) -> &StatusProjector {
        &self.status
    }

    pub fn transcript(&self) -> &TranscriptAccumulator {
        &self.transcript
    }

    pub fn message_log(&self) -> &MessageLogProjector {
        &self.message_log
    }

    pub fn skills(&self) -> &SkillSelector {
        &self.skills
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
