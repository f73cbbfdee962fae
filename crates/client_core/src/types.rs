use std::fmt;

use serde::{Deserialize, Serialize};

use crate::topic::TopicPatterns;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ListenerId);
id_newtype!(SubscriptionId);

pub const DEFAULT_BUS_URL: &str = "ws://localhost:8181/core";
pub const DEFAULT_TRANSCRIPT_CAP: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub bus_url: String,
    pub transcript_cap: usize,
    pub status_patterns: TopicPatterns,
    pub transcript_patterns: TopicPatterns,
    pub message_log_patterns: TopicPatterns,
    pub skill_feed_patterns: TopicPatterns,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bus_url: DEFAULT_BUS_URL.into(),
            transcript_cap: DEFAULT_TRANSCRIPT_CAP,
            status_patterns: TopicPatterns::include(["^recognizer_loop.*"]),
            transcript_patterns: TopicPatterns::include(["speak", "recognizer_loop:utterance"]),
            message_log_patterns: TopicPatterns::exclude(["^mycroft-date-time.*$"]),
            skill_feed_patterns: TopicPatterns::include(["^data_conversations:"]),
        }
    }
}
