use std::{collections::BTreeMap, fmt};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const SPEAK_TOPIC: &str = "speak";
pub const UTTERANCE_TOPIC: &str = "recognizer_loop:utterance";

pub const SCHOOLS_DATA_SKILL: &str = "schools-data.adelphi";
pub const WIKI_SKILL: &str = "mycroft-wiki.mycroftai";
pub const WEATHER_SKILL: &str = "mycroft-weather.mycroftai";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Resting,
    Listening,
    Thinking,
    Speaking,
    Confused,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resting => "resting",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Confused => "confused",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Assistant,
    User,
}

impl Speaker {
    /// Only the assistant's own `speak` messages count as assistant output.
    pub fn for_topic(topic: &str) -> Self {
        if topic == SPEAK_TOPIC {
            Self::Assistant
        } else {
            Self::User
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillSelectionState {
    pub active_skill: String,
    #[serde(rename = "component_focus", default)]
    pub focused_component_index: usize,
    #[serde(default, deserialize_with = "component_indices")]
    pub components: BTreeMap<usize, String>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl SkillSelectionState {
    pub fn new(active_skill: impl Into<String>) -> Self {
        Self {
            active_skill: active_skill.into(),
            ..Self::default()
        }
    }

    pub fn focused_component(&self) -> Option<&str> {
        self.components
            .get(&self.focused_component_index)
            .map(String::as_str)
    }
}

// Keys arrive as strings and flatten blocks serde's own integer coercion.
fn component_indices<'de, D>(deserializer: D) -> Result<BTreeMap<usize, String>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, String>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, component)| {
            key.parse::<usize>()
                .map(|index| (index, component))
                .map_err(|_| D::Error::custom(format!("component key `{key}` is not an index")))
        })
        .collect()
}
