use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// `None` is no constraint; an empty include set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPatterns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

impl TopicPatterns {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn include<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: Some(patterns.into_iter().map(Into::into).collect()),
            exclude: None,
        }
    }

    pub fn exclude<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::any().excluding(patterns)
    }

    pub fn excluding<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn compile(&self) -> Result<TopicFilter, BusError> {
        Ok(TopicFilter {
            include: compile_set(self.include.as_deref())?,
            exclude: compile_set(self.exclude.as_deref())?,
        })
    }
}

fn compile_set(patterns: Option<&[String]>) -> Result<Option<Vec<Regex>>, BusError> {
    let Some(patterns) = patterns else {
        return Ok(None);
    };
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| BusError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[derive(Debug, Clone)]
pub struct TopicFilter {
    include: Option<Vec<Regex>>,
    exclude: Option<Vec<Regex>>,
}

impl TopicFilter {
    pub fn matches(&self, topic: &str) -> bool {
        matches(topic, self.include.as_deref(), self.exclude.as_deref())
    }
}

pub fn matches(topic: &str, include: Option<&[Regex]>, exclude: Option<&[Regex]>) -> bool {
    let included = include.map_or(true, |set| set.iter().any(|re| re.is_match(topic)));
    let excluded = exclude.is_some_and(|set| set.iter().any(|re| re.is_match(topic)));
    included && !excluded
}

#[cfg(test)]
#[path = "tests/topic_tests.rs"]
mod tests;
