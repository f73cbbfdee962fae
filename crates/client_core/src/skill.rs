use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value};
use shared::{
    domain::{SkillSelectionState, SCHOOLS_DATA_SKILL, WEATHER_SKILL, WIKI_SKILL},
    error::ProtocolError,
    protocol::{DataConversationPayload, Envelope},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::BusError,
    lock,
    registry::{Attachment, SubscriptionRegistry},
    topic::TopicPatterns,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    SchoolsData,
    Wiki,
    Weather,
}

impl ViewKind {
    pub fn for_skill(skill: &str) -> Option<Self> {
        match skill {
            SCHOOLS_DATA_SKILL => Some(Self::SchoolsData),
            WIKI_SKILL => Some(Self::Wiki),
            WEATHER_SKILL => Some(Self::Weather),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewDescriptor {
    pub kind: ViewKind,
    pub skill: String,
    pub component: String,
    pub properties: Map<String, Value>,
}

pub fn resolve(state: &SkillSelectionState) -> Option<ViewDescriptor> {
    let Some(kind) = ViewKind::for_skill(&state.active_skill) else {
        info!(skill = %state.active_skill, "skill: no panel for active skill");
        return None;
    };
    let Some(component) = state.focused_component() else {
        debug!(
            skill = %state.active_skill,
            focus = state.focused_component_index,
            "skill: focused component index has no component"
        );
        return None;
    };

    Some(ViewDescriptor {
        kind,
        skill: state.active_skill.clone(),
        component: component.to_string(),
        properties: state.properties.clone(),
    })
}

struct SelectorInner {
    state: Mutex<Option<SkillSelectionState>>,
    resolution: watch::Sender<Option<ViewDescriptor>>,
}

#[derive(Clone)]
pub struct SkillSelector {
    inner: Arc<SelectorInner>,
}

impl Default for SkillSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillSelector {
    pub fn new() -> Self {
        let (resolution, _) = watch::channel(None);
        Self {
            inner: Arc::new(SelectorInner {
                state: Mutex::new(None),
                resolution,
            }),
        }
    }

    pub fn update(&self, state: SkillSelectionState) -> Option<ViewDescriptor> {
        let resolved = resolve(&state);
        *lock(&self.inner.state) = Some(state);
        self.inner.resolution.send_replace(resolved.clone());
        resolved
    }

    pub fn clear(&self) {
        lock(&self.inner.state).take();
        self.inner.resolution.send_replace(None);
    }

    pub fn state(&self) -> Option<SkillSelectionState> {
        lock(&self.inner.state).clone()
    }

    pub fn current(&self) -> Option<ViewDescriptor> {
        self.inner.resolution.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<ViewDescriptor>> {
        self.inner.resolution.subscribe()
    }
}

pub fn state_from_data_conversation(
    envelope: &Envelope,
) -> Result<SkillSelectionState, ProtocolError> {
    let payload = envelope.payload_as::<DataConversationPayload>()?;
    if payload.view.trim().is_empty() {
        return Err(ProtocolError::malformed_payload(
            envelope.topic(),
            "empty `view`",
        ));
    }

    let mut state = SkillSelectionState::new(SCHOOLS_DATA_SKILL);
    state.components.insert(0, payload.view);
    state.focused_component_index = 0;
    if let Some(title) = payload.title {
        state.properties.insert("title".into(), Value::String(title));
    }
    state.properties.insert("data".into(), payload.data);
    Ok(state)
}

pub struct SkillStateFeed {
    patterns: TopicPatterns,
    selector: SkillSelector,
    attachment: Attachment,
}

impl SkillStateFeed {
    pub fn new(patterns: TopicPatterns, selector: SkillSelector) -> Self {
        Self {
            patterns,
            selector,
            attachment: Attachment::default(),
        }
    }

    pub fn activate(&self, registry: &SubscriptionRegistry) -> Result<(), BusError> {
        self.attachment.attach(registry, |registry| {
            let selector = self.selector.clone();
            registry.subscribe(&self.patterns, move |envelope| {
                match state_from_data_conversation(envelope) {
                    Ok(state) => {
                        selector.update(state);
                    }
                    Err(err) => warn!(
                        projector = "skill_feed",
                        topic = envelope.topic(),
                        error = %err,
                        "skill: dropping malformed payload"
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
}

#[cfg(test)]
#[path = "tests/skill_tests.rs"]
mod tests;
