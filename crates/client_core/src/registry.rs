use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
};

use shared::protocol::Envelope;
use tracing::{debug, warn};

use crate::{
    error::BusError,
    lock,
    topic::{TopicFilter, TopicPatterns},
    transport::Connection,
    types::{ListenerId, SubscriptionId},
};

pub type Callback = Box<dyn FnMut(&Envelope) -> anyhow::Result<()> + Send>;

struct Subscription {
    id: SubscriptionId,
    filter: TopicFilter,
    live: AtomicBool,
    callback: Mutex<Callback>,
}

struct RegistryState {
    subscriptions: Vec<Arc<Subscription>>,
    next_id: u64,
    raw_listener: Option<ListenerId>,
}

struct RegistryInner {
    connection: Arc<Connection>,
    state: Mutex<RegistryState>,
}

#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connection,
                state: Mutex::new(RegistryState {
                    subscriptions: Vec::new(),
                    next_id: 1,
                    raw_listener: None,
                }),
            }),
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.connection
    }

    pub fn subscribe<F>(
        &self,
        patterns: &TopicPatterns,
        callback: F,
    ) -> Result<SubscriptionId, BusError>
    where
        F: FnMut(&Envelope) -> anyhow::Result<()> + Send + 'static,
    {
        let filter = patterns.compile()?;
        let callback: Callback = Box::new(callback);

        let mut state = lock(&self.inner.state);
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.subscriptions.push(Arc::new(Subscription {
            id,
            filter,
            live: AtomicBool::new(true),
            callback: Mutex::new(callback),
        }));

        if state.raw_listener.is_none() {
            let registry = Arc::downgrade(&self.inner);
            let listener_id = self.inner.connection.on_message(move |frame| {
                if let Some(inner) = Weak::upgrade(&registry) {
                    inner.dispatch_frame(frame);
                }
            });
            state.raw_listener = Some(listener_id);
        }

        debug!(subscription_id = %id, ?patterns, "bus: subscription added");
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let released_listener = {
            let mut state = lock(&self.inner.state);
            let Some(index) = state.subscriptions.iter().position(|sub| sub.id == id) else {
                return false;
            };
            let removed = state.subscriptions.remove(index);
            removed.live.store(false, Ordering::Release);
            if state.subscriptions.is_empty() {
                state.raw_listener.take()
            } else {
                None
            }
        };

        if let Some(listener_id) = released_listener {
            self.inner.connection.remove_listener(listener_id);
        }
        debug!(subscription_id = %id, "bus: subscription removed");
        true
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.state).subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dispatch_frame(&self, frame: &str) -> usize {
        self.inner.dispatch_frame(frame)
    }

    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        self.inner.dispatch(envelope)
    }
}

impl RegistryInner {
    fn dispatch_frame(&self, frame: &str) -> usize {
        match Envelope::decode(frame) {
            Ok(envelope) => self.dispatch(&envelope),
            Err(err) => {
                warn!(error = %err, frame_len = frame.len(), "bus: dropping malformed frame");
                0
            }
        }
    }

    fn dispatch(&self, envelope: &Envelope) -> usize {
        let snapshot: Vec<Arc<Subscription>> = lock(&self.state).subscriptions.clone();
        let topic = envelope.topic();
        let mut invoked = 0;

        for subscription in snapshot {
            if !subscription.filter.matches(topic) {
                continue;
            }
            if !subscription.live.load(Ordering::Acquire) {
                continue;
            }

            invoked += 1;
            let mut guard = lock(&subscription.callback);
            let callback = &mut **guard;
            match catch_unwind(AssertUnwindSafe(|| callback(envelope))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(
                    subscription_id = %subscription.id,
                    topic,
                    error = %err,
                    "bus: subscription callback failed"
                ),
                Err(_) => warn!(
                    subscription_id = %subscription.id,
                    topic,
                    "bus: subscription callback panicked"
                ),
            }
        }

        invoked
    }
}

/// Subscribes once no matter how often `attach` runs.
#[derive(Default)]
pub struct Attachment {
    slot: Mutex<Option<(SubscriptionRegistry, SubscriptionId)>>,
}

impl Attachment {
    /// Returns `Ok(true)` if this call created the subscription.
    pub fn attach<F>(&self, registry: &SubscriptionRegistry, subscribe: F) -> Result<bool, BusError>
    where
        F: FnOnce(&SubscriptionRegistry) -> Result<SubscriptionId, BusError>,
    {
        let mut slot = lock(&self.slot);
        if slot.is_some() {
            return Ok(false);
        }
        let id = subscribe(registry)?;
        *slot = Some((registry.clone(), id));
        Ok(true)
    }

    pub fn detach(&self) -> bool {
        let taken = lock(&self.slot).take();
        match taken {
            Some((registry, id)) => registry.unsubscribe(id),
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.slot).is_some()
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        lock(&self.slot).as_ref().map(|(_, id)| *id)
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
