//! Named push notifications the presentation layer can subscribe to.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    PetMessage,
    PetAnimation,
    PetGreeting,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::PetMessage, Topic::PetAnimation, Topic::PetGreeting];

    /// Event name on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Self::PetMessage => "pet-message",
            Self::PetAnimation => "pet-animation",
            Self::PetGreeting => "pet-greeting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationTag {
    Idle,
    Drag,
    Listen,
    Think,
    Configure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Animation(AnimationTag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&Payload) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

#[derive(Default)]
pub struct NotificationBus {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<Topic, Vec<Subscriber>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> SubscriptionId
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(topic).or_default().push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        for list in subscribers.values_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver to every subscriber of `topic`; returns how many were called.
    pub fn publish(&self, topic: Topic, payload: &Payload) -> usize {
        // callbacks run outside the lock so they may subscribe or publish themselves
        let callbacks: Vec<Callback> = self
            .lock()
            .get(&topic)
            .map(|list| list.iter().map(|s| s.callback.clone()).collect())
            .unwrap_or_default();
        trace!(topic = topic.name(), receivers = callbacks.len(), "publish");
        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    #[cfg(test)]
    fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock().get(&topic).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Topic, Vec<Subscriber>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
