use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::types::{AuthEvent, Session};

pub type AuthCallback = Arc<dyn Fn(AuthEvent, Option<&Session>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: BTreeMap<u64, AuthCallback>,
}

/// Auth state change subscribers.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<Mutex<Registry>>,
}

impl Listeners {
    pub fn subscribe(&self, callback: AuthCallback) -> Subscription {
        let mut registry = self.inner.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.insert(id, callback);
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn emit(&self, event: AuthEvent, session: Option<&Session>) {
        // Callbacks may subscribe or unsubscribe, so run them outside the lock.
        let callbacks: Vec<AuthCallback> = self.inner.lock().callbacks.values().cloned().collect();
        for callback in callbacks {
            callback(event, session);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by `on_auth_state_change`. Dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().callbacks.remove(&self.id);
        }
    }
}
