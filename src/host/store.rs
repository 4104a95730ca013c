//! In-memory source state store with change notifications.
//!
//! Fed by the MQTT statestream in the binary and directly by tests. Callbacks
//! run on the thread that applied the change, after all store locks have been
//! released, so a callback may read the store again.

use super::{CancelToken, ChangeCallback, SourceState, StateEvents, StateStore, Subscription};
use log::trace;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

struct Listener {
    id: u64,
    entity_ids: HashSet<String>,
    callback: ChangeCallback,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<Listener>,
}

/// Thread-safe source state store.
#[derive(Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<String, SourceState>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole state of a source. Notifies watchers if it changed.
    pub fn set(&self, state: SourceState) -> bool {
        let entity_id = state.entity_id.clone();
        let changed = {
            let mut states = self.states.write();
            let changed = states.get(&entity_id) != Some(&state);
            states.insert(entity_id.clone(), state);
            changed
        };
        if changed {
            self.notify(&entity_id);
        }
        changed
    }

    /// Update the raw state of a source, keeping its attributes.
    pub fn set_state(&self, entity_id: &str, state: &str) -> bool {
        self.modify(entity_id, |source| {
            if source.state == state {
                false
            } else {
                source.state = state.to_string();
                true
            }
        })
    }

    /// Update one attribute of a source.
    pub fn set_attribute(&self, entity_id: &str, key: &str, value: Value) -> bool {
        self.modify(entity_id, |source| {
            if source.attributes.get(key) == Some(&value) {
                false
            } else {
                source.attributes.insert(key.to_string(), value);
                true
            }
        })
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Sources not seen before start in the `unknown` state.
    fn modify(&self, entity_id: &str, apply: impl FnOnce(&mut SourceState) -> bool) -> bool {
        let changed = {
            let mut states = self.states.write();
            let source = states
                .entry(entity_id.to_string())
                .or_insert_with(|| SourceState::new(entity_id, super::state::STATE_UNKNOWN));
            apply(source)
        };
        if changed {
            self.notify(entity_id);
        }
        changed
    }

    fn notify(&self, entity_id: &str) {
        let callbacks: Vec<ChangeCallback> = self
            .listeners
            .lock()
            .entries
            .iter()
            .filter(|listener| listener.entity_ids.contains(entity_id))
            .map(|listener| listener.callback.clone())
            .collect();

        trace!(
            "State of {} changed, {} watcher(s)",
            entity_id,
            callbacks.len()
        );
        for callback in callbacks {
            callback(entity_id);
        }
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, entity_id: &str) -> Option<SourceState> {
        self.states.read().get(entity_id).cloned()
    }
}

impl StateEvents for MemoryStateStore {
    fn subscribe(&self, entity_ids: &[String], callback: ChangeCallback) -> Subscription {
        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push(Listener {
                id,
                entity_ids: entity_ids.iter().cloned().collect(),
                callback,
            });
            id
        };

        let listeners = Arc::downgrade(&self.listeners);
        CancelToken::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.lock().entries.retain(|listener| listener.id != id);
            }
        })
    }
}
