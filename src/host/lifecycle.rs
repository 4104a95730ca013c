//! One-shot "host fully started" signal.

use super::{Callback, CancelToken};
use log::debug;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

#[derive(Default)]
struct StartState {
    started: bool,
    next_id: u64,
    listeners: Vec<(u64, Callback)>,
}

/// Fires its listeners exactly once, when the host reports it has started.
///
/// Listeners registered after the signal fired run immediately, from inside
/// [`StartSignal::listen_once`].
#[derive(Clone, Default)]
pub struct StartSignal {
    inner: Arc<Mutex<StartState>>,
}

impl StartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().started
    }

    /// Register `callback` to run once the host has started.
    pub fn listen_once(&self, callback: Callback) -> CancelToken {
        let id = {
            let mut state = self.inner.lock();
            if !state.started {
                let id = state.next_id;
                state.next_id += 1;
                state.listeners.push((id, callback));
                Some(id)
            } else {
                drop(state);
                callback();
                None
            }
        };

        match id {
            Some(id) => {
                let weak: Weak<Mutex<StartState>> = Arc::downgrade(&self.inner);
                CancelToken::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.lock().listeners.retain(|(other, _)| *other != id);
                    }
                })
            }
            None => CancelToken::noop(),
        }
    }

    /// Mark the host as started and run all pending listeners.
    /// Firing again is a no-op.
    pub fn fire(&self) {
        let listeners = {
            let mut state = self.inner.lock();
            if state.started {
                return;
            }
            state.started = true;
            std::mem::take(&mut state.listeners)
        };

        debug!("Host started, notifying {} listener(s)", listeners.len());
        for (_, listener) in listeners {
            listener();
        }
    }
}
