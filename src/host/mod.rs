//! Collaborators provided by the hosting runtime.
//!
//! The felt temperature sensor never talks to MQTT, timers or the state
//! store directly. It receives these as trait objects bundled in a
//! [`HostContext`], so the same state machine runs against the real
//! runtime and against a hand-driven fake clock in tests.

pub mod lifecycle;
pub mod scheduler;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use lifecycle::StartSignal;
pub use scheduler::TokioScheduler;
pub use state::{Domain, RawValue, SourceState};
pub use store::MemoryStateStore;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// One-shot callback run by the scheduler or start signal.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Callback invoked with the identifier of a source whose state changed.
pub type ChangeCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Idempotent cancellation token.
///
/// Cancelling twice, or cancelling after the guarded work already ran, is a
/// no-op.
pub struct CancelToken {
    cancel: Mutex<Option<Callback>>,
}

impl CancelToken {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A token with nothing to cancel.
    pub fn noop() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    pub fn cancel(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("armed", &self.cancel.lock().is_some())
            .finish()
    }
}

/// Unsubscribe token returned by [`StateEvents::subscribe`].
pub type Subscription = CancelToken;

/// Cancel token returned by [`Scheduler::after`].
pub type TaskHandle = CancelToken;

/// Read-only view of the externally owned source states.
pub trait StateStore: Send + Sync {
    fn get(&self, entity_id: &str) -> Option<SourceState>;
}

/// State change notifications.
pub trait StateEvents: Send + Sync {
    /// Invoke `callback` for every state change of one of `entity_ids`.
    ///
    /// Implementations must not invoke the callback from inside `subscribe`.
    fn subscribe(&self, entity_ids: &[String], callback: ChangeCallback) -> Subscription;
}

/// Delayed-call scheduler.
pub trait Scheduler: Send + Sync {
    /// Run `callback` once after `delay`.
    ///
    /// Implementations must not invoke the callback from inside `after`, even
    /// for a zero delay.
    fn after(&self, delay: Duration, callback: Callback) -> TaskHandle;
}

/// Auxiliary values published next to the felt temperature.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SensorAttributes {
    pub temperature_source: Option<String>,
    pub temperature_source_value: Option<f64>,
    pub humidity_source: Option<String>,
    pub humidity_source_value: Option<f64>,
    pub wind_speed_source: Option<String>,
    pub wind_speed_source_value: Option<f64>,
}

/// A completed update pass, ready to be written to the published entity.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SensorUpdate {
    pub unique_id: String,
    pub name: String,
    /// Felt temperature in °C, or `None` while sources are missing.
    pub value: Option<f64>,
    pub attributes: SensorAttributes,
    pub last_updated: DateTime<Utc>,
}

/// Sink for the published sensor entity.
///
/// `publish` is called while the sensor holds its state lock and must not
/// call back into the sensor.
pub trait Publisher: Send + Sync {
    /// Announce a new sensor entity. Called once when a sensor attaches.
    fn announce(&self, _unique_id: &str, _name: &str) {}

    /// Write the value and attributes of a completed update pass.
    fn publish(&self, update: &SensorUpdate);

    /// Withdraw a sensor entity. Called once when a sensor detaches.
    fn retract(&self, _unique_id: &str) {}
}

/// Everything a sensor needs from its host.
#[derive(Clone)]
pub struct HostContext {
    pub store: Arc<dyn StateStore>,
    pub events: Arc<dyn StateEvents>,
    pub scheduler: Arc<dyn Scheduler>,
    pub started: StartSignal,
}

impl HostContext {
    pub fn new(
        store: Arc<dyn StateStore>,
        events: Arc<dyn StateEvents>,
        scheduler: Arc<dyn Scheduler>,
        started: StartSignal,
    ) -> Self {
        Self {
            store,
            events,
            scheduler,
            started,
        }
    }

    /// Host backed by an in-memory store, which serves as both the state
    /// store and the change event source.
    pub fn with_memory_store(
        store: Arc<MemoryStateStore>,
        scheduler: Arc<dyn Scheduler>,
        started: StartSignal,
    ) -> Self {
        Self::new(store.clone(), store, scheduler, started)
    }
}
