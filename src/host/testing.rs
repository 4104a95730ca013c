//! Deterministic host doubles for state machine tests.

use super::{Callback, CancelToken, Publisher, Scheduler, SensorUpdate, TaskHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

struct ScheduledCall {
    due: Duration,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    callback: Callback,
}

#[derive(Default)]
struct Clock {
    now: Duration,
    seq: u64,
    calls: Vec<ScheduledCall>,
}

/// Scheduler driven by a manual clock. Nothing runs until [`advance`] is
/// called.
///
/// [`advance`]: ManualScheduler::advance
#[derive(Default)]
pub struct ManualScheduler {
    clock: Mutex<Clock>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of scheduled calls that have neither run nor been cancelled.
    pub fn pending(&self) -> usize {
        self.clock
            .lock()
            .calls
            .iter()
            .filter(|call| !call.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Move the clock forward, running every call that falls due on the way
    /// in due order.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.lock().now + by;
        loop {
            let next = {
                let mut clock = self.clock.lock();
                clock.calls.retain(|call| !call.cancelled.load(Ordering::SeqCst));
                let index = clock
                    .calls
                    .iter()
                    .enumerate()
                    .filter(|(_, call)| call.due <= target)
                    .min_by_key(|(_, call)| (call.due, call.seq))
                    .map(|(index, _)| index);
                index.map(|index| {
                    let call = clock.calls.remove(index);
                    clock.now = call.due;
                    call
                })
            };

            match next {
                Some(call) => {
                    call.cancelled.store(true, Ordering::SeqCst);
                    (call.callback)();
                }
                None => break,
            }
        }
        self.clock.lock().now = target;
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, callback: Callback) -> TaskHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut clock = self.clock.lock();
        let due = clock.now + delay;
        let seq = clock.seq;
        clock.seq += 1;
        clock.calls.push(ScheduledCall {
            due,
            seq,
            cancelled: cancelled.clone(),
            callback,
        });
        CancelToken::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}

/// Scheduler whose cancel tokens do nothing.
///
/// Every call stays queued until [`run_next`] runs it, cancelled or not,
/// like a host timer that fired just before it was cancelled.
///
/// [`run_next`]: UncancellableScheduler::run_next
#[derive(Default)]
pub struct UncancellableScheduler {
    calls: Mutex<Vec<Callback>>,
}

impl UncancellableScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        self.calls.lock().len()
    }

    /// Run the oldest queued call. Returns false when nothing is queued.
    pub fn run_next(&self) -> bool {
        let next = {
            let mut calls = self.calls.lock();
            if calls.is_empty() {
                None
            } else {
                Some(calls.remove(0))
            }
        };
        match next {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

impl Scheduler for UncancellableScheduler {
    fn after(&self, _delay: Duration, callback: Callback) -> TaskHandle {
        self.calls.lock().push(callback);
        CancelToken::noop()
    }
}

/// Publisher that remembers everything written to it.
#[derive(Default)]
pub struct RecordingPublisher {
    announced: Mutex<Vec<String>>,
    updates: Mutex<Vec<SensorUpdate>>,
    retracted: Mutex<Vec<String>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn updates(&self) -> Vec<SensorUpdate> {
        self.updates.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn last(&self) -> Option<SensorUpdate> {
        self.updates.lock().last().cloned()
    }

    pub fn announced(&self) -> Vec<String> {
        self.announced.lock().clone()
    }

    pub fn retracted(&self) -> Vec<String> {
        self.retracted.lock().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn announce(&self, unique_id: &str, _name: &str) {
        self.announced.lock().push(unique_id.to_string());
    }

    fn publish(&self, update: &SensorUpdate) {
        self.updates.lock().push(update.clone());
    }

    fn retract(&self, unique_id: &str) {
        self.retracted.lock().push(unique_id.to_string());
    }
}
