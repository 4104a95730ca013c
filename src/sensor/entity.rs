//! Felt temperature sensor entity.
//!
//! Owns the role assignment and the update state machine:
//!
//! ```text
//! Idle -> AwaitingHostStart -> InitialDelay -> Ready
//!                                   (any attached phase) -> Detached
//! ```
//!
//! A retry may be pending in any attached phase. Update passes are not
//! serialised; each one re-reads every source, so overlapping passes are
//! harmless and the last published value wins.

use super::classifier::RoleAssignment;
use super::formula::{felt_temperature, round_half_up};
use super::reading::Readings;
use crate::host::{
    CancelToken, HostContext, Publisher, SensorAttributes, SensorUpdate, Subscription, TaskHandle,
};
use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Settle time after host start before the first update pass.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(10);

/// Delay before retrying a pass that found no temperature or humidity.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Decimal places of the published value.
pub const DISPLAY_PRECISION: usize = 1;

/// Lifecycle phase of a sensor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Created, not attached yet.
    Idle,
    /// Attached, waiting for the host started signal.
    AwaitingHostStart,
    /// Host started, waiting for the settle delay to pass.
    InitialDelay,
    /// First scheduled update has run.
    Ready,
    /// Detached; no further updates happen.
    Detached,
}

/// Construction parameters of a [`FeltTemperatureSensor`].
#[derive(Clone, Debug)]
pub struct SensorOptions {
    pub unique_id: String,
    pub name: String,
    pub sources: Vec<String>,
    pub startup_delay: Duration,
    pub retry_delay: Duration,
}

impl SensorOptions {
    pub fn new(unique_id: impl Into<String>, name: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            name: name.into(),
            sources,
            startup_delay: DEFAULT_STARTUP_DELAY,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_delays(mut self, startup_delay: Duration, retry_delay: Duration) -> Self {
        self.startup_delay = startup_delay;
        self.retry_delay = retry_delay;
        self
    }
}

struct PendingRetry {
    generation: u64,
    handle: TaskHandle,
}

struct SensorState {
    phase: Phase,
    roles: RoleAssignment,
    watched: Vec<String>,
    subscription: Option<Subscription>,
    start_listener: Option<CancelToken>,
    startup_task: Option<TaskHandle>,
    retry: Option<PendingRetry>,
    retry_generation: u64,
    value: Option<f64>,
    attributes: SensorAttributes,
}

/// Sensor publishing a felt temperature derived from its sources.
pub struct FeltTemperatureSensor {
    options: SensorOptions,
    host: HostContext,
    publisher: Arc<dyn Publisher>,
    state: Mutex<SensorState>,
}

impl FeltTemperatureSensor {
    pub fn new(
        options: SensorOptions,
        host: HostContext,
        publisher: Arc<dyn Publisher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            options,
            host,
            publisher,
            state: Mutex::new(SensorState {
                phase: Phase::Idle,
                roles: RoleAssignment::default(),
                watched: Vec::new(),
                subscription: None,
                start_listener: None,
                startup_task: None,
                retry: None,
                retry_generation: 0,
                value: None,
                attributes: SensorAttributes::default(),
            }),
        })
    }

    pub fn unique_id(&self) -> &str {
        &self.options.unique_id
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn sources(&self) -> &[String] {
        &self.options.sources
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Last published felt temperature.
    pub fn value(&self) -> Option<f64> {
        self.state.lock().value
    }

    pub fn attributes(&self) -> SensorAttributes {
        self.state.lock().attributes.clone()
    }

    pub fn roles(&self) -> RoleAssignment {
        self.state.lock().roles.clone()
    }

    /// Sources subscribed to for change notifications.
    pub fn watched(&self) -> Vec<String> {
        self.state.lock().watched.clone()
    }

    pub fn retry_pending(&self) -> bool {
        self.state.lock().retry.is_some()
    }

    /// Classify the sources, start watching them and wait for the host.
    pub fn attach(self: &Arc<Self>) {
        let watched = {
            let mut state = self.state.lock();
            if state.phase != Phase::Idle {
                warn!("{} is already attached", self.options.unique_id);
                return;
            }
            let watched = state
                .roles
                .classify(&self.options.sources, self.host.store.as_ref());
            if !state.roles.has_required() {
                info!(
                    "{}: no temperature or humidity source yet, waiting for sources to appear",
                    self.options.name
                );
            }
            state.watched = watched.clone();
            state.phase = Phase::AwaitingHostStart;
            watched
        };

        self.publisher
            .announce(&self.options.unique_id, &self.options.name);

        let weak = Arc::downgrade(self);
        let subscription = self.host.events.subscribe(
            &watched,
            Arc::new(move |entity_id: &str| {
                if let Some(sensor) = weak.upgrade() {
                    sensor.on_source_changed(entity_id);
                }
            }),
        );
        self.state.lock().subscription = Some(subscription);

        // Runs inline when the host has already started
        let weak = Arc::downgrade(self);
        let listener = self.host.started.listen_once(Box::new(move || {
            if let Some(sensor) = weak.upgrade() {
                sensor.on_host_started();
            }
        }));

        let mut state = self.state.lock();
        if state.phase == Phase::AwaitingHostStart {
            state.start_listener = Some(listener);
        }
        info!(
            "Attached {} watching {} source(s)",
            self.options.unique_id,
            watched.len()
        );
    }

    /// Stop watching sources and cancel everything still scheduled.
    pub fn detach(&self) {
        let (subscription, listener, startup_task, retry) = {
            let mut state = self.state.lock();
            if state.phase == Phase::Detached {
                return;
            }
            state.phase = Phase::Detached;
            (
                state.subscription.take(),
                state.start_listener.take(),
                state.startup_task.take(),
                state.retry.take(),
            )
        };

        if let Some(subscription) = subscription {
            subscription.cancel();
        }
        if let Some(listener) = listener {
            listener.cancel();
        }
        if let Some(task) = startup_task {
            task.cancel();
        }
        if let Some(retry) = retry {
            retry.handle.cancel();
        }
        self.publisher.retract(&self.options.unique_id);
        info!("Detached {}", self.options.unique_id);
    }

    fn on_host_started(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.phase != Phase::AwaitingHostStart {
            return;
        }
        state.phase = Phase::InitialDelay;
        state.start_listener = None;

        debug!(
            "Host started, first update of {} in {:?}",
            self.options.unique_id, self.options.startup_delay
        );
        let weak = Arc::downgrade(self);
        state.startup_task = Some(self.host.scheduler.after(
            self.options.startup_delay,
            Box::new(move || {
                if let Some(sensor) = weak.upgrade() {
                    sensor.on_startup_delay_elapsed();
                }
            }),
        ));
    }

    fn on_startup_delay_elapsed(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.phase != Phase::InitialDelay {
                return;
            }
            state.phase = Phase::Ready;
            state.startup_task = None;
        }
        self.update();
    }

    fn on_source_changed(self: &Arc<Self>, entity_id: &str) {
        let retry = {
            let mut state = self.state.lock();
            if matches!(state.phase, Phase::Idle | Phase::Detached) {
                return;
            }
            state.retry.take()
        };
        if let Some(retry) = retry {
            retry.handle.cancel();
        }
        debug!("{} changed, updating {}", entity_id, self.options.unique_id);
        self.update();
    }

    fn on_retry(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.phase == Phase::Detached {
                return;
            }
            // A cancelled or superseded retry may still fire; ignore it
            if state.retry.as_ref().map(|pending| pending.generation) != Some(generation) {
                return;
            }
            state.retry = None;
        }
        debug!("Retrying update of {}", self.options.unique_id);
        self.update();
    }

    /// Run one update pass: read, compute and publish.
    ///
    /// The value is published with the state still locked, so overlapping
    /// passes publish in the order they wrote `value` and nothing is
    /// published once [`detach`](Self::detach) has run.
    pub fn update(self: &Arc<Self>) {
        let store = self.host.store.as_ref();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.phase == Phase::Detached {
                return;
            }

            let mut readings = Readings::read(&state.roles, store);
            if readings.temperature.is_none()
                || readings.humidity.is_none()
                || (readings.wind.is_none() && state.roles.wind.is_some())
            {
                // Sources may only just have become available
                state.watched = state.roles.classify(&self.options.sources, store);
                readings = Readings::read(&state.roles, store);
            }

            state.attributes = SensorAttributes {
                temperature_source: state.roles.temperature.clone(),
                temperature_source_value: readings.temperature.map(|r| r.value),
                humidity_source: state.roles.humidity.clone(),
                humidity_source_value: readings.humidity.map(|r| r.value),
                wind_speed_source: state.roles.wind.clone(),
                wind_speed_source_value: readings.wind.map(|r| r.value),
            };

            match (readings.temperature, readings.humidity) {
                (Some(temperature), Some(humidity)) => {
                    let wind = match readings.wind {
                        Some(wind) => wind.value,
                        None => {
                            warn!(
                                "{}: could not read wind speed, ignoring wind",
                                self.options.unique_id
                            );
                            0.0
                        }
                    };
                    if let Some(retry) = state.retry.take() {
                        retry.handle.cancel();
                    }

                    let value = round_half_up(
                        felt_temperature(temperature.value, humidity.value, wind),
                        DISPLAY_PRECISION,
                    );
                    debug!(
                        "New felt temperature of {} is {} °C",
                        self.options.unique_id, value
                    );
                    state.value = Some(value);
                }
                _ => {
                    debug!(
                        "{}: sources not ready yet, temperature or humidity is missing",
                        self.options.unique_id
                    );
                    state.value = None;
                    if state.retry.is_none() {
                        self.schedule_retry(state);
                    }
                }
            }

            let update = SensorUpdate {
                unique_id: self.options.unique_id.clone(),
                name: self.options.name.clone(),
                value: state.value,
                attributes: state.attributes.clone(),
                last_updated: Utc::now(),
            };
            self.publisher.publish(&update);
        }
    }

    fn schedule_retry(self: &Arc<Self>, state: &mut SensorState) {
        state.retry_generation += 1;
        let generation = state.retry_generation;
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = self.host.scheduler.after(
            self.options.retry_delay,
            Box::new(move || {
                if let Some(sensor) = weak.upgrade() {
                    sensor.on_retry(generation);
                }
            }),
        );
        state.retry = Some(PendingRetry { generation, handle });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::state::{
        ATTR_UNIT_OF_MEASUREMENT, ATTR_WEATHER_HUMIDITY, ATTR_WEATHER_TEMPERATURE,
        ATTR_WEATHER_TEMPERATURE_UNIT, ATTR_WEATHER_WIND_SPEED, ATTR_WEATHER_WIND_SPEED_UNIT,
    };
    use crate::host::testing::{ManualScheduler, RecordingPublisher, UncancellableScheduler};
    use crate::host::{MemoryStateStore, SourceState, StartSignal};

    const STARTUP: Duration = Duration::from_secs(10);
    const RETRY: Duration = Duration::from_secs(60);

    struct Harness {
        store: Arc<MemoryStateStore>,
        scheduler: Arc<ManualScheduler>,
        started: StartSignal,
        publisher: Arc<RecordingPublisher>,
        sensor: Arc<FeltTemperatureSensor>,
    }

    fn harness(sources: &[&str]) -> Harness {
        let store = Arc::new(MemoryStateStore::new());
        let scheduler = ManualScheduler::new();
        let started = StartSignal::new();
        let publisher = RecordingPublisher::new();
        let host = HostContext::with_memory_store(store.clone(), scheduler.clone(), started.clone());
        let options = SensorOptions::new(
            "felt_1",
            "Felt Temperature",
            sources.iter().map(|s| s.to_string()).collect(),
        )
        .with_delays(STARTUP, RETRY);
        let sensor = FeltTemperatureSensor::new(options, host, publisher.clone());
        Harness {
            store,
            scheduler,
            started,
            publisher,
            sensor,
        }
    }

    fn celsius(id: &str, value: &str) -> SourceState {
        SourceState::new(id, value).with_attribute(ATTR_UNIT_OF_MEASUREMENT, "°C")
    }

    fn percent(id: &str, value: &str) -> SourceState {
        SourceState::new(id, value).with_attribute(ATTR_UNIT_OF_MEASUREMENT, "%")
    }

    fn speed(id: &str, value: &str) -> SourceState {
        SourceState::new(id, value).with_attribute(ATTR_UNIT_OF_MEASUREMENT, "m/s")
    }

    /// Attach, fire host start and wait out the settle delay.
    fn start(h: &Harness) {
        h.sensor.attach();
        h.started.fire();
        h.scheduler.advance(STARTUP);
    }

    #[test]
    fn test_superseded_retry_is_ignored() {
        let store = Arc::new(MemoryStateStore::new());
        let scheduler = UncancellableScheduler::new();
        let started = StartSignal::new();
        let publisher = RecordingPublisher::new();
        let host = HostContext::with_memory_store(store.clone(), scheduler.clone(), started.clone());
        let options = SensorOptions::new(
            "felt_1",
            "Felt Temperature",
            vec!["sensor.t".to_string(), "sensor.h".to_string()],
        )
        .with_delays(STARTUP, RETRY);
        let sensor = FeltTemperatureSensor::new(options, host, publisher.clone());

        store.set(celsius("sensor.t", "20"));
        store.set(percent("sensor.h", "unavailable"));
        sensor.attach();
        started.fire();

        // Settle delay elapses, humidity missing, first retry queued
        assert!(scheduler.run_next());
        assert_eq!(publisher.count(), 1);
        assert_eq!(scheduler.pending(), 1);

        // The notification cancels the first retry, but the cancel is lost
        store.set_state("sensor.t", "21");
        assert_eq!(publisher.count(), 2);
        assert_eq!(scheduler.pending(), 2);

        // The superseded retry fires and must do nothing
        assert!(scheduler.run_next());
        assert_eq!(publisher.count(), 2);
        assert!(sensor.retry_pending());

        // The current retry runs a pass and queues the next one
        assert!(scheduler.run_next());
        assert_eq!(publisher.count(), 3);
        assert!(sensor.retry_pending());
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_concurrent_passes_publish_last_value() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));
        start(&h);

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let h = &h;
                scope.spawn(move || {
                    for step in 0..50 {
                        let temperature = 10 + worker * 5 + step % 5;
                        h.store.set_state("sensor.t", &temperature.to_string());
                        h.sensor.update();
                    }
                });
            }
        });

        assert_eq!(h.publisher.last().unwrap().value, h.sensor.value());
    }

    #[test]
    fn test_no_publish_after_detach() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));
        start(&h);
        let published = h.publisher.count();

        h.sensor.detach();
        h.sensor.update();
        h.store.set_state("sensor.t", "25");
        assert_eq!(h.publisher.count(), published);
    }

    #[test]
    fn test_startup_sequence() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));

        assert_eq!(h.sensor.phase(), Phase::Idle);
        h.sensor.attach();
        assert_eq!(h.sensor.phase(), Phase::AwaitingHostStart);
        assert_eq!(h.publisher.announced(), vec!["felt_1"]);

        h.started.fire();
        assert_eq!(h.sensor.phase(), Phase::InitialDelay);
        assert_eq!(h.publisher.count(), 0);

        h.scheduler.advance(STARTUP - Duration::from_secs(1));
        assert_eq!(h.publisher.count(), 0);

        h.scheduler.advance(Duration::from_secs(1));
        assert_eq!(h.sensor.phase(), Phase::Ready);
        assert_eq!(h.publisher.count(), 1);
        assert_eq!(h.publisher.last().unwrap().value, Some(19.8));
    }

    #[test]
    fn test_attach_after_host_started() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));
        h.started.fire();

        h.sensor.attach();
        assert_eq!(h.sensor.phase(), Phase::InitialDelay);
        h.scheduler.advance(STARTUP);
        assert_eq!(h.sensor.value(), Some(19.8));
    }

    #[test]
    fn test_wind_defaults_to_calm_without_wind_source() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));
        start(&h);

        let update = h.publisher.last().unwrap();
        assert_eq!(update.value, Some(19.8));
        assert_eq!(update.attributes.wind_speed_source, None);
        assert_eq!(update.attributes.wind_speed_source_value, Some(0.0));
        assert!(!h.sensor.retry_pending());
    }

    #[test]
    fn test_publishes_metadata() {
        let h = harness(&["sensor.t", "sensor.h", "sensor.w"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));
        h.store.set(speed("sensor.w", "5"));
        start(&h);

        let update = h.publisher.last().unwrap();
        assert_eq!(update.value, Some(16.3));
        assert_eq!(update.unique_id, "felt_1");
        assert_eq!(update.attributes.temperature_source.as_deref(), Some("sensor.t"));
        assert_eq!(update.attributes.temperature_source_value, Some(20.0));
        assert_eq!(update.attributes.humidity_source.as_deref(), Some("sensor.h"));
        assert_eq!(update.attributes.humidity_source_value, Some(50.0));
        assert_eq!(update.attributes.wind_speed_source.as_deref(), Some("sensor.w"));
        assert_eq!(update.attributes.wind_speed_source_value, Some(5.0));
    }

    #[test]
    fn test_weather_source() {
        let h = harness(&["weather.home"]);
        h.store.set(
            SourceState::new("weather.home", "sunny")
                .with_attribute(ATTR_WEATHER_TEMPERATURE, 68.0)
                .with_attribute(ATTR_WEATHER_TEMPERATURE_UNIT, "°F")
                .with_attribute(ATTR_WEATHER_HUMIDITY, 50)
                .with_attribute(ATTR_WEATHER_WIND_SPEED, 18)
                .with_attribute(ATTR_WEATHER_WIND_SPEED_UNIT, "km/h"),
        );
        start(&h);

        // 68 °F = 20 °C, 18 km/h = 5 m/s
        assert_eq!(h.sensor.value(), Some(16.3));
        let roles = h.sensor.roles();
        assert_eq!(roles.temperature.as_deref(), Some("weather.home"));
        assert_eq!(roles.humidity.as_deref(), Some("weather.home"));
        assert_eq!(roles.wind.as_deref(), Some("weather.home"));
    }

    #[test]
    fn test_change_notification_triggers_update() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));
        start(&h);
        assert_eq!(h.publisher.count(), 1);

        h.store.set_state("sensor.t", "25");
        assert_eq!(h.publisher.count(), 2);
        let expected = round_half_up(felt_temperature(25.0, 50.0, 0.0), 1);
        assert_eq!(h.sensor.value(), Some(expected));

        // Unwatched sources never trigger a pass
        h.store.set_state("sensor.unrelated", "1");
        assert_eq!(h.publisher.count(), 2);
    }

    #[test]
    fn test_missing_humidity_schedules_single_retry() {
        let h = harness(&["sensor.t", "sensor.h", "sensor.w"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "unavailable"));
        h.store.set(speed("sensor.w", "2"));
        start(&h);

        let update = h.publisher.last().unwrap();
        assert_eq!(update.value, None);
        assert!(h.sensor.retry_pending());
        assert_eq!(h.scheduler.pending(), 1);

        // A notification before the retry fires must not stack a second retry
        h.store.set_state("sensor.t", "21");
        assert_eq!(h.publisher.last().unwrap().value, None);
        assert_eq!(h.scheduler.pending(), 1);
        h.store.set_state("sensor.w", "3");
        assert_eq!(h.scheduler.pending(), 1);

        // The retry fires, still nothing, and exactly one new retry is queued
        let published = h.publisher.count();
        h.scheduler.advance(RETRY);
        assert_eq!(h.publisher.count(), published + 1);
        assert_eq!(h.scheduler.pending(), 1);
    }

    #[test]
    fn test_retry_recovers_when_source_appears() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        start(&h);
        assert_eq!(h.sensor.value(), None);
        assert!(h.sensor.retry_pending());
        assert_eq!(h.sensor.roles().humidity, None);

        // Humidity comes up later; its change notification fills the role
        h.store.set(percent("sensor.h", "50"));
        assert_eq!(h.sensor.value(), Some(19.8));
        assert!(!h.sensor.retry_pending());
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.sensor.roles().humidity.as_deref(), Some("sensor.h"));
    }

    #[test]
    fn test_retry_reads_sources_again() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "unknown"));
        start(&h);
        assert_eq!(h.sensor.value(), None);

        // Without the change subscription only the retry can see the new value
        h.sensor.state.lock().subscription.take().unwrap().cancel();
        h.store.set_state("sensor.h", "50");
        assert_eq!(h.sensor.value(), None);

        h.scheduler.advance(RETRY);
        assert_eq!(h.sensor.value(), Some(19.8));
        assert!(!h.sensor.retry_pending());
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn test_successful_pass_cancels_pending_retry() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(percent("sensor.h", "50"));
        start(&h);
        assert!(h.sensor.retry_pending());

        h.store.set(celsius("sensor.t", "20"));
        assert!(!h.sensor.retry_pending());
        assert_eq!(h.scheduler.pending(), 0);

        let published = h.publisher.count();
        h.scheduler.advance(RETRY * 2);
        assert_eq!(h.publisher.count(), published);
    }

    #[test]
    fn test_unreadable_wind_degrades_to_calm() {
        let h = harness(&["sensor.t", "sensor.h", "sensor.w"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));
        h.store.set(speed("sensor.w", "gusty"));
        start(&h);

        assert_eq!(h.sensor.value(), Some(19.8));
        assert_eq!(h.sensor.attributes().wind_speed_source_value, None);
        assert!(!h.sensor.retry_pending());
    }

    #[test]
    fn test_conversion_failure_is_missing_data() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "not a number"));
        h.store.set(percent("sensor.h", "50"));
        start(&h);

        assert_eq!(h.sensor.value(), None);
        assert!(h.sensor.retry_pending());
    }

    #[test]
    fn test_no_sources_match() {
        let h = harness(&["sensor.pressure"]);
        h.store.set(SourceState::new("sensor.pressure", "1013"));
        start(&h);

        assert_eq!(h.sensor.phase(), Phase::Ready);
        assert_eq!(h.sensor.value(), None);
        assert_eq!(h.sensor.watched(), vec!["sensor.pressure"]);
        assert!(h.sensor.retry_pending());
    }

    #[test]
    fn test_notifications_before_ready_update() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.sensor.attach();

        h.store.set(percent("sensor.h", "50"));
        assert_eq!(h.sensor.phase(), Phase::AwaitingHostStart);
        assert_eq!(h.sensor.value(), Some(19.8));
    }

    #[test]
    fn test_detach_cancels_pending_retry() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        start(&h);
        assert!(h.sensor.retry_pending());
        let published = h.publisher.count();

        h.sensor.detach();
        h.sensor.detach();
        assert_eq!(h.sensor.phase(), Phase::Detached);
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.publisher.retracted(), vec!["felt_1"]);

        h.scheduler.advance(RETRY * 3);
        h.store.set(percent("sensor.h", "50"));
        assert_eq!(h.publisher.count(), published);
    }

    #[test]
    fn test_detach_before_host_start() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));
        h.sensor.attach();
        h.sensor.detach();

        h.started.fire();
        h.scheduler.advance(STARTUP * 2);
        assert_eq!(h.publisher.count(), 0);
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn test_detach_during_initial_delay() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));
        h.sensor.attach();
        h.started.fire();
        assert_eq!(h.scheduler.pending(), 1);

        h.sensor.detach();
        assert_eq!(h.scheduler.pending(), 0);
        h.scheduler.advance(STARTUP);
        assert_eq!(h.publisher.count(), 0);
    }

    #[test]
    fn test_attach_twice_is_ignored() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.sensor.attach();
        h.sensor.attach();
        assert_eq!(h.publisher.announced().len(), 1);
    }

    #[test]
    fn test_bursts_are_idempotent() {
        let h = harness(&["sensor.t", "sensor.h"]);
        h.store.set(celsius("sensor.t", "20"));
        h.store.set(percent("sensor.h", "50"));
        start(&h);

        for _ in 0..5 {
            h.sensor.update();
        }
        let values: Vec<Option<f64>> = h.publisher.updates().iter().map(|u| u.value).collect();
        assert_eq!(values.len(), 6);
        assert!(values.iter().all(|v| *v == Some(19.8)));
    }
}
