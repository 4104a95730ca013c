//! Config entry lifecycle.
//!
//! Each config entry owns one felt temperature sensor. Reloading an entry
//! tears its sensor down and builds a fresh one, so classification and the
//! update state machine start over with the new sources.

use crate::config::SensorConfig;
use crate::error::{FeltError, Result};
use crate::host::state::Domain;
use crate::host::{HostContext, Publisher, StateStore};
use crate::sensor::{FeltTemperatureSensor, SensorOptions};
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Replace group entities by their members, recursively.
///
/// Order is kept and duplicates are dropped. A group without a state yet is
/// kept as is so it can still be watched.
pub fn expand_sources(store: &dyn StateStore, sources: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    let mut visited = Vec::new();
    for source in sources {
        expand_into(store, source, &mut expanded, &mut visited);
    }
    expanded
}

fn expand_into(
    store: &dyn StateStore,
    entity_id: &str,
    expanded: &mut Vec<String>,
    visited: &mut Vec<String>,
) {
    if Domain::of(entity_id) == Domain::Group {
        if visited.iter().any(|v| v == entity_id) {
            return;
        }
        visited.push(entity_id.to_string());

        if let Some(group) = store.get(entity_id) {
            for member in group.members() {
                expand_into(store, &member, expanded, visited);
            }
            return;
        }
        warn!("Group {} has no state, watching it directly", entity_id);
    }

    if !expanded.iter().any(|e| e == entity_id) {
        expanded.push(entity_id.to_string());
    }
}

/// Manages the sensors of all config entries.
pub struct Integration {
    host: HostContext,
    publisher: Arc<dyn Publisher>,
    entries: Mutex<HashMap<String, Arc<FeltTemperatureSensor>>>,
}

impl Integration {
    pub fn new(host: HostContext, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            host,
            publisher,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create and attach a sensor for a new config entry under a fresh id.
    /// Returns the id.
    pub fn setup_entry(&self, config: &SensorConfig) -> Result<String> {
        let entry_id = Uuid::new_v4().simple().to_string();
        self.setup_entry_with_id(&entry_id, config)?;
        Ok(entry_id)
    }

    /// Create and attach a sensor under a given id, replacing any sensor
    /// already registered under it.
    pub fn setup_entry_with_id(&self, entry_id: &str, config: &SensorConfig) -> Result<()> {
        config.validate()?;

        let sources = expand_sources(self.host.store.as_ref(), &config.sources);
        let options = SensorOptions::new(entry_id, config.name.clone(), sources)
            .with_delays(config.startup_delay(), config.retry_delay());
        let sensor = FeltTemperatureSensor::new(options, self.host.clone(), self.publisher.clone());

        if let Some(previous) = self
            .entries
            .lock()
            .insert(entry_id.to_string(), sensor.clone())
        {
            previous.detach();
        }
        sensor.attach();

        info!("Set up entry {} ({})", entry_id, config.name);
        Ok(())
    }

    /// Detach and forget the sensor of an entry.
    pub fn unload_entry(&self, entry_id: &str) -> Result<()> {
        let sensor = self
            .entries
            .lock()
            .remove(entry_id)
            .ok_or_else(|| FeltError::UnknownEntry(entry_id.to_string()))?;
        sensor.detach();
        info!("Unloaded entry {}", entry_id);
        Ok(())
    }

    /// Rebuild an entry from a new configuration, keeping its id.
    ///
    /// An invalid configuration leaves the running sensor untouched.
    pub fn reload_entry(&self, entry_id: &str, config: &SensorConfig) -> Result<()> {
        config.validate()?;
        self.unload_entry(entry_id)?;
        self.setup_entry_with_id(entry_id, config)
    }

    pub fn unload_all(&self) {
        let sensors: Vec<_> = self.entries.lock().drain().collect();
        for (entry_id, sensor) in sensors {
            sensor.detach();
            info!("Unloaded entry {}", entry_id);
        }
    }

    pub fn entry(&self, entry_id: &str) -> Option<Arc<FeltTemperatureSensor>> {
        self.entries.lock().get(entry_id).cloned()
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}
