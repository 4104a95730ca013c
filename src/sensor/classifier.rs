//! Source classification.
//!
//! Maps arbitrary source identifiers onto the temperature, humidity and wind
//! roles. A pass only fills roles that are still empty, so re-running it
//! after sources come back never moves an assigned role to another source.

use crate::host::state::{Domain, SourceState};
use crate::host::StateStore;
use crate::units::{PERCENTAGE, SpeedUnit, TemperatureUnit};
use log::debug;
use serde::Serialize;
use std::fmt;

const DEVICE_CLASS_TEMPERATURE: &str = "temperature";
const DEVICE_CLASS_HUMIDITY: &str = "humidity";

/// Input role a source can fill.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Temperature,
    Humidity,
    Wind,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Temperature => "temperature",
            Role::Humidity => "humidity",
            Role::Wind => "wind",
        };
        f.write_str(name)
    }
}

/// Roles a single source state can provide, in rule order.
pub fn roles_for(state: &SourceState) -> &'static [Role] {
    match state.domain() {
        Domain::Weather => &[Role::Temperature, Role::Humidity, Role::Wind],
        Domain::Climate => &[Role::Temperature, Role::Humidity],
        _ => {
            let id = state.entity_id.as_str();
            let device_class = state.device_class();
            let unit = state.unit();

            if device_class == Some(DEVICE_CLASS_TEMPERATURE)
                || unit.is_some_and(TemperatureUnit::is_temperature)
                || id.contains("temperature")
            {
                &[Role::Temperature]
            } else if device_class == Some(DEVICE_CLASS_HUMIDITY)
                || unit == Some(PERCENTAGE)
                || id.contains("humidity")
            {
                &[Role::Humidity]
            } else if unit.is_some_and(SpeedUnit::is_speed) || id.contains("wind") {
                &[Role::Wind]
            } else {
                &[]
            }
        }
    }
}

/// Which source is responsible for each role.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RoleAssignment {
    pub temperature: Option<String>,
    pub humidity: Option<String>,
    pub wind: Option<String>,
}

impl RoleAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: Role) -> Option<&str> {
        self.slot(role).as_deref()
    }

    /// True when both mandatory roles are filled.
    pub fn has_required(&self) -> bool {
        self.temperature.is_some() && self.humidity.is_some()
    }

    fn slot(&self, role: Role) -> &Option<String> {
        match role {
            Role::Temperature => &self.temperature,
            Role::Humidity => &self.humidity,
            Role::Wind => &self.wind,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<String> {
        match role {
            Role::Temperature => &mut self.temperature,
            Role::Humidity => &mut self.humidity,
            Role::Wind => &mut self.wind,
        }
    }

    /// Fill every still-empty role from `sources`, first match wins.
    ///
    /// Returns every distinct identifier in `sources`, in order, whether or
    /// not it matched a role or currently has a state. These are the sources
    /// to watch for changes.
    pub fn classify(&mut self, sources: &[String], store: &dyn StateStore) -> Vec<String> {
        let mut watched: Vec<String> = Vec::with_capacity(sources.len());

        for entity_id in sources {
            if watched.contains(entity_id) {
                continue;
            }
            watched.push(entity_id.clone());

            let Some(state) = store.get(entity_id) else {
                debug!("Source {} has no state yet", entity_id);
                continue;
            };

            for &role in roles_for(&state) {
                let slot = self.slot_mut(role);
                if slot.is_none() {
                    debug!("Using {} as {} source", entity_id, role);
                    *slot = Some(entity_id.clone());
                }
            }
        }

        watched
    }
}
