//! Reading extraction.
//!
//! Each role reads a different attribute depending on the source's domain.
//! Values come back normalised: °C for temperature, % for humidity and m/s
//! for wind speed.

use super::classifier::{Role, RoleAssignment};
use crate::error::Result;
use crate::host::StateStore;
use crate::host::state::{
    ATTR_CURRENT_HUMIDITY, ATTR_CURRENT_TEMPERATURE, ATTR_WEATHER_HUMIDITY,
    ATTR_WEATHER_TEMPERATURE, ATTR_WEATHER_TEMPERATURE_UNIT, ATTR_WEATHER_WIND_SPEED,
    ATTR_WEATHER_WIND_SPEED_UNIT, Domain, RawValue, SourceState,
};
use crate::units::{self, CELSIUS, METERS_PER_SECOND, PERCENTAGE};
use log::error;

/// A normalised reading for one role.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    pub role: Role,
    pub value: f64,
    pub unit: &'static str,
}

/// What a source currently reports for a role, before conversion.
#[derive(Clone, Debug, PartialEq)]
enum Probe {
    Present {
        value: String,
        unit: Option<String>,
        domain: Domain,
    },
    Absent,
}

fn probe(state: &SourceState, role: Role) -> Probe {
    let domain = state.domain();
    let (raw, unit) = match (&domain, role) {
        (Domain::Weather, Role::Temperature) => (
            state.attribute(ATTR_WEATHER_TEMPERATURE),
            state.attribute_str(ATTR_WEATHER_TEMPERATURE_UNIT),
        ),
        (Domain::Weather, Role::Humidity) => (state.attribute(ATTR_WEATHER_HUMIDITY), None),
        (Domain::Weather, Role::Wind) => (
            state.attribute(ATTR_WEATHER_WIND_SPEED),
            state.attribute_str(ATTR_WEATHER_WIND_SPEED_UNIT),
        ),
        // Climate entities rarely declare a unit; assume Celsius
        (Domain::Climate, Role::Temperature) => (
            state.attribute(ATTR_CURRENT_TEMPERATURE),
            Some(
                state
                    .attribute_str(ATTR_WEATHER_TEMPERATURE_UNIT)
                    .unwrap_or(CELSIUS),
            ),
        ),
        (Domain::Climate, Role::Humidity) => (state.attribute(ATTR_CURRENT_HUMIDITY), None),
        _ => (state.value(), state.unit()),
    };

    match raw {
        RawValue::Present(value) => Probe::Present {
            value,
            unit: unit.map(str::to_string),
            domain,
        },
        RawValue::Absent => Probe::Absent,
    }
}

fn convert(role: Role, value: &str, unit: Option<&str>) -> Result<Reading> {
    let reading = match role {
        Role::Temperature => Reading {
            role,
            value: units::convert_temperature(value, unit)?,
            unit: CELSIUS,
        },
        Role::Humidity => Reading {
            role,
            value: units::parse_number(value, PERCENTAGE)?,
            unit: PERCENTAGE,
        },
        Role::Wind => Reading {
            role,
            value: units::convert_speed(value, unit)?,
            unit: METERS_PER_SECOND,
        },
    };
    Ok(reading)
}

/// Read one role from the source assigned to it.
///
/// `None` when the source has no state, reports an empty value, or the
/// value cannot be converted. Conversion failures are logged.
pub fn read(role: Role, entity_id: &str, store: &dyn StateStore) -> Option<Reading> {
    let state = store.get(entity_id)?;
    let Probe::Present {
        value,
        unit,
        domain,
    } = probe(&state, role)
    else {
        return None;
    };

    match convert(role, &value, unit.as_deref()) {
        Ok(reading) => Some(reading),
        Err(e) => {
            error!(
                "Could not read {} from {} ({} domain): {}",
                role,
                entity_id,
                domain.as_ref(),
                e
            );
            None
        }
    }
}

/// Latest readings for all three roles.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Readings {
    pub temperature: Option<Reading>,
    pub humidity: Option<Reading>,
    pub wind: Option<Reading>,
}

impl Readings {
    /// Read every assigned role. Without a wind source, wind reads as calm.
    pub fn read(roles: &RoleAssignment, store: &dyn StateStore) -> Self {
        let temperature = roles
            .temperature
            .as_deref()
            .and_then(|id| read(Role::Temperature, id, store));
        let humidity = roles
            .humidity
            .as_deref()
            .and_then(|id| read(Role::Humidity, id, store));
        let wind = match roles.wind.as_deref() {
            Some(id) => read(Role::Wind, id, store),
            None => Some(Reading {
                role: Role::Wind,
                value: 0.0,
                unit: METERS_PER_SECOND,
            }),
        };

        Self {
            temperature,
            humidity,
            wind,
        }
    }
}
