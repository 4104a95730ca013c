//! Typed access to loosely typed source states.
//!
//! A source state is a raw state string plus a bag of JSON attributes, the
//! same shape Home Assistant publishes. Every string-keyed lookup goes through
//! [`SourceState`] so the rest of the crate only sees typed values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, EnumString};

pub const ATTR_DEVICE_CLASS: &str = "device_class";
pub const ATTR_UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
pub const ATTR_ENTITY_ID: &str = "entity_id";

pub const ATTR_WEATHER_TEMPERATURE: &str = "temperature";
pub const ATTR_WEATHER_TEMPERATURE_UNIT: &str = "temperature_unit";
pub const ATTR_WEATHER_HUMIDITY: &str = "humidity";
pub const ATTR_WEATHER_WIND_SPEED: &str = "wind_speed";
pub const ATTR_WEATHER_WIND_SPEED_UNIT: &str = "wind_speed_unit";

pub const ATTR_CURRENT_TEMPERATURE: &str = "current_temperature";
pub const ATTR_CURRENT_HUMIDITY: &str = "current_humidity";

pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Entity domain, taken from the `domain.object_id` identifier.
#[derive(Clone, Debug, Eq, PartialEq, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
    Sensor,
    Climate,
    Weather,
    Group,
    #[strum(default)]
    Other(String),
}

impl Domain {
    /// Domain of an entity identifier. Identifiers without a dot have an
    /// empty `Other` domain.
    pub fn of(entity_id: &str) -> Self {
        let (domain, _) = split_entity_id(entity_id);
        domain.parse().unwrap_or_else(|_| Domain::Other(domain.to_string()))
    }
}

/// Split `domain.object_id` into its two halves.
pub fn split_entity_id(entity_id: &str) -> (&str, &str) {
    entity_id.split_once('.').unwrap_or(("", entity_id))
}

/// A raw reading with the "no value" states folded away.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Present(String),
    Absent,
}

impl RawValue {
    /// Interpret a raw state string.
    pub fn from_state(state: &str) -> Self {
        match state {
            "" | STATE_UNKNOWN | STATE_UNAVAILABLE | "None" => RawValue::Absent,
            other => RawValue::Present(other.to_string()),
        }
    }

    /// Interpret an optional JSON attribute value.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => RawValue::Absent,
            Some(Value::String(s)) => RawValue::from_state(s),
            Some(Value::Number(n)) => RawValue::Present(n.to_string()),
            Some(other) => RawValue::Present(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Present(s) => Some(s),
            RawValue::Absent => None,
        }
    }
}

/// Current externally owned state of one source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl SourceState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn domain(&self) -> Domain {
        Domain::of(&self.entity_id)
    }

    /// The raw state value.
    pub fn value(&self) -> RawValue {
        RawValue::from_state(&self.state)
    }

    pub fn attribute(&self, key: &str) -> RawValue {
        RawValue::from_json(self.attributes.get(key))
    }

    /// A string attribute, or `None` if missing or not a string.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn unit(&self) -> Option<&str> {
        self.attribute_str(ATTR_UNIT_OF_MEASUREMENT)
    }

    pub fn device_class(&self) -> Option<&str> {
        self.attribute_str(ATTR_DEVICE_CLASS)
    }

    /// Member identifiers of a group entity.
    pub fn members(&self) -> Vec<String> {
        self.attributes
            .get(ATTR_ENTITY_ID)
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
