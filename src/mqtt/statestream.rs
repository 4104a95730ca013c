//! Home Assistant `mqtt_statestream` ingestion.
//!
//! Topic layout under the configured base topic:
//!
//! - `<base>/<domain>/<object_id>/state` carries the raw state
//! - `<base>/<domain>/<object_id>/<attribute>` carries one JSON encoded attribute
//!
//! Timestamp topics (`last_changed`, `last_updated`) are ignored.

use crate::host::MemoryStateStore;
use log::trace;
use serde_json::Value;

const IGNORED_FIELDS: &[&str] = &["last_changed", "last_updated"];

/// What a statestream topic addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatestreamField {
    State,
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatestreamTopic {
    pub entity_id: String,
    pub field: StatestreamField,
}

/// Wildcard subscription covering the whole statestream tree.
pub fn subscription_topic(base: &str) -> String {
    format!("{}/#", base.trim_end_matches('/'))
}

/// Parse a topic under `base`. `None` for anything outside the layout.
pub fn parse_topic(base: &str, topic: &str) -> Option<StatestreamTopic> {
    let rest = topic
        .strip_prefix(base.trim_end_matches('/'))?
        .strip_prefix('/')?;
    let mut parts = rest.split('/');
    let (domain, object_id, field) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || domain.is_empty() || object_id.is_empty() || field.is_empty() {
        return None;
    }

    let field = match field {
        "state" => StatestreamField::State,
        other => StatestreamField::Attribute(other.to_string()),
    };
    Some(StatestreamTopic {
        entity_id: format!("{}.{}", domain, object_id),
        field,
    })
}

/// Apply one statestream message to the store. Returns true if the store
/// changed.
pub fn apply(store: &MemoryStateStore, base: &str, topic: &str, payload: &str) -> bool {
    let Some(parsed) = parse_topic(base, topic) else {
        trace!("Ignoring non-statestream topic {}", topic);
        return false;
    };

    match parsed.field {
        StatestreamField::State => store.set_state(&parsed.entity_id, payload),
        StatestreamField::Attribute(name) if IGNORED_FIELDS.contains(&name.as_str()) => false,
        StatestreamField::Attribute(name) => {
            // Attributes are JSON encoded; fall back to the raw text
            let value = serde_json::from_str(payload)
                .unwrap_or_else(|_| Value::String(payload.to_string()));
            store.set_attribute(&parsed.entity_id, &name, value)
        }
    }
}
