//! Publishes felt temperature sensors to Home Assistant over MQTT.
//!
//! Each sensor gets a retained discovery config, a state topic and a JSON
//! attributes topic.

use crate::error::Result;
use crate::host::{Publisher, SensorUpdate};
use crate::sensor::entity::DISPLAY_PRECISION;
use crate::units::CELSIUS;
use log::{debug, warn};
use rumqttc::{AsyncClient, QoS};
use serde_json::json;

/// Root of the topics this crate publishes.
pub const TOPIC_ROOT: &str = "felt_temperature";

/// Payload Home Assistant reads as an unknown sensor value.
pub const PAYLOAD_NONE: &str = "None";

pub fn state_topic(unique_id: &str) -> String {
    format!("{}/{}/state", TOPIC_ROOT, unique_id)
}

pub fn attributes_topic(unique_id: &str) -> String {
    format!("{}/{}/attributes", TOPIC_ROOT, unique_id)
}

pub fn discovery_topic(discovery_prefix: &str, unique_id: &str) -> String {
    format!("{}/sensor/{}/config", discovery_prefix, unique_id)
}

/// Discovery config describing a felt temperature sensor.
pub fn discovery_payload(unique_id: &str, name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "unique_id": unique_id,
        "object_id": format!("felt_temperature_{}", unique_id),
        "state_topic": state_topic(unique_id),
        "json_attributes_topic": attributes_topic(unique_id),
        "unit_of_measurement": CELSIUS,
        "device_class": "temperature",
        "state_class": "measurement",
        "icon": "mdi:thermometer-lines",
        "suggested_display_precision": DISPLAY_PRECISION,
    })
}

/// State payload for a published value.
pub fn state_payload(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{:.*}", DISPLAY_PRECISION, value),
        None => PAYLOAD_NONE.to_string(),
    }
}

/// [`Publisher`] writing to an MQTT broker.
///
/// Uses the non-blocking `try_publish`, so it can be called from the
/// sensor's synchronous update pass.
pub struct MqttPublisher {
    client: AsyncClient,
    discovery_prefix: String,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, discovery_prefix: impl Into<String>) -> Self {
        Self {
            client,
            discovery_prefix: discovery_prefix.into(),
        }
    }

    fn send(&self, topic: String, retain: bool, payload: String) -> Result<()> {
        debug!("Publishing to {}: {}", topic, payload);
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)?;
        Ok(())
    }

    fn send_or_warn(&self, topic: String, retain: bool, payload: String) {
        if let Err(e) = self.send(topic.clone(), retain, payload) {
            warn!("[MQTT] Failed to publish to {}: {}", topic, e);
        }
    }
}

impl Publisher for MqttPublisher {
    fn announce(&self, unique_id: &str, name: &str) {
        self.send_or_warn(
            discovery_topic(&self.discovery_prefix, unique_id),
            true,
            discovery_payload(unique_id, name).to_string(),
        );
    }

    fn publish(&self, update: &SensorUpdate) {
        match serde_json::to_string(&update.attributes) {
            Ok(attributes) => {
                self.send_or_warn(attributes_topic(&update.unique_id), true, attributes)
            }
            Err(e) => warn!("Failed to encode attributes of {}: {}", update.unique_id, e),
        }
        self.send_or_warn(
            state_topic(&update.unique_id),
            true,
            state_payload(update.value),
        );
    }

    fn retract(&self, unique_id: &str) {
        // An empty retained config removes the entity from Home Assistant
        self.send_or_warn(
            discovery_topic(&self.discovery_prefix, unique_id),
            true,
            String::new(),
        );
    }
}
