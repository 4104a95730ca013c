//! MQTT client wrapper for statestream input and sensor output.

use crate::config::MqttConfig;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use std::time::Duration;
use tokio::sync::mpsc;

/// Requests buffered between the client handles and the event loop.
pub(crate) const REQUEST_CAPACITY: usize = 100;

/// Message received from MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
}

/// Events forwarded from the MQTT event loop.
#[derive(Debug, Clone)]
pub enum MqttEvent {
    /// Connection (re-)established. Subscriptions must be renewed.
    Connected,
    Message(MqttMessage),
}

/// MQTT client for the broker shared with Home Assistant.
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl MqttClient {
    /// Create a new MQTT client from configuration.
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        // Set credentials if provided
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        Self { client, event_loop }
    }

    /// Run the MQTT event loop and forward events to the provided channel.
    ///
    /// Runs until the channel is closed, reconnecting after errors.
    pub async fn run(mut self, tx: mpsc::Sender<MqttEvent>) {
        info!("Starting MQTT event loop");

        loop {
            let event = match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("[MQTT] Connected to broker");
                    MqttEvent::Connected
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = match String::from_utf8(publish.payload.to_vec()) {
                        Ok(s) => s,
                        Err(e) => {
                            warn!("Invalid UTF-8 in MQTT payload: {}", e);
                            continue;
                        }
                    };
                    debug!("Received MQTT message on {}: {}", publish.topic, payload);
                    MqttEvent::Message(MqttMessage {
                        topic: publish.topic,
                        payload,
                    })
                }
                Ok(_) => continue,
                Err(e) => {
                    error!("MQTT connection error: {:?}", e);
                    // Wait before reconnecting
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            if tx.send(event).await.is_err() {
                error!("MQTT event channel closed");
                break;
            }
        }
    }

    /// Get a clone of the async client for publishing from other tasks.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }
}
