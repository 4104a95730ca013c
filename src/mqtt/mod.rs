//! MQTT transport for the standalone runtime.
//!
//! Source states arrive through Home Assistant's `mqtt_statestream` topic
//! tree and felt temperature sensors are published back with MQTT discovery.

mod client;
pub mod publisher;
pub mod statestream;

pub use client::{MqttClient, MqttEvent, MqttMessage};
pub use publisher::MqttPublisher;

use crate::config::MqttConfig;
use crate::error::Result;
use crate::host::{MemoryStateStore, StartSignal};
use log::{info, warn};
use rumqttc::{AsyncClient, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time given to retained statestream messages to arrive after the first
/// connection before the host counts as started.
pub const RETAINED_SETTLE: Duration = Duration::from_millis(500);

/// Feeds the statestream into the state store and fires the start signal
/// once connected.
pub struct StatestreamBridge {
    config: MqttConfig,
    store: Arc<MemoryStateStore>,
    started: StartSignal,
}

impl StatestreamBridge {
    pub fn new(config: MqttConfig, store: Arc<MemoryStateStore>, started: StartSignal) -> Self {
        Self {
            config,
            store,
            started,
        }
    }

    /// Start the bridge.
    ///
    /// Spawns a background task that drives the MQTT event loop, subscribes
    /// to the statestream on every (re-)connect and applies incoming
    /// messages. The task ends when `shutdown` is cancelled.
    pub fn start(self, mqtt_client: MqttClient, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(mqtt_client, shutdown).await;
        })
    }

    async fn run(self, mqtt_client: MqttClient, shutdown: CancellationToken) {
        info!(
            "[MQTT] Connecting to {}:{}",
            self.config.broker_host, self.config.broker_port
        );

        let subscribe_client = mqtt_client.client();
        let (event_tx, mut event_rx) = mpsc::channel::<MqttEvent>(256);
        let mqtt_loop = tokio::spawn(async move {
            mqtt_client.run(event_tx).await;
        });

        let base = self.config.statestream_base_topic.clone();
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = event_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                MqttEvent::Connected => {
                    if let Err(e) = subscribe(&subscribe_client, &base).await {
                        warn!("[MQTT] Failed to subscribe to statestream: {}", e);
                    }
                    if !self.started.is_started() {
                        let started = self.started.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(RETAINED_SETTLE).await;
                            info!("[MQTT] Statestream ready, host started");
                            started.fire();
                        });
                    }
                }
                MqttEvent::Message(msg) => {
                    statestream::apply(&self.store, &base, &msg.topic, &msg.payload);
                }
            }
        }

        mqtt_loop.abort();
        info!("[MQTT] Statestream bridge stopped");
    }
}

async fn subscribe(client: &AsyncClient, base: &str) -> Result<()> {
    let topic = statestream::subscription_topic(base);
    info!("Subscribing to MQTT topic: {}", topic);
    client.subscribe(topic, QoS::AtMostOnce).await?;
    Ok(())
}
