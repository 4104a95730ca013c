use clap::Parser;
use felt_temperature::config::{self, Config};
use felt_temperature::host::{HostContext, MemoryStateStore, StartSignal, TokioScheduler};
use felt_temperature::integration::Integration;
use felt_temperature::mqtt::{MqttClient, MqttPublisher, StatestreamBridge};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "felt-temperature")]
#[command(about = "Publish a felt temperature sensor derived from Home Assistant sources")]
struct Cli {
    /// JSON config file (defaults to the user config directory)
    #[arg(long, env = "FELT_CONFIG")]
    config: Option<PathBuf>,

    /// Sensor name
    #[arg(long)]
    name: Option<String>,

    /// Source entity id, may be repeated
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Seconds to wait after host start before the first update
    #[arg(long)]
    startup_delay: Option<u64>,

    /// Seconds between retries while a reading is missing
    #[arg(long)]
    retry_delay: Option<u64>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(name) = self.name {
            config.sensor.name = name;
        }
        if !self.sources.is_empty() {
            config.sensor.sources = self.sources;
        }
        if let Some(delay) = self.startup_delay {
            config.sensor.startup_delay_secs = delay;
        }
        if let Some(delay) = self.retry_delay {
            config.sensor.retry_delay_secs = delay;
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Environment is set up before the runtime spawns any worker thread
    config::load_dotenv();
    init_logger();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(Cli::parse()));
}

async fn run(cli: Cli) {
    info!("Starting Felt Temperature");

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    if let Err(e) = config.sensor.validate() {
        error!("Invalid sensor configuration: {}", e);
        std::process::exit(1);
    }

    info!("Configuration loaded:");
    info!("  Name: {}", config.sensor.name);
    info!("  Unique ID: {}", config.sensor.unique_id());
    info!("  Sources: {}", config.sensor.sources.join(", "));
    info!(
        "  MQTT: {}:{}",
        config.mqtt.broker_host, config.mqtt.broker_port
    );

    let store = Arc::new(MemoryStateStore::new());
    let started = StartSignal::new();
    let mqtt_client = MqttClient::new(&config.mqtt);
    let publisher = Arc::new(MqttPublisher::new(
        mqtt_client.client(),
        config.mqtt.discovery_prefix.clone(),
    ));
    let host = HostContext::with_memory_store(
        store.clone(),
        Arc::new(TokioScheduler::current()),
        started.clone(),
    );
    let integration = Arc::new(Integration::new(host, publisher));

    // Set up once retained states are in, so groups can be expanded
    let sensor_config = config.sensor.clone();
    let setup = integration.clone();
    let _listener = started.listen_once(Box::new(move || {
        let entry_id = sensor_config.unique_id();
        match setup.setup_entry_with_id(&entry_id, &sensor_config) {
            Ok(()) => info!("Felt temperature sensor ready ({})", entry_id),
            Err(e) => error!("Failed to set up sensor: {}", e),
        }
    }));

    let shutdown = CancellationToken::new();
    let bridge = StatestreamBridge::new(config.mqtt.clone(), store, started)
        .start(mqtt_client, shutdown.clone());

    info!("Felt Temperature is running");
    info!("  - Press Ctrl+C to exit");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    // Entries stay announced so the entity survives restarts
    info!("Stopping {} sensor(s)", integration.entry_ids().len());
    shutdown.cancel();
    if let Err(e) = bridge.await {
        error!("Statestream bridge task failed: {}", e);
    }

    info!("Felt Temperature stopped");
}
