use crate::error::{FeltError, Result};
use crate::host::state::Domain;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_NAME: &str = "Felt Temperature";

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
///
/// Must run while the process is still single-threaded.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

fn load_dotenv_from(env_path: &Path) {
    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(&key).is_err() {
            // SAFETY: the binary calls this from a plain `main` before the
            // tokio runtime and its worker threads exist
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Parse `KEY=value` lines, skipping blanks and comments and stripping one
/// pair of surrounding quotes.
fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            pairs.push((key.to_string(), value.to_string()));
        }
    }
    pairs
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorConfig,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub name: String,
    /// Stable entity id. Derived from the name when unset.
    pub unique_id: Option<String>,
    /// Source entity ids; groups are expanded at setup.
    pub sources: Vec<String>,
    pub startup_delay_secs: u64,
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Root of the Home Assistant statestream topic tree.
    pub statestream_base_topic: String,
    pub discovery_prefix: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            unique_id: None,
            sources: Vec::new(),
            startup_delay_secs: 10,
            retry_delay_secs: 60,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "felt-temperature".to_string(),
            username: None,
            password: None,
            statestream_base_topic: "homeassistant_statestream".to_string(),
            discovery_prefix: "homeassistant".to_string(),
        }
    }
}

impl SensorConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Configured unique id, or one derived from the name.
    pub fn unique_id(&self) -> String {
        match &self.unique_id {
            Some(id) => id.clone(),
            None => self
                .name
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_lowercase()
                    } else {
                        '_'
                    }
                })
                .collect(),
        }
    }

    /// Check the sources the way the setup form does: at least one, and
    /// only sensor, climate, weather or group entities.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(FeltError::NoSource);
        }
        for source in &self.sources {
            match Domain::of(source) {
                Domain::Sensor | Domain::Climate | Domain::Weather | Domain::Group => {}
                Domain::Other(_) => return Err(FeltError::InvalidSource(source.clone())),
            }
        }
        Ok(())
    }
}

/// Split a comma separated list, dropping empty items.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Default location of the JSON config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("felt-temperature").join("config.json"))
    }

    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Defaults, then the config file, then environment variables.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        Ok(config.with_env())
    }

    /// Override fields from environment variables.
    pub fn with_env(mut self) -> Self {
        if let Ok(name) = std::env::var("FELT_NAME") {
            self.sensor.name = name;
        }
        if let Ok(unique_id) = std::env::var("FELT_UNIQUE_ID") {
            self.sensor.unique_id = Some(unique_id);
        }
        if let Ok(sources) = std::env::var("FELT_SOURCES") {
            self.sensor.sources = parse_list(&sources);
        }
        if let Ok(delay) = std::env::var("FELT_STARTUP_DELAY")
            && let Ok(d) = delay.parse()
        {
            self.sensor.startup_delay_secs = d;
        }
        if let Ok(delay) = std::env::var("FELT_RETRY_DELAY")
            && let Ok(d) = delay.parse()
        {
            self.sensor.retry_delay_secs = d;
        }

        // MQTT configuration
        if let Ok(host) = std::env::var("MQTT_BROKER_HOST") {
            self.mqtt.broker_host = host;
        }
        if let Ok(port) = std::env::var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            self.mqtt.broker_port = p;
        }
        if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Ok(username) = std::env::var("MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        if let Ok(base) = std::env::var("MQTT_STATESTREAM_BASE") {
            self.mqtt.statestream_base_topic = base;
        }
        if let Ok(prefix) = std::env::var("MQTT_DISCOVERY_PREFIX") {
            self.mqtt.discovery_prefix = prefix;
        }

        self
    }
}
