use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum FeltError {
    #[error("Could not convert value \"{value}\" ({unit}) to a number")]
    Conversion { value: String, unit: String },

    #[error("Unknown unit of measurement: {0}")]
    UnknownUnit(String),

    #[error("No source configured")]
    NoSource,

    #[error("Source is not a sensor, climate, weather or group entity: {0}")]
    InvalidSource(String),

    #[error("Unknown config entry: {0}")]
    UnknownEntry(String),

    #[error(transparent)]
    Mqtt(#[from] rumqttc::ClientError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FeltError>;
