//! Felt temperature library.
//!
//! Derives a felt temperature sensor from existing temperature, humidity and
//! wind speed sources. The sensor logic runs against the host abstractions in
//! [`host`]; [`mqtt`] connects them to a Home Assistant instance.

pub mod config;
pub mod error;
pub mod host;
pub mod integration;
pub mod mqtt;
pub mod sensor;
pub mod units;
