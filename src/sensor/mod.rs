//! Felt temperature sensor.
//!
//! - `classifier`: assigns sources to the temperature, humidity and wind roles
//! - `reading`: reads and normalises the value of each role
//! - `formula`: the felt temperature approximation and its rounding
//! - `entity`: the update state machine that ties them together

pub mod classifier;
pub mod entity;
pub mod formula;
pub mod reading;

pub use classifier::{Role, RoleAssignment};
pub use entity::{FeltTemperatureSensor, Phase, SensorOptions};
pub use formula::{felt_temperature, round_half_up};
pub use reading::{Reading, Readings};
