//! Unit parsing and conversion for source readings.
//!
//! Temperatures are normalised to degrees Celsius and speeds to metres per
//! second before they reach the felt temperature formula.

use crate::error::{FeltError, Result};
use std::str::FromStr;
use strum::EnumString;

/// Percentage unit used by humidity sensors.
pub const PERCENTAGE: &str = "%";

/// Unit of every normalised temperature.
pub const CELSIUS: &str = "°C";

/// Unit of every normalised speed.
pub const METERS_PER_SECOND: &str = "m/s";

/// Temperature units understood by the converter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumString)]
pub enum TemperatureUnit {
    #[strum(serialize = "°C")]
    Celsius,
    #[strum(serialize = "°F")]
    Fahrenheit,
    #[strum(serialize = "K")]
    Kelvin,
}

impl TemperatureUnit {
    /// True if `unit` belongs to the temperature unit family.
    pub fn is_temperature(unit: &str) -> bool {
        Self::from_str(unit).is_ok()
    }

    fn to_celsius(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
            TemperatureUnit::Kelvin => value - 273.15,
        }
    }
}

/// Speed units understood by the converter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumString)]
pub enum SpeedUnit {
    #[strum(serialize = "m/s")]
    MetersPerSecond,
    #[strum(serialize = "km/h")]
    KilometersPerHour,
    #[strum(serialize = "mph")]
    MilesPerHour,
    #[strum(serialize = "kn")]
    Knots,
    #[strum(serialize = "ft/s")]
    FeetPerSecond,
    #[strum(serialize = "mm/s")]
    MillimetersPerSecond,
    #[strum(serialize = "in/s")]
    InchesPerSecond,
    #[strum(serialize = "in/h")]
    InchesPerHour,
    #[strum(serialize = "in/d")]
    InchesPerDay,
    #[strum(serialize = "mm/d")]
    MillimetersPerDay,
    #[strum(serialize = "Beaufort")]
    Beaufort,
}

impl SpeedUnit {
    /// True if `unit` belongs to the speed unit family.
    pub fn is_speed(unit: &str) -> bool {
        Self::from_str(unit).is_ok()
    }

    fn to_meters_per_second(self, value: f64) -> f64 {
        match self {
            SpeedUnit::MetersPerSecond => value,
            SpeedUnit::KilometersPerHour => value / 3.6,
            SpeedUnit::MilesPerHour => value * 0.44704,
            SpeedUnit::Knots => value * 1852.0 / 3600.0,
            SpeedUnit::FeetPerSecond => value * 0.3048,
            SpeedUnit::MillimetersPerSecond => value / 1000.0,
            SpeedUnit::InchesPerSecond => value * 0.0254,
            SpeedUnit::InchesPerHour => value * 0.0254 / 3600.0,
            SpeedUnit::InchesPerDay => value * 0.0254 / 86400.0,
            SpeedUnit::MillimetersPerDay => value / 1000.0 / 86400.0,
            // Empirical Beaufort scale: v = 0.836 * B^(3/2)
            SpeedUnit::Beaufort => 0.836 * value.powf(1.5),
        }
    }
}

/// Parse a raw reading as a floating point number.
pub fn parse_number(raw: &str, unit: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FeltError::Conversion {
            value: raw.to_string(),
            unit: unit.to_string(),
        })
}

/// Convert a raw temperature reading to degrees Celsius.
///
/// A missing unit is read as Celsius.
pub fn convert_temperature(raw: &str, unit: Option<&str>) -> Result<f64> {
    let unit = unit.unwrap_or(CELSIUS);
    let parsed =
        TemperatureUnit::from_str(unit).map_err(|_| FeltError::UnknownUnit(unit.to_string()))?;
    Ok(parsed.to_celsius(parse_number(raw, unit)?))
}

/// Convert a raw speed reading to metres per second.
///
/// A missing unit is read as metres per second.
pub fn convert_speed(raw: &str, unit: Option<&str>) -> Result<f64> {
    let unit = unit.unwrap_or(METERS_PER_SECOND);
    let parsed = SpeedUnit::from_str(unit).map_err(|_| FeltError::UnknownUnit(unit.to_string()))?;
    Ok(parsed.to_meters_per_second(parse_number(raw, unit)?))
}
