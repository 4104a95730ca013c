//! Felt temperature formula.
//!
//! This is an apparent-temperature style approximation of UTCI with the mean
//! radiant temperature assumed equal to the air temperature. A real UTCI needs
//! radiant temperature data that simple sensors do not provide, so the result
//! is an approximation and must stay this exact formula.

/// Water vapour pressure in hPa for an air temperature (°C) and relative
/// humidity (%).
pub fn vapour_pressure(ta: f64, rh: f64) -> f64 {
    6.105 * ((17.27 * ta) / (237.7 + ta)).exp() * (rh / 100.0)
}

/// Felt temperature in °C from air temperature (°C), relative humidity (%)
/// and wind speed (m/s). Not rounded.
pub fn felt_temperature(ta: f64, rh: f64, va: f64) -> f64 {
    let e = vapour_pressure(ta, rh);
    ta + 0.33 * e - 0.70 * va - 4.00
}

/// Round to `places` decimals, half away from zero, on the shortest decimal
/// representation of `value`.
///
/// `12.35_f64` is stored as `12.3499999…` in binary but prints as `12.35`,
/// so it rounds to `12.4`.
pub fn round_half_up(value: f64, places: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let repr = value.abs().to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    if frac_part.len() <= places {
        return value;
    }

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(places))
        .map(|b| b - b'0')
        .collect();

    if frac_part.as_bytes()[places] >= b'5' {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == 9 {
                *digit = 0;
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, 1);
        }
    }

    let split = digits.len() - places;
    let mut text: String = digits[..split].iter().map(|d| char::from(b'0' + d)).collect();
    if places > 0 {
        text.push('.');
        text.extend(digits[split..].iter().map(|d| char::from(b'0' + d)));
    }

    let rounded: f64 = text.parse().unwrap_or(value.abs());
    if rounded == 0.0 {
        0.0
    } else if value < 0.0 {
        -rounded
    } else {
        rounded
    }
}
