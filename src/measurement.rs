//! SwitchBot Meter measurement data structure.

/// A single reading decoded from a SwitchBot Meter advertisement.
///
/// The meter reports temperature as separate integer and tenths parts with
/// a sign flag, so those are kept as advertised and combined by
/// [`Measurement::temperature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Integer part of the temperature in Celsius (0-127)
    pub temperature_integer: u8,
    /// Tenths digit of the temperature (0-15 as encoded, normally 0-9)
    pub temperature_decimal: u8,
    /// Sign flag: 0 for below zero, 1 for zero or above
    pub temperature_sign: u8,
    /// Relative humidity in percent (0-127 as encoded)
    pub humidity: u8,
    /// Remaining battery in percent (0-127 as encoded)
    pub battery: u8,
}

impl Measurement {
    /// Signed temperature in Celsius.
    pub fn temperature(&self) -> f64 {
        let magnitude =
            f64::from(self.temperature_integer) + f64::from(self.temperature_decimal) * 0.1;
        if self.temperature_sign == 0 {
            -magnitude
        } else {
            magnitude
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(integer: u8, decimal: u8, sign: u8) -> Measurement {
        Measurement {
            temperature_integer: integer,
            temperature_decimal: decimal,
            temperature_sign: sign,
            humidity: 40,
            battery: 50,
        }
    }

    #[test]
    fn test_positive_temperature() {
        assert!((measurement(21, 5, 1).temperature() - 21.5).abs() < 1e-9);
    }

    #[test]
    fn test_negative_temperature() {
        assert!((measurement(21, 5, 0).temperature() + 21.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_without_sign_flag_is_negative_zero() {
        let t = measurement(0, 0, 0).temperature();
        assert_eq!(t, 0.0);
        assert_eq!(format!("{t:.1}"), "-0.0");
    }

    #[test]
    fn test_decimal_nibble_above_nine() {
        // Out-of-range tenths are accepted and simply carry into the integer part.
        assert!((measurement(1, 15, 1).temperature() - 2.5).abs() < 1e-9);
    }
}
