//! SwitchBot Meter service data decoder.
//!
//! The meter broadcasts its reading in the service data of every
//! advertisement. Only bytes 2 to 5 carry the measurement:
//!
//! | byte | bits   | meaning                              |
//! |------|--------|--------------------------------------|
//! | 2    | 0..=6  | remaining battery, percent           |
//! | 3    | 0..=3  | temperature tenths digit             |
//! | 4    | 0..=6  | temperature integer part, Celsius    |
//! | 4    | 7      | temperature sign (1 = non-negative)  |
//! | 5    | 0..=6  | relative humidity, percent           |

use crate::measurement::Measurement;
use thiserror::Error;

/// Number of service data bytes the decoder reads.
pub const METER_PAYLOAD_LEN: usize = 6;

const BATTERY_INDEX: usize = 2;
const DECIMAL_INDEX: usize = 3;
const INTEGER_INDEX: usize = 4;
const HUMIDITY_INDEX: usize = 5;

const SEVEN_BIT_MASK: u8 = 0b0111_1111;
const NIBBLE_MASK: u8 = 0b0000_1111;
const SIGN_MASK: u8 = 0b1000_0000;

/// Error types for decoding meter service data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload is shorter than the fixed meter layout
    #[error("service data too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
}

/// Decode SwitchBot Meter service data into a [`Measurement`].
///
/// Every byte value is accepted under the layout masks; the only failure is a
/// payload shorter than [`METER_PAYLOAD_LEN`]. Trailing bytes are ignored.
pub fn decode(data: &[u8]) -> Result<Measurement, DecodeError> {
    if data.len() < METER_PAYLOAD_LEN {
        return Err(DecodeError::TooShort {
            expected: METER_PAYLOAD_LEN,
            actual: data.len(),
        });
    }

    Ok(Measurement {
        temperature_integer: data[INTEGER_INDEX] & SEVEN_BIT_MASK,
        temperature_decimal: data[DECIMAL_INDEX] & NIBBLE_MASK,
        temperature_sign: (data[INTEGER_INDEX] & SIGN_MASK) >> 7,
        humidity: data[HUMIDITY_INDEX] & SEVEN_BIT_MASK,
        battery: data[BATTERY_INDEX] & SEVEN_BIT_MASK,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{NEGATIVE_PAYLOAD, SAMPLE_PAYLOAD};

    /// Lay out a reading the way the meter does, with noise in the unused bits.
    fn encode(integer: u8, decimal: u8, sign: u8) -> [u8; 6] {
        [
            0x54,
            0x10,
            0x80 | 64,
            0xF0 | decimal,
            (sign << 7) | integer,
            0x80 | 55,
        ]
    }

    #[test]
    fn test_decode_sample_payload() {
        let m = decode(&SAMPLE_PAYLOAD).unwrap();
        assert_eq!(m.battery, 50);
        assert_eq!(m.temperature_decimal, 5);
        assert_eq!(m.temperature_integer, 21);
        assert_eq!(m.temperature_sign, 1);
        assert_eq!(m.humidity, 40);
        assert!((m.temperature() - 21.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_negative_temperature() {
        let m = decode(&NEGATIVE_PAYLOAD).unwrap();
        assert_eq!(m.temperature_sign, 0);
        assert!((m.temperature() + 21.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_masks_unused_bits() {
        let m = decode(&encode(3, 7, 1)).unwrap();
        assert_eq!(m.battery, 64);
        assert_eq!(m.humidity, 55);
        assert_eq!(m.temperature_decimal, 7);
    }

    #[test]
    fn test_decode_recovers_every_encodable_temperature() {
        for sign in 0..=1u8 {
            for integer in 0..=127u8 {
                for decimal in 0..=15u8 {
                    let m = decode(&encode(integer, decimal, sign)).unwrap();
                    assert_eq!(
                        (m.temperature_integer, m.temperature_decimal, m.temperature_sign),
                        (integer, decimal, sign)
                    );

                    let magnitude = f64::from(integer) + f64::from(decimal) * 0.1;
                    let expected = if sign == 0 { -magnitude } else { magnitude };
                    assert!((m.temperature() - expected).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut data = SAMPLE_PAYLOAD.to_vec();
        data.extend_from_slice(&[0xFF, 0xFF]);
        assert_eq!(decode(&data), decode(&SAMPLE_PAYLOAD));
    }

    #[test]
    fn test_decode_short_payload() {
        assert_eq!(
            decode(&[0x69, 0x00, 0x32, 0x05, 0x95]),
            Err(DecodeError::TooShort {
                expected: 6,
                actual: 5
            })
        );
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::TooShort {
            expected: 6,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "service data too short: expected at least 6 bytes, got 2"
        );
    }
}
