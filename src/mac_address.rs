//! Bluetooth device address type.
//!
//! Addresses are kept as six raw bytes so that comparing a scanned device
//! against the requested target does not depend on how either side spelled
//! the hex digits.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth MAC address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors returned when parsing a MAC address string.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseMacError {
    #[error("invalid MAC address: empty string")]
    Empty,
    #[error("invalid MAC address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid MAC address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid MAC address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Parses `aa:bb:cc:dd:ee:ff`, in either case, with `:` or `-` separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseMacError::Empty);
        }

        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidHex(part.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_lowercase() {
        let addr = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(format!("{}", addr), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_display_with_zeros() {
        let addr = MacAddress([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(format!("{}", addr), "00:01:02:03:04:05");
    }

    #[test]
    fn test_from_str_either_case() {
        let upper: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let lower: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_from_str_dash_separated() {
        let addr: MacAddress = "e1-2f-3a-4b-5c-6d".parse().unwrap();
        assert_eq!(addr.0, [0xE1, 0x2F, 0x3A, 0x4B, 0x5C, 0x6D]);
    }

    #[test]
    fn test_from_str_trims_whitespace() {
        let addr: MacAddress = " aa:bb:cc:dd:ee:ff\n".parse().unwrap();
        assert_eq!(addr.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_from_str_invalid() {
        assert_eq!("".parse::<MacAddress>(), Err(ParseMacError::Empty));
        assert!(matches!(
            "invalid".parse::<MacAddress>(),
            Err(ParseMacError::InvalidLength(1))
        ));
        assert!(matches!(
            "AA:BB:CC".parse::<MacAddress>(),
            Err(ParseMacError::InvalidLength(3))
        ));
        assert!(matches!(
            "AA:BB:CC:DD:EE:FFF".parse::<MacAddress>(),
            Err(ParseMacError::InvalidPartLength(5))
        ));
        assert!(matches!(
            "AA:BB:CC:DD:EE:GG".parse::<MacAddress>(),
            Err(ParseMacError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_round_trips_through_display() {
        let addr = MacAddress([0xC4, 0x7C, 0x8D, 0x01, 0x02, 0x03]);
        assert_eq!(addr.to_string().parse::<MacAddress>(), Ok(addr));
    }
}
