//! Configuration errors raised before a scan is started.

use crate::mac_address::{MacAddress, ParseMacError};
use thiserror::Error;

/// A command-line or programmatic setting that cannot be used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown output format '{0}' (expected none, tsv or json)")]
    UnknownFormat(String),
    #[error(transparent)]
    InvalidAddress(#[from] ParseMacError),
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

/// Parse the target device address given on the command line.
pub fn parse_address(src: &str) -> Result<MacAddress, ConfigError> {
    Ok(src.parse::<MacAddress>()?)
}
