//! `switchbot-meter` library.
//!
//! The binary (`src/main.rs`) is responsible for logging setup, signal
//! handling and process exit codes. The core “business logic” lives in
//! [`crate::app`] where it can be tested deterministically with an injected
//! scanner, interrupt and output stream.

pub mod advertisement;
pub mod app;
pub mod config;
pub mod decoder;
pub mod duration;
pub mod filter;
pub mod mac_address;
pub mod measurement;
pub mod output;
pub mod scanner;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{Advertisement, ServiceData};
pub use app::{Outcome, ScanSession, ScanState, Scanner};
pub use config::ConfigError;
pub use decoder::{DecodeError, METER_PAYLOAD_LEN, decode};
pub use duration::parse_duration;
pub use mac_address::MacAddress;
pub use measurement::Measurement;
pub use output::{JsonFormatter, OutputFormat, OutputFormatter, TextFormatter, TsvFormatter};
pub use scanner::{AdvertisementResult, Backend, ScanError};
