//! Output formatters for meter measurements.
//!
//! This module provides a trait for formatting measurements and one
//! implementation per supported output format. The format is chosen once,
//! before scanning starts, through [`OutputFormat`].

pub mod json;
pub mod text;
pub mod tsv;

use crate::config::ConfigError;
use crate::measurement::Measurement;
use std::fmt;
use std::str::FromStr;

pub use json::JsonFormatter;
pub use text::TextFormatter;
pub use tsv::TsvFormatter;

/// Trait for formatting measurements into output strings.
///
/// Implementations return the text without a trailing newline; the caller
/// decides how to terminate it.
pub trait OutputFormatter: Send + Sync {
    /// Format a measurement.
    fn format(&self, measurement: &Measurement) -> String;
}

/// Available output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human readable, one value per line
    #[default]
    None,
    /// Tab separated: temperature, humidity, battery
    Tsv,
    /// Single-line JSON object
    Json,
}

impl OutputFormat {
    /// Build the formatter for this format.
    pub fn formatter(self) -> Box<dyn OutputFormatter> {
        match self {
            OutputFormat::None => Box::new(TextFormatter),
            OutputFormat::Tsv => Box::new(TsvFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::None => write!(f, "none"),
            OutputFormat::Tsv => write!(f, "tsv"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(OutputFormat::None),
            "tsv" => Ok(OutputFormat::Tsv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::UnknownFormat(s.to_string())),
        }
    }
}
