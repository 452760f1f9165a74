//! Tab separated output: temperature, humidity, battery.

use crate::measurement::Measurement;
use crate::output::OutputFormatter;

#[derive(Debug, Default, Clone, Copy)]
pub struct TsvFormatter;

impl OutputFormatter for TsvFormatter {
    fn format(&self, m: &Measurement) -> String {
        format!("{:.1}\t{}\t{}", m.temperature(), m.humidity, m.battery)
    }
}
