//! Human readable output, one value per line.

use crate::measurement::Measurement;
use crate::output::OutputFormatter;

/// Formats a measurement as three labelled lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFormatter;

impl OutputFormatter for TextFormatter {
    fn format(&self, m: &Measurement) -> String {
        format!(
            "temperature: {:.1}℃\nhumidity: {}%\nremaining battery: {}%",
            m.temperature(),
            m.humidity,
            m.battery
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::test_utils::{NEGATIVE_PAYLOAD, sample_measurement};

    #[test]
    fn test_text_format() {
        let out = TextFormatter.format(&sample_measurement());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "temperature: 21.5℃",
                "humidity: 40%",
                "remaining battery: 50%"
            ]
        );
    }

    #[test]
    fn test_text_format_negative() {
        let out = TextFormatter.format(&decode(&NEGATIVE_PAYLOAD).unwrap());
        assert!(out.starts_with("temperature: -21.5℃\n"));
    }

    #[test]
    fn test_text_format_whole_degrees_keep_one_digit() {
        let mut m = sample_measurement();
        m.temperature_decimal = 0;
        assert!(TextFormatter.format(&m).starts_with("temperature: 21.0℃"));
    }
}
