//! Single-line JSON output.
//!
//! The object has a fixed shape and spacing, so it is written directly.

use crate::measurement::Measurement;
use crate::output::OutputFormatter;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format(&self, m: &Measurement) -> String {
        format!(
            "{{ \"temperature\": {:.1}, \"humidity\": {}, \"battery\": {} }}",
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
    use crate::test_utils::{NEGATIVE_PAYLOAD, SAMPLE_PAYLOAD};

    #[test]
    fn test_json_format() {
        let m = decode(&SAMPLE_PAYLOAD).unwrap();
        assert_eq!(
            JsonFormatter.format(&m),
            r#"{ "temperature": 21.5, "humidity": 40, "battery": 50 }"#
        );
    }

    #[test]
    fn test_json_format_negative() {
        let m = decode(&NEGATIVE_PAYLOAD).unwrap();
        assert_eq!(
            JsonFormatter.format(&m),
            r#"{ "temperature": -21.5, "humidity": 40, "battery": 50 }"#
        );
    }

    #[test]
    fn test_json_is_single_line() {
        let m = decode(&SAMPLE_PAYLOAD).unwrap();
        assert!(!JsonFormatter.format(&m).contains('\n'));
    }
}
