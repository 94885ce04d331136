use super::regex_patterns::BRACKETED_LINE;
use super::timestamp::parse_timestamp;
use crate::domain::{CanonicalRecord, Destination, Fields};

/// Normalizes a `[<timestamp>]<message>` line.
///
/// A timestamp with exactly six `-`/`:` separated parts carries milliseconds in
/// its last part; they are kept as a zero-padded `milliseconds` field.
pub fn normalize_bracketed(line: &str, destination: &Destination) -> Option<CanonicalRecord> {
    let regex = BRACKETED_LINE.regex().ok()?;
    let caps = regex.captures(line)?;
    let raw_time = caps.get(1)?.as_str();
    let message = caps.get(2).map_or("", |m| m.as_str().trim());

    let mut fields = Fields::with_capacity(2);
    fields.insert("message", message);

    let parts: Vec<&str> = raw_time.split([':', '-']).collect();
    if parts.len() == 6 {
        fields.insert("milliseconds", format!("{:0>3}", parts[5]));
    }

    Some(CanonicalRecord::new(
        destination.clone(),
        Some(parse_timestamp(raw_time)),
        fields,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest() -> Destination {
        Destination::new("dispatcherlog").unwrap()
    }

    #[test]
    fn test_bracketed_line_with_milliseconds() {
        let record = normalize_bracketed("[02-09-23:44:24:837] boot complete", &dest()).unwrap();
        assert_eq!(record.field("message"), Some("boot complete"));
        assert_eq!(record.field("milliseconds"), Some("837"));
    }

    #[test]
    fn test_milliseconds_are_left_padded() {
        let record = normalize_bracketed("[02-10-00-54-17:8]x", &dest()).unwrap();
        assert_eq!(record.field("milliseconds"), Some("008"));
        assert_eq!(record.field("message"), Some("x"));
    }

    #[test]
    fn test_full_timestamp_has_no_milliseconds() {
        let record = normalize_bracketed("[2025-01-21 13:24:44]  started  ", &dest()).unwrap();
        assert_eq!(record.timestamp(), parse_timestamp("2025-01-21 13:24:44"));
        assert_eq!(record.field("message"), Some("started"));
        assert!(!record.fields().contains_key("milliseconds"));
    }

    #[test]
    fn test_lines_without_brackets_are_skipped() {
        assert!(normalize_bracketed("plain text", &dest()).is_none());
        assert!(normalize_bracketed("[unterminated", &dest()).is_none());
    }
}
