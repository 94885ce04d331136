use crate::domain::{CanonicalRecord, Destination, Fields, is_valid_timestamp};

const TIMESTAMP_KEY: &str = "timestamp";

/// Normalizes a `key=value,key=value` telemetry line.
///
/// A `Timestamp` pair (any case) carries epoch seconds and is not stored as a
/// field. Values keep their inner whitespace. Lines without a single usable
/// pair produce nothing.
pub fn normalize_key_value(line: &str, destination: &Destination) -> Option<CanonicalRecord> {
    let mut fields = Fields::new();
    let mut timestamp = None;
    let mut pairs = 0usize;

    for pair in line.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        pairs += 1;

        let value = value.trim();
        if key.eq_ignore_ascii_case(TIMESTAMP_KEY) {
            if let Ok(ts) = value.parse::<i64>()
                && is_valid_timestamp(ts)
            {
                timestamp = Some(ts);
            }
        } else {
            fields.insert(key, value);
        }
    }

    (pairs > 0).then(|| CanonicalRecord::new(destination.clone(), timestamp, fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dest() -> Destination {
        Destination::new("cpuinfolog").unwrap()
    }

    #[test]
    fn test_timestamp_pair_sets_record_time() {
        let record = normalize_key_value("Timestamp=1700000000,cpu=12,mem=55", &dest()).unwrap();
        assert_eq!(record.timestamp(), 1_700_000_000);
        let fields: Vec<_> = record.fields().iter().collect();
        assert_eq!(fields, vec![("cpu", "12"), ("mem", "55")]);
        assert!(!record.fields().keys().any(|k| k.eq_ignore_ascii_case("timestamp")));
    }

    #[test]
    fn test_values_keep_inner_whitespace() {
        let record = normalize_key_value("proc=Dispatcher Service,state=running\r", &dest()).unwrap();
        assert_eq!(record.field("proc"), Some("Dispatcher Service"));
        assert_eq!(record.field("state"), Some("running"));
    }

    #[test]
    fn test_bad_timestamp_falls_back_to_now() {
        let before = Utc::now().timestamp();
        let record = normalize_key_value("TIMESTAMP=abc,cpu=1", &dest()).unwrap();
        assert!(record.timestamp() >= before);
        assert_eq!(record.fields().len(), 1);
    }

    #[test]
    fn test_later_bad_timestamp_keeps_earlier_value() {
        let record =
            normalize_key_value("Timestamp=1700000000,timestamp=x,cpu=1", &dest()).unwrap();
        assert_eq!(record.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_timestamp_beyond_envelope_range_falls_back_to_now() {
        let before = Utc::now().timestamp();
        let record = normalize_key_value("Timestamp=5000000000,cpu=2", &dest()).unwrap();
        assert!(record.timestamp() >= before && record.timestamp() < 5_000_000_000);
        assert_eq!(record.field("cpu"), Some("2"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        assert!(normalize_key_value("", &dest()).is_none());
        assert!(normalize_key_value("no pairs here", &dest()).is_none());
        assert!(normalize_key_value(",,=value,", &dest()).is_none());
    }

    #[test]
    fn test_partially_malformed_line_keeps_good_pairs() {
        let record = normalize_key_value("junk,cpu=3,=x,mem=", &dest()).unwrap();
        let fields: Vec<_> = record.fields().iter().collect();
        assert_eq!(fields, vec![("cpu", "3")]);
    }
}
