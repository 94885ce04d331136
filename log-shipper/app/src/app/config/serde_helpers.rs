use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Replaces `target` with the file value when the CLI value is still the
/// built-in default.
pub fn merge_default<T: PartialEq>(target: &mut T, default: T, file_value: Option<T>) {
    if *target == default
        && let Some(value) = file_value
    {
        *target = value;
    }
}

/// Reads a non-blank value through `lookup`, trimmed.
pub fn lookup_non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
