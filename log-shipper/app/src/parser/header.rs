/// Turns a raw column name into a field key.
///
/// Characters outside `[a-zA-Z0-9_]` become `_`, a leading digit gets a `_`
/// prefix and the result is lower-cased: `1stRun-ID` → `_1strun_id`.
pub fn clean_header(header: &str) -> String {
    let mut key = String::with_capacity(header.len() + 1);

    if header.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        key.push('_');
    }

    key.extend(header.chars().map(|c| {
        if c.is_ascii_alphanumeric() || c == '_' {
            c.to_ascii_lowercase()
        } else {
            '_'
        }
    }));

    key
}

/// Removes every whitespace character from a value.
pub fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
