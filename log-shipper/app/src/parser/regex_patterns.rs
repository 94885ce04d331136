//! Regexes shared by the normalizers and the file source reader, compiled on
//! first use.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
#[error("Pattern '{name}' does not compile: {source}")]
pub struct RegexError {
    pub name: &'static str,
    #[source]
    pub source: regex::Error,
}

pub struct LazyPattern {
    name: &'static str,
    source: &'static str,
    compiled: OnceLock<Result<Regex, RegexError>>,
}

impl LazyPattern {
    pub const fn new(name: &'static str, source: &'static str) -> Self {
        Self {
            name,
            source,
            compiled: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn regex(&self) -> Result<&Regex, RegexError> {
        self.compiled
            .get_or_init(|| {
                Regex::new(self.source).map_err(|source| RegexError {
                    name: self.name,
                    source,
                })
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// `[<timestamp>]<message>`, leading whitespace allowed.
pub static BRACKETED_LINE: LazyPattern =
    LazyPattern::new("bracketed_line", r"^\s*\[([^\]]*)\](.*)$");

/// `YYYYMMDD-HHMMSS`
pub static COMPACT_TIMESTAMP: LazyPattern = LazyPattern::new(
    "compact_timestamp",
    r"^(\d{4})(\d{2})(\d{2})-(\d{2})(\d{2})(\d{2})$",
);

/// Stamp embedded in a file name, e.g. `AutoTestResult_20250121-132444.csv`.
pub static FILE_NAME_STAMP: LazyPattern = LazyPattern::new("file_name_stamp", r"(\d{8}-\d{6})");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_patterns_compile() {
        for pattern in [&BRACKETED_LINE, &COMPACT_TIMESTAMP, &FILE_NAME_STAMP] {
            assert!(pattern.regex().is_ok(), "{} should compile", pattern.name());
        }
    }

    #[test]
    fn test_pattern_used_from_many_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    COMPACT_TIMESTAMP
                        .regex()
                        .is_ok_and(|regex| regex.is_match("20250121-132444"))
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_broken_pattern_reports_its_name() {
        static BROKEN: LazyPattern = LazyPattern::new("broken", r"[unclosed");

        let err = BROKEN.regex().unwrap_err();
        assert_eq!(err.name, "broken");
        assert!(err.to_string().contains("broken"));
        // The failure is cached, not retried.
        assert!(BROKEN.regex().is_err());
    }
}
