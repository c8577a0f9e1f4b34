//! Log Line Parser
//!
//! Extracts a typed `KEY=VALUE` pair from one raw log line. The key is the
//! first word immediately followed by `=`; the value is everything after the
//! first `=`. Lines that do not match are ignored, never reported as errors.

use regex::Regex;
use std::sync::OnceLock;

/// Log key emitted by instrumented methods
pub const METHOD_KIND: &str = "METHOD";

fn kind_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // literal pattern
    PATTERN.get_or_init(|| Regex::new(r"(\w+?)=").expect("valid kind pattern"))
}

fn content_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // literal pattern
    PATTERN.get_or_init(|| Regex::new(r"=(.*)").expect("valid content pattern"))
}

/// One parsed coverage log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Key before the first `=` (e.g. `METHOD`)
    pub kind: String,
    /// Everything after the first `=`
    pub content: String,
}

impl LogLine {
    /// Parse a raw line, returning `None` for lines without a `KEY=` token
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let kind = kind_pattern().captures(line)?.get(1)?.as_str();
        let content = content_pattern().captures(line)?.get(1)?.as_str();
        Some(Self {
            kind: kind.to_string(),
            content: content.trim_end_matches('\r').to_string(),
        })
    }

    /// Whether this line reports an executed method
    #[must_use]
    pub fn is_method(&self) -> bool {
        self.kind == METHOD_KIND
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_method_line() {
        let line = LogLine::parse("METHOD=com.example.Foo.bar()V").unwrap();
        assert_eq!(line.kind, "METHOD");
        assert_eq!(line.content, "com.example.Foo.bar()V");
        assert!(line.is_method());
    }

    #[test]
    fn test_parse_logcat_prefixed_line() {
        let raw = "I/FING_SUPER_LOG( 4242): METHOD=com.example.Foo.baz(I)V";
        let line = LogLine::parse(raw).unwrap();
        assert_eq!(line.kind, "METHOD");
        assert_eq!(line.content, "com.example.Foo.baz(I)V");
    }

    #[test]
    fn test_parse_other_kind() {
        let line = LogLine::parse("CLASS=Baz").unwrap();
        assert_eq!(line.kind, "CLASS");
        assert_eq!(line.content, "Baz");
        assert!(!line.is_method());
    }

    #[test]
    fn test_content_keeps_later_equals() {
        let line = LogLine::parse("METHOD=a=b").unwrap();
        assert_eq!(line.kind, "METHOD");
        assert_eq!(line.content, "a=b");
    }

    #[test]
    fn test_trailing_carriage_return_dropped() {
        let line = LogLine::parse("METHOD=foo.bar\r").unwrap();
        assert_eq!(line.content, "foo.bar");
    }

    #[test]
    fn test_garbage_is_ignored() {
        assert!(LogLine::parse("garbage text").is_none());
        assert!(LogLine::parse("").is_none());
        assert!(LogLine::parse("--------- beginning of main").is_none());
    }

    #[test]
    fn test_equals_without_word_is_ignored() {
        assert!(LogLine::parse("= nothing before").is_none());
    }

    #[test]
    fn test_empty_content_is_allowed() {
        let line = LogLine::parse("METHOD=").unwrap();
        assert_eq!(line.content, "");
    }
}
