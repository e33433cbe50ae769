//! Structured JSON logger for logdoc
//!
//! - One log line = one event
//! - Deterministic key ordering: `event`, `severity`, then fields by name
//! - Lines are handed to `tracing` at the matching level; the library never
//!   installs a subscriber

use std::fmt;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-operation detail
    Trace = 0,
    /// Lifecycle milestones
    Info = 1,
    /// Recoverable issues such as skipped lines
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured logger that renders JSON lines
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and fields
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let line = Self::render(severity, event, fields);
        match severity {
            Severity::Trace => tracing::trace!(target: "logdoc", "{}", line),
            Severity::Info => tracing::info!(target: "logdoc", "{}", line),
            Severity::Warn => tracing::warn!(target: "logdoc", "{}", line),
            Severity::Error => tracing::error!(target: "logdoc", "{}", line),
        }
    }

    /// Renders one JSON object (no trailing newline).
    ///
    /// Fields are output in deterministic order (alphabetical by key).
    pub fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(128);

        output.push_str("{\"event\":\"");
        escape_json_string(&mut output, event);
        output.push_str("\",\"severity\":\"");
        output.push_str(severity.as_str());
        output.push('"');

        let mut sorted_fields: Vec<_> = fields.iter().collect();
        sorted_fields.sort_by_key(|(k, _)| *k);

        for (key, value) in sorted_fields {
            output.push_str(",\"");
            escape_json_string(&mut output, key);
            output.push_str("\":\"");
            escape_json_string(&mut output, value);
            output.push('"');
        }

        output.push('}');
        output
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}

fn escape_json_string(output: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_render_is_json() {
        let output = Logger::render(Severity::Warn, "MALFORMED_LINE_SKIPPED", &[("table", "users")]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "MALFORMED_LINE_SKIPPED");
        assert_eq!(parsed["severity"], "WARN");
        assert_eq!(parsed["table"], "users");
    }

    #[test]
    fn test_render_deterministic_ordering() {
        let a = Logger::render(Severity::Info, "T", &[("zebra", "1"), ("apple", "2")]);
        let b = Logger::render(Severity::Info, "T", &[("apple", "2"), ("zebra", "1")]);
        assert_eq!(a, b);
        assert!(a.find("apple").unwrap() < a.find("zebra").unwrap());
        assert!(a.find("\"event\"").unwrap() < a.find("\"severity\"").unwrap());
    }

    #[test]
    fn test_render_escapes_special_chars() {
        let output = Logger::render(Severity::Error, "T", &[("reason", "bad \"line\"\n2")]);
        assert!(!output.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["reason"], "bad \"line\"\n2");
    }

    #[test]
    fn test_log_without_subscriber() {
        Logger::info("TABLE_LOAD_START", &[("table", "t")]);
        Logger::error("COMPACTION_FAILED", &[]);
    }
}
