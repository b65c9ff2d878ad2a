//! Diagnostic sink for repair-path warnings
//!
//! The editor silently repairs a number of conditions (abandoned dictionary
//! edits, xref fallback scans, widgets without a page reference). Each repair
//! reports through a [`DiagnosticSink`] so the conditions stay observable
//! without turning them into errors.

use std::cell::RefCell;

/// Receives warnings from locally-repaired conditions.
pub trait DiagnosticSink {
    fn warn(&self, message: &str);
}

/// Production sink: forwards to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn warn(&self, message: &str) {
        log::warn!("{message}");
    }
}

/// Sink that drops every warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn warn(&self, _message: &str) {}
}

/// Sink that records warnings for later inspection. Used by tests to assert
/// that a repair path actually fired.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: RefCell<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn warn(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_captures_warnings() {
        let sink = RecordingSink::new();
        assert!(sink.is_empty());

        sink.warn("first");
        sink.warn("second");

        let messages = sink.messages();
        assert_eq!(messages, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_null_sink_discards() {
        let sink = NullSink;
        sink.warn("nobody hears this");
    }
}
