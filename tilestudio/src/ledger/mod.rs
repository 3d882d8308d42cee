//! Per-style log of recent render failures.
//!
//! Failures accumulate in insertion order until the next successful render of
//! the same style clears them. The list is bounded; when full, the oldest
//! entry is dropped first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Default number of entries kept per style.
pub const DEFAULT_LEDGER_CAPACITY: usize = 32;

/// One recorded failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorLogEntry {
    pub style_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Process-wide error ledger keyed by style id.
#[derive(Debug)]
pub struct ErrorLedger {
    capacity: usize,
    entries: DashMap<String, VecDeque<ErrorLogEntry>>,
}

impl Default for ErrorLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

impl ErrorLedger {
    /// Creates a ledger holding at most `capacity` entries per style.
    ///
    /// A capacity of zero is raised to one so the latest failure is always
    /// reported.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a failure and returns the style's messages, oldest first.
    pub fn record(&self, style_id: &str, message: impl Into<String>) -> Vec<String> {
        let entry = ErrorLogEntry {
            style_id: style_id.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        };

        let mut log = self.entries.entry(style_id.to_string()).or_default();
        if log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(entry);
        log.iter().map(|e| e.message.clone()).collect()
    }

    /// Forgets every failure of a style.
    pub fn clear(&self, style_id: &str) {
        self.entries.remove(style_id);
    }

    /// Messages for a style, oldest first.
    pub fn messages(&self, style_id: &str) -> Vec<String> {
        self.entries
            .get(style_id)
            .map(|log| log.iter().map(|e| e.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Full entries for a style, oldest first.
    pub fn entries(&self, style_id: &str) -> Vec<ErrorLogEntry> {
        self.entries
            .get(style_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Joins messages with `|` for the `errors` cookie.
    pub fn encode(messages: &[String]) -> String {
        messages.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_returns_all_messages_in_order() {
        let ledger = ErrorLedger::default();
        assert_eq!(ledger.record("style", "first"), vec!["first"]);
        assert_eq!(ledger.record("style", "second"), vec!["first", "second"]);
        assert_eq!(
            ErrorLedger::encode(&ledger.messages("style")),
            "first|second"
        );
    }

    #[test]
    fn test_clear_resets_style_only() {
        let ledger = ErrorLedger::default();
        ledger.record("a", "boom");
        ledger.record("b", "bang");

        ledger.clear("a");

        assert!(ledger.messages("a").is_empty());
        assert_eq!(ledger.messages("b"), vec!["bang"]);
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let ledger = std::sync::Arc::new(ErrorLedger::new(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ledger = std::sync::Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        ledger.record("style", format!("t{}-{}", t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let messages = ledger.messages("style");
        assert_eq!(messages.len(), 40);
        for t in 0..4 {
            let own: Vec<_> = messages
                .iter()
                .filter(|m| m.starts_with(&format!("t{}-", t)))
                .cloned()
                .collect();
            let expected: Vec<_> = (0..10).map(|i| format!("t{}-{}", t, i)).collect();
            assert_eq!(own, expected, "thread {} lost or reordered entries", t);
        }
    }

    #[test]
    fn test_concurrent_records_respect_capacity() {
        let ledger = std::sync::Arc::new(ErrorLedger::new(8));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ledger = std::sync::Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let seen = ledger.record("style", format!("t{}-{}", t, i));
                        assert!(seen.len() <= 8);
                        if i % 10 == 0 {
                            ledger.clear("style");
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(ledger.messages("style").len() <= 8);
        ledger.record("style", "last");
        assert_eq!(ledger.messages("style").last().map(String::as_str), Some("last"));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let ledger = ErrorLedger::new(3);
        for i in 0..5 {
            ledger.record("style", format!("error {}", i));
        }
        assert_eq!(
            ledger.messages("style"),
            vec!["error 2", "error 3", "error 4"]
        );
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let ledger = ErrorLedger::new(0);
        ledger.record("style", "old");
        assert_eq!(ledger.record("style", "new"), vec!["new"]);
    }

    #[test]
    fn test_entries_carry_style_and_time() {
        let before = Utc::now();
        let ledger = ErrorLedger::default();
        ledger.record("style", "boom");

        let entries = ledger.entries("style");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].style_id, "style");
        assert!(entries[0].timestamp >= before);
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(ErrorLedger::encode(&[]), "");
    }
}
