//! Console capture buffer.
//!
//! Holds intercepted console output in a bounded ring so the protocol's
//! `console get` can replay recent entries. Argument stringification is
//! defensive: a page's misbehaving objects degrade to a fallback string
//! instead of breaking the capture pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Maximum retained console entries; oldest are dropped first.
pub const CONSOLE_CAPACITY: usize = 200;

/// Console severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    /// `console.debug`
    Debug,
    /// `console.log`
    Log,
    /// `console.info`
    Info,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
}

impl ConsoleLevel {
    /// Parse a level name, defaulting unknown names to `Log`.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Log,
        }
    }
}

/// One captured console entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// Severity
    pub level: ConsoleLevel,
    /// Joined, stringified arguments
    pub message: String,
    /// Capture time in engine milliseconds
    pub timestamp: u64,
}

/// Bounded ring of captured console output.
#[derive(Debug, Default)]
pub struct ConsoleBuffer {
    entries: VecDeque<ConsoleEntry>,
}

impl ConsoleBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a console call with already-captured argument values.
    pub fn record(&mut self, level: ConsoleLevel, args: &[Value], timestamp: u64) {
        let message = args
            .iter()
            .map(stringify)
            .collect::<Vec<_>>()
            .join(" ");
        self.push(ConsoleEntry {
            level,
            message,
            timestamp,
        });
    }

    /// Record a failed network request as an error entry.
    pub fn record_network_error(
        &mut self,
        url: &str,
        status: Option<u16>,
        message: &str,
        timestamp: u64,
    ) {
        let message = match status {
            Some(code) => format!("fetch {url} failed: {code} {message}"),
            None => format!("fetch {url} failed: {message}"),
        };
        self.push(ConsoleEntry {
            level: ConsoleLevel::Error,
            message,
            timestamp,
        });
    }

    /// Entries, optionally restricted to one level, oldest first.
    #[must_use]
    pub fn get(&self, level: Option<ConsoleLevel>) -> Vec<ConsoleEntry> {
        self.entries
            .iter()
            .filter(|e| level.map_or(true, |l| e.level == l))
            .cloned()
            .collect()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn push(&mut self, entry: ConsoleEntry) {
        if self.entries.len() == CONSOLE_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }
}

/// Render a captured argument as text.
///
/// Strings pass through unquoted; structured values serialize to JSON; a
/// value that refuses to serialize degrades to a placeholder rather than
/// poisoning the entry.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other)
            .unwrap_or_else(|_| "[unserializable]".to_string()),
    }
}
