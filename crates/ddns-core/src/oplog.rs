//! Operation log
//!
//! Bounded in-memory audit trail of reconciliation outcomes and lifecycle
//! events. Entries are read by offset, so a poller can keep the count it last
//! saw and ask only for what is new.
//!
//! Every append is mirrored to `tracing` under the `ddns::oplog` target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;

/// Default number of entries kept
pub const DEFAULT_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

/// FIFO of at most `capacity` entries; the oldest entry is evicted first
#[derive(Debug)]
pub struct OperationLog {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
}

impl OperationLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn append(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info | Severity::Success => tracing::info!(target: "ddns::oplog", "{}", message),
            Severity::Warn => tracing::warn!(target: "ddns::oplog", "{}", message),
            Severity::Error => tracing::error!(target: "ddns::oplog", "{}", message),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            severity,
            message,
        };

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.append(Severity::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(Severity::Error, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.append(Severity::Success, message);
    }

    /// Entries from index `from` to the newest; empty when `from` is out of range
    pub fn entries_from(&self, from: usize) -> Vec<LogEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().skip(from).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
