use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// One timestamped progress line for a host.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// Per-host progress channel: the owning worker appends, the orchestrator
/// drains. Entries for one host keep append order.
#[derive(Clone, Default)]
pub struct MessageLog {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    appended: Arc<AtomicU64>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line. Multi-line text (collaborator output) becomes one
    /// entry per non-empty line.
    pub fn push(&self, text: impl Into<String>) {
        let text = text.into();
        let at = Utc::now();
        let mut entries = self.entries.lock();
        for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
            entries.push_back(LogEntry {
                at,
                text: line.to_string(),
            });
            self.appended.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove and return everything appended so far, in append order.
    /// Draining an empty log returns an empty vec and mutates nothing.
    pub fn drain(&self) -> Vec<LogEntry> {
        self.entries.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Total number of entries ever appended.
    pub fn appended_total(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }
}
