//! Recent status messages per PLC.
//!
//! [`StatusHistory`] is an [`EventSink`] that keeps the status events of
//! each PLC for a limited time window and up to a maximum count, so a
//! monitoring surface can show what went wrong recently without tailing the
//! event stream.

use bridge_core::{BridgeEvent, BridgeEventKind, EventSink, StatusEvent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Retention limits for [`StatusHistory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusHistoryConfig {
    /// How long a status stays visible
    pub window: Duration,
    /// Maximum number of statuses kept per PLC
    pub max_entries: usize,
}

impl Default for StatusHistoryConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(5),
            max_entries: 100,
        }
    }
}

/// Time-windowed status retention, keyed by PLC name.
///
/// Entries older than the window are pruned on insert and on read.
#[derive(Debug, Default)]
pub struct StatusHistory {
    config: StatusHistoryConfig,
    entries: Mutex<HashMap<String, VecDeque<StatusEvent>>>,
}

impl StatusHistory {
    /// History with the given limits.
    pub fn new(config: StatusHistoryConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Retention limits in use.
    pub fn config(&self) -> StatusHistoryConfig {
        self.config
    }

    /// Record a status for `plc`.
    pub fn record(&self, plc: &str, status: StatusEvent) {
        self.record_at(plc, status, Utc::now());
    }

    /// Statuses of `plc` still inside the window, oldest first.
    pub fn recent(&self, plc: &str) -> Vec<StatusEvent> {
        self.recent_at(plc, Utc::now())
    }

    /// Newest status of `plc` still inside the window.
    pub fn latest(&self, plc: &str) -> Option<StatusEvent> {
        self.recent(plc).pop()
    }

    /// Forget everything recorded for `plc`.
    pub fn clear(&self, plc: &str) {
        self.entries.lock().remove(plc);
    }

    fn record_at(&self, plc: &str, status: StatusEvent, now: DateTime<Utc>) {
        let mut entries = self.entries.lock();
        let queue = entries.entry(plc.to_string()).or_default();
        queue.push_back(status);
        while queue.len() > self.config.max_entries {
            queue.pop_front();
        }
        self.prune(queue, now);
    }

    fn recent_at(&self, plc: &str, now: DateTime<Utc>) -> Vec<StatusEvent> {
        let mut entries = self.entries.lock();
        let Some(queue) = entries.get_mut(plc) else {
            return Vec::new();
        };
        self.prune(queue, now);
        queue.iter().cloned().collect()
    }

    fn prune(&self, queue: &mut VecDeque<StatusEvent>, now: DateTime<Utc>) {
        let Ok(window) = chrono::Duration::from_std(self.config.window) else {
            return;
        };
        let Some(cutoff) = now.checked_sub_signed(window) else {
            return;
        };
        while queue.front().is_some_and(|s| s.timestamp < cutoff) {
            queue.pop_front();
        }
    }
}

impl EventSink for StatusHistory {
    fn emit(&self, event: BridgeEvent) {
        if let BridgeEventKind::Status(status) = event.kind {
            self.record(&event.plc, status);
        }
    }
}
