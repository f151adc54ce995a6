//! Last-write-wins buffer of pending PLC writes.

use bridge_core::PlcValue;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Pending writes keyed by variable name.
///
/// Callers [`queue`](Self::queue) from any thread; the write loop
/// [`drain`](Self::drain)s once per cycle. Every queued value ends up in
/// exactly one drained batch unless a later value for the same name replaces
/// it first.
#[derive(Debug, Default)]
pub struct WriteCoalescer {
    pending: Mutex<HashMap<String, PlcValue>>,
}

impl WriteCoalescer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pending value for `name`, replacing any unflushed one.
    pub fn queue(&self, name: impl Into<String>, value: PlcValue) {
        self.pending.lock().insert(name.into(), value);
    }

    /// Take every pending write, leaving the buffer empty.
    pub fn drain(&self) -> HashMap<String, PlcValue> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Number of pending writes.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
