//! Notifications emitted by PLC runtimes.
//!
//! Every runtime reports through an injected [`EventSink`]. Sinks must not
//! block: they are called from inside the scheduler loops.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::value::ValueTree;

/// Connection state of one PLC, as owned by its supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Desired-enabled is false; no session is held or attempted.
    #[default]
    Disabled,
    /// Enabled, but no session (initial, failed attempt, or lost).
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Session open.
    Connected,
}

impl ConnectionState {
    /// Whether a session is open.
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disabled => "disabled",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Connection lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// A connect attempt started.
    Connecting,
    /// The session was established.
    Connected,
    /// An established session ended (disabled, lost, or stopped).
    Disconnected,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleEvent::Connecting => "Connecting",
            LifecycleEvent::Connected => "Connected",
            LifecycleEvent::Disconnected => "Disconnected",
        };
        f.write_str(label)
    }
}

/// Human-readable status line, usually an error report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    /// Message text.
    pub message: String,
    /// When the status was raised.
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Status stamped with the current time.
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Payload of a [`BridgeEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEventKind {
    /// The runtime was created; consumers should register their read variables.
    Initialized,
    /// Connection lifecycle transition.
    Lifecycle(LifecycleEvent),
    /// Status report.
    Status(StatusEvent),
    /// The enabled flag was set.
    Enabled(bool),
    /// Snapshot of the accumulated value tree after a successful read.
    Data(Arc<ValueTree>),
}

/// Event tagged with the name of the PLC that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeEvent {
    /// PLC name.
    pub plc: String,
    /// What happened.
    pub kind: BridgeEventKind,
}

impl BridgeEvent {
    /// Build an event for `plc`.
    pub fn new(plc: impl Into<String>, kind: BridgeEventKind) -> Self {
        Self {
            plc: plc.into(),
            kind,
        }
    }

    /// `Initialized` event.
    pub fn initialized(plc: impl Into<String>) -> Self {
        Self::new(plc, BridgeEventKind::Initialized)
    }

    /// Lifecycle event.
    pub fn lifecycle(plc: impl Into<String>, event: LifecycleEvent) -> Self {
        Self::new(plc, BridgeEventKind::Lifecycle(event))
    }

    /// Status event stamped now.
    pub fn status(plc: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(plc, BridgeEventKind::Status(StatusEvent::now(message)))
    }

    /// `Enabled` event.
    pub fn enabled(plc: impl Into<String>, enabled: bool) -> Self {
        Self::new(plc, BridgeEventKind::Enabled(enabled))
    }

    /// `Data` event.
    pub fn data(plc: impl Into<String>, tree: Arc<ValueTree>) -> Self {
        Self::new(plc, BridgeEventKind::Data(tree))
    }

    /// Status payload, if this is a status event.
    pub fn as_status(&self) -> Option<&StatusEvent> {
        match &self.kind {
            BridgeEventKind::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Tree payload, if this is a data event.
    pub fn as_data(&self) -> Option<&Arc<ValueTree>> {
        match &self.kind {
            BridgeEventKind::Data(tree) => Some(tree),
            _ => None,
        }
    }

    /// Lifecycle payload, if this is a lifecycle event.
    pub fn as_lifecycle(&self) -> Option<LifecycleEvent> {
        match &self.kind {
            BridgeEventKind::Lifecycle(event) => Some(*event),
            _ => None,
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Receiver of runtime events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Must not block.
    fn emit(&self, event: BridgeEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: BridgeEvent) {
        (**self).emit(event);
    }
}

/// Lagging or absent receivers are not an error for the emitter.
impl EventSink for broadcast::Sender<BridgeEvent> {
    fn emit(&self, event: BridgeEvent) {
        let _ = self.send(event);
    }
}

impl EventSink for mpsc::UnboundedSender<BridgeEvent> {
    fn emit(&self, event: BridgeEvent) {
        let _ = self.send(event);
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: BridgeEvent) {}
}

/// Forwards every event to several sinks, in order.
#[derive(Clone, Default)]
pub struct FanOut {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanOut {
    /// Empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of attached sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink is attached.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanOut {
    fn emit(&self, event: BridgeEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

impl fmt::Debug for FanOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOut")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
