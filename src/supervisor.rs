//! Per-PLC connection state machine.
//!
//! ```text
//!             enable                ok
//!  Disabled ─────────▶ Connecting ─────▶ Connected
//!     ▲                   │  ▲              │
//!     │ disable       err │  │ next tick    │ lost / endpoint changed
//!     │                   ▼  │              ▼
//!     └───────────────  Disconnected ◀──────┘
//! ```
//!
//! The supervisor is owned by the read loop and ticked once per cycle. It
//! turns every driver failure into a status event; nothing propagates out.

use bridge_core::{
    BridgeEvent, CommunicationDriver, ConnectionState, EventSink, LifecycleEvent,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Connection lifecycle of one PLC.
pub struct ConnectionSupervisor {
    plc: String,
    driver: Arc<dyn CommunicationDriver>,
    sink: Arc<dyn EventSink>,
    state: watch::Sender<ConnectionState>,
    /// Endpoint of the open session, if any.
    session_endpoint: Option<String>,
}

impl ConnectionSupervisor {
    /// Supervisor publishing its state through `state`.
    pub fn new(
        plc: impl Into<String>,
        driver: Arc<dyn CommunicationDriver>,
        sink: Arc<dyn EventSink>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            plc: plc.into(),
            driver,
            sink,
            state,
            session_endpoint: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Reconcile the session with the desired `enabled` flag and `endpoint`.
    pub async fn tick(&mut self, enabled: bool, endpoint: &str) -> ConnectionState {
        if !enabled {
            if self.state() != ConnectionState::Disabled {
                self.close("disabled").await;
                self.set(ConnectionState::Disabled);
            }
            return ConnectionState::Disabled;
        }

        if self.state() == ConnectionState::Connected {
            if self.session_endpoint.as_deref() != Some(endpoint) {
                info!(plc = %self.plc, endpoint, "endpoint changed, reconnecting");
                self.close("endpoint changed").await;
            } else if !self.driver.is_connected().await {
                warn!(plc = %self.plc, endpoint, "driver reports session closed");
                self.lost();
                return self.state();
            } else {
                return ConnectionState::Connected;
            }
        }

        self.connect(endpoint).await
    }

    /// Record that the read path saw the session drop.
    pub fn mark_lost(&mut self) {
        if self.state() == ConnectionState::Connected {
            warn!(plc = %self.plc, "connection lost");
            self.lost();
        }
    }

    /// Close the session for good. Emits `Disconnected` if it was open.
    pub async fn shutdown(&mut self) {
        self.close("runtime stopping").await;
        self.driver.disconnect().await;
        self.set(ConnectionState::Disabled);
    }

    async fn connect(&mut self, endpoint: &str) -> ConnectionState {
        self.set(ConnectionState::Connecting);
        self.emit_lifecycle(LifecycleEvent::Connecting);
        debug!(plc = %self.plc, endpoint, "connecting");

        match self.driver.connect(endpoint).await {
            Ok(()) => {
                self.session_endpoint = Some(endpoint.to_string());
                self.set(ConnectionState::Connected);
                self.emit_lifecycle(LifecycleEvent::Connected);
                info!(plc = %self.plc, endpoint, "connected");
            }
            Err(e) => {
                self.set(ConnectionState::Disconnected);
                warn!(plc = %self.plc, endpoint, error = %e, "connect failed");
                self.sink
                    .emit(BridgeEvent::status(&self.plc, format!("Error connecting: {}", e)));
            }
        }
        self.state()
    }

    /// Disconnect the driver if a session is open.
    async fn close(&mut self, reason: &str) {
        if self.state() == ConnectionState::Connected {
            self.driver.disconnect().await;
            self.session_endpoint = None;
            self.set(ConnectionState::Disconnected);
            self.emit_lifecycle(LifecycleEvent::Disconnected);
            info!(plc = %self.plc, reason, "disconnected");
        }
    }

    fn lost(&mut self) {
        self.session_endpoint = None;
        self.set(ConnectionState::Disconnected);
        self.emit_lifecycle(LifecycleEvent::Disconnected);
    }

    fn set(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit_lifecycle(&self, event: LifecycleEvent) {
        self.sink.emit(BridgeEvent::lifecycle(&self.plc, event));
    }
}
