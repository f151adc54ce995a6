//! # Beckhoff Bridge
//!
//! Keeps a set of Beckhoff PLCs connected, reads a list of variables from
//! each at a fixed cadence and publishes them as a nested value tree, and
//! forwards writes to the PLCs with last-write-wins coalescing.
//!
//! ## Crate Structure
//!
//! - **`registry`**: [`RuntimeRegistry`], the named collection of PLC runtimes.
//! - **`runtime`**: [`PlcRuntime`], one PLC with its read and write loops.
//! - **`supervisor`**: connection state machine driven by the read loop.
//! - **`scheduler`**: the read and write loops and their drift-corrected pacing.
//! - **`coalescer`**: last-write-wins buffer of pending writes.
//! - **`status`**: time-windowed history of status events.
//! - **`config`**: figment-based loading of [`BridgeConfig`].
//! - **`logging`**: tracing subscriber setup.
//!
//! Values, paths, the flat/nested codec, events and the driver seam live in
//! `bridge_core`; a simulated PLC lives in `bridge_driver_mock`.
//!
//! ## Example
//!
//! ```no_run
//! use beckhoff_bridge::RuntimeRegistry;
//! use bridge_core::{BridgeEvent, PlcConfig};
//! use bridge_driver_mock::MockPlcFactory;
//! use std::sync::Arc;
//! use tokio::sync::broadcast;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (events, mut rx) = broadcast::channel::<BridgeEvent>(256);
//! let registry = RuntimeRegistry::new(Arc::new(MockPlcFactory::new()), Arc::new(events));
//!
//! let plc = registry.add(
//!     &PlcConfig::new("PLC1")
//!         .with_enabled(true)
//!         .with_read_variables(["MAIN.counter"]),
//! )?;
//! plc.queue_write("MAIN.setpoint", 12.5)?;
//!
//! while let Ok(event) = rx.recv().await {
//!     if let Some(tree) = event.as_data() {
//!         println!("{}: {}", event.plc, tree.to_json());
//!         break;
//!     }
//! }
//! registry.clear().await;
//! # Ok(())
//! # }
//! ```

pub mod coalescer;
pub mod config;
pub mod logging;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod status;
pub mod supervisor;

pub use coalescer::WriteCoalescer;
pub use config::{ApplicationConfig, BridgeConfig, ConfigLoadError};
pub use registry::{ReconcileReport, RuntimeRegistry};
pub use runtime::PlcRuntime;
pub use scheduler::Pacer;
pub use status::{StatusHistory, StatusHistoryConfig};
pub use supervisor::ConnectionSupervisor;
