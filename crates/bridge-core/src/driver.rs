//! Communication driver seam.
//!
//! The wire-level transport to a PLC (ADS routing, symbol handles, byte
//! encoding) lives outside this workspace. Runtimes only see it through
//! [`CommunicationDriver`], and obtain one instance per PLC from a
//! [`DriverFactory`].
//!
//! ```text
//! ┌──────────────────────┐  build(&PlcConfig)  ┌──────────────────────────┐
//! │   RuntimeRegistry    │ ──────────────────▶ │      DriverFactory       │
//! └──────────────────────┘                     └──────────────────────────┘
//!            │                                              │
//!            ▼                                              ▼
//! ┌──────────────────────┐    connect/read/    ┌──────────────────────────┐
//! │      PlcRuntime      │ ──────────────────▶ │ Arc<dyn CommunicationDriver> │
//! └──────────────────────┘       write         └──────────────────────────┘
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::PlcConfig;
use crate::error::{BridgeResult, DriverResult};
use crate::value::FlatValues;

/// Session with one PLC.
///
/// Implementations must be safe to call from the read loop and the write loop
/// at the same time.
#[async_trait]
pub trait CommunicationDriver: Send + Sync {
    /// Open a session with the device at `endpoint`.
    ///
    /// Fails with a [`DriverErrorKind::Connection`](crate::error::DriverErrorKind::Connection)
    /// error when the device is unreachable.
    async fn connect(&self, endpoint: &str) -> DriverResult<()>;

    /// Close the session. Calling it while disconnected is a no-op.
    async fn disconnect(&self);

    /// Whether the session is currently open.
    async fn is_connected(&self) -> bool;

    /// Register a symbol for cyclic reads. Registering twice is a no-op.
    async fn add_read(&self, path: &str) -> DriverResult<()>;

    /// Read every registered symbol.
    ///
    /// Returns an empty map when nothing is registered.
    async fn read_data(&self) -> DriverResult<FlatValues>;

    /// Write a batch of symbols.
    async fn write_data(&self, values: &FlatValues) -> DriverResult<()>;
}

/// Builds drivers for configured PLCs.
pub trait DriverFactory: Send + Sync {
    /// Short identifier of the driver family (e.g. `"mock"`, `"ads"`).
    fn driver_type(&self) -> &'static str;

    /// Check driver-specific options before anything is spawned.
    fn validate(&self, _config: &PlcConfig) -> BridgeResult<()> {
        Ok(())
    }

    /// Create a driver for `config`. The driver starts disconnected.
    fn build(&self, config: &PlcConfig) -> BridgeResult<Arc<dyn CommunicationDriver>>;
}
