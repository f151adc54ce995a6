//! Error types shared by the bridge crates.
//!
//! Errors are split along the boundary they cross:
//!
//! - **`DriverError`**: raised by a [`CommunicationDriver`](crate::driver::CommunicationDriver)
//!   implementation. The [`DriverErrorKind`] tells the scheduler how to react
//!   (retry the connection next tick, mark the link lost, list the offending
//!   symbols in the status report, ...).
//! - **`PathError`**: a flat variable path failed to parse. Re-exported from
//!   [`crate::path`].
//! - **`BridgeError`**: caller-facing error for runtime and registry operations.
//!
//! None of these ever escape a scheduler loop; inside the loops they are turned
//! into status events.

use thiserror::Error;

pub use crate::path::PathError;

// =============================================================================
// Driver Errors
// =============================================================================

/// Classification of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// Endpoint unreachable or session rejected while connecting.
    Connection,
    /// The transport dropped an established session.
    ConnectionLost,
    /// Generic transport fault during a read or write.
    Communication,
    /// The device did not answer in time.
    Timeout,
    /// A named variable does not exist on the device.
    UnknownSymbol,
    /// Anything the driver could not classify.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Connection => "connection",
            DriverErrorKind::ConnectionLost => "connection_lost",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::UnknownSymbol => "unknown_symbol",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Failure reported by a communication driver.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Driver error on '{endpoint}' ({kind}): {message}")]
pub struct DriverError {
    /// Endpoint (AMS Net ID) the driver was talking to.
    pub endpoint: String,
    /// Failure classification.
    pub kind: DriverErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        endpoint: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind,
            message: message.into(),
        }
    }

    /// Connect failed or endpoint unreachable.
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(endpoint, DriverErrorKind::Connection, message)
    }

    /// Transport fault during read or write.
    pub fn communication(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(endpoint, DriverErrorKind::Communication, message)
    }

    /// Named variable missing on the device.
    pub fn unknown_symbol(endpoint: impl Into<String>, symbol: &str) -> Self {
        Self::new(
            endpoint,
            DriverErrorKind::UnknownSymbol,
            format!("symbol '{}' not found", symbol),
        )
    }

    /// Whether the failure means the session is gone and must be re-established.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self.kind,
            DriverErrorKind::ConnectionLost | DriverErrorKind::Connection
        )
    }
}

/// Convenience alias for driver results.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

// =============================================================================
// Bridge Errors
// =============================================================================

/// Convenience alias for results using the bridge error type.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Caller-facing error for bridge operations.
///
/// Scheduler loops never return this type; it is only produced by operations a
/// caller invokes directly (adding a runtime, validating configuration, queueing
/// a write with a malformed path).
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A variable path did not parse.
    ///
    /// **Recovery Strategy**: fix the path; nothing was queued or registered.
    #[error("Invalid variable path: {0}")]
    Path(#[from] PathError),

    /// The driver factory or driver rejected an operation.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Configuration values parsed but are semantically invalid
    /// (duplicate PLC names, out-of-range refresh rate, ...).
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// No driver factory is able to serve the requested PLC.
    #[error("No driver available for PLC '{0}'")]
    DriverUnavailable(String),

    /// Standard I/O failure (configuration files, sockets).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
