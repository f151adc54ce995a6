//! Mock PLC driver for beckhoff-bridge
//!
//! This crate provides a simulated PLC for running the bridge without an ADS
//! router. All delays are async (`tokio::time::sleep`).
//!
//! # Features
//!
//! - [`MockPlc`]: symbol table, cyclic read registration, write history
//! - [`ErrorConfig`] / [`ErrorScenario`]: refused connects, dropped sessions,
//!   timeouts, seeded random failures
//! - [`TimingConfig`]: connect and round-trip latency with jitter
//!
//! # Driver Factory
//!
//! ```rust
//! use bridge_core::{DriverFactory, PlcConfig};
//! use bridge_driver_mock::MockPlcFactory;
//!
//! let factory = MockPlcFactory::new();
//! let driver = factory.build(&PlcConfig::new("PLC1")).unwrap();
//! # drop(driver);
//! assert!(factory.instance("PLC1").is_some());
//! ```

pub mod common;
mod mock_plc;

pub use common::{ErrorConfig, ErrorScenario, MockRng, TimingConfig};
pub use mock_plc::{MockPlc, MockPlcBuilder, MockPlcConfig, MockPlcFactory};
