//! Common infrastructure for the mock PLC.
//!
//! - **timing**: latency simulation
//! - **errors**: error injection framework
//! - **rng**: seeded random number generator

pub mod errors;
pub mod rng;
pub mod timing;

pub use errors::{ErrorConfig, ErrorScenario};
pub use rng::MockRng;
pub use timing::TimingConfig;
