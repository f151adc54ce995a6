//! Error injection for the mock PLC.
//!
//! Enables configurable failures so runtimes can be exercised against
//! refused connections, dropped sessions, timeouts and random faults.
//! Operations are identified by name: [`CONNECT`], [`READ`], [`WRITE`].

use bridge_core::error::{DriverError, DriverErrorKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::rng::MockRng;

/// Session establishment.
pub const CONNECT: &str = "connect";
/// Cyclic read.
pub const READ: &str = "read";
/// Batch write.
pub const WRITE: &str = "write";

/// Error injection configuration.
///
/// Cloning shares the scenario state, so a clone handed to a driver and one
/// kept by a test observe the same counters.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0), `"*"` matches every operation
    failure_rates: Arc<HashMap<&'static str, f64>>,
    scenarios: Arc<Vec<ErrorScenario>>,
    rng: Arc<MockRng>,
    state: Arc<Mutex<ErrorState>>,
}

/// A scripted failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorScenario {
    /// Fail every call of `operation` after `count` successful ones.
    FailAfterN {
        /// Operation name.
        operation: &'static str,
        /// Successful calls before failures start.
        count: u32,
    },
    /// Every call of `operation` times out.
    Timeout {
        /// Operation name.
        operation: &'static str,
    },
    /// The session drops once, on the first read or write. Reconnecting works.
    CommunicationLoss,
    /// The first `attempts` connect calls are refused.
    RefuseConnect {
        /// Refused attempts before the device accepts.
        attempts: u32,
    },
}

#[derive(Default, Debug)]
struct ErrorState {
    operation_counts: HashMap<&'static str, u32>,
    communication_lost: bool,
    refused_connects: u32,
}

impl ErrorConfig {
    /// No injected errors (default).
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Uniform random failures on every operation.
    pub fn random_failures(rate: f64) -> Self {
        Self::random_failures_seeded(rate, None)
    }

    /// Uniform random failures with a fixed seed.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    /// Single scenario.
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios, checked in order.
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Custom failure rate per operation.
    pub fn with_rates(rates: HashMap<&'static str, f64>) -> Self {
        Self::build(rates, Vec::new(), None)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Whether `operation` against `endpoint` should fail, and with which error.
    pub fn check_operation(&self, endpoint: &str, operation: &'static str) -> Result<(), DriverError> {
        let mut state = self.state.lock();

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation => {
                    let current = state.operation_counts.entry(operation).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(DriverError::new(
                            endpoint,
                            kind_for(operation, DriverErrorKind::Communication),
                            format!("Injected failure after {} operations", count),
                        ));
                    }
                }
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(DriverError::new(
                        endpoint,
                        kind_for(operation, DriverErrorKind::Timeout),
                        format!("Operation '{}' timed out", operation),
                    ));
                }
                ErrorScenario::CommunicationLoss if operation != CONNECT => {
                    if !state.communication_lost {
                        state.communication_lost = true;
                        return Err(DriverError::new(
                            endpoint,
                            DriverErrorKind::ConnectionLost,
                            "Communication lost",
                        ));
                    }
                }
                ErrorScenario::RefuseConnect { attempts } if operation == CONNECT => {
                    if state.refused_connects < *attempts {
                        state.refused_connects += 1;
                        return Err(DriverError::connection(
                            endpoint,
                            format!(
                                "Connection refused (attempt {} of {})",
                                state.refused_connects, attempts
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);

        if self.rng.should_fail(rate) {
            return Err(DriverError::new(
                endpoint,
                kind_for(operation, DriverErrorKind::Communication),
                format!("Random failure on operation '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Clear counters and one-shot scenario state.
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

/// Failures while connecting are always connection errors.
fn kind_for(operation: &str, otherwise: DriverErrorKind) -> DriverErrorKind {
    if operation == CONNECT {
        DriverErrorKind::Connection
    } else {
        otherwise
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
