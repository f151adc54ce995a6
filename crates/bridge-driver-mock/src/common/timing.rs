//! Latency simulation.
//!
//! Delays are applied with `tokio::time::sleep` so mock calls behave like
//! real network round-trips without blocking the runtime.

use serde::Deserialize;
use std::time::Duration;

use super::rng::MockRng;

/// Simulated round-trip timing of an ADS route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct TimingConfig {
    /// Time to open a session, in milliseconds.
    #[serde(default)]
    pub connect_delay_ms: u64,
    /// Base delay of every read or write, in milliseconds.
    #[serde(default)]
    pub communication_delay_ms: u64,
    /// Extra uniformly distributed delay added to each read or write, in milliseconds.
    #[serde(default)]
    pub jitter_ms: u64,
}

impl TimingConfig {
    /// No delays at all (default).
    pub fn instant() -> Self {
        Self::default()
    }

    /// Router on the same host.
    pub fn local_router() -> Self {
        Self {
            connect_delay_ms: 5,
            communication_delay_ms: 1,
            jitter_ms: 0,
        }
    }

    /// Target reached over the plant network.
    pub fn remote_router() -> Self {
        Self {
            connect_delay_ms: 50,
            communication_delay_ms: 4,
            jitter_ms: 3,
        }
    }

    /// Delay of one connect call.
    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    /// Delay of one read or write, jitter included.
    pub fn communication_delay(&self, rng: &MockRng) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rng.gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.communication_delay_ms + jitter)
    }
}

/// Sleep for `delay` unless it is zero.
pub(crate) async fn simulate(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
