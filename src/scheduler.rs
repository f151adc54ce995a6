//! Read and write loops of a PLC runtime.
//!
//! Each runtime runs two tokio tasks:
//!
//! - **read loop**: registers new read variables, ticks the
//!   [`ConnectionSupervisor`], reads every registered symbol and merges the
//!   result into the runtime's persistent [`ValueTree`]. Paced by a [`Pacer`].
//! - **write loop**: drains the [`WriteCoalescer`](crate::coalescer::WriteCoalescer)
//!   and hands the batch to the driver while the session is open.
//!
//! Both observe a shared `watch<bool>` stop signal at every iteration and
//! inside every sleep. Driver calls already in flight are never aborted.

use bridge_core::codec::merge_flat;
use bridge_core::{
    BridgeEvent, ConnectionState, DriverError, DriverErrorKind, FlatValues, ValueTree,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::runtime::RuntimeShared;
use crate::supervisor::ConnectionSupervisor;

/// Sleep of the read loop while no session is open.
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(1);

/// Sleep of the write loop while nothing is pending or no session is open.
pub const WRITE_IDLE_INTERVAL: Duration = Duration::from_millis(5);

// =============================================================================
// Pacer
// =============================================================================

/// Drift-corrected fixed-period cadence.
///
/// Each deadline is the previous one plus the period, so jitter in how long
/// a cycle takes never accumulates. A cycle that overruns its deadline
/// re-anchors the phase at the current time instead of bursting to catch up.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    anchor: Instant,
}

impl Pacer {
    /// Pacer whose first deadline is one period after `start`.
    pub fn new(start: Instant) -> Self {
        Self { anchor: start }
    }

    /// Restart the phase at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.anchor = now;
    }

    /// How long to wait at `now` before the next cycle. Zero means the cycle
    /// overran and the caller should only yield.
    pub fn next_delay(&mut self, period: Duration, now: Instant) -> Duration {
        let deadline = self.anchor + period;
        if deadline > now {
            self.anchor = deadline;
            deadline - now
        } else {
            self.anchor = now;
            Duration::ZERO
        }
    }
}

// =============================================================================
// Stop Signal
// =============================================================================

/// Stop requested, or the runtime owning the sender is gone.
fn stopped(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

/// Sleep for `duration` unless stopped first. Returns whether to stop.
async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if stopped(stop) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        changed = stop.changed() => {
            if changed.is_err() {
                return true;
            }
        }
    }
    stopped(stop)
}

// =============================================================================
// Read Loop
// =============================================================================

pub(crate) async fn read_loop(
    shared: Arc<RuntimeShared>,
    mut supervisor: ConnectionSupervisor,
    mut stop: watch::Receiver<bool>,
) {
    let mut tree = ValueTree::new();
    let mut registered = 0;
    let mut pacer = Pacer::new(Instant::now());
    debug!(plc = %shared.name, "read loop started");

    while !stopped(&stop) {
        registered = register_reads(&shared, registered).await;

        let endpoint = shared.endpoint();
        let state = supervisor.tick(shared.enabled(), &endpoint).await;
        if state != ConnectionState::Connected {
            if sleep_or_stop(&mut stop, FALLBACK_INTERVAL).await {
                break;
            }
            pacer.reset(Instant::now());
            continue;
        }

        read_cycle(&shared, &mut supervisor, &mut tree).await;

        let delay = pacer.next_delay(shared.refresh_period(), Instant::now());
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else if sleep_or_stop(&mut stop, delay).await {
            break;
        }
    }

    supervisor.shutdown().await;
    debug!(plc = %shared.name, "read loop stopped");
}

/// Register variables added since the last call. Returns the new count of
/// registered variables; a failure leaves the rest for the next cycle.
async fn register_reads(shared: &RuntimeShared, registered: usize) -> usize {
    let pending = shared.read_variables_from(registered);
    let mut count = registered;

    for path in pending {
        if let Err(e) = shared.driver.add_read(path.as_str()).await {
            warn!(plc = %shared.name, variable = %path, error = %e, "failed to register read");
            break;
        }
        trace!(plc = %shared.name, variable = %path, "registered read");
        count += 1;
    }
    count
}

async fn read_cycle(
    shared: &RuntimeShared,
    supervisor: &mut ConnectionSupervisor,
    tree: &mut ValueTree,
) {
    match shared.driver.read_data().await {
        Ok(values) if values.is_empty() => {
            trace!(plc = %shared.name, "no read variables registered");
        }
        Ok(values) => {
            let count = values.len();
            for rejected in merge_flat(tree, values) {
                warn!(
                    plc = %shared.name,
                    name = %rejected.name,
                    error = %rejected.error,
                    "skipping unparseable symbol"
                );
                shared.emit_status(format!(
                    "Invalid variable path '{}': {}",
                    rejected.name, rejected.error
                ));
            }

            let snapshot = Arc::new(tree.clone());
            shared.publish(snapshot.clone());
            trace!(plc = %shared.name, count, "read cycle complete");
            shared.sink.emit(BridgeEvent::data(&shared.name, snapshot));
        }
        Err(e) => {
            warn!(plc = %shared.name, error = %e, "read failed");
            shared.emit_status(format!("Error reading: {}", e));
            if e.kind == DriverErrorKind::UnknownSymbol {
                let names = shared.read_variable_names();
                shared.emit_status(format!("Error reading one of: [{}]", names.join(", ")));
            }
            if e.is_connection_lost() {
                supervisor.mark_lost();
            }
        }
    }
}

// =============================================================================
// Write Loop
// =============================================================================

pub(crate) async fn write_loop(
    shared: Arc<RuntimeShared>,
    state: watch::Receiver<ConnectionState>,
    mut stop: watch::Receiver<bool>,
) {
    debug!(plc = %shared.name, "write loop started");

    while !stopped(&stop) {
        let connected = state.borrow().is_connected();
        if connected && !shared.coalescer.is_empty() {
            let batch: FlatValues = shared.coalescer.drain().into_iter().collect();
            if let Err(e) = write_batch(&shared, &batch).await {
                report_write_error(&shared, &batch, &e);
            }
            continue;
        }

        if sleep_or_stop(&mut stop, WRITE_IDLE_INTERVAL).await {
            break;
        }
    }

    let dropped = shared.coalescer.len();
    if dropped > 0 {
        debug!(plc = %shared.name, dropped, "write loop stopped with pending writes");
    } else {
        debug!(plc = %shared.name, "write loop stopped");
    }
}

async fn write_batch(shared: &RuntimeShared, batch: &FlatValues) -> Result<(), DriverError> {
    shared.driver.write_data(batch).await?;
    trace!(plc = %shared.name, count = batch.len(), "write batch flushed");
    Ok(())
}

/// Writes are at-most-once: a failed batch is reported and dropped.
fn report_write_error(shared: &RuntimeShared, batch: &FlatValues, e: &DriverError) {
    warn!(
        plc = %shared.name,
        error = %e,
        count = batch.len(),
        "write failed, dropping batch"
    );
    shared.emit_status(format!("Error writing: {}", e));
    if e.kind == DriverErrorKind::UnknownSymbol {
        let names: Vec<&str> = batch.keys().map(String::as_str).collect();
        shared.emit_status(format!("Error writing one of: [{}]", names.join(", ")));
    }
}
