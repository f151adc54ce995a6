//! One live PLC: supervisor, coalescer and the two scheduler tasks.
//!
//! A [`PlcRuntime`] is the caller-facing handle. Setters only touch atomics
//! or short-held locks in [`RuntimeShared`]; the loops pick the new values up
//! on their next tick.

use bridge_core::config::clamp_refresh_ms;
use bridge_core::{
    BridgeEvent, BridgeResult, CommunicationDriver, ConnectionState, EventSink,
    PathError, PlcConfig, PlcValue, ValueTree, VariablePath,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coalescer::WriteCoalescer;
use crate::scheduler::{read_loop, write_loop};
use crate::supervisor::ConnectionSupervisor;

/// State shared between a runtime handle and its loops.
pub(crate) struct RuntimeShared {
    pub(crate) name: String,
    enabled: AtomicBool,
    refresh_ms: AtomicU64,
    endpoint: RwLock<String>,
    read_variables: RwLock<Vec<VariablePath>>,
    pub(crate) coalescer: WriteCoalescer,
    latest: RwLock<Option<Arc<ValueTree>>>,
    pub(crate) driver: Arc<dyn CommunicationDriver>,
    pub(crate) sink: Arc<dyn EventSink>,
    driver_options: toml::Table,
}

impl RuntimeShared {
    pub(crate) fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn endpoint(&self) -> String {
        self.endpoint.read().clone()
    }

    pub(crate) fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.load(Ordering::Acquire))
    }

    /// Read variables from index `start` on, copied out of the lock.
    pub(crate) fn read_variables_from(&self, start: usize) -> Vec<VariablePath> {
        self.read_variables
            .read()
            .get(start..)
            .map(<[VariablePath]>::to_vec)
            .unwrap_or_default()
    }

    pub(crate) fn read_variable_names(&self) -> Vec<String> {
        self.read_variables
            .read()
            .iter()
            .map(|p| p.as_str().to_string())
            .collect()
    }

    pub(crate) fn publish(&self, tree: Arc<ValueTree>) {
        *self.latest.write() = Some(tree);
    }

    pub(crate) fn emit_status(&self, message: String) {
        self.sink.emit(BridgeEvent::status(&self.name, message));
    }
}

/// Handle to a running PLC.
///
/// Created by [`PlcRuntime::spawn`], which must be called from within a tokio
/// runtime. [`stop`](Self::stop) terminates both loops and disconnects;
/// dropping the handle only signals them.
pub struct PlcRuntime {
    shared: Arc<RuntimeShared>,
    state_rx: watch::Receiver<ConnectionState>,
    stop_tx: watch::Sender<bool>,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl PlcRuntime {
    /// Validate `config`, emit `Initialized` and start the read and write loops.
    pub fn spawn(
        config: &PlcConfig,
        driver: Arc<dyn CommunicationDriver>,
        sink: Arc<dyn EventSink>,
    ) -> BridgeResult<Self> {
        config.validate()?;

        let mut read_variables: Vec<VariablePath> = Vec::new();
        for name in &config.read_variables {
            let path = VariablePath::parse(name)?;
            if !read_variables.contains(&path) {
                read_variables.push(path);
            }
        }

        let shared = Arc::new(RuntimeShared {
            name: config.name.clone(),
            enabled: AtomicBool::new(config.enabled),
            refresh_ms: AtomicU64::new(config.effective_refresh_ms()),
            endpoint: RwLock::new(config.endpoint.clone()),
            read_variables: RwLock::new(read_variables),
            coalescer: WriteCoalescer::new(),
            latest: RwLock::new(None),
            driver,
            sink,
            driver_options: config.driver.clone(),
        });

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disabled);
        let (stop_tx, stop_rx) = watch::channel(false);

        shared.sink.emit(BridgeEvent::initialized(&shared.name));

        let supervisor = ConnectionSupervisor::new(
            shared.name.clone(),
            shared.driver.clone(),
            shared.sink.clone(),
            state_tx,
        );
        let reader = tokio::spawn(read_loop(shared.clone(), supervisor, stop_rx.clone()));
        let writer = tokio::spawn(write_loop(shared.clone(), state_rx.clone(), stop_rx));

        info!(
            plc = %shared.name,
            endpoint = %config.endpoint,
            enabled = config.enabled,
            refresh_ms = config.effective_refresh_ms(),
            "PLC runtime started"
        );

        Ok(Self {
            shared,
            state_rx,
            stop_tx,
            tasks: Mutex::new(Some((reader, writer))),
        })
    }

    /// PLC name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Desired connection flag.
    pub fn enabled(&self) -> bool {
        self.shared.enabled()
    }

    /// Set the desired connection flag and emit `Enabled`.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
        debug!(plc = %self.shared.name, enabled, "enabled flag set");
        self.shared
            .sink
            .emit(BridgeEvent::enabled(&self.shared.name, enabled));
    }

    /// Read period in milliseconds.
    pub fn refresh_rate(&self) -> u64 {
        self.shared.refresh_ms.load(Ordering::Acquire)
    }

    /// Set the read period. Out-of-range values are clamped; returns the
    /// applied period.
    pub fn set_refresh_rate(&self, ms: u64) -> u64 {
        let applied = clamp_refresh_ms(ms);
        if applied != ms {
            warn!(plc = %self.shared.name, requested = ms, applied, "refresh rate clamped");
        }
        self.shared.refresh_ms.store(applied, Ordering::Release);
        applied
    }

    /// Current endpoint.
    pub fn endpoint(&self) -> String {
        self.shared.endpoint()
    }

    /// Change the endpoint. An open session is moved on the next tick.
    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        debug!(plc = %self.shared.name, endpoint = %endpoint, "endpoint set");
        *self.shared.endpoint.write() = endpoint;
    }

    /// Add a variable to the cyclic read list. Returns whether it was new.
    pub fn add_cyclic_read_variable(&self, path: &str) -> Result<bool, PathError> {
        let path = VariablePath::parse(path)?;
        let mut variables = self.shared.read_variables.write();
        if variables.contains(&path) {
            return Ok(false);
        }
        debug!(plc = %self.shared.name, variable = %path, "read variable added");
        variables.push(path);
        Ok(true)
    }

    /// Add several variables. Nothing is added unless all of them parse;
    /// returns how many were new.
    pub fn add_cyclic_read_variables<I, S>(&self, paths: I) -> Result<usize, PathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = paths
            .into_iter()
            .map(|p| VariablePath::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut variables = self.shared.read_variables.write();
        let mut added = 0;
        for path in parsed {
            if !variables.contains(&path) {
                variables.push(path);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Cyclic read list in registration order.
    pub fn read_variables(&self) -> Vec<String> {
        self.shared.read_variable_names()
    }

    /// Queue a write, replacing any unflushed value for the same variable.
    pub fn queue_write(&self, path: &str, value: impl Into<PlcValue>) -> Result<(), PathError> {
        let path = VariablePath::parse(path)?;
        self.shared.coalescer.queue(path.as_str(), value.into());
        Ok(())
    }

    /// Writes queued but not yet handed to the driver.
    pub fn pending_writes(&self) -> usize {
        self.shared.coalescer.len()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Tree published by the last successful read.
    pub fn latest_data(&self) -> Option<Arc<ValueTree>> {
        self.shared.latest.read().clone()
    }

    /// Snapshot of the current settings.
    pub fn config(&self) -> PlcConfig {
        PlcConfig {
            name: self.shared.name.clone(),
            endpoint: self.endpoint(),
            enabled: self.enabled(),
            refresh_ms: self.refresh_rate(),
            read_variables: self.read_variables(),
            driver: self.shared.driver_options.clone(),
        }
    }

    /// Apply every setting of `config` to this runtime.
    ///
    /// Read variables are added to the list, never removed. Driver options
    /// only take effect when the runtime is rebuilt.
    pub fn apply_config(&self, config: &PlcConfig) -> BridgeResult<()> {
        config.validate()?;
        self.add_cyclic_read_variables(&config.read_variables)?;
        if self.endpoint() != config.endpoint {
            self.set_endpoint(config.endpoint.clone());
        }
        self.set_refresh_rate(config.refresh_ms);
        if self.enabled() != config.enabled {
            self.set_enabled(config.enabled);
        }
        Ok(())
    }

    /// Whether [`stop`](Self::stop) has not been called yet.
    pub fn is_running(&self) -> bool {
        !*self.stop_tx.borrow() && self.tasks.lock().is_some()
    }

    /// Stop both loops and disconnect. Safe to call more than once.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        let tasks = self.tasks.lock().take();
        let Some((reader, writer)) = tasks else {
            return;
        };

        if let Err(e) = reader.await {
            // The read loop owns the session; close it here if it never got to.
            warn!(plc = %self.shared.name, task = "read", error = %e, "loop task failed");
            self.shared.driver.disconnect().await;
        }
        if let Err(e) = writer.await {
            warn!(plc = %self.shared.name, task = "write", error = %e, "loop task failed");
        }
        info!(plc = %self.shared.name, "PLC runtime stopped");
    }
}

impl Drop for PlcRuntime {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

impl std::fmt::Debug for PlcRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlcRuntime")
            .field("name", &self.shared.name)
            .field("enabled", &self.enabled())
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::NullSink;
    use bridge_driver_mock::MockPlc;

    fn runtime(config: PlcConfig) -> PlcRuntime {
        PlcRuntime::spawn(&config, Arc::new(MockPlc::new()), Arc::new(NullSink)).unwrap()
    }

    #[tokio::test]
    async fn spawn_rejects_invalid_config() {
        let config = PlcConfig::new("PLC1").with_read_variables(["MAIN..x"]);
        let err = PlcRuntime::spawn(&config, Arc::new(MockPlc::new()), Arc::new(NullSink))
            .unwrap_err();
        assert!(err.to_string().contains("MAIN..x"));
    }

    #[tokio::test]
    async fn oversized_indices_are_rejected() {
        let config = PlcConfig::new("PLC1").with_read_variables(["M.a[18446744073709551615]"]);
        assert!(PlcRuntime::spawn(&config, Arc::new(MockPlc::new()), Arc::new(NullSink)).is_err());

        let rt = runtime(PlcConfig::new("PLC1"));
        assert!(rt.add_cyclic_read_variable("M.a[4000000000000]").is_err());
        assert!(rt.add_cyclic_read_variables(["M.x", "M.b[18446744073709551615]"]).is_err());
        assert!(rt.read_variables().is_empty());
        rt.stop().await;
    }

    #[tokio::test]
    async fn read_variables_are_deduplicated() {
        let rt = runtime(PlcConfig::new("PLC1").with_read_variables(["MAIN.a", "MAIN.a"]));
        assert_eq!(rt.read_variables(), vec!["MAIN.a"]);
        assert!(!rt.add_cyclic_read_variable("MAIN.a").unwrap());
        assert!(rt.add_cyclic_read_variable("MAIN.b[2]").unwrap());
        assert!(rt.add_cyclic_read_variable("MAIN.b[").is_err());
        assert_eq!(rt.read_variables(), vec!["MAIN.a", "MAIN.b[2]"]);
        rt.stop().await;
    }

    #[tokio::test]
    async fn bulk_add_is_all_or_nothing() {
        let rt = runtime(PlcConfig::new("PLC1"));
        assert!(rt.add_cyclic_read_variables(["MAIN.a", "bad..name"]).is_err());
        assert!(rt.read_variables().is_empty());
        assert_eq!(rt.add_cyclic_read_variables(["MAIN.a", "MAIN.b", "MAIN.a"]).unwrap(), 2);
        rt.stop().await;
    }

    #[tokio::test]
    async fn refresh_rate_is_clamped() {
        let rt = runtime(PlcConfig::new("PLC1"));
        assert_eq!(rt.refresh_rate(), 20);
        assert_eq!(rt.set_refresh_rate(1), 10);
        assert_eq!(rt.set_refresh_rate(20_000), 10_000);
        assert_eq!(rt.set_refresh_rate(250), 250);
        assert_eq!(rt.refresh_rate(), 250);
        rt.stop().await;
    }

    #[tokio::test]
    async fn queue_write_validates_path() {
        let rt = runtime(PlcConfig::new("PLC1"));
        assert!(rt.queue_write("MAIN.x[", 1).is_err());
        rt.queue_write("MAIN.x", 1).unwrap();
        rt.queue_write("MAIN.x", 2).unwrap();
        assert_eq!(rt.pending_writes(), 1);
        rt.stop().await;
    }

    #[tokio::test]
    async fn config_snapshot_round_trips_settings() {
        let rt = runtime(PlcConfig::new("PLC1"));
        let target = PlcConfig::new("PLC1")
            .with_endpoint("5.1.2.3.1.1")
            .with_refresh_ms(100)
            .with_read_variables(["MAIN.a"]);
        rt.apply_config(&target).unwrap();

        let snapshot = rt.config();
        assert_eq!(snapshot.endpoint, "5.1.2.3.1.1");
        assert_eq!(snapshot.refresh_ms, 100);
        assert_eq!(snapshot.read_variables, vec!["MAIN.a"]);
        assert!(!snapshot.enabled);
        rt.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let rt = runtime(PlcConfig::new("PLC1"));
        assert!(rt.is_running());
        rt.stop().await;
        rt.stop().await;
        assert!(!rt.is_running());
        assert_eq!(rt.connection_state(), ConnectionState::Disabled);
    }
}
