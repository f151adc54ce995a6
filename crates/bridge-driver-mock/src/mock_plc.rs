//! In-memory PLC.
//!
//! Simulates a TwinCAT target reached through an ADS router:
//! - Symbol table of flat names and scalar values
//! - Registered cyclic reads, unknown symbols reported like the router does
//! - Session state with optional reachable-endpoint restriction
//! - Counter symbols that advance on every read cycle
//! - Write history for assertions
//!
//! # Example
//!
//! ```rust
//! use bridge_core::{CommunicationDriver, PlcValue};
//! use bridge_driver_mock::MockPlc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let plc = MockPlc::builder().symbol("MAIN.x", PlcValue::Int(7)).build();
//! plc.connect("127.0.0.1.1.1").await.unwrap();
//! plc.add_read("MAIN.x").await.unwrap();
//! let values = plc.read_data().await.unwrap();
//! assert_eq!(values.get("MAIN.x"), Some(&PlcValue::Int(7)));
//! # }
//! ```

use async_trait::async_trait;
use bridge_core::{
    BridgeError, BridgeResult, CommunicationDriver, DriverError, DriverErrorKind, DriverFactory,
    DriverResult, FlatValues, PlcConfig, PlcValue, VariablePath,
};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::common::errors::{CONNECT, READ, WRITE};
use crate::common::timing::simulate;
use crate::common::{ErrorConfig, MockRng, TimingConfig};

// =============================================================================
// MockPlcFactory - DriverFactory implementation
// =============================================================================

/// Mock driver options, read from the `[plcs.driver]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MockPlcConfig {
    /// Initial symbol table.
    #[serde(default)]
    pub symbols: BTreeMap<String, PlcValue>,
    /// Symbols incremented on every read cycle.
    #[serde(default)]
    pub counters: Vec<String>,
    /// Endpoints that accept a session. Absent means any endpoint does.
    #[serde(default)]
    pub reachable: Option<Vec<String>>,
    /// Latency simulation.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Random failure rate on every operation (0.0 to 1.0).
    #[serde(default)]
    pub failure_rate: f64,
    /// Seed for failures and jitter.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl MockPlcConfig {
    /// Parse the driver table of `config`.
    pub fn from_plc_config(config: &PlcConfig) -> BridgeResult<Self> {
        let parsed: Self = toml::Value::Table(config.driver.clone())
            .try_into()
            .map_err(|e: toml::de::Error| {
                BridgeError::Configuration(format!(
                    "PLC '{}' mock driver options: {}",
                    config.name, e
                ))
            })?;

        for name in parsed.symbols.keys().chain(parsed.counters.iter()) {
            VariablePath::parse(name).map_err(|e| {
                BridgeError::Configuration(format!(
                    "PLC '{}' mock symbol '{}': {}",
                    config.name, name, e
                ))
            })?;
        }
        if !(0.0..=1.0).contains(&parsed.failure_rate) {
            return Err(BridgeError::Configuration(format!(
                "PLC '{}' mock failure_rate {} outside [0, 1]",
                config.name, parsed.failure_rate
            )));
        }

        Ok(parsed)
    }
}

/// Factory for [`MockPlc`] drivers.
///
/// Built devices are kept by PLC name and handed out again when the same PLC
/// is rebuilt, so a simulated device outlives the runtimes that talk to it.
/// Tests can pre-register a configured device with [`MockPlcFactory::with_instance`].
#[derive(Default)]
pub struct MockPlcFactory {
    instances: Mutex<HashMap<String, Arc<MockPlc>>>,
}

impl MockPlcFactory {
    /// Factory without pre-registered devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register the device used for PLC `name`.
    pub fn with_instance(self, name: impl Into<String>, plc: Arc<MockPlc>) -> Self {
        self.insert(name, plc);
        self
    }

    /// Register or replace the device used for PLC `name`.
    pub fn insert(&self, name: impl Into<String>, plc: Arc<MockPlc>) {
        self.instances.lock().insert(name.into(), plc);
    }

    /// Device serving PLC `name`, if one was built or registered.
    pub fn instance(&self, name: &str) -> Option<Arc<MockPlc>> {
        self.instances.lock().get(name).cloned()
    }
}

impl DriverFactory for MockPlcFactory {
    fn driver_type(&self) -> &'static str {
        "mock"
    }

    fn validate(&self, config: &PlcConfig) -> BridgeResult<()> {
        MockPlcConfig::from_plc_config(config).map(|_| ())
    }

    fn build(&self, config: &PlcConfig) -> BridgeResult<Arc<dyn CommunicationDriver>> {
        let mut instances = self.instances.lock();
        if let Some(existing) = instances.get(&config.name) {
            debug!(plc = %config.name, "reusing mock PLC");
            return Ok(existing.clone());
        }

        let cfg = MockPlcConfig::from_plc_config(config)?;
        let plc = Arc::new(MockPlc::from_config(&cfg));
        info!(plc = %config.name, symbols = cfg.symbols.len(), "built mock PLC");
        instances.insert(config.name.clone(), plc.clone());
        Ok(plc)
    }
}

// =============================================================================
// MockPlc
// =============================================================================

/// Simulated PLC implementing [`CommunicationDriver`].
pub struct MockPlc {
    symbols: RwLock<FlatValues>,
    counters: Vec<String>,
    reads: Mutex<Vec<String>>,
    reachable: Option<HashSet<String>>,
    connected: AtomicBool,
    endpoint: RwLock<Option<String>>,
    writes: Mutex<Vec<FlatValues>>,
    connect_attempts: AtomicU64,
    read_cycles: AtomicU64,
    timing: TimingConfig,
    error_config: ErrorConfig,
    rng: MockRng,
}

impl MockPlc {
    /// Empty, instant, error-free device.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Builder for custom configuration.
    pub fn builder() -> MockPlcBuilder {
        MockPlcBuilder::default()
    }

    /// Device described by parsed driver options.
    pub fn from_config(config: &MockPlcConfig) -> Self {
        let mut builder = Self::builder()
            .symbols(config.symbols.clone())
            .counters(config.counters.iter().cloned())
            .timing(config.timing)
            .seed(config.seed);
        if let Some(reachable) = &config.reachable {
            builder = builder.reachable(reachable.iter().cloned());
        }
        if config.failure_rate > 0.0 {
            builder = builder.error_config(ErrorConfig::random_failures_seeded(
                config.failure_rate,
                config.seed,
            ));
        }
        builder.build()
    }

    /// Set a symbol, creating it if needed.
    pub fn set_symbol(&self, name: impl Into<String>, value: impl Into<PlcValue>) {
        self.symbols.write().insert(name.into(), value.into());
    }

    /// Remove a symbol (simulates an online change deleting a variable).
    pub fn remove_symbol(&self, name: &str) -> Option<PlcValue> {
        self.symbols.write().remove(name)
    }

    /// Current value of a symbol.
    pub fn symbol(&self, name: &str) -> Option<PlcValue> {
        self.symbols.read().get(name).cloned()
    }

    /// Registered cyclic reads, in registration order.
    pub fn registered_reads(&self) -> Vec<String> {
        self.reads.lock().clone()
    }

    /// Every accepted write batch, oldest first.
    pub fn writes(&self) -> Vec<FlatValues> {
        self.writes.lock().clone()
    }

    /// Number of connect calls so far.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of successful read cycles so far.
    pub fn read_cycles(&self) -> u64 {
        self.read_cycles.load(Ordering::SeqCst)
    }

    /// Endpoint of the last successful connect.
    pub fn connected_endpoint(&self) -> Option<String> {
        self.endpoint.read().clone()
    }

    /// Drop the session from the device side (router restart, cable pulled).
    pub fn drop_session(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(endpoint = %self.endpoint_label(), "mock PLC dropped session");
        }
    }

    /// Error injection shared with this device.
    pub fn error_config(&self) -> &ErrorConfig {
        &self.error_config
    }

    fn endpoint_label(&self) -> String {
        self.endpoint
            .read()
            .clone()
            .unwrap_or_else(|| "<none>".to_string())
    }

    fn ensure_connected(&self) -> DriverResult<String> {
        let endpoint = self.endpoint_label();
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DriverError::new(
                endpoint,
                DriverErrorKind::ConnectionLost,
                "not connected",
            ));
        }
        Ok(endpoint)
    }

    fn check(&self, endpoint: &str, operation: &'static str) -> DriverResult<()> {
        self.error_config
            .check_operation(endpoint, operation)
            .inspect_err(|e| {
                if e.kind == DriverErrorKind::ConnectionLost {
                    self.connected.store(false, Ordering::SeqCst);
                }
            })
    }

    fn advance_counters(&self, symbols: &mut FlatValues) {
        for name in &self.counters {
            let value = symbols.entry(name.clone()).or_insert(PlcValue::Int(0));
            match value {
                PlcValue::Int(n) => *n = n.wrapping_add(1),
                PlcValue::Float(f) => *f += 1.0,
                _ => {}
            }
        }
    }
}

impl Default for MockPlc {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockPlc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPlc")
            .field("symbols", &self.symbols.read().len())
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("endpoint", &self.endpoint_label())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CommunicationDriver for MockPlc {
    async fn connect(&self, endpoint: &str) -> DriverResult<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        simulate(self.timing.connect_delay()).await;

        if let Some(reachable) = &self.reachable {
            if !reachable.contains(endpoint) {
                return Err(DriverError::connection(
                    endpoint,
                    format!("no route to {}", endpoint),
                ));
            }
        }
        self.check(endpoint, CONNECT)?;

        *self.endpoint.write() = Some(endpoint.to_string());
        self.connected.store(true, Ordering::SeqCst);
        debug!(endpoint, "mock PLC session opened");
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!(endpoint = %self.endpoint_label(), "mock PLC session closed");
        }
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn add_read(&self, path: &str) -> DriverResult<()> {
        let mut reads = self.reads.lock();
        if !reads.iter().any(|r| r == path) {
            reads.push(path.to_string());
        }
        Ok(())
    }

    async fn read_data(&self) -> DriverResult<FlatValues> {
        let endpoint = self.ensure_connected()?;
        simulate(self.timing.communication_delay(&self.rng)).await;
        self.check(&endpoint, READ)?;

        let reads = self.reads.lock().clone();
        let mut symbols = self.symbols.write();
        self.advance_counters(&mut symbols);

        let mut values = FlatValues::new();
        for name in reads {
            match symbols.get(&name) {
                Some(value) => {
                    values.insert(name, value.clone());
                }
                None => return Err(DriverError::unknown_symbol(endpoint, &name)),
            }
        }

        self.read_cycles.fetch_add(1, Ordering::SeqCst);
        Ok(values)
    }

    async fn write_data(&self, values: &FlatValues) -> DriverResult<()> {
        let endpoint = self.ensure_connected()?;
        simulate(self.timing.communication_delay(&self.rng)).await;
        self.check(&endpoint, WRITE)?;

        {
            let mut symbols = self.symbols.write();
            if let Some(missing) = values.keys().find(|name| !symbols.contains_key(*name)) {
                return Err(DriverError::unknown_symbol(endpoint, missing));
            }
            for (name, value) in values {
                symbols.insert(name.clone(), value.clone());
            }
        }

        self.writes.lock().push(values.clone());
        Ok(())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`MockPlc`].
#[derive(Debug, Default)]
pub struct MockPlcBuilder {
    symbols: FlatValues,
    counters: Vec<String>,
    reachable: Option<HashSet<String>>,
    timing: TimingConfig,
    error_config: Option<ErrorConfig>,
    seed: Option<u64>,
}

impl MockPlcBuilder {
    /// Add one symbol.
    pub fn symbol(mut self, name: impl Into<String>, value: impl Into<PlcValue>) -> Self {
        self.symbols.insert(name.into(), value.into());
        self
    }

    /// Add several symbols.
    pub fn symbols(mut self, symbols: impl IntoIterator<Item = (String, PlcValue)>) -> Self {
        self.symbols.extend(symbols);
        self
    }

    /// Symbols incremented on every read cycle.
    pub fn counters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.counters.extend(names.into_iter().map(Into::into));
        self
    }

    /// Restrict the endpoints that accept a session.
    pub fn reachable<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reachable = Some(endpoints.into_iter().map(Into::into).collect());
        self
    }

    /// Latency simulation.
    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Error injection.
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = Some(config);
        self
    }

    /// Seed for latency jitter.
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Build the device, initially disconnected.
    pub fn build(self) -> MockPlc {
        MockPlc {
            symbols: RwLock::new(self.symbols),
            counters: self.counters,
            reads: Mutex::new(Vec::new()),
            reachable: self.reachable,
            connected: AtomicBool::new(false),
            endpoint: RwLock::new(None),
            writes: Mutex::new(Vec::new()),
            connect_attempts: AtomicU64::new(0),
            read_cycles: AtomicU64::new(0),
            timing: self.timing,
            error_config: self.error_config.unwrap_or_default(),
            rng: MockRng::new(self.seed),
        }
    }
}
