//! Named collection of PLC runtimes.
//!
//! The registry is an explicit value owned by the application. It builds a
//! driver per PLC through an injected [`DriverFactory`] and hands every
//! runtime the same [`EventSink`].

use bridge_core::{BridgeError, BridgeResult, DriverFactory, EventSink, PlcConfig, PlcDefaults};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::runtime::PlcRuntime;

/// What [`RuntimeRegistry::reconcile`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// PLCs that were spawned
    pub added: Vec<String>,
    /// Existing PLCs that received new settings
    pub updated: Vec<String>,
    /// PLCs that were stopped and removed
    pub removed: Vec<String>,
}

/// Runtimes keyed by PLC name.
pub struct RuntimeRegistry {
    factory: Arc<dyn DriverFactory>,
    sink: Arc<dyn EventSink>,
    runtimes: RwLock<BTreeMap<String, Arc<PlcRuntime>>>,
    defaults: RwLock<PlcDefaults>,
}

impl RuntimeRegistry {
    /// Empty registry.
    pub fn new(factory: Arc<dyn DriverFactory>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            factory,
            sink,
            runtimes: RwLock::new(BTreeMap::new()),
            defaults: RwLock::new(PlcDefaults::default()),
        }
    }

    /// Registry with the configured defaults and every configured PLC spawned.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(
        config: &BridgeConfig,
        factory: Arc<dyn DriverFactory>,
        sink: Arc<dyn EventSink>,
    ) -> BridgeResult<Self> {
        let registry = Self::new(factory, sink);
        registry.set_default_config(config.defaults.clone());
        for plc in &config.plcs {
            registry.add(plc)?;
        }
        info!(
            driver = registry.factory.driver_type(),
            plcs = registry.len(),
            "registry ready"
        );
        Ok(registry)
    }

    /// Settings used by [`get_or_create`](Self::get_or_create).
    pub fn set_default_config(&self, defaults: PlcDefaults) {
        *self.defaults.write() = defaults;
    }

    /// Current defaults.
    pub fn default_config(&self) -> PlcDefaults {
        self.defaults.read().clone()
    }

    /// Runtime registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<PlcRuntime>> {
        self.runtimes.read().get(name).cloned()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.runtimes.read().contains_key(name)
    }

    /// Spawn a runtime for `config`, or apply `config` to the runtime already
    /// registered under that name.
    pub fn add(&self, config: &PlcConfig) -> BridgeResult<Arc<PlcRuntime>> {
        if let Some(existing) = self.get(&config.name) {
            existing.apply_config(config)?;
            debug!(plc = %config.name, "applied configuration to existing runtime");
            return Ok(existing);
        }

        let mut runtimes = self.runtimes.write();
        // Another caller may have won the race between the read and write lock.
        if let Some(existing) = runtimes.get(&config.name).cloned() {
            drop(runtimes);
            existing.apply_config(config)?;
            return Ok(existing);
        }

        self.factory.validate(config)?;
        let driver = self.factory.build(config)?;
        let runtime = Arc::new(PlcRuntime::spawn(config, driver, self.sink.clone())?);
        runtimes.insert(config.name.clone(), runtime.clone());
        info!(plc = %config.name, driver = self.factory.driver_type(), "PLC added");
        Ok(runtime)
    }

    /// Runtime for `name`, spawned from the registry defaults if missing.
    pub fn get_or_create(&self, name: &str) -> BridgeResult<Arc<PlcRuntime>> {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        let config = self.default_config().to_config(name);
        self.add(&config)
    }

    /// Stop and discard the runtime registered under `name`. Returns whether
    /// it existed.
    pub async fn remove(&self, name: &str) -> bool {
        let removed = self.runtimes.write().remove(name);
        match removed {
            Some(runtime) => {
                runtime.stop().await;
                info!(plc = %name, "PLC removed");
                true
            }
            None => false,
        }
    }

    /// Registered names in order.
    pub fn names(&self) -> Vec<String> {
        self.runtimes.read().keys().cloned().collect()
    }

    /// Number of registered runtimes.
    pub fn len(&self) -> usize {
        self.runtimes.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.runtimes.read().is_empty()
    }

    /// Stop and remove every runtime.
    pub async fn clear(&self) {
        let runtimes = std::mem::take(&mut *self.runtimes.write());
        if runtimes.is_empty() {
            return;
        }
        let count = runtimes.len();
        join_all(runtimes.values().map(|runtime| runtime.stop())).await;
        info!(count, "all PLCs stopped");
    }

    /// Make the registry match `configs`: spawn new PLCs, re-apply settings
    /// to existing ones and remove those no longer listed.
    pub async fn reconcile(&self, configs: &[PlcConfig]) -> BridgeResult<ReconcileReport> {
        let mut wanted = HashSet::new();
        for config in configs {
            config.validate()?;
            if !wanted.insert(config.name.as_str()) {
                return Err(BridgeError::Configuration(format!(
                    "Duplicate PLC name: {}",
                    config.name
                )));
            }
        }

        let mut report = ReconcileReport::default();
        for name in self.names() {
            if !wanted.contains(name.as_str()) && self.remove(&name).await {
                report.removed.push(name);
            }
        }
        for config in configs {
            let existed = self.contains(&config.name);
            self.add(config)?;
            if existed {
                report.updated.push(config.name.clone());
            } else {
                report.added.push(config.name.clone());
            }
        }

        debug!(
            added = report.added.len(),
            updated = report.updated.len(),
            removed = report.removed.len(),
            "registry reconciled"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeRegistry")
            .field("driver", &self.factory.driver_type())
            .field("plcs", &self.names())
            .finish_non_exhaustive()
    }
}
