//! Per-PLC registration entry.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::path::VariablePath;

/// Endpoint used when none is configured (local ADS router).
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1.1.1";

/// Default read cadence.
pub const DEFAULT_REFRESH_MS: u64 = 20;

/// Fastest accepted read cadence.
pub const MIN_REFRESH_MS: u64 = 10;

/// Slowest accepted read cadence.
pub const MAX_REFRESH_MS: u64 = 10_000;

/// Clamp a requested refresh period into `[MIN_REFRESH_MS, MAX_REFRESH_MS]`.
pub fn clamp_refresh_ms(ms: u64) -> u64 {
    ms.clamp(MIN_REFRESH_MS, MAX_REFRESH_MS)
}

/// Split a comma-separated variable list, trimming blanks and dropping empty
/// entries.
pub fn split_variable_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// One PLC as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlcConfig {
    /// Unique name, used as registry key and event tag.
    pub name: String,
    /// AMS Net ID of the target.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Whether the runtime should hold a connection.
    #[serde(default)]
    pub enabled: bool,
    /// Read period in milliseconds.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
    /// Variables read every cycle.
    #[serde(default)]
    pub read_variables: Vec<String>,
    /// Driver-specific options, passed through to the factory untouched.
    #[serde(default)]
    pub driver: toml::Table,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_refresh_ms() -> u64 {
    DEFAULT_REFRESH_MS
}

impl PlcConfig {
    /// Configuration with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: default_endpoint(),
            enabled: false,
            refresh_ms: DEFAULT_REFRESH_MS,
            read_variables: Vec::new(),
            driver: toml::Table::new(),
        }
    }

    /// Set the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the refresh period (clamped when applied to a runtime).
    pub fn with_refresh_ms(mut self, refresh_ms: u64) -> Self {
        self.refresh_ms = refresh_ms;
        self
    }

    /// Append read variables.
    pub fn with_read_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_variables.extend(variables.into_iter().map(Into::into));
        self
    }

    /// Set one driver option.
    pub fn with_driver_option(mut self, key: impl Into<String>, value: toml::Value) -> Self {
        self.driver.insert(key.into(), value);
        self
    }

    /// Refresh period as it will be applied.
    pub fn effective_refresh_ms(&self) -> u64 {
        clamp_refresh_ms(self.refresh_ms)
    }

    /// Check the name and every read variable.
    ///
    /// An out-of-range refresh period is not an error; it is clamped on apply.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.name.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "PLC name must not be empty".to_string(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(BridgeError::Configuration(format!(
                "PLC '{}' has an empty endpoint",
                self.name
            )));
        }
        for variable in &self.read_variables {
            VariablePath::parse(variable).map_err(|e| {
                BridgeError::Configuration(format!(
                    "PLC '{}' read variable '{}': {}",
                    self.name, variable, e
                ))
            })?;
        }
        Ok(())
    }
}

/// Registry defaults applied to PLCs created on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlcDefaults {
    /// Endpoint for new PLCs.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Enabled flag for new PLCs.
    #[serde(default)]
    pub enabled: bool,
    /// Refresh period for new PLCs.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
}

impl Default for PlcDefaults {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            enabled: false,
            refresh_ms: DEFAULT_REFRESH_MS,
        }
    }
}

impl PlcDefaults {
    /// Build a configuration for `name` from these defaults.
    pub fn to_config(&self, name: impl Into<String>) -> PlcConfig {
        PlcConfig::new(name)
            .with_endpoint(self.endpoint.clone())
            .with_enabled(self.enabled)
            .with_refresh_ms(self.refresh_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_router() {
        let config = PlcConfig::new("PLC1");
        assert_eq!(config.endpoint, "127.0.0.1.1.1");
        assert!(!config.enabled);
        assert_eq!(config.refresh_ms, 20);
        assert!(config.read_variables.is_empty());
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config: PlcConfig = toml::from_str(r#"name = "PLC1""#).unwrap();
        assert_eq!(config, PlcConfig::new("PLC1"));
    }

    #[test]
    fn deserialize_driver_table() {
        let config: PlcConfig = toml::from_str(
            r#"
            name = "PLC1"
            read_variables = ["MAIN.x"]
            [driver]
            symbols = { "MAIN.x" = 7 }
            "#,
        )
        .unwrap();
        assert_eq!(config.read_variables, vec!["MAIN.x"]);
        let symbols = config.driver.get("symbols").and_then(|v| v.as_table()).unwrap();
        assert_eq!(symbols.get("MAIN.x").and_then(|v| v.as_integer()), Some(7));
    }

    #[test]
    fn refresh_is_clamped() {
        assert_eq!(clamp_refresh_ms(1), MIN_REFRESH_MS);
        assert_eq!(clamp_refresh_ms(50), 50);
        assert_eq!(clamp_refresh_ms(60_000), MAX_REFRESH_MS);
        assert_eq!(PlcConfig::new("p").with_refresh_ms(0).effective_refresh_ms(), 10);
    }

    #[test]
    fn comma_list_is_trimmed() {
        assert_eq!(
            split_variable_list(" MAIN.a , MAIN.b[1],, "),
            vec!["MAIN.a", "MAIN.b[1]"]
        );
        assert!(split_variable_list("").is_empty());
    }

    #[test]
    fn validate_rejects_bad_entries() {
        assert!(PlcConfig::new("").validate().is_err());
        assert!(PlcConfig::new("p").with_endpoint(" ").validate().is_err());

        let err = PlcConfig::new("p")
            .with_read_variables(["MAIN.ok", "MAIN..bad"])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("MAIN..bad"));

        assert!(PlcConfig::new("p")
            .with_read_variables(["MAIN.ok[3]"])
            .validate()
            .is_ok());
    }

    #[test]
    fn defaults_build_config() {
        let defaults = PlcDefaults {
            endpoint: "5.1.2.3.1.1".to_string(),
            enabled: true,
            refresh_ms: 100,
        };
        let config = defaults.to_config("cell");
        assert_eq!(config.name, "cell");
        assert_eq!(config.endpoint, "5.1.2.3.1.1");
        assert!(config.enabled);
        assert_eq!(config.refresh_ms, 100);
    }
}
