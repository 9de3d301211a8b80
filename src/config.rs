//! Simulator configuration, loaded once from TOML and passed to constructors.
//!
//! ```toml
//! [battery]
//! min_voltage = 0.0
//! max_voltage = 5.0
//! peer = "127.0.0.1:5001"
//!
//! [temperature]
//! base = 20.0
//! amplitude = 5.0
//! period_secs = 60.0
//!
//! [thermostat]
//! listen = "127.0.0.1:5003"
//! device = "127.0.0.1:5004"
//! ```
//!
//! Missing sections and keys take their defaults.

use crate::generator::{GeneratorError, SinusoidalVariation};
use crate::protocol::{SETPOINT_MAX_C, SETPOINT_MIN_C};
use crate::record::{Bounds, InvalidBounds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub min_voltage: f64,
    pub max_voltage: f64,
    pub initial_voltage: f64,
    pub interval_ms: u64,
    /// Address receiving the telemetry lines.
    pub peer: String,
    pub send_timeout_ms: u64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            min_voltage: 0.0,
            max_voltage: 5.0,
            initial_voltage: 3.7,
            interval_ms: 1000,
            peer: "127.0.0.1:5001".into(),
            send_timeout_ms: 2000,
        }
    }
}

impl BatteryConfig {
    pub fn bounds(&self) -> Result<Bounds, InvalidBounds> {
        Bounds::new(self.min_voltage, self.max_voltage)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureConfig {
    pub min: f64,
    pub max: f64,
    pub base: f64,
    pub amplitude: f64,
    pub period_secs: f64,
    pub interval_ms: u64,
    pub peer: String,
    pub send_timeout_ms: u64,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            min: -10.0,
            max: 40.0,
            base: 20.0,
            amplitude: 5.0,
            period_secs: 60.0,
            interval_ms: 1000,
            peer: "127.0.0.1:5002".into(),
            send_timeout_ms: 2000,
        }
    }
}

impl TemperatureConfig {
    pub fn bounds(&self) -> Result<Bounds, InvalidBounds> {
        Bounds::new(self.min, self.max)
    }

    pub fn variation(&self) -> Result<SinusoidalVariation, GeneratorError> {
        SinusoidalVariation::from_secs(self.base, self.amplitude, self.period_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermostatConfig {
    /// Where the device reports its state.
    pub listen: String,
    /// Where commands are delivered.
    pub device: String,
    pub setpoint_min: f64,
    pub setpoint_max: f64,
    pub send_timeout_ms: u64,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:5003".into(),
            device: "127.0.0.1:5004".into(),
            setpoint_min: SETPOINT_MIN_C,
            setpoint_max: SETPOINT_MAX_C,
            send_timeout_ms: 2000,
        }
    }
}

impl ThermostatConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub battery: BatteryConfig,
    pub temperature: TemperatureConfig,
    pub thermostat: ThermostatConfig,
}

impl SimConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(content)?;
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Like [`SimConfig::load`], falling back to defaults when the file is
    /// absent or unusable.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match Self::load(path) {
                Ok(config) => return config,
                Err(e) => warn!("Ignoring {}: {}", path.display(), e),
            }
        }

        info!("Using default configuration");
        Self::default()
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = self.battery.bounds() {
            errors.push(format!("battery: {}", e));
        }
        if self.battery.interval_ms == 0 {
            errors.push("battery: interval_ms must be positive".into());
        }
        if self.battery.peer.is_empty() {
            errors.push("battery: peer must not be empty".into());
        }

        if let Err(e) = self.temperature.bounds() {
            errors.push(format!("temperature: {}", e));
        }
        if let Err(e) = self.temperature.variation() {
            errors.push(format!("temperature: {}", e));
        }
        if self.temperature.interval_ms == 0 {
            errors.push("temperature: interval_ms must be positive".into());
        }
        if self.temperature.peer.is_empty() {
            errors.push("temperature: peer must not be empty".into());
        }

        let thermostat = &self.thermostat;
        if !(thermostat.setpoint_min.is_finite() && thermostat.setpoint_max.is_finite())
            || thermostat.setpoint_min > thermostat.setpoint_max
        {
            errors.push(format!(
                "thermostat: setpoint range [{}, {}] is invalid",
                thermostat.setpoint_min, thermostat.setpoint_max
            ));
        }
        if thermostat.listen.is_empty() || thermostat.device.is_empty() {
            errors.push("thermostat: listen and device addresses are required".into());
        }

        for (name, timeout) in [
            ("battery", self.battery.send_timeout_ms),
            ("temperature", self.temperature.send_timeout_ms),
            ("thermostat", thermostat.send_timeout_ms),
        ] {
            if timeout == 0 {
                errors.push(format!("{}: send_timeout_ms must be positive", name));
            }
        }

        errors
    }
}
