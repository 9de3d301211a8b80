use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational range a simulated quantity is expected to stay within.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBounds")]
pub struct Bounds {
    min: f64,
    max: f64,
}

#[derive(Deserialize)]
struct RawBounds {
    min: f64,
    max: f64,
}

impl TryFrom<RawBounds> for Bounds {
    type Error = InvalidBounds;

    fn try_from(raw: RawBounds) -> Result<Self, Self::Error> {
        Bounds::new(raw.min, raw.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("invalid bounds [{min}, {max}]")]
pub struct InvalidBounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Result<Self, InvalidBounds> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A reading that can be checked against a [`Bounds`].
pub trait Reading {
    /// The scalar compared against the operational range.
    fn scalar(&self) -> f64;
}

impl Reading for f64 {
    fn scalar(&self) -> f64 {
        *self
    }
}

/// One generated or received reading.
///
/// Everything except `in_range` is fixed at construction; `in_range` only
/// changes through [`StateRecord::validate_range`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateRecord<T> {
    value: T,
    timestamp: DateTime<Utc>,
    in_range: bool,
}

impl<T> StateRecord<T> {
    pub fn new(value: T) -> Self {
        Self::with_timestamp(value, Utc::now())
    }

    pub fn with_timestamp(value: T, timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            timestamp,
            in_range: true,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn in_range(&self) -> bool {
        self.in_range
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: Reading> StateRecord<T> {
    /// Recompute the in-range flag against `bounds`. Returns the new flag.
    pub fn validate_range(&mut self, bounds: &Bounds) -> bool {
        self.in_range = bounds.contains(self.value.scalar());
        self.in_range
    }
}

pub type BatteryRecord = StateRecord<f64>;
pub type TemperatureRecord = StateRecord<f64>;
pub type ThermostatRecord = StateRecord<ThermostatState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClimatizerMode {
    #[serde(rename = "calentando")]
    Heating,
    #[serde(rename = "enfriando")]
    Cooling,
    #[serde(rename = "reposo")]
    Idle,
    #[serde(rename = "apagado")]
    Off,
}

impl ClimatizerMode {
    pub const ALL: [ClimatizerMode; 4] = [
        ClimatizerMode::Heating,
        ClimatizerMode::Cooling,
        ClimatizerMode::Idle,
        ClimatizerMode::Off,
    ];

    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ClimatizerMode::Heating => "calentando",
            ClimatizerMode::Cooling => "enfriando",
            ClimatizerMode::Idle => "reposo",
            ClimatizerMode::Off => "apagado",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.as_wire_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayMode {
    #[serde(rename = "ambiente")]
    Ambient,
    #[serde(rename = "deseada")]
    Desired,
}

impl DisplayMode {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            DisplayMode::Ambient => "ambiente",
            DisplayMode::Desired => "deseada",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Self> {
        match s {
            "ambiente" => Some(DisplayMode::Ambient),
            "deseada" => Some(DisplayMode::Desired),
            _ => None,
        }
    }
}

/// Snapshot of the thermostat device as reported over the state channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermostatState {
    pub current_temp: f64,
    pub desired_temp: f64,
    pub climatizer_mode: ClimatizerMode,
    pub sensor_fault: bool,
    pub low_battery: bool,
    pub powered: bool,
    pub display_mode: DisplayMode,
}

impl Reading for ThermostatState {
    fn scalar(&self) -> f64 {
        self.current_temp
    }
}
