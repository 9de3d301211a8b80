use super::{GenerationMode, ValueGenerator};
use crate::record::{Bounds, StateRecord};
use tracing::debug;

// Fraction of the remaining distance covered per tick.
const SWEEP_GAIN: f64 = 0.05;
// Fraction of the span at which the sweep turns around.
const TURNAROUND_TOLERANCE: f64 = 0.01;

/// Battery voltage source.
///
/// In automatic mode the voltage drifts toward one end of the range with
/// first-order smoothing and turns around once it gets close, giving a
/// discharge/charge sweep that never leaves the configured bounds.
#[derive(Debug)]
pub struct BatteryGenerator {
    bounds: Bounds,
    mode: GenerationMode,
    voltage: f64,
    target: f64,
}

impl BatteryGenerator {
    pub fn new(bounds: Bounds, initial_voltage: f64) -> Self {
        Self {
            bounds,
            mode: GenerationMode::Automatic,
            voltage: bounds.clamp(initial_voltage),
            target: bounds.min(),
        }
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn is_charging(&self) -> bool {
        self.target >= self.bounds.max()
    }

    fn sweep(&mut self) -> f64 {
        let span = self.bounds.max() - self.bounds.min();
        if (self.target - self.voltage).abs() <= span * TURNAROUND_TOLERANCE {
            self.target = if self.is_charging() {
                self.bounds.min()
            } else {
                self.bounds.max()
            };
            debug!(charging = self.is_charging(), voltage = self.voltage, "battery sweep turned around");
        }

        self.voltage = self
            .bounds
            .clamp(self.voltage + (self.target - self.voltage) * SWEEP_GAIN);

        debug_assert!(
            self.bounds.contains(self.voltage),
            "Battery voltage {} left bounds {:?}",
            self.voltage,
            self.bounds
        );

        self.voltage
    }
}

impl ValueGenerator for BatteryGenerator {
    fn tick(&mut self) -> StateRecord<f64> {
        let value = match self.mode {
            GenerationMode::Automatic => self.sweep(),
            GenerationMode::Manual(value) => value,
        };
        StateRecord::new(value)
    }

    fn set_value(&mut self, value: f64) {
        let clamped = self.bounds.clamp(value);
        self.voltage = clamped;
        self.mode = GenerationMode::Manual(clamped);
    }

    fn set_manual_override(&mut self, value: f64) {
        self.mode = GenerationMode::Manual(value);
    }

    fn set_automatic(&mut self) {
        self.mode = GenerationMode::Automatic;
    }

    fn mode(&self) -> GenerationMode {
        self.mode
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }
}
