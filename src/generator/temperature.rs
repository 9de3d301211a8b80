use super::{GenerationMode, GeneratorError, ValueGenerator};
use crate::record::{Bounds, StateRecord};
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// `base + amplitude * sin(2π t / period)`, with `t` counted from construction.
///
/// A variation never changes after it is built; reconfiguring means building a
/// new one, which also restarts `t`.
#[derive(Debug, Clone, Copy)]
pub struct SinusoidalVariation {
    base: f64,
    amplitude: f64,
    period: Duration,
    configured_at: Instant,
}

impl SinusoidalVariation {
    pub fn new(base: f64, amplitude: f64, period: Duration) -> Result<Self, GeneratorError> {
        if !base.is_finite() {
            return Err(GeneratorError::NonFinite { name: "base", value: base });
        }
        if !amplitude.is_finite() {
            return Err(GeneratorError::NonFinite { name: "amplitude", value: amplitude });
        }
        if period.is_zero() {
            return Err(GeneratorError::InvalidPeriod(0.0));
        }

        Ok(Self {
            base,
            amplitude,
            period,
            configured_at: Instant::now(),
        })
    }

    pub fn from_secs(base: f64, amplitude: f64, period_secs: f64) -> Result<Self, GeneratorError> {
        if !period_secs.is_finite() || period_secs <= 0.0 {
            return Err(GeneratorError::InvalidPeriod(period_secs));
        }
        Self::new(base, amplitude, Duration::from_secs_f64(period_secs))
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Value `elapsed_secs` seconds after the variation was configured.
    pub fn calculate(&self, elapsed_secs: f64) -> f64 {
        let phase = TAU * elapsed_secs / self.period.as_secs_f64();
        self.base + self.amplitude * phase.sin()
    }

    pub fn elapsed(&self) -> Duration {
        self.configured_at.elapsed()
    }

    pub fn current(&self) -> f64 {
        self.calculate(self.elapsed().as_secs_f64())
    }
}

/// Ambient temperature source driven by a [`SinusoidalVariation`].
#[derive(Debug)]
pub struct TemperatureGenerator {
    bounds: Bounds,
    variation: SinusoidalVariation,
    mode: GenerationMode,
}

impl TemperatureGenerator {
    pub fn new(bounds: Bounds, variation: SinusoidalVariation) -> Self {
        Self {
            bounds,
            variation,
            mode: GenerationMode::Automatic,
        }
    }

    pub fn variation(&self) -> &SinusoidalVariation {
        &self.variation
    }

    pub fn configure_variation(
        &mut self,
        base: f64,
        amplitude: f64,
        period: Duration,
    ) -> Result<(), GeneratorError> {
        self.variation = SinusoidalVariation::new(base, amplitude, period)?;
        info!(base, amplitude, period_secs = period.as_secs_f64(), "temperature variation reconfigured");
        Ok(())
    }
}

impl ValueGenerator for TemperatureGenerator {
    fn tick(&mut self) -> StateRecord<f64> {
        let value = match self.mode {
            GenerationMode::Automatic => self.variation.current(),
            GenerationMode::Manual(value) => value,
        };
        StateRecord::new(value)
    }

    fn set_value(&mut self, value: f64) {
        self.mode = GenerationMode::Manual(self.bounds.clamp(value));
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
