pub mod battery;
pub mod temperature;

pub use battery::BatteryGenerator;
pub use temperature::{SinusoidalVariation, TemperatureGenerator};

use crate::record::{Bounds, StateRecord};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeneratorError {
    #[error("variation period must be positive and finite, got {0}s")]
    InvalidPeriod(f64),
    #[error("variation {name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },
}

/// Where the next reading comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenerationMode {
    Automatic,
    Manual(f64),
}

/// Source of scalar readings for one simulated quantity.
///
/// `set_value` clamps to [`ValueGenerator::bounds`] before storing, while
/// `set_manual_override` stores the value as given so that out-of-range
/// readings can be produced on purpose.
pub trait ValueGenerator: Send {
    fn tick(&mut self) -> StateRecord<f64>;
    fn set_value(&mut self, value: f64);
    fn set_manual_override(&mut self, value: f64);
    fn set_automatic(&mut self);
    fn mode(&self) -> GenerationMode;
    fn bounds(&self) -> Bounds;

    fn is_automatic(&self) -> bool {
        matches!(self.mode(), GenerationMode::Automatic)
    }
}

pub type SharedGenerator = Arc<Mutex<dyn ValueGenerator>>;

pub fn shared<G: ValueGenerator + 'static>(generator: G) -> SharedGenerator {
    Arc::new(Mutex::new(generator))
}
