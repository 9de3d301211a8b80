//! # Simulator Link
//!
//! Telemetry and command exchange for a family of desktop simulators
//! (battery, temperature, thermostat) that talk to a peer device over TCP.
//!
//! ## Features
//!
//! - **Value generation**: battery sweep and sinusoidal temperature with
//!   clamped setters and unclamped manual overrides
//! - **Wire codec**: `"%.2f\n"` telemetry lines, JSON command and state lines
//! - **Transmission service**: periodic generate → validate → encode → send
//!   with idempotent start/stop and success/failure accounting
//! - **State server**: line-by-line decoding of thermostat reports, one bad
//!   line never ends a connection
//! - **Coordinator**: event routing to any number of observers
//!
//! ## Quick Start
//!
//! ```rust
//! use simlink::protocol::{encode_telemetry, decode_state};
//! use simlink::record::StateRecord;
//!
//! let line = encode_telemetry(&StateRecord::new(12.5)).unwrap();
//! assert_eq!(line, "12.50\n");
//!
//! let err = decode_state(r#"{"temperatura_actual": 21.0}"#).unwrap_err();
//! println!("rejected: {}", err);
//! ```
//!
//! ## Architecture
//!
//! - [`generator`] - Reading sources
//! - [`record`] - State records, bounds and thermostat state
//! - [`protocol`] - Wire encoding and decoding
//! - [`channel`] - Outbound line delivery
//! - [`transmission`] - Periodic send service and command sender
//! - [`server`] - Inbound state server
//! - [`coordinator`] - Event routing, with stock [`observers`]
//! - [`config`] - TOML configuration

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod generator;
pub mod observers;
pub mod protocol;
pub mod record;
pub mod server;
pub mod transmission;

// Re-export main public types for convenience
pub use channel::{EphemeralTcpChannel, SendFailure, TelemetryChannel};
pub use config::SimConfig;
pub use coordinator::{Coordinator, CoordinatorHandle, Observer};
pub use events::{SimEvent, SimulatorKind};
pub use generator::{BatteryGenerator, TemperatureGenerator, ValueGenerator};
pub use protocol::{CodecError, Command};
pub use record::{Bounds, StateRecord, ThermostatState};
pub use server::TelemetryServer;
pub use transmission::{CommandSender, TransmissionCounters, TransmissionService};
