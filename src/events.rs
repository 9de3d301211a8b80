use crate::protocol::{CodecError, Command};
use crate::record::{StateRecord, ThermostatRecord};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SimulatorKind {
    Battery,
    Temperature,
    Thermostat,
}

impl core::fmt::Display for SimulatorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SimulatorKind::Battery => write!(f, "battery"),
            SimulatorKind::Temperature => write!(f, "temperature"),
            SimulatorKind::Thermostat => write!(f, "thermostat"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Started,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionChange {
    Connected,
    Disconnected,
}

/// Everything producers report to the coordinator.
#[derive(Debug, Clone)]
pub enum SimEvent {
    Tick {
        source: SimulatorKind,
        record: StateRecord<f64>,
    },
    Lifecycle {
        source: SimulatorKind,
        state: Lifecycle,
    },
    Sent {
        source: SimulatorKind,
        value: f64,
    },
    SendFailed {
        source: SimulatorKind,
        reason: String,
    },
    CommandSent {
        command: Command,
    },
    StateReceived {
        peer: SocketAddr,
        record: ThermostatRecord,
    },
    ParseError {
        peer: SocketAddr,
        error: CodecError,
    },
    Connection {
        peer: SocketAddr,
        change: ConnectionChange,
    },
}

impl SimEvent {
    /// Human-readable reason for failure events.
    pub fn reason(&self) -> Option<String> {
        match self {
            SimEvent::SendFailed { reason, .. } => Some(reason.clone()),
            SimEvent::ParseError { error, .. } => Some(error.to_string()),
            _ => None,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<SimEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SimEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

pub(crate) fn emit(events: &EventSender, event: SimEvent) {
    if let Err(e) = events.send(event) {
        trace!("no event listener, dropping {:?}", e.0);
    }
}
