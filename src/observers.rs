use crate::coordinator::Observer;
use crate::events::{ConnectionChange, Lifecycle, SimulatorKind};
use crate::protocol::{CodecError, Command};
use crate::record::{StateRecord, ThermostatRecord};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Logs every routed event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_tick(&mut self, source: SimulatorKind, record: &StateRecord<f64>) {
        debug!(%source, value = *record.value(), in_range = record.in_range(), "tick");
    }

    fn on_lifecycle(&mut self, source: SimulatorKind, state: Lifecycle) {
        info!(%source, "{:?}", state);
    }

    fn on_sent(&mut self, source: SimulatorKind, value: f64) {
        info!("📡 {} sent {:.2}", source, value);
    }

    fn on_send_failed(&mut self, source: SimulatorKind, reason: &str) {
        warn!("❌ {} send failed: {}", source, reason);
    }

    fn on_command_sent(&mut self, command: &Command) {
        info!("📤 command {} sent", command.name());
    }

    fn on_state_received(&mut self, peer: SocketAddr, record: &ThermostatRecord) {
        let state = record.value();
        info!(
            %peer,
            current = state.current_temp,
            desired = state.desired_temp,
            mode = state.climatizer_mode.as_wire_str(),
            powered = state.powered,
            "📨 thermostat state"
        );
    }

    fn on_parse_error(&mut self, peer: SocketAddr, error: &CodecError) {
        warn!(%peer, "parse error: {}", error);
    }

    fn on_connection_change(&mut self, peer: SocketAddr, change: ConnectionChange) {
        info!(%peer, "{:?}", change);
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub connected_peers: BTreeSet<SocketAddr>,
    pub running: BTreeMap<SimulatorKind, bool>,
    pub last_reading: BTreeMap<SimulatorKind, StateRecord<f64>>,
    pub last_sent: BTreeMap<SimulatorKind, f64>,
    pub last_state: Option<ThermostatRecord>,
    pub last_error: Option<String>,
    pub parse_errors: u64,
    pub send_failures: u64,
}

impl StatusSnapshot {
    pub fn is_running(&self, kind: SimulatorKind) -> bool {
        self.running.get(&kind).copied().unwrap_or(false)
    }

    /// `Some(false)` when the latest reading of `kind` was outside its range.
    pub fn in_range(&self, kind: SimulatorKind) -> Option<bool> {
        self.last_reading.get(&kind).map(StateRecord::in_range)
    }
}

/// Keeps the latest connection state, readings and error for display.
///
/// Clones share the same snapshot, so one clone can be registered with the
/// coordinator while another is read from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.lock().clone()
    }
}

impl Observer for StatusBoard {
    fn on_tick(&mut self, source: SimulatorKind, record: &StateRecord<f64>) {
        self.inner.lock().last_reading.insert(source, record.clone());
    }

    fn on_lifecycle(&mut self, source: SimulatorKind, state: Lifecycle) {
        self.inner
            .lock()
            .running
            .insert(source, state == Lifecycle::Started);
    }

    fn on_sent(&mut self, source: SimulatorKind, value: f64) {
        self.inner.lock().last_sent.insert(source, value);
    }

    fn on_send_failed(&mut self, source: SimulatorKind, reason: &str) {
        let mut snapshot = self.inner.lock();
        snapshot.send_failures += 1;
        snapshot.last_error = Some(format!("{}: {}", source, reason));
    }

    fn on_state_received(&mut self, _peer: SocketAddr, record: &ThermostatRecord) {
        self.inner.lock().last_state = Some(record.clone());
    }

    fn on_parse_error(&mut self, peer: SocketAddr, error: &CodecError) {
        let mut snapshot = self.inner.lock();
        snapshot.parse_errors += 1;
        snapshot.last_error = Some(format!("{}: {}", peer, error));
    }

    fn on_connection_change(&mut self, peer: SocketAddr, change: ConnectionChange) {
        let mut snapshot = self.inner.lock();
        match change {
            ConnectionChange::Connected => snapshot.connected_peers.insert(peer),
            ConnectionChange::Disconnected => snapshot.connected_peers.remove(&peer),
        };
    }
}
