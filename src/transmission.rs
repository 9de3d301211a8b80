//! Periodic generate → validate → encode → send loop.

use crate::channel::{SendFailure, TelemetryChannel};
use crate::events::{emit, EventSender, Lifecycle, SimEvent, SimulatorKind};
use crate::generator::SharedGenerator;
use crate::protocol::{self, Command};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionCounters {
    pub succeeded: u64,
    pub failed: u64,
}

impl TransmissionCounters {
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Sent(f64),
    Failed(String),
    /// The service was stopped while this cycle was in flight.
    Discarded,
}

struct Control {
    task: Option<JoinHandle<()>>,
    // Bumped on every start and stop; a periodic cycle only reports if its
    // epoch is still current.
    epoch: u64,
    counters: TransmissionCounters,
}

struct Shared {
    kind: SimulatorKind,
    generator: SharedGenerator,
    channel: Arc<dyn TelemetryChannel>,
    events: EventSender,
    control: Mutex<Control>,
}

/// Owns the periodic send cycle for one simulator.
///
/// `start` and `stop` are idempotent. Once `stop` returns, no further `Sent`
/// event is emitted by the periodic cycle; a send that was already in flight
/// is neither counted nor reported. Send failures are counted and reported,
/// never propagated.
pub struct TransmissionService {
    shared: Arc<Shared>,
    interval: Duration,
}

impl TransmissionService {
    pub fn new(
        kind: SimulatorKind,
        generator: SharedGenerator,
        channel: Arc<dyn TelemetryChannel>,
        interval: Duration,
        events: EventSender,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                kind,
                generator,
                channel,
                events,
                control: Mutex::new(Control {
                    task: None,
                    epoch: 0,
                    counters: TransmissionCounters::default(),
                }),
            }),
            interval,
        }
    }

    pub fn kind(&self) -> SimulatorKind {
        self.shared.kind
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> ServiceState {
        if self.shared.control.lock().task.is_some() {
            ServiceState::Running
        } else {
            ServiceState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// Begin the periodic cycle. Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut control = self.shared.control.lock();
        if control.task.is_some() {
            debug!(source = %self.shared.kind, "start ignored, already running");
            return;
        }

        control.epoch += 1;
        let epoch = control.epoch;
        let shared = Arc::clone(&self.shared);
        let period = self.interval;
        control.task = Some(tokio::spawn(run_periodic(shared, period, epoch)));

        emit(
            &self.shared.events,
            SimEvent::Lifecycle {
                source: self.shared.kind,
                state: Lifecycle::Started,
            },
        );
        info!(source = %self.shared.kind, interval_ms = period.as_millis() as u64, channel = %self.shared.channel.describe(), "transmission started");
    }

    pub fn stop(&self) {
        let mut control = self.shared.control.lock();
        let Some(task) = control.task.take() else {
            debug!(source = %self.shared.kind, "stop ignored, not running");
            return;
        };

        control.epoch += 1;
        task.abort();

        emit(
            &self.shared.events,
            SimEvent::Lifecycle {
                source: self.shared.kind,
                state: Lifecycle::Stopped,
            },
        );
        info!(source = %self.shared.kind, succeeded = control.counters.succeeded, failed = control.counters.failed, "transmission stopped");
    }

    /// Run one cycle right now, independent of the periodic schedule.
    pub async fn trigger(&self) -> CycleOutcome {
        run_cycle(&self.shared, None).await
    }

    pub fn counters(&self) -> TransmissionCounters {
        self.shared.control.lock().counters
    }

    pub fn reset_counters(&self) {
        self.shared.control.lock().counters = TransmissionCounters::default();
    }

    pub fn generator(&self) -> SharedGenerator {
        Arc::clone(&self.shared.generator)
    }

    pub fn set_value(&self, value: f64) {
        self.shared.generator.lock().set_value(value);
    }

    pub fn set_manual_override(&self, value: f64) {
        self.shared.generator.lock().set_manual_override(value);
    }

    pub fn set_automatic(&self) {
        self.shared.generator.lock().set_automatic();
    }
}

impl Drop for TransmissionService {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_periodic(shared: Arc<Shared>, period: Duration, epoch: u64) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if run_cycle(&shared, Some(epoch)).await == CycleOutcome::Discarded {
            break;
        }
    }
}

async fn run_cycle(shared: &Arc<Shared>, epoch: Option<u64>) -> CycleOutcome {
    let record = {
        let mut generator = shared.generator.lock();
        let bounds = generator.bounds();
        let mut record = generator.tick();
        record.validate_range(&bounds);
        record
    };
    let value = *record.value();

    {
        let control = shared.control.lock();
        if matches!(epoch, Some(e) if e != control.epoch) {
            return CycleOutcome::Discarded;
        }
        emit(
            &shared.events,
            SimEvent::Tick {
                source: shared.kind,
                record: record.clone(),
            },
        );
    }

    if !record.in_range() {
        debug!(source = %shared.kind, value, "reading outside operational range");
    }

    let result = match protocol::encode_telemetry(&record) {
        Ok(line) => deliver(&shared.channel, line).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let mut control = shared.control.lock();
    if matches!(epoch, Some(e) if e != control.epoch) {
        debug!(source = %shared.kind, "discarding cycle completed after stop");
        return CycleOutcome::Discarded;
    }

    match result {
        Ok(()) => {
            control.counters.succeeded += 1;
            emit(
                &shared.events,
                SimEvent::Sent {
                    source: shared.kind,
                    value,
                },
            );
            debug!(source = %shared.kind, value, "reading sent");
            CycleOutcome::Sent(value)
        }
        Err(reason) => {
            control.counters.failed += 1;
            warn!(source = %shared.kind, failed = control.counters.failed, "send failed: {}", reason);
            emit(
                &shared.events,
                SimEvent::SendFailed {
                    source: shared.kind,
                    reason: reason.clone(),
                },
            );
            CycleOutcome::Failed(reason)
        }
    }
}

/// Send on a separate task so a panicking channel shows up as a failure.
async fn deliver(channel: &Arc<dyn TelemetryChannel>, line: String) -> Result<(), SendFailure> {
    let channel = Arc::clone(channel);
    match tokio::spawn(async move { channel.send(&line).await }).await {
        Ok(result) => result,
        Err(e) => Err(SendFailure::Aborted(e.to_string())),
    }
}

/// One-shot delivery of thermostat commands with the same accounting as
/// [`TransmissionService`].
pub struct CommandSender {
    channel: Arc<dyn TelemetryChannel>,
    events: EventSender,
    counters: Mutex<TransmissionCounters>,
}

impl CommandSender {
    pub fn new(channel: Arc<dyn TelemetryChannel>, events: EventSender) -> Self {
        Self {
            channel,
            events,
            counters: Mutex::new(TransmissionCounters::default()),
        }
    }

    pub async fn send(&self, command: &Command) -> Result<(), SendFailure> {
        let line = protocol::encode_command(command);
        let result = deliver(&self.channel, line).await;

        let mut counters = self.counters.lock();
        match &result {
            Ok(()) => {
                counters.succeeded += 1;
                info!(command = command.name(), "command sent");
                emit(
                    &self.events,
                    SimEvent::CommandSent {
                        command: command.clone(),
                    },
                );
            }
            Err(e) => {
                counters.failed += 1;
                warn!(command = command.name(), "command failed: {}", e);
                emit(
                    &self.events,
                    SimEvent::SendFailed {
                        source: SimulatorKind::Thermostat,
                        reason: e.to_string(),
                    },
                );
            }
        }
        result
    }

    pub fn counters(&self) -> TransmissionCounters {
        *self.counters.lock()
    }

    pub fn reset_counters(&self) {
        *self.counters.lock() = TransmissionCounters::default();
    }
}
