//! Routes producer events to registered observers.
//!
//! Producers only hold an [`EventSender`]; observers only implement
//! [`Observer`]. Neither side knows about the other.

use crate::events::{event_channel, ConnectionChange, EventReceiver, EventSender, Lifecycle, SimEvent, SimulatorKind};
use crate::protocol::{CodecError, Command};
use crate::record::{StateRecord, ThermostatRecord};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Receiver of routed events. Every method defaults to doing nothing.
///
/// Callbacks run while the coordinator holds its observer registry lock.
/// Calling [`CoordinatorHandle::register`], [`CoordinatorHandle::unregister`]
/// or [`CoordinatorHandle::observer_count`] from inside a callback deadlocks;
/// send a message to another task and change the registry from there.
pub trait Observer: Send {
    fn on_tick(&mut self, _source: SimulatorKind, _record: &StateRecord<f64>) {}
    fn on_lifecycle(&mut self, _source: SimulatorKind, _state: Lifecycle) {}
    fn on_sent(&mut self, _source: SimulatorKind, _value: f64) {}
    fn on_send_failed(&mut self, _source: SimulatorKind, _reason: &str) {}
    fn on_command_sent(&mut self, _command: &Command) {}
    fn on_state_received(&mut self, _peer: SocketAddr, _record: &ThermostatRecord) {}
    fn on_parse_error(&mut self, _peer: SocketAddr, _error: &CodecError) {}
    fn on_connection_change(&mut self, _peer: SocketAddr, _change: ConnectionChange) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Registry = Arc<Mutex<Vec<(ObserverId, Box<dyn Observer>)>>>;

pub struct Coordinator {
    registry: Registry,
    events: EventReceiver,
}

/// Cloneable access to a running [`Coordinator`].
#[derive(Clone)]
pub struct CoordinatorHandle {
    registry: Registry,
    next_id: Arc<AtomicU64>,
    sender: EventSender,
}

impl Coordinator {
    pub fn new() -> (Self, CoordinatorHandle) {
        let (sender, events) = event_channel();
        let registry: Registry = Arc::new(Mutex::new(Vec::new()));

        let coordinator = Self {
            registry: Arc::clone(&registry),
            events,
        };
        let handle = CoordinatorHandle {
            registry,
            next_id: Arc::new(AtomicU64::new(1)),
            sender,
        };
        (coordinator, handle)
    }

    /// Route events until every [`EventSender`], including those held by
    /// handles, has been dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.dispatch(&event);
        }
        debug!("event stream closed, coordinator exiting");
    }

    /// Route one event to every registered observer, in registration order.
    pub fn dispatch(&self, event: &SimEvent) {
        for (_, observer) in self.registry.lock().iter_mut() {
            route(observer.as_mut(), event);
        }
    }

    /// Route whatever is already queued without waiting. Returns the number
    /// of events routed.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut routed = 0;
        while let Ok(event) = self.events.try_recv() {
            self.dispatch(&event);
            routed += 1;
        }
        routed
    }
}

impl CoordinatorHandle {
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn register<O: Observer + 'static>(&self, observer: O) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry.lock().push((id, Box::new(observer)));
        id
    }

    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.len();
        registry.retain(|(existing, _)| *existing != id);
        registry.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.registry.lock().len()
    }
}

fn route(observer: &mut dyn Observer, event: &SimEvent) {
    match event {
        SimEvent::Tick { source, record } => observer.on_tick(*source, record),
        SimEvent::Lifecycle { source, state } => observer.on_lifecycle(*source, *state),
        SimEvent::Sent { source, value } => observer.on_sent(*source, *value),
        SimEvent::SendFailed { source, reason } => observer.on_send_failed(*source, reason),
        SimEvent::CommandSent { command } => observer.on_command_sent(command),
        SimEvent::StateReceived { peer, record } => observer.on_state_received(*peer, record),
        SimEvent::ParseError { peer, error } => observer.on_parse_error(*peer, error),
        SimEvent::Connection { peer, change } => observer.on_connection_change(*peer, *change),
    }
}
