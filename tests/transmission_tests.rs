use async_trait::async_trait;
use simlink::channel::{SendFailure, TelemetryChannel};
use simlink::events::{event_channel, EventReceiver, Lifecycle, SimEvent, SimulatorKind};
use simlink::generator::{self, BatteryGenerator, TemperatureGenerator};
use simlink::generator::SinusoidalVariation;
use simlink::protocol::{decode_command, Command, CommandKind};
use simlink::record::Bounds;
use simlink::transmission::{CommandSender, CycleOutcome, ServiceState, TransmissionService};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const PERIOD: Duration = Duration::from_secs(1);

struct RefusingChannel {
    attempts: AtomicUsize,
}

#[async_trait]
impl TelemetryChannel for RefusingChannel {
    async fn send(&self, _line: &str) -> Result<(), SendFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SendFailure::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }
}

struct SlowChannel {
    delay: Duration,
    completed: AtomicUsize,
}

#[async_trait]
impl TelemetryChannel for SlowChannel {
    async fn send(&self, _line: &str) -> Result<(), SendFailure> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct PanickingChannel;

#[async_trait]
impl TelemetryChannel for PanickingChannel {
    async fn send(&self, _line: &str) -> Result<(), SendFailure> {
        panic!("peer driver crashed");
    }
}

fn battery_service(
    channel: Arc<dyn TelemetryChannel>,
) -> (TransmissionService, EventReceiver) {
    let (events, rx) = event_channel();
    let bounds = Bounds::new(0.0, 5.0).unwrap();
    let service = TransmissionService::new(
        SimulatorKind::Battery,
        generator::shared(BatteryGenerator::new(bounds, 3.7)),
        channel,
        PERIOD,
        events,
    );
    (service, rx)
}

fn drain(rx: &mut EventReceiver) -> Vec<SimEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn lifecycle_count(events: &[SimEvent], wanted: Lifecycle) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SimEvent::Lifecycle { state, .. } if *state == wanted))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let (tx, _lines) = mpsc::unbounded_channel::<String>();
    let (service, mut rx) = battery_service(Arc::new(tx));

    service.start();
    service.start();
    assert_eq!(service.state(), ServiceState::Running);

    let events = drain(&mut rx);
    assert_eq!(lifecycle_count(&events, Lifecycle::Started), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_start_is_noop() {
    let (tx, _lines) = mpsc::unbounded_channel::<String>();
    let (service, mut rx) = battery_service(Arc::new(tx));

    service.stop();
    assert_eq!(service.state(), ServiceState::Stopped);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_periodic_sends_are_counted() {
    let (tx, mut lines) = mpsc::unbounded_channel::<String>();
    let (service, mut rx) = battery_service(Arc::new(tx));

    service.start();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(service.counters().succeeded, 3);
    assert_eq!(service.counters().failed, 0);

    let mut received = 0;
    while let Ok(line) = lines.try_recv() {
        assert!(line.ends_with('\n'));
        let value: f64 = line.trim_end().parse().unwrap();
        assert!((0.0..=5.0).contains(&value));
        received += 1;
    }
    assert_eq!(received, 3);

    let events = drain(&mut rx);
    let ticks = events.iter().filter(|e| matches!(e, SimEvent::Tick { .. })).count();
    let sent = events.iter().filter(|e| matches!(e, SimEvent::Sent { .. })).count();
    assert_eq!(ticks, 3);
    assert_eq!(sent, 3);
}

#[tokio::test(start_paused = true)]
async fn test_no_sent_after_stop() {
    let (tx, _lines) = mpsc::unbounded_channel::<String>();
    let (service, mut rx) = battery_service(Arc::new(tx));

    service.start();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    service.stop();
    let before = service.counters();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(service.counters(), before);
    assert!(!service.is_running());

    let events = drain(&mut rx);
    let stopped_at = events
        .iter()
        .position(|e| matches!(e, SimEvent::Lifecycle { state: Lifecycle::Stopped, .. }))
        .expect("stopped event");
    assert!(events[stopped_at + 1..]
        .iter()
        .all(|e| !matches!(e, SimEvent::Sent { .. } | SimEvent::Tick { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_send_in_flight_at_stop_is_discarded() {
    let channel = Arc::new(SlowChannel {
        delay: Duration::from_millis(800),
        completed: AtomicUsize::new(0),
    });
    let (service, mut rx) = battery_service(channel.clone());

    service.start();
    // The first cycle starts at 1s and its send is pending until 1.8s.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(channel.completed.load(Ordering::SeqCst), 0);
    service.stop();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(channel.completed.load(Ordering::SeqCst), 1);
    assert_eq!(service.counters().total(), 0);

    let events = drain(&mut rx);
    assert_eq!(
        events.iter().filter(|e| matches!(e, SimEvent::Tick { .. })).count(),
        1
    );
    assert!(events
        .iter()
        .all(|e| !matches!(e, SimEvent::Sent { .. } | SimEvent::SendFailed { .. })));
    assert!(matches!(
        events.last(),
        Some(SimEvent::Lifecycle {
            state: Lifecycle::Stopped,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_peer_keeps_running() {
    let channel = Arc::new(RefusingChannel {
        attempts: AtomicUsize::new(0),
    });
    let (service, mut rx) = battery_service(channel.clone());

    service.start();
    tokio::time::sleep(Duration::from_millis(5500)).await;

    let counters = service.counters();
    assert_eq!(counters.failed, 5);
    assert_eq!(counters.succeeded, 0);
    assert_eq!(channel.attempts.load(Ordering::SeqCst), 5);
    assert!(service.is_running());

    let failures: Vec<_> = drain(&mut rx).iter().filter_map(SimEvent::reason).collect();
    assert_eq!(failures.len(), 5);
    assert!(failures[0].contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let (tx, _lines) = mpsc::unbounded_channel::<String>();
    let (service, mut rx) = battery_service(Arc::new(tx));

    service.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    service.stop();
    service.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(service.counters().succeeded, 2);
    let events = drain(&mut rx);
    assert_eq!(lifecycle_count(&events, Lifecycle::Started), 2);
    assert_eq!(lifecycle_count(&events, Lifecycle::Stopped), 1);
}

#[tokio::test]
async fn test_panicking_channel_counts_as_failure() {
    let (service, mut rx) = battery_service(Arc::new(PanickingChannel));

    match service.trigger().await {
        CycleOutcome::Failed(reason) => assert!(reason.contains("aborted")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(service.counters().failed, 1);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, SimEvent::SendFailed { .. })));
}

#[tokio::test]
async fn test_manual_override_reports_out_of_range() {
    let (tx, mut lines) = mpsc::unbounded_channel::<String>();
    let (service, mut rx) = battery_service(Arc::new(tx));

    service.set_manual_override(7.5);
    assert_eq!(service.trigger().await, CycleOutcome::Sent(7.5));
    assert_eq!(lines.try_recv().unwrap(), "7.50\n");

    let tick = drain(&mut rx)
        .into_iter()
        .find_map(|e| match e {
            SimEvent::Tick { record, .. } => Some(record),
            _ => None,
        })
        .unwrap();
    assert_eq!(*tick.value(), 7.5);
    assert!(!tick.in_range());
}

#[tokio::test]
async fn test_set_value_is_clamped() {
    let (tx, mut lines) = mpsc::unbounded_channel::<String>();
    let (service, mut rx) = battery_service(Arc::new(tx));

    service.set_value(-1.0);
    assert_eq!(service.trigger().await, CycleOutcome::Sent(0.0));
    assert_eq!(lines.try_recv().unwrap(), "0.00\n");

    let in_range = drain(&mut rx).into_iter().find_map(|e| match e {
        SimEvent::Tick { record, .. } => Some(record.in_range()),
        _ => None,
    });
    assert_eq!(in_range, Some(true));

    service.set_automatic();
    assert!(service.generator().lock().is_automatic());
}

#[tokio::test]
async fn test_reset_counters() {
    let (tx, _lines) = mpsc::unbounded_channel::<String>();
    let (service, _rx) = battery_service(Arc::new(tx));

    service.trigger().await;
    service.trigger().await;
    assert_eq!(service.counters().total(), 2);

    service.reset_counters();
    assert_eq!(service.counters().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_temperature_service_follows_variation() {
    let (events, _rx) = event_channel();
    let (tx, mut lines) = mpsc::unbounded_channel::<String>();
    let variation = SinusoidalVariation::from_secs(20.0, 5.0, 4.0).unwrap();
    let service = TransmissionService::new(
        SimulatorKind::Temperature,
        generator::shared(TemperatureGenerator::new(
            Bounds::new(-10.0, 40.0).unwrap(),
            variation,
        )),
        Arc::new(tx),
        PERIOD,
        events,
    );

    service.start();
    tokio::time::sleep(Duration::from_millis(4500)).await;
    service.stop();

    let values: Vec<String> = std::iter::from_fn(|| lines.try_recv().ok()).collect();
    assert_eq!(values, vec!["25.00\n", "20.00\n", "15.00\n", "20.00\n"]);
}

#[tokio::test]
async fn test_command_sender_accounting() {
    let (events, mut rx) = event_channel();
    let (tx, mut lines) = mpsc::unbounded_channel::<String>();
    let sender = CommandSender::new(Arc::new(tx), events);

    sender.send(&Command::power(true)).await.unwrap();
    let decoded = decode_command(&lines.try_recv().unwrap()).unwrap();
    assert_eq!(decoded.kind(), CommandKind::Power { on: true });

    let refusing = CommandSender::new(
        Arc::new(RefusingChannel {
            attempts: AtomicUsize::new(0),
        }),
        event_channel().0,
    );
    assert!(refusing.send(&Command::power(false)).await.is_err());
    assert_eq!(refusing.counters().failed, 1);

    assert_eq!(sender.counters().succeeded, 1);
    assert!(matches!(rx.try_recv(), Ok(SimEvent::CommandSent { .. })));
}
