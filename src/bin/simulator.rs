use clap::{App, Arg};
use simlink::channel::EphemeralTcpChannel;
use simlink::config::SimConfig;
use simlink::coordinator::Coordinator;
use simlink::events::SimulatorKind;
use simlink::generator::{self, BatteryGenerator, TemperatureGenerator};
use simlink::observers::{LogObserver, StatusBoard};
use simlink::server::TelemetryServer;
use simlink::transmission::TransmissionService;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "simlink.toml";
const STATUS_PERIOD: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let matches = App::new("simlink-sim")
        .version("0.1.0")
        .about("Battery, temperature and thermostat simulators")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .takes_value(true)
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .get_matches();

    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);
    let config = SimConfig::load_or_default(Path::new(config_path));
    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{}", e);
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    println!("🔋 Simulator Link");
    println!("=================");

    let (coordinator, handle) = Coordinator::new();
    let board = StatusBoard::new();
    handle.register(LogObserver);
    handle.register(board.clone());
    let coordinator_task = tokio::spawn(coordinator.run());

    let battery = TransmissionService::new(
        SimulatorKind::Battery,
        generator::shared(BatteryGenerator::new(
            config.battery.bounds()?,
            config.battery.initial_voltage,
        )),
        Arc::new(EphemeralTcpChannel::with_timeout(
            config.battery.peer.clone(),
            config.battery.send_timeout(),
        )),
        config.battery.interval(),
        handle.sender(),
    );

    let temperature = TransmissionService::new(
        SimulatorKind::Temperature,
        generator::shared(TemperatureGenerator::new(
            config.temperature.bounds()?,
            config.temperature.variation()?,
        )),
        Arc::new(EphemeralTcpChannel::with_timeout(
            config.temperature.peer.clone(),
            config.temperature.send_timeout(),
        )),
        config.temperature.interval(),
        handle.sender(),
    );

    let server = TelemetryServer::bind(&config.thermostat.listen, handle.sender()).await?;
    let server_task = server.spawn();

    battery.start();
    temperature.start();

    let mut status = time::interval(STATUS_PERIOD);
    status.tick().await;

    loop {
        tokio::select! {
            _ = status.tick() => {
                let snapshot = board.snapshot();
                let battery_counters = battery.counters();
                let temperature_counters = temperature.counters();
                info!(
                    battery_ok = battery_counters.succeeded,
                    battery_failed = battery_counters.failed,
                    temperature_ok = temperature_counters.succeeded,
                    temperature_failed = temperature_counters.failed,
                    devices = snapshot.connected_peers.len(),
                    last_error = snapshot.last_error.as_deref().unwrap_or("-"),
                    "📊 status"
                );
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
        }
    }

    battery.stop();
    temperature.stop();
    server_task.abort();

    drop(battery);
    drop(temperature);
    drop(handle);
    if time::timeout(Duration::from_secs(1), coordinator_task).await.is_err() {
        error!("coordinator did not drain in time");
    }

    println!("🛑 Simulators stopped");
    Ok(())
}
