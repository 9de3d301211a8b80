use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use simlink::channel::EphemeralTcpChannel;
use simlink::config::SimConfig;
use simlink::coordinator::{Coordinator, Observer};
use simlink::events::{event_channel, ConnectionChange};
use simlink::protocol::{self, CodecError, Command};
use simlink::record::{ClimatizerMode, DisplayMode, ThermostatRecord};
use simlink::server::TelemetryServer;
use simlink::transmission::CommandSender;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

const DEFAULT_CONFIG_PATH: &str = "simlink.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("simlink")
        .version("0.1.0")
        .about("🌡️  Thermostat command line and telemetry monitor")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file [default: simlink.toml]")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("device")
                .short("d")
                .long("device")
                .value_name("ADDR")
                .help("Thermostat device address (overrides configuration)")
                .takes_value(true)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("power")
                .about("🔌 Switch the thermostat on or off")
                .arg(
                    Arg::with_name("state")
                        .help("Power state")
                        .required(true)
                        .possible_values(&["on", "off"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("setpoint")
                .about("🎯 Set the desired temperature")
                .arg(
                    Arg::with_name("value")
                        .help("Desired temperature in °C")
                        .required(true)
                        .allow_hyphen_values(true)
                        .validator(|v| match v.parse::<f64>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Temperature must be a number".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("display")
                .about("🖥️  Choose which temperature the device displays")
                .arg(
                    Arg::with_name("mode")
                        .help("Display mode")
                        .required(true)
                        .possible_values(&["ambiente", "deseada"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("listen")
                .about("📨 Print thermostat state reports as they arrive")
                .arg(
                    Arg::with_name("addr")
                        .long("addr")
                        .value_name("ADDR")
                        .help("Listen address (defaults to thermostat.listen)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("watch")
                .about("📡 Act as the peer device and print incoming telemetry lines")
                .arg(
                    Arg::with_name("addr")
                        .long("addr")
                        .value_name("ADDR")
                        .help("Listen address")
                        .takes_value(true)
                        .default_value("127.0.0.1:5001"),
                ),
        )
        .get_matches();

    let config_path = global_value(&matches, "config").unwrap_or(DEFAULT_CONFIG_PATH);
    let config = SimConfig::load_or_default(Path::new(config_path));
    let device = global_value(&matches, "device").unwrap_or(&config.thermostat.device);

    match matches.subcommand() {
        ("power", Some(sub)) => {
            let on = sub.value_of("state") == Some("on");
            send(device, &config, Command::power(on)).await
        }
        ("setpoint", Some(sub)) => {
            let value: f64 = sub.value_of("value").unwrap_or_default().parse()?;
            let command = match Command::set_desired_temp_within(
                value,
                config.thermostat.setpoint_min,
                config.thermostat.setpoint_max,
            ) {
                Ok(command) => command,
                Err(e) => {
                    eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
                    return Err(e.into());
                }
            };
            send(device, &config, command).await
        }
        ("display", Some(sub)) => {
            let mode = match sub.value_of("mode") {
                Some("deseada") => DisplayMode::Desired,
                _ => DisplayMode::Ambient,
            };
            send(device, &config, Command::set_display_mode(mode)).await
        }
        ("listen", Some(sub)) => {
            let addr = sub.value_of("addr").unwrap_or(&config.thermostat.listen);
            listen(addr).await
        }
        ("watch", Some(sub)) => {
            let addr = sub.value_of("addr").unwrap_or("127.0.0.1:5001");
            watch(addr).await
        }
        _ => Ok(()),
    }
}

/// Global flags may follow the subcommand, in which case only the
/// subcommand's matches carry them.
fn global_value<'a>(matches: &'a ArgMatches<'_>, name: &str) -> Option<&'a str> {
    match matches.subcommand() {
        (_, Some(sub)) => sub.value_of(name).or_else(|| matches.value_of(name)),
        _ => matches.value_of(name),
    }
}

async fn send(device: &str, config: &SimConfig, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let channel = EphemeralTcpChannel::with_timeout(device, config.thermostat.send_timeout());
    let (events, _rx) = event_channel();
    let sender = CommandSender::new(Arc::new(channel), events);

    let line = protocol::encode_command(&command);
    match sender.send(&command).await {
        Ok(()) => {
            println!("{} {} → {}", "✅".green(), command.name().bright_cyan(), device.bright_white());
            println!("   {}", line.trim_end().dimmed());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} Failed to deliver {} to {}", "❌".red(), command.name(), device.bright_white());
            eprintln!("{} {}", "🔌".yellow(), e.to_string().bright_red());
            Err(e.into())
        }
    }
}

struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_state_received(&mut self, peer: SocketAddr, record: &ThermostatRecord) {
        let state = record.value();
        let mode = match state.climatizer_mode {
            ClimatizerMode::Heating => "HEATING".bright_red(),
            ClimatizerMode::Cooling => "COOLING".bright_blue(),
            ClimatizerMode::Idle => "IDLE".white(),
            ClimatizerMode::Off => "OFF".dimmed(),
        };
        let power = if state.powered { "ON".bright_green() } else { "OFF".bright_red() };
        let mut flags = Vec::new();
        if state.sensor_fault {
            flags.push("SENSOR FAULT".red().to_string());
        }
        if state.low_battery {
            flags.push("LOW BATTERY".yellow().to_string());
        }

        println!(
            "[{}] {} | {:>6.2}°C → {:>6.2}°C | {} | power {} | display {} {}",
            record.timestamp().format("%H:%M:%S"),
            peer,
            state.current_temp,
            state.desired_temp,
            mode,
            power,
            state.display_mode.as_wire_str(),
            flags.join(" ")
        );
    }

    fn on_parse_error(&mut self, peer: SocketAddr, error: &CodecError) {
        println!("{} {} {}", "⚠️ ".yellow(), peer, error.to_string().bright_red());
    }

    fn on_connection_change(&mut self, peer: SocketAddr, change: ConnectionChange) {
        match change {
            ConnectionChange::Connected => println!("{} {} connected", "🔗".green(), peer),
            ConnectionChange::Disconnected => println!("{} {} disconnected", "🔌".yellow(), peer),
        }
    }
}

async fn listen(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (coordinator, handle) = Coordinator::new();
    handle.register(ConsoleObserver);

    let server = TelemetryServer::bind(addr, handle.sender()).await?;
    println!("{} Waiting for thermostat reports on {}", "📨".blue(), server.local_addr()?.to_string().bright_white());
    drop(handle);

    tokio::select! {
        _ = coordinator.run() => {}
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}

async fn watch(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    println!("{} Waiting for telemetry on {}", "📡".blue(), listener.local_addr()?.to_string().bright_white());

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };

        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match protocol::decode_telemetry(&line) {
                    Ok(value) => println!("{} {:>10.2}", peer.to_string().dimmed(), value),
                    Err(e) => println!("{} {}", peer.to_string().dimmed(), e.to_string().bright_red()),
                }
            }
        });
    }
}
