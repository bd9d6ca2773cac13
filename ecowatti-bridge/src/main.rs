use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ecowatti_bridge::{
    Config, MockTransport, MqttPublisher, SensorPoller, SerialTransport, StdoutPublisher,
    Transport, TransportConfig, capture, run_bridge,
};
use ecowatti_core::{MemoryAddress, PollResult};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Time allowed for queued MQTT messages to leave on shutdown.
const MQTT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "ecowatti-bridge")]
#[command(about = "Ecowatti controller to home automation bridge")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "ecowatti-bridge.toml")]
    config: PathBuf,

    /// What to do; defaults to `run`
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Poll all configured sensors on schedule and publish the results
    #[default]
    Run,
    /// Log every frame on the bus without transmitting
    Capture,
    /// Poll a single register once and print the result
    Poll {
        /// Register address, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_address)]
        address: u8,
    },
}

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "ecowatti_bridge=info,ecowatti_core=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    let command = cli.command.unwrap_or_default();

    match config.transport.clone() {
        TransportConfig::Serial { device, baud_rate } => {
            info!(device = ?device, baud_rate, "Using serial transport");
            let transport = SerialTransport::open(&device, baud_rate)?;
            execute(transport, &config, command).await?;
        }
        TransportConfig::Mock {
            unit_id,
            noise,
            values,
        } => {
            info!(unit_id, "Using simulated controller");
            let transport =
                MockTransport::new(unit_id, noise, values.iter().map(|v| (v.address, v.value)));
            execute(transport, &config, command).await?;
        }
    }

    Ok(())
}

async fn execute<T: Transport>(
    mut transport: T,
    config: &Config,
    command: Command,
) -> color_eyre::Result<()> {
    match command {
        Command::Run => {
            let cancel = shutdown_on_ctrl_c();
            match &config.publish.broker {
                Some(broker) => {
                    let (publisher, connection) = MqttPublisher::connect(broker);
                    let result = run_bridge(transport, config, publisher.clone(), cancel).await;

                    if let Err(e) = publisher.disconnect() {
                        warn!(error = %e, "Failed to queue MQTT disconnect");
                    }
                    drop(publisher);
                    if tokio::time::timeout(MQTT_SHUTDOWN_GRACE, connection)
                        .await
                        .is_err()
                    {
                        warn!("MQTT connection did not close in time");
                    }

                    result?;
                }
                None => {
                    info!("No MQTT broker configured, publishing to stdout");
                    run_bridge(transport, config, StdoutPublisher, cancel).await?;
                }
            }
        }
        Command::Capture => {
            let cancel = shutdown_on_ctrl_c();
            let captured = capture(&mut transport, &config.poller, cancel, |frame| {
                println!("{frame}");
            })
            .await?;
            info!(captured, "ecowatti-bridge capture complete");
        }
        Command::Poll { address } => {
            let mut poller = SensorPoller::new(transport, config.poller.clone());
            match poller.poll(MemoryAddress(address)).await? {
                PollResult::Value(value) => println!("{value}"),
                PollResult::NoReading => println!("no reading"),
            }
        }
    }

    Ok(())
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                cancel_for_signal.cancel();
            }
            Err(e) => warn!(error = %e, "Unable to listen for Ctrl+C"),
        }
    });

    cancel
}
