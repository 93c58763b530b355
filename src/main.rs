//! MQTT Ticker - Main Entry Point

use clap::{Parser, Subcommand};
use mqtt_ticker::config::{redact_url, ConfigOverrides, TickerConfig};
use mqtt_ticker::observability::init_with_verbosity;
use mqtt_ticker::publisher::{PublisherExit, PublisherLoop, PublisherSettings};
use mqtt_ticker::transport::mqtt::{MqttClient, ReconnectConfig};
use mqtt_ticker::{TickerError, TickerResult};
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Periodic MQTT publisher
#[derive(Parser)]
#[command(name = "mqtt-ticker")]
#[command(about = "Publishes a numbered message to an MQTT topic on a fixed period")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Broker URL, e.g. mqtt://localhost:1883
    #[arg(long, env = "MQTT_BROKER", global = true)]
    broker_url: Option<String>,

    /// Topic to publish to
    #[arg(long, env = "MQTT_TOPIC", global = true)]
    topic: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and publish until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_with_verbosity(cli.verbose);

    info!("Starting mqtt-ticker v{}", env!("CARGO_PKG_VERSION"));

    let overrides = ConfigOverrides {
        broker_url: cli.broker_url.clone(),
        topic: cli.topic.clone(),
    };
    let config = match load_configuration(cli.config.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Run => run_ticker(config).await.map_err(Into::into),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: Option<&std::path::Path>,
    overrides: &ConfigOverrides,
) -> Result<TickerConfig, mqtt_ticker::ConfigError> {
    match TickerConfig::resolve_path(config_path) {
        Some(path) => info!("Loading configuration from: {}", path.display()),
        None => info!("No configuration file found, using built-in defaults"),
    }

    let mut config = TickerConfig::load(config_path)?;
    config.apply_overrides(overrides)?;
    Ok(config)
}

fn handle_config_command(
    config: &TickerConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        let rendered = toml::to_string_pretty(config)?;
        println!("{rendered}");
    } else {
        info!("Configuration is valid");
    }
    Ok(())
}

/// Flip the shutdown watch on SIGINT or SIGTERM
fn spawn_signal_watcher(shutdown_tx: watch::Sender<bool>) -> std::io::Result<()> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
        let _ = shutdown_tx.send(true);
    });

    Ok(())
}

async fn run_ticker(config: TickerConfig) -> TickerResult<()> {
    info!(
        broker = %redact_url(&config.mqtt.broker_url),
        topic = %config.publisher.topic,
        interval_ms = config.publisher.interval_ms,
        "Ticker starting"
    );

    let mut client = MqttClient::new(config.mqtt.clone())
        .map_err(TickerError::transport)?
        .with_reconnect_config(ReconnectConfig::from(&config.reconnect));
    client.connect().await.map_err(TickerError::transport)?;
    info!("MQTT transport connected");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_watcher(shutdown_tx).map_err(TickerError::transport)?;

    let mut publisher = PublisherLoop::new(client, PublisherSettings::from(&config.publisher))?;
    let metrics = publisher.metrics();

    let outcome = publisher.run(shutdown_rx).await;

    let mut client = publisher.into_transport();
    if let Some(uptime) = client.uptime() {
        info!(uptime_secs = uptime.as_secs(), "Disconnecting from broker");
    }
    if let Err(e) = client.disconnect().await {
        warn!("Error during disconnect: {}", e);
    }

    match serde_json::to_string(&metrics.snapshot()) {
        Ok(json) => info!(metrics = %json, "Final publisher metrics"),
        Err(e) => warn!("Failed to serialize metrics: {}", e),
    }

    match outcome? {
        PublisherExit::Cancelled { ticks } => info!(ticks, "Publisher cancelled"),
        PublisherExit::Completed { ticks } => info!(ticks, "Publisher completed"),
    }
    Ok(())
}
