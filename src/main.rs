//! telemetry-relay - forwards local MQTT telemetry to a cloud hub
//!
//! Usage:
//!   telemetry-relay [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>         Configuration file path (default: telemetry-relay.toml)
//!   -l, --log-level <LEVEL>     Log level (error, warn, info, debug, trace)
//!   --self-test                 Publish self-test traffic after startup
//!   --self-test-count <N>       Number of self-test messages
//!   -h, --help                  Print help

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use telemetry_relay::cloud::IotHubTransport;
use telemetry_relay::config::Config;
use telemetry_relay::endpoint::{BrokerEndpoint, CloudEndpoint};
use telemetry_relay::relay::Relay;
use telemetry_relay::transport::MqttTransport;

const DEFAULT_CONFIG_PATH: &str = "telemetry-relay.toml";

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    fn from_config(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// Relay messages from a local MQTT broker to a cloud telemetry hub
#[derive(Parser, Debug)]
#[command(name = "telemetry-relay")]
#[command(version)]
#[command(about = "Relays messages from a local MQTT broker to a cloud telemetry hub")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,

    /// Publish self-test traffic on the default topic after startup
    #[arg(long)]
    self_test: bool,

    /// Number of self-test messages
    #[arg(long)]
    self_test_count: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config from {:?}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    // CLI args override file config
    if args.self_test {
        config.self_test.enabled = true;
    }
    if let Some(count) = args.self_test_count {
        config.self_test.count = count;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let log_level = args
        .log_level
        .unwrap_or_else(|| LogLevel::from_config(&config.log.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Loaded configuration from {:?}", config_path);

    let broker_transport = Arc::new(MqttTransport::new(config.broker.mqtt_options()));
    let cloud_transport = match IotHubTransport::new(&config.cloud) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("Failed to set up cloud transport: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Broker {}:{} (topic '{}'), cloud {}",
        config.broker.address,
        config.broker.port,
        config.broker.default_topic,
        cloud_transport.connection().connect_host()
    );

    let broker = BrokerEndpoint::new(broker_transport, &config.broker.default_topic)
        .with_qos(config.broker.qos())
        .with_payload_format(config.broker.payload_format);
    let cloud = CloudEndpoint::new(cloud_transport);
    let relay = Arc::new(Relay::new(broker, cloud));

    // Ctrl+C during startup cancels the pending connect/subscribe
    let startup = CancellationToken::new();
    let interrupted = {
        let startup = startup.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                startup.cancel();
            }
        })
    };

    if let Err(e) = relay.start(&startup).await {
        error!("Relay startup failed: {}", e);
        interrupted.abort();
        std::process::exit(1);
    }
    interrupted.abort();

    let self_test = if config.self_test.enabled {
        let relay = relay.clone();
        let self_test = config.self_test.clone();
        Some(tokio::spawn(async move {
            relay.run_self_test(&self_test).await
        }))
    } else {
        None
    };

    info!("Relay running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    relay.shutdown().await;
    if let Some(handle) = self_test {
        let _ = handle.await;
    }

    Ok(())
}
