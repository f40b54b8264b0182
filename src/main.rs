mod clock;
mod config;
mod provision;
mod store;
mod telemetry;
mod transport;
mod wire;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clock::SystemClock;
use provision::ProvisioningSession;
use store::region::FileRegion;
use store::CredentialStore;
use telemetry::body::SampleValue;
use telemetry::TelemetryDispatcher;
use transport::TcpConnector;

#[derive(Parser)]
#[command(name = "c8y-uplink")]
#[command(about = "Device-side provisioning and telemetry upstreaming for Cumulocity IoT")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Acquire device credentials (busy-waits for operator approval)
    /// and register the device as a managed object
    Provision,

    /// Erase the local credential region. The tenant-side managed
    /// object is not touched.
    Remove {
        /// Erase even if a valid record is currently stored
        #[arg(long)]
        force: bool,
    },

    /// Post a single-series measurement
    Measurement {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        fragment: String,
        #[arg(long)]
        series: String,
        #[arg(long)]
        value: f64,
        #[arg(long)]
        unit: Option<String>,
    },

    /// Raise an alarm
    Alarm {
        #[arg(long)]
        severity: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        kind: String,
    },

    /// Post an event
    Event {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {}", cli.config, e);
        eprintln!("Using default configuration");
        config::Config::default()
    });

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("c8y-uplink v{}", env!("CARGO_PKG_VERSION"));
    info!("Tenant: {}:{}", config.tenant.host, config.tenant.port);

    let connector = TcpConnector::new(config.tenant.host.clone(), config.tenant.port);
    let region = FileRegion::open(&config.storage.path)?;
    let store = CredentialStore::new(region);

    match cli.command {
        Command::Provision => {
            let mut session = ProvisioningSession::new(
                connector,
                store,
                config.tenant.clone(),
                config.device.clone(),
                config.retry.clone(),
            );
            let link = session.provision().await?;
            info!(
                "Provisioned: host={} device_id={}",
                link.host, link.device_id
            );
        }
        Command::Remove { force } => {
            let mut session = ProvisioningSession::new(
                connector,
                store,
                config.tenant.clone(),
                config.device.clone(),
                config.retry.clone(),
            );
            session.remove_device(force)?;
        }
        Command::Measurement {
            kind,
            fragment,
            series,
            value,
            unit,
        } => {
            let dispatcher = TelemetryDispatcher::from_store(connector, SystemClock, &store)?;
            // Whole-number CLI values post as JSON integers
            let value = if value.fract() == 0.0 {
                SampleValue::Integer(value as i64)
            } else {
                SampleValue::Decimal(value)
            };
            dispatcher
                .send_measurement(&kind, &fragment, &series, value, unit.as_deref())
                .await?;
        }
        Command::Alarm {
            severity,
            text,
            kind,
        } => {
            let dispatcher = TelemetryDispatcher::from_store(connector, SystemClock, &store)?;
            dispatcher.send_alarm(&severity, &text, &kind).await?;
        }
        Command::Event { kind, text } => {
            let dispatcher = TelemetryDispatcher::from_store(connector, SystemClock, &store)?;
            dispatcher.send_event(&kind, &text).await?;
        }
    }

    Ok(())
}
