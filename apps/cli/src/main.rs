use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use sl_ota_core::events::{OtaEvent, OtaObserver};
use sl_ota_core::session::{OtaSession, SessionConfig};
use sl_ota_core::state::UpdateMode;
use sl_ota_core::transport::BtleplugCentral;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Silicon Labs BLE OTA update tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Read session defaults from a TOML config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flash a GBL image onto a device
    Flash {
        /// BD address or advertised name of the target
        #[arg(short, long)]
        device: Option<String>,

        /// Path to the GBL upgrade image
        #[arg(short, long)]
        image: Option<String>,

        /// Use acknowledged data writes (slower, lossless)
        #[arg(long)]
        reliable: bool,

        /// Update path: apploader or application
        #[arg(long)]
        mode: Option<String>,

        /// Assume this ATT MTU instead of asking the backend
        #[arg(long)]
        mtu: Option<usize>,

        /// Scan budget in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Pause after each unacknowledged data write, milliseconds
        #[arg(long)]
        write_gap_ms: Option<u64>,
    },
    /// Scan for advertising devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Read the OTA version characteristics without updating
    Info {
        /// BD address or advertised name of the target
        #[arg(short, long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let base = load_base_config(args.config.as_deref())?;

    match args.command {
        Command::Flash {
            device,
            image,
            reliable,
            mode,
            mtu,
            timeout,
            write_gap_ms,
        } => {
            let mut config = base;
            if let Some(device) = device {
                config.device = device;
            }
            if let Some(image) = image {
                config.firmware_path = Some(image);
            }
            if reliable {
                config.reliable = true;
            }
            if let Some(mode) = mode {
                config.mode = parse_mode(&mode)?;
            }
            if let Some(mtu) = mtu {
                config.mtu = Some(mtu);
            }
            if let Some(secs) = timeout {
                config.discovery_timeout_secs = secs;
            }
            if let Some(gap) = write_gap_ms {
                config.write_gap_ms = gap;
            }
            require_device(&config)?;
            flash(config).await
        }
        Command::Scan { duration } => scan(Duration::from_secs(duration)).await,
        Command::Info { device } => {
            let mut config = base;
            if let Some(device) = device {
                config.device = device;
            }
            require_device(&config)?;
            probe(config).await
        }
    }
}

fn load_base_config(path: Option<&str>) -> Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading config from {path}")),
        None => Ok(SessionConfig::default()),
    }
}

fn parse_mode(mode: &str) -> Result<UpdateMode> {
    match mode.to_ascii_lowercase().as_str() {
        "apploader" => Ok(UpdateMode::AppLoader),
        "application" => Ok(UpdateMode::Application),
        other => bail!("unknown mode {other:?}; expected apploader or application"),
    }
}

fn require_device(config: &SessionConfig) -> Result<()> {
    if config.device.is_empty() {
        bail!("no target device; pass --device or set one in the config file");
    }
    Ok(())
}

async fn flash(config: SessionConfig) -> Result<()> {
    info!("Starting sl-ota (btleplug backend)...");

    let central = BtleplugCentral::open().await?;
    let mut session = OtaSession::with_observer(central, config, Arc::new(CliObserver::default()));
    let report = session.run().await?;

    println!(
        "Transferred {} bytes in {:.2}s ({:.0} B/s, {:.0} bit/s)",
        report.bytes_sent, report.elapsed_secs, report.bytes_per_sec, report.bits_per_sec
    );
    Ok(())
}

async fn scan(duration: Duration) -> Result<()> {
    let central = BtleplugCentral::open().await?;

    println!("Scanning for {} seconds...", duration.as_secs());
    let devices = central.scan(duration).await?;

    if devices.is_empty() {
        println!("No devices found");
        return Ok(());
    }
    println!("Found {} devices:", devices.len());
    for device in devices {
        let name = device.name.unwrap_or_else(|| "Unknown".to_string());
        let rssi = device
            .rssi
            .map(|r| format!("{r} dBm"))
            .unwrap_or_else(|| "N/A".to_string());
        println!("  {} ({}) RSSI: {}", name, device.address, rssi);
    }
    Ok(())
}

async fn probe(config: SessionConfig) -> Result<()> {
    let central = BtleplugCentral::open().await?;
    let mut session = OtaSession::new(central, config);
    let info = session.probe().await?;
    println!("{info}");
    Ok(())
}

/// Observer that drives a progress bar for the data stream and logs the
/// milestones around it.
#[derive(Default)]
struct CliObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl OtaObserver for CliObserver {
    fn on_event(&self, event: &OtaEvent) {
        match event {
            OtaEvent::StateChanged { from, to } => debug!(%from, %to, "State transition"),
            OtaEvent::DeviceFound { device } => info!("Found device: {device}"),
            OtaEvent::RebootRequested => info!("Requested reboot into the bootloader"),
            OtaEvent::DeviceRebooted => info!("Device rebooted"),
            OtaEvent::Versions { info } => info!("Device reports: {info}"),
            OtaEvent::UploadStarted {
                total_bytes,
                chunk_count,
                chunk_size,
            } => {
                info!(
                    "Uploading {} bytes in {} chunks of up to {} bytes",
                    total_bytes, chunk_count, chunk_size
                );
                let bar = ProgressBar::new(*total_bytes as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                        )
                        .unwrap()
                        .progress_chars("#>-"),
                );
                *self.bar.lock().unwrap() = Some(bar);
            }
            OtaEvent::ChunkSent { bytes, .. } => {
                if let Some(bar) = self.bar.lock().unwrap().as_ref() {
                    bar.inc(*bytes as u64);
                }
            }
            OtaEvent::UploadFinished { .. } => {
                if let Some(bar) = self.bar.lock().unwrap().take() {
                    bar.finish_and_clear();
                }
            }
            OtaEvent::Complete => info!("Update complete"),
            OtaEvent::Failed { .. } => {
                if let Some(bar) = self.bar.lock().unwrap().take() {
                    bar.finish_and_clear();
                }
            }
        }
    }
}
