//! One-shot diagnostic for the SHT20.
//!
//! Usage:
//!   cargo run --bin sht20-probe
//!   cargo run --bin sht20-probe -- --device /dev/i2c-3 --address 0x40
//!   cargo run --bin sht20-probe -- --simulate
//!
//! Resets the sensor, waits for it to settle, takes one reading and prints it
//! in the same JSON shape the monitor produces. Exits non-zero on failure.

use clap::Parser;
use log::{error, info};
use sht20_monitor::bus::{BusTransport, SimulatedBus};
use sht20_monitor::config::{Config, load_dotenv, parse_address};
use sht20_monitor::error::AppError;
use sht20_monitor::sensors::Sht20;
use sht20_monitor::state::Snapshot;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sht20-probe")]
#[command(about = "Take a single reading from an SHT20 sensor")]
struct Cli {
    /// I2C character device
    #[arg(long, env = "SHT20_I2C_DEVICE")]
    device: Option<PathBuf>,

    /// Sensor address, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_address)]
    address: Option<u8>,

    /// Use a simulated sensor instead of the I2C bus
    #[arg(long)]
    simulate: bool,
}

async fn probe<B: BusTransport>(bus: B, config: &Config) -> Result<Snapshot, AppError> {
    let mut sensor = Sht20::with_address(bus, config.bus.address);

    info!("Resetting SHT20 at 0x{:02X}", sensor.address());
    sensor.reset().await?;
    tokio::time::sleep(config.poller.startup_settle).await;

    let reading = sensor.read().await?;
    info!(
        "Temperature: {:.2}°C, Humidity: {:.2}%",
        reading.temperature, reading.humidity
    );
    Ok(Snapshot::ok(reading))
}

#[cfg(feature = "linux-i2c")]
async fn probe_hardware(config: &Config) -> Result<Snapshot, AppError> {
    use sht20_monitor::bus::{LinuxI2c, ScopedI2cBus};

    info!("Using {}", config.bus.device.display());
    probe(ScopedI2cBus::new(LinuxI2c::new(config.bus.device.clone())), config).await
}

#[cfg(not(feature = "linux-i2c"))]
async fn probe_hardware(_config: &Config) -> Result<Snapshot, AppError> {
    Err(AppError::BusUnsupported)
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = Config::from_env()?;
    if let Some(device) = cli.device {
        config.bus.device = device;
    }
    if let Some(address) = cli.address {
        config.bus.address = address;
    }

    let snapshot = if cli.simulate {
        probe(SimulatedBus::new(21.0, 45.0), &config).await?
    } else {
        probe_hardware(&config).await?
    };

    println!("{}", serde_json::to_string_pretty(&snapshot.to_query())?);
    Ok(())
}

fn main() {
    load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        error!("Probe failed: {}", e);
        std::process::exit(1);
    }
}
