use clap::Parser;
use log::{error, info, warn};
use sht20_monitor::api;
use sht20_monitor::bus::{BusTransport, SimulatedBus};
use sht20_monitor::config::{Config, load_dotenv, parse_address};
use sht20_monitor::error::AppError;
use sht20_monitor::poller::{Poller, PollerState};
use sht20_monitor::reporter::Reporter;
use sht20_monitor::sensors::Sht20;
use sht20_monitor::state::SharedState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::{JoinHandle, LocalSet};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "sht20-monitor")]
#[command(about = "Poll an SHT20 sensor and serve the latest reading as JSON")]
struct Cli {
    /// I2C character device (overrides SHT20_I2C_DEVICE)
    #[arg(long)]
    device: Option<PathBuf>,

    /// Sensor address, decimal or 0x-prefixed hex (overrides SHT20_I2C_ADDRESS)
    #[arg(long, value_parser = parse_address)]
    address: Option<u8>,

    /// Delay between polling cycles in milliseconds (overrides SHT20_POLL_INTERVAL_MS)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Publish an error when the sensor cannot be initialized
    #[arg(long)]
    report_init_failure: bool,

    /// Use a simulated sensor instead of the I2C bus
    #[arg(long, env = "SHT20_SIMULATE")]
    simulate: bool,

    /// Address of the HTTP query endpoint (overrides SHT20_HTTP_BIND)
    #[arg(long)]
    http_bind: Option<SocketAddr>,

    /// How often to check for a new reading to print, in milliseconds
    #[arg(long, default_value_t = 500)]
    report_interval_ms: u64,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.bus.device = device.clone();
        }
        if let Some(address) = self.address {
            config.bus.address = address;
        }
        if let Some(ms) = self.interval_ms {
            config.poller.interval = Duration::from_millis(ms);
        }
        if self.report_init_failure {
            config.poller.report_init_failure = true;
        }
        if let Some(bind) = self.http_bind {
            config.http.bind = bind;
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn spawn_poller<B>(
    bus: B,
    config: &Config,
    state: Arc<SharedState>,
    cancel: CancellationToken,
) -> JoinHandle<PollerState>
where
    B: BusTransport + Send + 'static,
{
    let sensor = Sht20::with_address(bus, config.bus.address);
    Poller::new(sensor, state, config.poller.clone()).spawn(cancel)
}

#[cfg(feature = "linux-i2c")]
fn spawn_hardware_poller(
    config: &Config,
    state: Arc<SharedState>,
    cancel: CancellationToken,
) -> Result<JoinHandle<PollerState>, AppError> {
    use sht20_monitor::bus::{LinuxI2c, ScopedI2cBus};

    let bus = ScopedI2cBus::new(LinuxI2c::new(config.bus.device.clone()));
    Ok(spawn_poller(bus, config, state, cancel))
}

#[cfg(not(feature = "linux-i2c"))]
fn spawn_hardware_poller(
    _config: &Config,
    _state: Arc<SharedState>,
    _cancel: CancellationToken,
) -> Result<JoinHandle<PollerState>, AppError> {
    Err(AppError::BusUnsupported)
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = Config::from_env()?;
    cli.apply(&mut config);

    info!("Configuration loaded:");
    if cli.simulate {
        info!("  Bus: simulated");
    } else {
        info!("  Bus: {}", config.bus.device.display());
    }
    info!("  Address: 0x{:02X}", config.bus.address);
    info!("  Interval: {:?}", config.poller.interval);
    info!("  HTTP: {}", config.http.bind);

    let listener = TcpListener::bind(config.http.bind).await?;
    let state = Arc::new(SharedState::new());
    let cancel = CancellationToken::new();

    let mut poller_task = if cli.simulate {
        let bus = SimulatedBus::new(21.0, 45.0).with_drift();
        spawn_poller(bus, &config, state.clone(), cancel.clone())
    } else {
        spawn_hardware_poller(&config, state.clone(), cancel.clone())?
    };

    let mut reporter = Reporter::new(
        state.clone(),
        Duration::from_millis(cli.report_interval_ms),
        std::io::stdout(),
    );
    let reporter_cancel = cancel.clone();
    let reporter_task = tokio::spawn(async move { reporter.run(reporter_cancel).await });
    let server_task = tokio::task::spawn_local(api::serve(listener, state.clone(), cancel.clone()));

    info!("SHT20 monitor is running, press Ctrl+C to exit");

    let poller_finished = tokio::select! {
        result = &mut poller_task => {
            match result {
                Ok(PollerState::Halted) => {
                    warn!("Poller halted; the reading will stay at its initial value");
                }
                Ok(other) => warn!("Poller ended in state {:?}", other),
                Err(e) => error!("Poller task failed: {}", e),
            }
            true
        }
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            false
        }
    };

    // A halted poller does not end the process; keep serving the last state
    if poller_finished && let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Received shutdown signal");

    cancel.cancel();
    if !poller_finished {
        match poller_task.await {
            Ok(state) => info!("Poller stopped in state {:?}", state),
            Err(e) => error!("Poller task failed: {}", e),
        }
    }
    match reporter_task.await {
        Ok(result) => result?,
        Err(e) => error!("Reporter task failed: {}", e),
    }
    match server_task.await {
        Ok(result) => result?,
        Err(e) => error!("HTTP server task failed: {}", e),
    }

    info!("SHT20 monitor stopped");
    Ok(())
}

fn main() {
    // Load .env file before anything else, while still single-threaded
    load_dotenv();
    init_logger();
    info!("Starting SHT20 monitor");

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    // The HTTP server runs its connections as local tasks
    if let Err(e) = runtime.block_on(LocalSet::new().run_until(run(cli))) {
        error!("{}", e);
        std::process::exit(1);
    }
}
