use crate::error::AppError;
use crate::sensors::SHT20_ADDRESS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

/// Same as [`load_dotenv`], reading from `env_path`.
pub fn load_dotenv_from(env_path: &Path) {
    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the runtime starts any threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Parse `KEY=value` lines, skipping blanks and comments and stripping one
/// level of surrounding quotes.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            if !key.is_empty() {
                pairs.push((key, value));
            }
        }
    }

    pairs
}

/// Parse an I2C address given as decimal or `0x`-prefixed hex.
pub fn parse_address(value: &str) -> Result<u8, AppError> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        _ => Err(AppError::InvalidConfig(format!(
            "invalid 7-bit I2C address: {value}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub bus: BusConfig,
    pub poller: PollerConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// I2C character device, e.g. `/dev/i2c-1`
    pub device: PathBuf,
    pub address: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Delay after every cycle, successful or not
    pub interval: Duration,
    /// Wait after the initial reset before the first cycle
    pub startup_settle: Duration,
    /// Publish an error when the initial reset fails instead of leaving
    /// the zero reading untouched
    pub report_init_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address the query endpoint listens on
    pub bind: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: BusConfig {
                device: PathBuf::from("/dev/i2c-1"),
                address: SHT20_ADDRESS,
            },
            poller: PollerConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            startup_settle: Duration::from_millis(200),
            report_init_failure: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(device) = lookup("SHT20_I2C_DEVICE") {
            config.bus.device = PathBuf::from(device);
        }
        if let Some(address) = lookup("SHT20_I2C_ADDRESS") {
            config.bus.address = parse_address(&address)?;
        }
        if let Some(interval) = lookup("SHT20_POLL_INTERVAL_MS") {
            let ms: u64 = interval.trim().parse().map_err(|_| {
                AppError::InvalidConfig(format!("invalid SHT20_POLL_INTERVAL_MS: {interval}"))
            })?;
            config.poller.interval = Duration::from_millis(ms);
        }
        if let Some(flag) = lookup("SHT20_REPORT_INIT_FAILURE") {
            config.poller.report_init_failure =
                matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(bind) = lookup("SHT20_HTTP_BIND") {
            config.http.bind = bind.trim().parse().map_err(|_| {
                AppError::InvalidConfig(format!("invalid SHT20_HTTP_BIND: {bind}"))
            })?;
        }

        Ok(config)
    }
}
