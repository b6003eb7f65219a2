use thiserror::Error as ThisError;

/// Failure of a single bus or sensor operation.
///
/// Both kinds are recoverable during steady-state polling; the poller records
/// the message and tries again on the next cycle.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// Bus unavailable, or a write/read was rejected by the adapter or device.
    #[error("I2C transport error: {0}")]
    Transport(String),

    /// Short read or a sample that cannot be decoded.
    #[error("invalid sensor data: {0}")]
    Data(String),
}

impl SensorError {
    pub fn transport(details: impl Into<String>) -> Self {
        Self::Transport(details.into())
    }

    pub fn data(details: impl Into<String>) -> Self {
        Self::Data(details.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }
}

/// Process-level failures reported by the binaries.
#[derive(ThisError, Debug)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No I2C support in this build (enable `linux-i2c` or use --simulate)")]
    BusUnsupported,

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SensorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(SensorError::transport("bus busy").is_transport());
        assert!(!SensorError::transport("bus busy").is_data());
        assert!(SensorError::data("short read").is_data());
    }

    #[test]
    fn test_display_includes_details() {
        let err = SensorError::data("expected at least 2 bytes, got 1");
        assert_eq!(
            err.to_string(),
            "invalid sensor data: expected at least 2 bytes, got 1"
        );
    }

    #[test]
    fn test_sensor_error_converts_into_app_error() {
        let app: AppError = SensorError::transport("no ack").into();
        assert_eq!(app.to_string(), "I2C transport error: no ack");
    }
}
