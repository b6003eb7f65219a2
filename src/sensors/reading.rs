use serde::{Deserialize, Serialize};

/// One temperature/humidity pair taken in the same polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Degrees Celsius, 2 decimals
    pub temperature: f64,
    /// Relative humidity in percent, 2 decimals
    pub humidity: f64,
}

impl Reading {
    pub fn new(temperature: f64, humidity: f64) -> Self {
        Self {
            temperature,
            humidity,
        }
    }
}
