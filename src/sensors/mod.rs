//! SHT20 sensor protocol and measurement types.

pub mod command;
pub mod reading;
pub mod sht20;

pub use command::{Command, RawSample, SHT20_ADDRESS};
pub use reading::Reading;
pub use sht20::Sht20;
