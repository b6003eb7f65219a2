//! SHT20 monitor library.
//!
//! Samples an SHT20 temperature/humidity sensor over I2C on a fixed cadence
//! and keeps the latest consistent reading available to any number of
//! readers.
//!
//! Layers, bottom-up: [`bus`] (byte transfers), [`sensors`] (SHT20 protocol
//! and decoding), [`state`] (published snapshot), [`poller`] (background
//! loop), and the read-only consumers [`api`] (HTTP query endpoint) and
//! [`reporter`] (JSON lines).

pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod poller;
pub mod reporter;
pub mod sensors;
pub mod state;
