//! Shelly Grid Bridge Library
//!
//! This library polls a Shelly(Plus) 1PM smart relay over HTTP and
//! republishes its electrical measurements as a grid-meter service on the
//! energy-monitoring bus, with an update counter for downstream consumers
//! and a periodic sign-of-life log.

pub mod bus;
pub mod config;
pub mod logging;
pub mod reading;
pub mod service;
pub mod shelly_client;

// Re-export commonly used types for easier access
pub use bus::{BusService, BusValue, PathWrite, Unit};
pub use config::Config;
pub use reading::{DeviceIdentity, Reading};
pub use service::ShellyGridService;
pub use shelly_client::ShellyClient;
