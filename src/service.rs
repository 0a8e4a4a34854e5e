use crate::bus::{BusService, BusValue, PathWrite, Unit};
use crate::config::Config;
use crate::reading::{DeviceIdentity, Reading};
use crate::shelly_client::ShellyClient;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Fixed period of the fetch-transform-publish cycle.
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// The measurement paths written on every tick.
const MEASUREMENT_PATHS: [(&str, Unit); 6] = [
    ("/Ac/Power", Unit::Watts),
    ("/Ac/Energy/Forward", Unit::KilowattHours),
    ("/Ac/L1/Current", Unit::Amps),
    ("/Ac/L1/Energy/Forward", Unit::KilowattHours),
    ("/Ac/L1/Power", Unit::Watts),
    ("/Ac/L1/Voltage", Unit::Volts),
];

/// Grid-meter service bridging one Shelly(Plus) 1PM to the bus.
///
/// Owns the whole poll cycle: fetch the device status, extract a
/// [`Reading`], publish it (zeros when the device is offline or draws no
/// power), and bump `/UpdateIndex` so consumers can detect fresh data.
pub struct ShellyGridService {
    config: Config,
    client: ShellyClient,
    bus: BusService,
    writes: Sender<PathWrite>,
    update_index: u8,
    last_update: Option<DateTime<Utc>>,
}

impl ShellyGridService {
    /// Builds the service: one identity fetch (serial falls back to
    /// "Offline"), then path registration. Never fails on an unreachable
    /// device.
    pub async fn new(config: Config) -> ShellyGridService {
        let client = ShellyClient::new(&config);
        let identity = DeviceIdentity::detect(&client).await;
        info!(
            "connecting {} (serial {}) at {}",
            identity.product_name,
            identity.serial,
            client.status_url()
        );

        let service_name =
            format!("com.victronenergy.grid.http_{:02}", config.device_instance);
        let (bus, writes) = BusService::new(service_name);
        register_paths(&bus, &config, &identity);

        ShellyGridService {
            config,
            client,
            bus,
            writes,
            update_index: 0,
            last_update: None,
        }
    }

    /// Handle for other bus participants to write published paths back.
    pub fn write_handle(&self) -> Sender<PathWrite> {
        self.writes.clone()
    }

    pub fn bus(&self) -> &BusService {
        &self.bus
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Runs both timers on one cooperative loop; each tick runs to
    /// completion before the next fires, and neither timer is ever
    /// cancelled.
    pub async fn run(mut self) {
        info!("service {} entering poll loop", self.bus.service_name());
        let mut update_timer = interval(UPDATE_INTERVAL);

        match self.config.sign_of_life_interval() {
            Some(heartbeat_period) => {
                let mut heartbeat_timer = interval(heartbeat_period);
                loop {
                    tokio::select! {
                        _ = update_timer.tick() => self.update_tick().await,
                        _ = heartbeat_timer.tick() => self.sign_of_life(),
                    }
                }
            }
            None => loop {
                update_timer.tick().await;
                self.update_tick().await;
            },
        }
    }

    /// One poll cycle. Errors are caught here so the timer keeps firing.
    pub async fn update_tick(&mut self) {
        if let Err(err) = self.run_update().await {
            error!("update tick failed: {err:#}");
        }
    }

    async fn run_update(&mut self) -> anyhow::Result<()> {
        let reading = match self.client.fetch_status().await {
            Ok(status) => {
                debug!("Shelly status: {status}");
                Reading::from_status(&status)?
            }
            Err(err) => {
                info!("Shelly offline: {err:#}");
                Reading::default()
            }
        };

        self.publish_reading(&reading);

        // Wrapping counter signalling fresh data to downstream consumers
        self.update_index = self.update_index.wrapping_add(1);
        self.bus
            .set("/UpdateIndex", BusValue::Int(self.update_index as i64));

        self.last_update = Some(Utc::now());
        Ok(())
    }

    fn publish_reading(&self, reading: &Reading) {
        self.bus.set("/Ac/Power", BusValue::Float(reading.power_w));
        self.bus.set(
            "/Ac/Energy/Forward",
            BusValue::Float(reading.total_energy_kwh),
        );
        self.bus
            .set("/Ac/L1/Current", BusValue::Float(reading.current_a));
        self.bus.set(
            "/Ac/L1/Energy/Forward",
            BusValue::Float(reading.total_energy_kwh),
        );
        self.bus
            .set("/Ac/L1/Power", BusValue::Float(reading.power_w));
        self.bus
            .set("/Ac/L1/Voltage", BusValue::Float(reading.voltage_v));
    }

    /// Periodic heartbeat in the log, to tell a healthy quiet service from
    /// a dead one.
    pub fn sign_of_life(&self) {
        info!("--- Start: sign of life ---");
        match self.last_update {
            Some(at) => info!("Last update tick: {}", at.format("%Y-%m-%d %H:%M:%S")),
            None => info!("Last update tick: never"),
        }
        if let Some(power) = self.bus.formatted("/Ac/Power") {
            info!("Last '/Ac/Power': {power}");
        }
        info!("--- End: sign of life ---");
    }
}

fn register_paths(bus: &BusService, config: &Config, identity: &DeviceIdentity) {
    // Identity and management paths, set once and read-only
    bus.register(
        "/ProductName",
        BusValue::Text(identity.product_name.to_string()),
        Unit::None,
        false,
    );
    bus.register(
        "/CustomName",
        BusValue::Text(config.custom_name.clone()),
        Unit::None,
        false,
    );
    bus.register(
        "/Mgmt/Connection",
        BusValue::Text("Shelly(Plus) 1PM HTTP JSON service".to_string()),
        Unit::None,
        false,
    );
    bus.register(
        "/Mgmt/ProcessName",
        BusValue::Text(env!("CARGO_PKG_NAME").to_string()),
        Unit::None,
        false,
    );
    bus.register(
        "/Mgmt/ProcessVersion",
        BusValue::Text(env!("CARGO_PKG_VERSION").to_string()),
        Unit::None,
        false,
    );
    bus.register("/Connected", BusValue::Int(1), Unit::None, false);
    bus.register(
        "/DeviceInstance",
        BusValue::Int(config.device_instance as i64),
        Unit::None,
        false,
    );
    bus.register("/ProductId", BusValue::Int(0xFFFF), Unit::None, false);
    bus.register(
        "/Serial",
        BusValue::Text(identity.serial.clone()),
        Unit::None,
        false,
    );
    bus.register(
        "/HardwareVersion",
        BusValue::Int(identity.hardware_version),
        Unit::None,
        false,
    );
    bus.register(
        "/FirmwareVersion",
        BusValue::Float(identity.firmware_version),
        Unit::None,
        false,
    );
    bus.register("/UpdateIndex", BusValue::Int(0), Unit::None, false);

    // Measurement paths, updated every tick and writable from the bus
    for (path, unit) in MEASUREMENT_PATHS {
        let initial = match unit {
            Unit::KilowattHours => BusValue::None,
            _ => BusValue::Int(0),
        };
        bus.register(path, initial, unit, true);
    }
}
