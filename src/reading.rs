use crate::shelly_client::ShellyClient;
use anyhow::Context;
use serde_json::Value;
use tracing::warn;

/// One measurement cycle worth of electrical values.
///
/// Invariant: when the device reports power > 0 and a non-zero voltage,
/// `current_a` is power/voltage and all fields carry the reported values;
/// in every other case (offline, power <= 0, zero voltage) all fields are
/// zero, so downstream consumers never see a half-populated reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    /// Active power in Watts
    pub power_w: f64,
    /// AC voltage in Volts
    pub voltage_v: f64,
    /// Derived current in Amps (power / voltage)
    pub current_a: f64,
    /// Cumulative energy in kWh (the device counts Wh)
    pub total_energy_kwh: f64,
}

impl Reading {
    /// Extracts a reading from a `Shelly.GetStatus` document.
    ///
    /// Missing or non-numeric fields are an error (a tick-level failure,
    /// distinct from the device being unreachable).
    pub fn from_status(status: &Value) -> anyhow::Result<Reading> {
        let switch = status
            .get("switch:0")
            .context("status has no 'switch:0' component")?;
        let power = switch
            .get("apower")
            .and_then(Value::as_f64)
            .context("'switch:0' has no numeric 'apower'")?;
        let voltage = switch
            .get("voltage")
            .and_then(Value::as_f64)
            .context("'switch:0' has no numeric 'voltage'")?;
        let total_wh = switch
            .get("aenergy")
            .and_then(|aenergy| aenergy.get("total"))
            .and_then(Value::as_f64)
            .context("'switch:0' has no numeric 'aenergy.total'")?;

        if power > 0.0 && voltage != 0.0 {
            Ok(Reading {
                power_w: power,
                voltage_v: voltage,
                current_a: power / voltage,
                total_energy_kwh: total_wh / 1000.0,
            })
        } else {
            Ok(Reading::default())
        }
    }
}

/// Identity of the metered device, fetched once at startup and never
/// refreshed.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Device MAC, or "Offline" when the device could not be reached
    pub serial: String,
    pub product_name: &'static str,
    pub firmware_version: f64,
    pub hardware_version: i64,
}

impl DeviceIdentity {
    pub const PRODUCT_NAME: &'static str = "Shelly(Plus) 1PM";
    pub const OFFLINE_SERIAL: &'static str = "Offline";

    /// Queries the device once for its MAC address. Any failure leaves the
    /// serial at "Offline"; startup continues either way.
    pub async fn detect(client: &ShellyClient) -> DeviceIdentity {
        let serial = match client.fetch_status().await {
            Ok(status) => match status["sys"]["mac"].as_str() {
                Some(mac) if !mac.is_empty() => mac.to_string(),
                _ => {
                    warn!("status response carries no 'sys.mac', reporting serial as offline");
                    Self::OFFLINE_SERIAL.to_string()
                }
            },
            Err(err) => {
                warn!("device not reachable during identity fetch: {err:#}");
                Self::OFFLINE_SERIAL.to_string()
            }
        };

        DeviceIdentity {
            serial,
            product_name: Self::PRODUCT_NAME,
            firmware_version: 0.1,
            hardware_version: 0,
        }
    }
}
