use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;

use shelly_grid_bridge::{BusValue, Config, PathWrite, ShellyGridService};

/// Mock Shelly(Plus) 1PM HTTP device serving `Shelly.GetStatus`
struct MockShellyDevice {
    power: Mutex<f64>,
    voltage: Mutex<f64>,
    total_wh: Mutex<f64>,
    mac: Mutex<String>,
    should_fail: AtomicBool,
    drop_switch_section: AtomicBool,
    request_count: AtomicU32,
}

impl MockShellyDevice {
    fn new() -> Self {
        Self {
            power: Mutex::new(0.0),
            voltage: Mutex::new(230.0),
            total_wh: Mutex::new(0.0),
            mac: Mutex::new("AA:BB:CC:DD:EE:FF".to_string()),
            should_fail: AtomicBool::new(false),
            drop_switch_section: AtomicBool::new(false),
            request_count: AtomicU32::new(0),
        }
    }

    fn set_reading(&self, power: f64, voltage: f64, total_wh: f64) {
        *self.power.lock().unwrap() = power;
        *self.voltage.lock().unwrap() = voltage;
        *self.total_wh.lock().unwrap() = total_wh;
    }

    fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::Relaxed);
    }

    fn set_drop_switch_section(&self, drop: bool) {
        self.drop_switch_section.store(drop, Ordering::Relaxed);
    }

    fn get_request_count(&self) -> u32 {
        self.request_count.load(Ordering::Relaxed)
    }

    fn status_document(&self) -> Value {
        let mut status = json!({
            "sys": {"mac": *self.mac.lock().unwrap()},
            "switch:0": {
                "apower": *self.power.lock().unwrap(),
                "voltage": *self.voltage.lock().unwrap(),
                "aenergy": {"total": *self.total_wh.lock().unwrap()},
            },
        });
        if self.drop_switch_section.load(Ordering::Relaxed) {
            status.as_object_mut().unwrap().remove("switch:0");
        }
        status
    }

    fn create_router(self: Arc<Self>) -> Router {
        Router::new().route(
            "/rpc/Shelly.GetStatus",
            get({
                let device = self.clone();
                move || async move {
                    device.request_count.fetch_add(1, Ordering::Relaxed);

                    if device.should_fail.load(Ordering::Relaxed) {
                        return Err(StatusCode::INTERNAL_SERVER_ERROR);
                    }

                    Ok(Json(device.status_document()))
                }
            }),
        )
    }
}

/// Starts the mock device on an ephemeral port and returns its host:port
async fn start_mock_device(device: Arc<MockShellyDevice>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, device.create_router()).await.unwrap();
    });
    // Give the server a moment to start accepting
    sleep(Duration::from_millis(20)).await;
    addr.to_string()
}

fn config_for_host(host: &str) -> Config {
    serde_json::from_str(&format!(
        r#"{{
            "Deviceinstance": 40,
            "CustomName": "Shore power",
            "SignOfLifeLog": 1,
            "Host": "{host}",
            "timeout": 1.0
        }}"#
    ))
    .unwrap()
}

const MEASUREMENT_PATHS: [&str; 6] = [
    "/Ac/Power",
    "/Ac/Energy/Forward",
    "/Ac/L1/Current",
    "/Ac/L1/Energy/Forward",
    "/Ac/L1/Power",
    "/Ac/L1/Voltage",
];

#[tokio::test]
async fn test_online_tick_publishes_full_reading() {
    let device = Arc::new(MockShellyDevice::new());
    device.set_reading(690.0, 230.0, 12500.0);
    let host = start_mock_device(device.clone()).await;

    let mut service = ShellyGridService::new(config_for_host(&host)).await;
    service.update_tick().await;

    let bus = service.bus();
    assert_eq!(bus.get("/Ac/Power"), Some(BusValue::Float(690.0)));
    assert_eq!(bus.get("/Ac/L1/Power"), Some(BusValue::Float(690.0)));
    assert_eq!(bus.get("/Ac/L1/Voltage"), Some(BusValue::Float(230.0)));
    assert_eq!(bus.get("/Ac/L1/Current"), Some(BusValue::Float(3.0)));
    assert_eq!(bus.get("/Ac/Energy/Forward"), Some(BusValue::Float(12.5)));
    assert_eq!(
        bus.get("/Ac/L1/Energy/Forward"),
        Some(BusValue::Float(12.5))
    );
    assert_eq!(bus.get("/UpdateIndex"), Some(BusValue::Int(1)));

    // Identity fetch plus one tick
    assert_eq!(device.get_request_count(), 2);
}

#[tokio::test]
async fn test_serial_is_device_mac() {
    let device = Arc::new(MockShellyDevice::new());
    let host = start_mock_device(device).await;

    let service = ShellyGridService::new(config_for_host(&host)).await;
    assert_eq!(
        service.bus().get("/Serial"),
        Some(BusValue::Text("AA:BB:CC:DD:EE:FF".to_string()))
    );
    assert_eq!(
        service.bus().get("/ProductName"),
        Some(BusValue::Text("Shelly(Plus) 1PM".to_string()))
    );
    assert_eq!(
        service.bus().get("/CustomName"),
        Some(BusValue::Text("Shore power".to_string()))
    );
}

#[tokio::test]
async fn test_non_positive_power_zeroes_every_field() {
    let device = Arc::new(MockShellyDevice::new());
    device.set_reading(690.0, 230.0, 12500.0);
    let host = start_mock_device(device.clone()).await;

    let mut service = ShellyGridService::new(config_for_host(&host)).await;
    service.update_tick().await;
    assert_eq!(
        service.bus().get("/Ac/Power"),
        Some(BusValue::Float(690.0))
    );

    // Relay switched off: the device keeps answering but draws no power
    device.set_reading(0.0, 230.0, 12500.0);
    service.update_tick().await;

    for path in MEASUREMENT_PATHS {
        assert_eq!(
            service.bus().get(path),
            Some(BusValue::Float(0.0)),
            "path {path} shall be zeroed for non-positive power"
        );
    }
    assert_eq!(service.bus().get("/UpdateIndex"), Some(BusValue::Int(2)));
}

#[tokio::test]
async fn test_device_failure_mid_run_publishes_zeros() {
    let device = Arc::new(MockShellyDevice::new());
    device.set_reading(100.0, 230.0, 5000.0);
    let host = start_mock_device(device.clone()).await;

    let mut service = ShellyGridService::new(config_for_host(&host)).await;
    service.update_tick().await;
    assert_eq!(
        service.bus().get("/Ac/Power"),
        Some(BusValue::Float(100.0))
    );

    device.set_should_fail(true);
    service.update_tick().await;

    for path in MEASUREMENT_PATHS {
        assert_eq!(service.bus().get(path), Some(BusValue::Float(0.0)));
    }
    // Offline ticks still count as updates
    assert_eq!(service.bus().get("/UpdateIndex"), Some(BusValue::Int(2)));

    // And the device coming back restores real values
    device.set_should_fail(false);
    service.update_tick().await;
    assert_eq!(
        service.bus().get("/Ac/Power"),
        Some(BusValue::Float(100.0))
    );
    assert_eq!(service.bus().get("/UpdateIndex"), Some(BusValue::Int(3)));
}

#[tokio::test]
async fn test_malformed_status_is_a_tick_error_without_index_bump() {
    let device = Arc::new(MockShellyDevice::new());
    device.set_reading(100.0, 230.0, 5000.0);
    let host = start_mock_device(device.clone()).await;

    let mut service = ShellyGridService::new(config_for_host(&host)).await;
    service.update_tick().await;
    assert_eq!(service.bus().get("/UpdateIndex"), Some(BusValue::Int(1)));

    // Valid JSON but missing the switch component: a tick-level error, not
    // an offline device. The last published values stay in place.
    device.set_drop_switch_section(true);
    service.update_tick().await;

    assert_eq!(
        service.bus().get("/Ac/Power"),
        Some(BusValue::Float(100.0))
    );
    assert_eq!(service.bus().get("/UpdateIndex"), Some(BusValue::Int(1)));
}

#[tokio::test]
async fn test_external_write_back_is_accepted_until_next_tick() {
    let device = Arc::new(MockShellyDevice::new());
    device.set_reading(100.0, 230.0, 5000.0);
    let host = start_mock_device(device).await;

    let mut service = ShellyGridService::new(config_for_host(&host)).await;
    service.update_tick().await;

    service
        .write_handle()
        .send(PathWrite {
            path: "/Ac/Power".to_string(),
            value: BusValue::Float(42.0),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(service.bus().get("/Ac/Power"), Some(BusValue::Float(42.0)));

    // The externally written value is not enforced; the next tick simply
    // overwrites it.
    service.update_tick().await;
    assert_eq!(
        service.bus().get("/Ac/Power"),
        Some(BusValue::Float(100.0))
    );
}
