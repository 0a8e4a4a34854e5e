use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, warn};

/// Value stored under a published path.
#[derive(Debug, Clone, PartialEq)]
pub enum BusValue {
    Int(i64),
    Float(f64),
    Text(String),
    /// Registered but not yet measured (energy counters start out unknown)
    None,
}

/// Unit attached to a path, used to render values for log output with the
/// platform's conventional rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Watts,
    Volts,
    Amps,
    KilowattHours,
    None,
}

impl Unit {
    pub fn format(&self, value: &BusValue) -> String {
        let number = match value {
            BusValue::Int(v) => *v as f64,
            BusValue::Float(v) => *v,
            BusValue::Text(text) => return text.clone(),
            BusValue::None => return "---".to_string(),
        };
        match self {
            Unit::Watts => format!("{number:.1} W"),
            Unit::Volts => format!("{number:.1} V"),
            Unit::Amps => format!("{number:.2} A"),
            Unit::KilowattHours => format!("{number:.2} kWh"),
            Unit::None => format!("{number}"),
        }
    }
}

/// An external write arriving from another bus participant.
#[derive(Debug, Clone)]
pub struct PathWrite {
    pub path: String,
    pub value: BusValue,
}

struct BusPath {
    value: BusValue,
    unit: Unit,
    writable: bool,
}

/// In-process register service holding the published paths.
///
/// Paths are registered once at startup and updated from the poll loop.
/// External writes arrive over an MPSC channel and are accepted and logged;
/// no consistency is enforced against externally written values.
#[derive(Clone)]
pub struct BusService {
    service_name: String,
    paths: Arc<Mutex<HashMap<String, BusPath>>>,
}

impl BusService {
    /// Creates the service and the write-back channel. The handler task for
    /// incoming writes runs for the process lifetime.
    pub fn new(service_name: impl Into<String>) -> (Self, Sender<PathWrite>) {
        let service = Self {
            service_name: service_name.into(),
            paths: Arc::new(Mutex::new(HashMap::new())),
        };

        let (tx, rx) = mpsc::channel(32);
        let handler = service.clone();
        tokio::spawn(async move {
            handler.handle_incoming_writes(rx).await;
        });

        (service, tx)
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Registers a path with its initial value. Re-registering replaces the
    /// previous entry.
    pub fn register(&self, path: &str, initial: BusValue, unit: Unit, writable: bool) {
        let mut paths = self.paths.lock().expect("shall lock bus paths");
        paths.insert(
            path.to_string(),
            BusPath {
                value: initial,
                unit,
                writable,
            },
        );
    }

    /// Updates a registered path; writes to unregistered paths are dropped.
    pub fn set(&self, path: &str, value: BusValue) {
        let mut paths = self.paths.lock().expect("shall lock bus paths");
        match paths.get_mut(path) {
            Some(entry) => entry.value = value,
            None => warn!("ignoring value for unregistered path {path}"),
        }
    }

    pub fn get(&self, path: &str) -> Option<BusValue> {
        let paths = self.paths.lock().expect("shall lock bus paths");
        paths.get(path).map(|entry| entry.value.clone())
    }

    /// Value rendered with its unit, for the sign-of-life log
    pub fn formatted(&self, path: &str) -> Option<String> {
        let paths = self.paths.lock().expect("shall lock bus paths");
        paths.get(path).map(|entry| entry.unit.format(&entry.value))
    }

    async fn handle_incoming_writes(self, mut writes: Receiver<PathWrite>) {
        while let Some(write) = writes.recv().await {
            let mut paths = self.paths.lock().expect("shall lock bus paths");
            match paths.get_mut(&write.path) {
                Some(entry) if entry.writable => {
                    debug!(
                        "someone else updated {} to {}",
                        write.path,
                        entry.unit.format(&write.value)
                    );
                    entry.value = write.value;
                }
                Some(_) => {
                    warn!("rejecting external write to read-only path {}", write.path);
                }
                None => {
                    warn!("external write to unregistered path {}", write.path);
                }
            }
        }
    }
}
