use serde_derive::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration of the bridge, read from a JSON file.
///
/// Key names match the original installer-facing config file.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Device instance number used to register the bus service
    #[serde(rename = "Deviceinstance")]
    pub device_instance: u32,

    /// Display name published under /CustomName
    #[serde(rename = "CustomName")]
    pub custom_name: String,

    /// Minutes between sign-of-life log lines; 0 disables the heartbeat
    #[serde(rename = "SignOfLifeLog", default)]
    pub sign_of_life_minutes: u64,

    /// Log level for console and file output (trace/debug/info/warn/error)
    #[serde(rename = "LogLevel", default = "default_log_level")]
    pub log_level: String,

    /// Host name or IP of the Shelly device, optionally with a port
    #[serde(rename = "Host")]
    pub host: String,

    /// Digest-auth user, only used when both username and password are set
    #[serde(rename = "Username", default)]
    pub username: String,

    #[serde(rename = "Password", default)]
    pub password: String,

    /// Network timeout per request, in seconds
    #[serde(rename = "timeout")]
    pub timeout_s: f64,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Config {
    /// Reads the config file, or fails with the reason (the only fatal
    /// startup path).
    pub fn read_from_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("cannot read config file '{}': {}", path.display(), e)
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            anyhow::anyhow!("cannot parse config file '{}': {}", path.display(), e)
        })?;
        Ok(config)
    }

    /// URL of the device status endpoint
    pub fn status_url(&self) -> String {
        format!("http://{}/rpc/Shelly.GetStatus", self.host)
    }

    /// Network connection timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_s)
    }

    /// Digest credentials, when both username and password are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((&self.username, &self.password))
        }
    }

    /// Interval between sign-of-life log lines, `None` when disabled
    pub fn sign_of_life_interval(&self) -> Option<Duration> {
        if self.sign_of_life_minutes == 0 {
            None
        } else {
            Some(Duration::from_secs(self.sign_of_life_minutes * 60))
        }
    }
}
