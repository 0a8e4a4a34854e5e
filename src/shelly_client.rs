use crate::config::Config;
use diqwest::WithDigestAuth;
use std::time::Duration;

/// HTTP client for the Shelly(Plus) 1PM status endpoint.
///
/// One GET per call, no retry. Any transport error, timeout, non-2xx
/// status or JSON-decode failure is reported as an error; the caller
/// decides whether that means "device offline" or "tick failed".
pub struct ShellyClient {
    status_url: String,
    credentials: Option<(String, String)>,
    timeout: Duration,
    client: reqwest::Client,
}

impl ShellyClient {
    pub fn new(config: &Config) -> Self {
        Self {
            status_url: config.status_url(),
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
            timeout: config.timeout(),
            client: reqwest::Client::new(),
        }
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    /// Fetches `Shelly.GetStatus` and returns the raw JSON document.
    pub async fn fetch_status(&self) -> Result<serde_json::Value, anyhow::Error> {
        let request = self.client.get(&self.status_url).timeout(self.timeout);

        // Shelly Gen2 devices challenge with digest auth when protected
        let response = match &self.credentials {
            Some((user, pass)) => request.send_with_digest_auth(user, pass).await?,
            None => request.send().await?,
        };

        let status = response.error_for_status()?.json().await?;
        Ok(status)
    }
}
