use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error};
use reqwest::Client;

use crate::config::IpConfig;

/// Plain-text IP echo service (ipify and friends).
pub struct IpEcho {
    client: Client,
    url: String,
}

impl IpEcho {
    pub fn new(config: &IpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for IP lookup")?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// The caller's public address as reported by the echo service, trimmed.
    /// The text is not parsed as an IP address.
    pub async fn fetch_external_ip(&self) -> Option<String> {
        match self.fetch().await {
            Ok(ip) => {
                debug!("Current external IP: {}", ip);
                Some(ip)
            }
            Err(e) => {
                error!("Failed to get current IP: {:#}", e);
                None
            }
        }
    }

    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.url))?
            .error_for_status()
            .context("IP service returned an error")?;

        let text = response
            .text()
            .await
            .context("Failed to read IP service response")?;

        let ip = text.trim();
        if ip.is_empty() {
            anyhow::bail!("IP service returned an empty body");
        }
        Ok(ip.to_string())
    }
}
