use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
    #[serde(default)]
    pub cloudflare: CloudflareConfig,
    #[serde(default)]
    pub ip: IpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudflareConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpConfig {
    #[serde(default = "default_ip_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_credentials_file() -> String {
    "credentials.json".to_string()
}

fn default_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_ip_url() -> String {
    "https://api.ipify.org".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            credentials_file: default_credentials_file(),
            cloudflare: CloudflareConfig::default(),
            ip: IpConfig::default(),
        }
    }
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for IpConfig {
    fn default() -> Self {
        Self {
            url: default_ip_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// A zero timeout would fail every request before it is sent.
    fn validate(&self) -> Result<()> {
        if self.cloudflare.timeout_secs == 0 {
            anyhow::bail!("cloudflare.timeout_secs must be at least 1");
        }
        if self.ip.timeout_secs == 0 {
            anyhow::bail!("ip.timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Loads `path` when given. Without an explicit path the default file is
    /// optional and built-in defaults are used when it does not exist.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }
}
