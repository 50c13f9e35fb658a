//! Configuration loading and validation

use anyhow::{bail, Context, Result};
use meshmap_core::classify::{self, RouterRule};
use meshmap_core::registry::default_wifi_manufacturers;
use meshmap_core::{EngineSettings, Thresholds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub otbr: OtbrConfig,
    #[serde(default)]
    pub link_quality: Thresholds,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub health: HealthConfig,
    /// Extra classification rules, checked before the built-in table
    #[serde(default, rename = "router_rule")]
    pub router_rules: Vec<RouterRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Seconds between diagnostic polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtbrConfig {
    /// Base URL of the border router REST API, e.g. `http://192.168.1.10:8081`
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for OtbrConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// TOML or JSON device list, re-read every cycle
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Manufacturers treated as WiFi-bridged when an entry has no transport marker
    #[serde(default = "default_wifi_manufacturers")]
    pub wifi_manufacturers: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: None,
            wifi_manufacturers: default_wifi_manufacturers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive failed cycles before the network is reported degraded
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_after: default_degraded_after(),
        }
    }
}

fn default_degraded_after() -> u32 {
    meshmap_core::store::DEFAULT_DEGRADED_AFTER
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        match self.otbr.url.as_deref().map(str::trim) {
            None | Some("") => bail!("No OTBR URL configured: set [otbr] url or pass --otbr-url"),
            Some(_) => {}
        }
        if self.daemon.poll_interval_secs == 0 {
            bail!("daemon.poll_interval_secs must be greater than zero");
        }
        if self.otbr.timeout_secs == 0 {
            bail!("otbr.timeout_secs must be greater than zero");
        }
        if self.health.degraded_after == 0 {
            bail!("health.degraded_after must be greater than zero");
        }
        self.link_quality
            .validate()
            .context("Invalid [link_quality] table")?;
        Ok(())
    }

    pub fn otbr_url(&self) -> Result<&str> {
        self.otbr
            .url
            .as_deref()
            .context("No OTBR URL configured")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.daemon.poll_interval_secs)
    }

    pub fn otbr_timeout(&self) -> Duration {
        Duration::from_secs(self.otbr.timeout_secs)
    }

    /// Engine settings: user rules first, then the built-in table
    pub fn engine_settings(&self) -> EngineSettings {
        let mut rules = self.router_rules.clone();
        rules.extend(classify::default_rules());
        EngineSettings {
            thresholds: self.link_quality,
            rules,
            wifi_manufacturers: self.registry.wifi_manufacturers.clone(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
