//! rosterd.toml configuration.
//!
//! Every field has a default, so an empty or missing file is valid.
//! Command-line flags override file values.

use std::path::Path;
use std::time::Duration;

use roster_hub::HubSettings;
use roster_state::Role;
use roster_sync::{ChannelConfig, EngineConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterdConfig {
    pub hub: HubSection,
    pub watch: WatchSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSection {
    pub port: u16,
    pub registration_ttl_secs: u64,
    pub reap_interval_secs: u64,
    pub event_buffer: usize,
    pub keep_alive_secs: u64,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            port: 8080,
            registration_ttl_secs: 30,
            reap_interval_secs: 10,
            event_buffer: 256,
            keep_alive_secs: 5,
        }
    }
}

impl HubSection {
    pub fn settings(&self) -> HubSettings {
        HubSettings {
            registration_ttl: Duration::from_secs(self.registration_ttl_secs),
            event_buffer: self.event_buffer,
            keep_alive: Duration::from_secs(self.keep_alive_secs.max(1)),
        }
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Hub `host:port`.
    pub hub: String,
    pub roles: Vec<Role>,
    pub queue_capacity: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            hub: "127.0.0.1:8080".to_string(),
            roles: Role::ALL.to_vec(),
            queue_capacity: 256,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl WatchSection {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            roles: self.roles.clone(),
            queue_capacity: self.queue_capacity.max(1),
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms)),
        }
    }
}

impl RosterdConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RosterdConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Read `path` when given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path)
                .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display())),
            None => Ok(Self::default()),
        }
    }
}
