//! Configuration loading and validation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Transmitter endpoint table (JSON)
    #[serde(default = "default_tx_endpoints")]
    pub tx_endpoints: PathBuf,
    /// Receiver endpoint table (JSON)
    #[serde(default = "default_rx_endpoints")]
    pub rx_endpoints: PathBuf,
    /// Address table URI stamped into synthesized device configs
    #[serde(default = "default_address_table")]
    pub address_table: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tx_endpoints: default_tx_endpoints(),
            rx_endpoints: default_rx_endpoints(),
            address_table: default_address_table(),
        }
    }
}

fn default_tx_endpoints() -> PathBuf {
    PathBuf::from("./config/tx_endpoints.json")
}

fn default_rx_endpoints() -> PathBuf {
    PathBuf::from("./config/rx_endpoints.json")
}

fn default_address_table() -> String {
    "file://config/hermes_wib/tx_mux_wib.xml".to_string()
}

/// Load configuration from file, falling back to defaults when absent
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
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
