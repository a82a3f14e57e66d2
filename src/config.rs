use std::fs;
use std::time::Duration;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::parse_address;
use crate::reconcile::balance::ETH_BALANCE_GAP;
use crate::reconcile::engine::{LayerSettings, StartBalanceSeed};
use crate::reconcile::window::MESSAGE_LIMIT;
use crate::types::Layer;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid {layer} config: {reason}")]
    Invalid { layer: Layer, reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    pub layer1: LayerConfig,
    pub layer2: LayerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReconcileConfig {
    /// Unchecked records fetched per cycle
    pub batch_size: usize,
    /// Blocks behind head after which a pruning node is not queried
    pub balance_gap: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            batch_size: MESSAGE_LIMIT,
            balance_gap: ETH_BALANCE_GAP,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LayerConfig {
    pub rpc_url: String,
    pub messenger_address: String,
    pub check_interval_ms: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Defaults to true on layer1 only
    #[serde(default)]
    pub prunes_history: Option<bool>,
    /// Decimal wei; absent means the on-chain balance at height 0
    #[serde(default)]
    pub start_messenger_balance: Option<String>,
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

impl LayerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn seed(&self, layer: Layer) -> Result<StartBalanceSeed, ConfigError> {
        let Some(raw) = &self.start_messenger_balance else {
            return Ok(StartBalanceSeed::Genesis);
        };
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                layer,
                reason: format!("start_messenger_balance {:?} is not a decimal wei amount", raw),
            });
        }
        raw.parse::<BigInt>()
            .map(StartBalanceSeed::Configured)
            .map_err(|e| ConfigError::Invalid {
                layer,
                reason: format!("start_messenger_balance {:?}: {}", raw, e),
            })
    }

    /// Engine settings for `layer`, with the messenger address validated
    pub fn settings(
        &self,
        layer: Layer,
        reconcile: &ReconcileConfig,
    ) -> Result<LayerSettings, ConfigError> {
        let address = parse_address(&self.messenger_address).map_err(|e| ConfigError::Invalid {
            layer,
            reason: e.to_string(),
        })?;

        if self.check_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                layer,
                reason: "check_interval_ms must be greater than zero".to_string(),
            });
        }

        let mut settings = LayerSettings::new(layer, address, self.seed(layer)?);
        if let Some(prunes) = self.prunes_history {
            settings.prunes_history = prunes;
        }
        settings.batch_size = reconcile.batch_size;
        settings.balance_gap = reconcile.balance_gap;
        Ok(settings)
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn layer(&self, layer: Layer) -> &LayerConfig {
        match layer {
            Layer::Layer1 => &self.layer1,
            Layer::Layer2 => &self.layer2,
        }
    }
}
