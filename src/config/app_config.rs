use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::chunk::DEFAULT_CHUNK_SIZE;
use crate::crypto::KdfParams;
use crate::distribution::{DistributionStrategy, PlacementPolicy};
use crate::model::{Destination, Provider};
use crate::orchestrator::{ReplicaFailurePolicy, TransferOptions};
use crate::storage::backend::BackendSpec;

pub const CONFIG_VERSION: &str = "1.0";

/// Main configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoreConfig {
    pub version: String,
    pub chunk: ChunkConfig,
    pub cloud: CloudConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub kdf: KdfParams,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChunkConfig {
    /// Size in bytes
    pub chunk_size: u64,
}

/// Cloud placement: which providers, which accounts, how many copies.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CloudConfig {
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    pub replication_count: usize,
    #[serde(default)]
    pub load_balancing: PlacementPolicy,
    /// Only used by the random policy
    #[serde(default)]
    pub placement_seed: u64,
}

/// A single account on a provider
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AccountConfig {
    pub name: String,
    pub provider: Provider,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    /// Built-in backend for this account, if any
    #[serde(default)]
    pub backend: Option<BackendSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransferConfig {
    pub max_concurrency: usize,
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub replica_failure: ReplicaFailurePolicy,
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            chunk: ChunkConfig {
                chunk_size: DEFAULT_CHUNK_SIZE as u64,
            },
            cloud: CloudConfig::default(),
            transfer: TransferConfig::default(),
            kdf: KdfParams::default(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            accounts: Vec::new(),
            replication_count: 1,
            load_balancing: PlacementPolicy::RoundRobin,
            placement_seed: 0,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            call_timeout_secs: 120,
            max_retries: 0,
            replica_failure: ReplicaFailurePolicy::Continue,
        }
    }
}

impl StoreConfig {
    /// Load from JSON, writing the default configuration first when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, creating default config");
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: StoreConfig = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create config directory {}", dir.display()))?;
        }
        let data = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, data).with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk.chunk_size as usize
    }

    pub fn strategy(&self) -> crate::error::Result<DistributionStrategy> {
        Ok(DistributionStrategy::new(
            self.cloud.destination_pool(),
            self.cloud.replication_count,
            self.cloud.load_balancing,
        )?
        .with_seed(self.cloud.placement_seed))
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            max_concurrency: self.transfer.max_concurrency.max(1),
            call_timeout: (self.transfer.call_timeout_secs > 0)
                .then(|| Duration::from_secs(self.transfer.call_timeout_secs)),
            max_retries: self.transfer.max_retries,
            replica_failure: self.transfer.replica_failure,
            ..TransferOptions::default()
        }
    }
}

impl CloudConfig {
    pub fn enabled_accounts(&self, provider: Provider) -> impl Iterator<Item = &AccountConfig> {
        self.accounts
            .iter()
            .filter(move |a| a.enabled && a.provider == provider)
    }

    /// Flatten providers (declared order) and their enabled accounts (declared order)
    /// into the ordered destination pool.
    pub fn destination_pool(&self) -> Vec<Destination> {
        self.providers
            .iter()
            .flat_map(|provider| {
                self.enabled_accounts(*provider)
                    .map(|account| Destination::new(account.provider, account.name.clone()))
            })
            .collect()
    }

    pub fn total_enabled_accounts(&self) -> usize {
        self.accounts.iter().filter(|a| a.enabled).count()
    }
}
