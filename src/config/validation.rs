use std::collections::HashSet;

use crate::config::app_config::StoreConfig;
use crate::error::{ChunkStoreError, Result};
use crate::model::Provider;

impl StoreConfig {
    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk.chunk_size == 0 {
            return Err(ChunkStoreError::config("chunk size must be positive"));
        }
        if self.cloud.replication_count < 1 {
            return Err(ChunkStoreError::config("replication count must be at least 1"));
        }
        if self.transfer.max_concurrency == 0 {
            return Err(ChunkStoreError::config("max concurrency must be at least 1"));
        }

        let mut seen = HashSet::new();
        for (i, account) in self.cloud.accounts.iter().enumerate() {
            if account.name.trim().is_empty() {
                return Err(ChunkStoreError::config(format!(
                    "{} account {}: name cannot be empty",
                    account.provider, i
                )));
            }
            if !seen.insert((account.provider, account.name.as_str())) {
                return Err(ChunkStoreError::config(format!(
                    "duplicate {} account name: {}",
                    account.provider, account.name
                )));
            }
        }

        let mut listed = HashSet::new();
        for provider in &self.cloud.providers {
            if *provider == Provider::Local {
                return Err(ChunkStoreError::config(
                    "'local' is the fallback placement and cannot be listed as a provider",
                ));
            }
            if !listed.insert(*provider) {
                return Err(ChunkStoreError::config(format!("provider {} listed twice", provider)));
            }
            if self.cloud.enabled_accounts(*provider).next().is_none() {
                return Err(ChunkStoreError::config(format!(
                    "provider {} is enabled but no accounts are configured",
                    provider
                )));
            }
        }

        self.kdf
            .check_bounds()
            .map_err(|e| ChunkStoreError::config(format!("invalid key derivation parameters: {}", e)))?;

        Ok(())
    }
}
