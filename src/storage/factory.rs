use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CloudConfig;
use crate::error::{ChunkStoreError, Result};
use crate::model::Destination;
use crate::storage::backend::{BackendSpec, ChunkBackend};
use crate::storage::backends::{FolderBackend, MemoryBackend};

/// Builds the built-in backends from their configuration.
pub struct BackendFactory;

impl BackendFactory {
    pub async fn create_backend(spec: &BackendSpec) -> Result<Arc<dyn ChunkBackend>> {
        match spec {
            BackendSpec::Folder { path, create_dirs } => {
                let backend = FolderBackend::new(path, create_dirs.unwrap_or(true))
                    .await
                    .map_err(|e| ChunkStoreError::config(format!("folder backend {}: {}", path, e)))?;
                Ok(Arc::new(backend))
            }
            BackendSpec::Memory => Ok(Arc::new(MemoryBackend::new())),
        }
    }
}

/// Explicit set of live backends, one per destination, owned by the caller.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<Destination, Arc<dyn ChunkBackend>>,
    order: Vec<Destination>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create backends for every enabled account that declares a built-in one.
    ///
    /// Accounts without a `backend` entry (vendor clouds) must be registered by
    /// the caller with its own implementation.
    pub async fn from_config(cloud: &CloudConfig) -> Result<Self> {
        let mut registry = Self::new();
        for account in cloud.accounts.iter().filter(|a| a.enabled) {
            let Some(spec) = &account.backend else {
                tracing::debug!(
                    provider = %account.provider,
                    account = %account.name,
                    "No built-in backend configured; expecting caller registration"
                );
                continue;
            };
            let backend = BackendFactory::create_backend(spec).await?;
            registry.register(Destination::new(account.provider, account.name.clone()), backend);
        }
        Ok(registry)
    }

    /// Register (or replace) the backend serving `destination`.
    pub fn register(&mut self, destination: Destination, backend: Arc<dyn ChunkBackend>) {
        if self.backends.insert(destination.clone(), backend).is_none() {
            self.order.push(destination);
        }
    }

    pub fn get(&self, destination: &Destination) -> Option<Arc<dyn ChunkBackend>> {
        self.backends.get(destination).cloned()
    }

    /// Registered destinations in registration order.
    pub fn destinations(&self) -> &[Destination] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn remove(&mut self, destination: &Destination) -> Option<Arc<dyn ChunkBackend>> {
        self.order.retain(|d| d != destination);
        self.backends.remove(destination)
    }
}
