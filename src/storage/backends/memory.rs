use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::storage::backend::{BackendError, ChunkBackend};

struct StoredObject {
    name: String,
    data: Vec<u8>,
}

/// In-process store keyed by generated ids.
#[derive(Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, StoredObject>>,
    next_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Overwrite a stored object in place.
    pub async fn replace(&self, remote_id: &str, data: Vec<u8>) -> Result<(), BackendError> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(remote_id)
            .ok_or_else(|| BackendError::NotFound(remote_id.to_string()))?;
        object.data = data;
        Ok(())
    }
}

fn file_name(remote_path: &str) -> &str {
    remote_path.rsplit('/').next().unwrap_or(remote_path)
}

#[async_trait]
impl ChunkBackend for MemoryBackend {
    async fn upload(&self, data: &[u8], remote_path: &str) -> Result<String, BackendError> {
        let id = format!("mem-{:016}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.objects.write().await.insert(
            id.clone(),
            StoredObject {
                name: file_name(remote_path).to_string(),
                data: data.to_vec(),
            },
        );
        Ok(id)
    }

    async fn download(&self, remote_id: &str) -> Result<Vec<u8>, BackendError> {
        self.objects
            .read()
            .await
            .get(remote_id)
            .map(|o| o.data.clone())
            .ok_or_else(|| BackendError::NotFound(remote_id.to_string()))
    }

    async fn find_by_name(&self, name: &str) -> Result<String, BackendError> {
        self.objects
            .read()
            .await
            .iter()
            .filter(|(_, o)| o.name == name)
            .map(|(id, _)| id.clone())
            // newest upload wins
            .max()
            .ok_or_else(|| BackendError::NotFound(name.to_string()))
    }
}
