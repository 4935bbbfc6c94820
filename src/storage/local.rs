use std::fs;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkSource;
use crate::error::{ChunkStoreError, Result};
use crate::manifest::ChunkRecord;
use crate::utils::{create_dir_if_not_exists, staging_path, write_atomically};

pub const CHUNK_EXTENSION: &str = "chunk";

/// Caller-supplied directory holding one `<id>.chunk` file per chunk.
#[derive(Debug, Clone)]
pub struct LocalChunkDir {
    dir: PathBuf,
}

impl LocalChunkDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Like `new`, but creates the directory when missing.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let chunk_dir = Self::new(dir);
        create_dir_if_not_exists(&chunk_dir.dir)?;
        Ok(chunk_dir)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn chunk_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, CHUNK_EXTENSION))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chunk_path(id).is_file()
    }

    pub fn write_chunk(&self, id: &str, data: &[u8]) -> Result<()> {
        write_atomically(&self.chunk_path(id), data)
    }

    pub fn load(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.chunk_path(id);
        fs::read(&path).map_err(|e| ChunkStoreError::io(format!("reading chunk {}", path.display()), e))
    }

    pub async fn load_async(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.chunk_path(id);
        tokio::fs::read(&path)
            .await
            .map_err(|e| ChunkStoreError::io(format!("reading chunk {}", path.display()), e))
    }

    pub async fn store_async(&self, id: &str, data: &[u8]) -> Result<()> {
        let path = self.chunk_path(id);
        let temp_path = staging_path(&path);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ChunkStoreError::io(format!("creating directory {}", self.dir.display()), e))?;
        tokio::fs::write(&temp_path, data)
            .await
            .map_err(|e| ChunkStoreError::io(format!("writing {}", temp_path.display()), e))?;
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(ChunkStoreError::io(format!("renaming into {}", path.display()), e));
        }
        Ok(())
    }

    /// Delete every `*.chunk` file in the directory; returns how many were removed.
    pub fn cleanup(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| ChunkStoreError::io(format!("reading chunk directory {}", self.dir.display()), e))?;

        let mut deleted = 0;
        for entry in entries {
            let entry = entry.map_err(|e| ChunkStoreError::io("listing chunk directory", e))?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == CHUNK_EXTENSION) {
                fs::remove_file(&path)
                    .map_err(|e| ChunkStoreError::io(format!("removing chunk {}", path.display()), e))?;
                deleted += 1;
            }
        }

        tracing::info!(dir = %self.dir.display(), deleted, "Cleaned up chunk files");
        Ok(deleted)
    }
}

impl ChunkSource for LocalChunkDir {
    fn read_chunk(&self, record: &ChunkRecord) -> Result<Vec<u8>> {
        self.load(&record.id)
    }
}
