use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::storage::backend::{BackendError, ChunkBackend};
use crate::utils::staging_path;

/// Directory-backed store: remote paths map onto files under `root`.
pub struct FolderBackend {
    root: PathBuf,
}

impl FolderBackend {
    pub async fn new(root: impl Into<PathBuf>, create_dirs: bool) -> Result<Self, BackendError> {
        let root = root.into();

        if create_dirs {
            fs::create_dir_all(&root).await?;
        }

        let metadata = fs::metadata(&root)
            .await
            .map_err(|_| BackendError::Permanent(format!("Base path does not exist: {}", root.display())))?;
        if !metadata.is_dir() {
            return Err(BackendError::Permanent(format!(
                "Base path is not a directory: {}",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a remote path to a file under the root, refusing anything that escapes it.
    fn resolve(&self, remote: &str) -> Result<PathBuf, BackendError> {
        let mut path = self.root.clone();
        for component in Path::new(remote.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(BackendError::Permanent(format!(
                        "remote path escapes the store: {}",
                        remote
                    )))
                }
            }
        }
        if path == self.root {
            return Err(BackendError::Permanent(format!("empty remote path: {:?}", remote)));
        }
        Ok(path)
    }

    async fn find_in(&self, dir: PathBuf, name: &str) -> Result<Option<PathBuf>, BackendError> {
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if entry.file_name().to_string_lossy() == name {
                    return Ok(Some(entry.path()));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ChunkBackend for FolderBackend {
    async fn upload(&self, data: &[u8], remote_path: &str) -> Result<String, BackendError> {
        let target = self.resolve(remote_path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to temporary file first, then rename for atomicity
        let temp_path = staging_path(&target);
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        drop(file);
        if let Err(e) = fs::rename(&temp_path, &target).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(remote_path.trim_start_matches('/').to_string())
    }

    async fn download(&self, remote_id: &str) -> Result<Vec<u8>, BackendError> {
        let path = self.resolve(remote_id)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::NotFound(remote_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_name(&self, name: &str) -> Result<String, BackendError> {
        let found = self
            .find_in(self.root.clone(), name)
            .await?
            .ok_or_else(|| BackendError::NotFound(name.to_string()))?;
        let relative = found
            .strip_prefix(&self.root)
            .map_err(|e| BackendError::Permanent(e.to_string()))?;
        Ok(relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"))
    }
}
