use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Capability every storage provider/account implements.
///
/// Authentication, folder bootstrapping and rate limiting live behind this
/// interface; the core only moves bytes through it.
#[async_trait]
pub trait ChunkBackend: Send + Sync {
    /// Store `data` at `remote_path`, returning the provider's identifier for it.
    async fn upload(&self, data: &[u8], remote_path: &str) -> Result<String, BackendError>;

    /// Fetch the bytes stored under `remote_id`.
    async fn download(&self, remote_id: &str) -> Result<Vec<u8>, BackendError>;

    /// Resolve a stored object by file name when its id was not recorded.
    async fn find_by_name(&self, name: &str) -> Result<String, BackendError>;
}

/// Errors specific to a single backend call
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Worth retrying (timeouts, throttling, dropped connections)
    #[error("transient backend error: {0}")]
    Transient(String),

    #[error("backend error: {0}")]
    Permanent(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transient(_) => true,
            BackendError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            BackendError::Permanent(_) | BackendError::NotFound(_) => false,
        }
    }
}

/// Which built-in implementation backs an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSpec {
    Folder {
        path: String,
        #[serde(default)]
        create_dirs: Option<bool>,
    },
    Memory,
}
