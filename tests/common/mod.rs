#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chunkstore::crypto::KdfParams;
use chunkstore::storage::{BackendError, ChunkBackend, MemoryBackend};

/// Cheap Argon2id parameters so tests don't spend seconds deriving keys.
pub fn fast_params() -> KdfParams {
    KdfParams::argon2id(1, 8, 1)
}

/// Deterministic, non-repeating test payload.
pub fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Payload of `blocks` blocks of `block_size` bytes where most blocks repeat:
/// zero-filled runs, a recurring 0xAB block, and every fifth block unique.
pub fn repeating_data(blocks: usize, block_size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(blocks * block_size);
    for block in 0..blocks {
        if block % 5 == 0 {
            data.extend((0..block_size).map(|i| ((i + block * 7) * 31 % 251) as u8));
        } else if block % 2 == 0 {
            data.extend(std::iter::repeat(0u8).take(block_size));
        } else {
            data.extend(std::iter::repeat(0xABu8).take(block_size));
        }
    }
    data
}

pub fn write_input(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// In-memory backend whose failures can be switched on from the test.
#[derive(Default)]
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    pub fail_uploads: AtomicBool,
    pub fail_downloads: AtomicBool,
    /// Upcoming calls that fail with a transient error before succeeding
    pub transient_failures: AtomicU32,
    pub upload_delay: Option<Duration>,
    /// Raised after the first successful upload
    pub trip_after_upload: Option<Arc<AtomicBool>>,
    pub upload_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let backend = Self::default();
        backend.fail_uploads.store(true, Ordering::SeqCst);
        backend.fail_downloads.store(true, Ordering::SeqCst);
        backend
    }

    pub fn with_transient_failures(count: u32) -> Self {
        let backend = Self::default();
        backend.transient_failures.store(count, Ordering::SeqCst);
        backend
    }

    pub fn with_upload_delay(delay: Duration) -> Self {
        Self {
            upload_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn tripping(flag: Arc<AtomicBool>) -> Self {
        Self {
            trip_after_upload: Some(flag),
            ..Self::default()
        }
    }

    fn take_transient(&self) -> bool {
        self.transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChunkBackend for FlakyBackend {
    async fn upload(&self, data: &[u8], remote_path: &str) -> Result<String, BackendError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BackendError::Permanent("upload rejected".to_string()));
        }
        if self.take_transient() {
            return Err(BackendError::Transient("rate limited".to_string()));
        }
        let id = self.inner.upload(data, remote_path).await?;
        if let Some(flag) = &self.trip_after_upload {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(id)
    }

    async fn download(&self, remote_id: &str) -> Result<Vec<u8>, BackendError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(BackendError::Permanent("download rejected".to_string()));
        }
        if self.take_transient() {
            return Err(BackendError::Transient("rate limited".to_string()));
        }
        self.inner.download(remote_id).await
    }

    async fn find_by_name(&self, name: &str) -> Result<String, BackendError> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(BackendError::Permanent("lookup rejected".to_string()));
        }
        self.inner.find_by_name(name).await
    }
}
