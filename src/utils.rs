use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ChunkStoreError, Result};

/// Raw SHA-256 digest of `data`.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Lowercase hex SHA-256 of `data`.
pub fn compute_sha256(data: &[u8]) -> String {
    hex::encode(sha256_digest(data))
}

pub fn encode_base64(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(data)
        .map_err(|e| ChunkStoreError::MalformedManifest(format!("invalid base64: {}", e)))
}

pub fn create_dir_if_not_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| ChunkStoreError::io(format!("creating directory {}", path.display()), e))?;
    }
    Ok(())
}

/// Unique sibling of `path` to stage a write in; concurrent writers never share one.
pub fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{:016x}.tmp", name, rand::random::<u64>()))
}

/// Write `data` next to `path` and rename it into place so readers never see a torn file.
pub fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_if_not_exists(parent)?;
    }
    let temp_path = staging_path(path);
    fs::write(&temp_path, data)
        .map_err(|e| ChunkStoreError::io(format!("writing {}", temp_path.display()), e))?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(ChunkStoreError::io(format!("renaming into {}", path.display()), e));
    }
    Ok(())
}

/// Estimate number of chunks given file size and chunk size in bytes.
/// Empty input produces no chunks.
pub fn estimate_chunks(file_size_bytes: u64, chunk_bytes: usize) -> u64 {
    if chunk_bytes == 0 {
        return 0;
    }
    file_size_bytes.div_ceil(chunk_bytes as u64)
}
