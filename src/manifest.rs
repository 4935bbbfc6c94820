//! Manifest model: how one original file was decomposed and where each piece lives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ChunkStoreError, Result};
use crate::model::{Destination, Provider};
use crate::utils::write_atomically;

pub const MANIFEST_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionMode {
    #[default]
    Local,
    Cloud,
    Hybrid,
}

/// One stored copy of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaLocation {
    pub provider: Provider,
    pub remote_path: String,
    pub remote_id: String,
    pub account: String,
}

impl ReplicaLocation {
    pub fn destination(&self) -> Destination {
        Destination::new(self.provider, self.account.clone())
    }

    pub fn is_at(&self, destination: &Destination) -> bool {
        self.provider == destination.provider && self.account == destination.account
    }
}

/// One physical piece of the original file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    /// SHA-256 of the plaintext bytes, fixed at split time.
    pub content_hash: String,
    pub index: usize,
    pub encrypted: bool,
    /// Length of the stored (possibly encrypted) payload.
    pub size_bytes: u64,
    #[serde(default)]
    pub destinations: Vec<ReplicaLocation>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl ChunkRecord {
    pub fn new(id: String, content_hash: String, index: usize, encrypted: bool, size_bytes: u64) -> Self {
        Self {
            id,
            content_hash,
            index,
            encrypted,
            size_bytes,
            destinations: Vec::new(),
            uploaded_at: None,
        }
    }

    pub fn has_replica_at(&self, destination: &Destination) -> bool {
        self.destinations.iter().any(|r| r.is_at(destination))
    }
}

/// Password derivation used for an encrypted file. The password itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDerivation {
    pub algorithm: String,
    /// base64
    pub salt: String,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

/// Authoritative description of one original file's decomposition.
///
/// `chunks` is kept sorted by index; `total_size` and `chunk_count` are always
/// derived from it rather than stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub original_name: String,
    pub created_at: DateTime<Utc>,
    pub encrypted: bool,
    pub key_derivation: Option<KeyDerivation>,
    pub file_hash: Option<String>,
    pub distribution_mode: DistributionMode,
    chunks: Vec<ChunkRecord>,
}

/// On-disk form. Field names are part of the format and must not change.
#[derive(Serialize, Deserialize)]
struct ManifestDocument {
    #[serde(default = "default_format_version")]
    format_version: u32,
    original_name: String,
    total_size: u64,
    chunk_count: usize,
    created_at: DateTime<Utc>,
    encrypted: bool,
    #[serde(default)]
    key_derivation: Option<KeyDerivation>,
    #[serde(default)]
    file_hash: Option<String>,
    distribution_mode: DistributionMode,
    chunks: Vec<ChunkRecord>,
}

fn default_format_version() -> u32 {
    MANIFEST_FORMAT_VERSION
}

/// Checks the structural invariants every manifest must hold and returns the chunks sorted.
fn validate_chunks(mut chunks: Vec<ChunkRecord>, encrypted: bool) -> Result<Vec<ChunkRecord>> {
    chunks.sort_by_key(|c| c.index);
    for (expected, chunk) in chunks.iter().enumerate() {
        if chunk.index != expected {
            return Err(ChunkStoreError::MalformedManifest(format!(
                "chunk indices are not contiguous: expected index {}, found {} (chunk {})",
                expected, chunk.index, chunk.id
            )));
        }
        if chunk.encrypted != encrypted {
            return Err(ChunkStoreError::MalformedManifest(format!(
                "chunk {} (index {}) has encrypted={} but the manifest has encrypted={}",
                chunk.id, chunk.index, chunk.encrypted, encrypted
            )));
        }
    }
    Ok(chunks)
}

fn mode_for(chunks: &[ChunkRecord]) -> DistributionMode {
    let placed = chunks.iter().filter(|c| !c.destinations.is_empty()).count();
    if placed == 0 {
        DistributionMode::Local
    } else {
        DistributionMode::Hybrid
    }
}

impl Manifest {
    pub fn create(chunks: Vec<ChunkRecord>, original_name: impl Into<String>, encrypted: bool) -> Result<Self> {
        let chunks = validate_chunks(chunks, encrypted)?;
        Ok(Self {
            original_name: original_name.into(),
            created_at: Utc::now(),
            encrypted,
            key_derivation: None,
            file_hash: None,
            distribution_mode: mode_for(&chunks),
            chunks,
        })
    }

    pub fn with_key_derivation(mut self, key_derivation: KeyDerivation) -> Self {
        self.key_derivation = Some(key_derivation);
        self
    }

    pub fn with_file_hash(mut self, file_hash: impl Into<String>) -> Self {
        self.file_hash = Some(file_hash.into());
        self
    }

    /// Chunks in index order.
    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> Option<&ChunkRecord> {
        self.chunks.get(index)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Sum of the stored (encrypted or plain) chunk sizes.
    pub fn total_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.size_bytes).sum()
    }

    /// Chunks that do not yet have any remote replica.
    pub fn unplaced_chunks(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.chunks.iter().filter(|c| c.destinations.is_empty())
    }

    /// Fail before any chunk I/O when the caller's intent disagrees with the file.
    pub fn ensure_encryption_intent(&self, decrypt: bool) -> Result<()> {
        match (self.encrypted, decrypt) {
            (true, false) => Err(ChunkStoreError::config(format!(
                "{} was encrypted but no decryption key was provided",
                self.original_name
            ))),
            (false, true) => Err(ChunkStoreError::config(format!(
                "{} was not encrypted but a decryption key was provided",
                self.original_name
            ))),
            _ => Ok(()),
        }
    }

    /// Record a successful replica of the chunk at `index`.
    pub fn update_distribution(&mut self, index: usize, location: ReplicaLocation) -> Result<()> {
        let chunk = self
            .chunks
            .get_mut(index)
            .ok_or(ChunkStoreError::UnknownChunk { index })?;
        if !chunk.destinations.contains(&location) {
            chunk.destinations.push(location);
        }
        chunk.uploaded_at = Some(Utc::now());
        self.distribution_mode = mode_for(&self.chunks);
        Ok(())
    }

    /// Close an upload pass: `cloud` when every chunk has a replica, otherwise `hybrid` (or `local`).
    pub fn finish_upload_pass(&mut self) {
        self.distribution_mode = if !self.chunks.is_empty() && self.unplaced_chunks().next().is_none() {
            DistributionMode::Cloud
        } else {
            mode_for(&self.chunks)
        };
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let document = ManifestDocument {
            format_version: MANIFEST_FORMAT_VERSION,
            original_name: self.original_name.clone(),
            total_size: self.total_size(),
            chunk_count: self.chunk_count(),
            created_at: self.created_at,
            encrypted: self.encrypted,
            key_derivation: self.key_derivation.clone(),
            file_hash: self.file_hash.clone(),
            distribution_mode: self.distribution_mode,
            chunks: self.chunks.clone(),
        };
        serde_json::to_vec_pretty(&document)
            .map_err(|e| ChunkStoreError::MalformedManifest(format!("failed to serialize: {}", e)))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let document: ManifestDocument = serde_json::from_slice(bytes)
            .map_err(|e| ChunkStoreError::MalformedManifest(e.to_string()))?;

        if document.format_version > MANIFEST_FORMAT_VERSION {
            return Err(ChunkStoreError::MalformedManifest(format!(
                "unsupported format version {}",
                document.format_version
            )));
        }
        if document.encrypted && document.key_derivation.is_none() {
            return Err(ChunkStoreError::MalformedManifest(
                "encrypted manifest is missing key_derivation".to_string(),
            ));
        }

        let chunks = validate_chunks(document.chunks, document.encrypted)?;
        let manifest = Self {
            original_name: document.original_name,
            created_at: document.created_at,
            encrypted: document.encrypted,
            key_derivation: document.key_derivation,
            file_hash: document.file_hash,
            distribution_mode: document.distribution_mode,
            chunks,
        };

        if document.chunk_count != manifest.chunk_count() || document.total_size != manifest.total_size() {
            tracing::warn!(
                file = %manifest.original_name,
                declared_chunks = document.chunk_count,
                actual_chunks = manifest.chunk_count(),
                declared_size = document.total_size,
                actual_size = manifest.total_size(),
                "Manifest totals disagree with its chunk list; using recomputed values"
            );
        }
        Ok(manifest)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .map_err(|e| ChunkStoreError::io(format!("reading manifest {}", path.display()), e))?;
        Self::deserialize(&bytes)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_atomically(path, &self.serialize()?)
    }
}
