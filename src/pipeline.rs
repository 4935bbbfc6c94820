use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::chunk::{assemble_to_path, split, verify_chunks};
use crate::crypto::{generate_salt, Cipher, KdfParams, KDF_ALGORITHM};
use crate::error::{ChunkStoreError, Result};
use crate::logging::StageTimer;
use crate::manifest::{ChunkRecord, KeyDerivation, Manifest};
use crate::orchestrator::{DownloadReport, Orchestrator};
use crate::storage::local::LocalChunkDir;
use crate::utils::{create_dir_if_not_exists, decode_base64, encode_base64, estimate_chunks};

/// Encryption requested for a split.
#[derive(Debug, Clone, Copy)]
pub enum Encryption<'a> {
    Disabled,
    Password { password: &'a str, params: KdfParams },
}

impl<'a> Encryption<'a> {
    pub fn password(password: &'a str) -> Self {
        Encryption::Password {
            password,
            params: KdfParams::default(),
        }
    }
}

/// Split `input` into encrypted (or plain) chunk files under `chunk_dir` and
/// write the manifest to `manifest_path`.
pub fn split_file(
    input: &Path,
    chunk_dir: &LocalChunkDir,
    manifest_path: &Path,
    encryption: &Encryption<'_>,
    chunk_size: usize,
) -> Result<Manifest> {
    let _timer = StageTimer::new("split");

    let (cipher, key_derivation) = match encryption {
        Encryption::Disabled => (Cipher::disabled(), None),
        Encryption::Password { password, params } => {
            let salt = generate_salt();
            let cipher = Cipher::from_password(password, &salt, params)?;
            let key_derivation = KeyDerivation {
                algorithm: KDF_ALGORITHM.to_string(),
                salt: encode_base64(&salt),
                memory_kib: params.memory_kib,
                iterations: params.iterations,
                parallelism: params.parallelism,
            };
            (cipher, Some(key_derivation))
        }
    };

    let file = File::open(input).map_err(|e| ChunkStoreError::io(format!("opening {}", input.display()), e))?;
    create_dir_if_not_exists(chunk_dir.path())?;
    let expected_chunks = file
        .metadata()
        .map(|m| estimate_chunks(m.len(), chunk_size))
        .unwrap_or_default();
    tracing::debug!(input = %input.display(), chunk_size, expected_chunks, "Splitting file");

    let mut file_hasher = Sha256::new();
    let mut records = Vec::new();
    for raw in split(BufReader::new(file), chunk_size)? {
        let raw = raw?;
        file_hasher.update(&raw.data);

        let stored = cipher.encrypt(&raw.data)?;
        chunk_dir.write_chunk(&raw.id, &stored)?;
        tracing::debug!(
            chunk_id = %raw.id,
            index = raw.index,
            plain_bytes = raw.data.len(),
            stored_bytes = stored.len(),
            "Chunk written"
        );
        records.push(ChunkRecord::new(
            raw.id,
            raw.content_hash,
            raw.index,
            cipher.is_enabled(),
            stored.len() as u64,
        ));
    }

    let original_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());

    let mut manifest = Manifest::create(records, original_name, cipher.is_enabled())?
        .with_file_hash(hex::encode(file_hasher.finalize()));
    if let Some(key_derivation) = key_derivation {
        manifest = manifest.with_key_derivation(key_derivation);
    }
    manifest.write_to(manifest_path)?;

    tracing::info!(
        file = %manifest.original_name,
        chunks = manifest.chunk_count(),
        total_size = manifest.total_size(),
        encrypted = manifest.encrypted,
        manifest = %manifest_path.display(),
        "File split"
    );
    Ok(manifest)
}

/// Rebuild the cipher an encrypted manifest was written with.
pub fn open_cipher(manifest: &Manifest, password: Option<&str>) -> Result<Cipher> {
    manifest.ensure_encryption_intent(password.is_some())?;
    let Some(password) = password else {
        return Ok(Cipher::disabled());
    };

    let key_derivation = manifest
        .key_derivation
        .as_ref()
        .ok_or_else(|| ChunkStoreError::MalformedManifest("encrypted manifest has no key derivation".to_string()))?;
    if key_derivation.algorithm != KDF_ALGORITHM {
        return Err(ChunkStoreError::MalformedManifest(format!(
            "unsupported key derivation algorithm: {}",
            key_derivation.algorithm
        )));
    }

    let salt = decode_base64(&key_derivation.salt)?;
    let params = KdfParams {
        memory_kib: key_derivation.memory_kib,
        iterations: key_derivation.iterations,
        parallelism: key_derivation.parallelism,
    };
    params
        .check_bounds()
        .map_err(|e| ChunkStoreError::MalformedManifest(format!("key derivation parameters rejected: {}", e)))?;
    Ok(Cipher::from_password(password, &salt, &params)?)
}

/// Assemble an in-memory manifest's chunks from `chunk_dir` into `output`.
pub fn assemble_manifest(
    manifest: &Manifest,
    chunk_dir: &LocalChunkDir,
    output: &Path,
    password: Option<&str>,
) -> Result<u64> {
    let _timer = StageTimer::new("assemble");
    let cipher = open_cipher(manifest, password)?;
    let written = assemble_to_path(
        manifest.chunks(),
        chunk_dir,
        &cipher,
        output,
        manifest.file_hash.as_deref(),
    )?;

    tracing::info!(
        file = %manifest.original_name,
        bytes = written,
        output = %output.display(),
        "File assembled"
    );
    Ok(written)
}

/// Read the manifest at `manifest_path` and assemble its chunks into `output`.
///
/// A mismatch between `password` and the manifest's encryption flag fails
/// before any chunk file is opened.
pub fn assemble_file(
    manifest_path: &Path,
    chunk_dir: &LocalChunkDir,
    output: &Path,
    password: Option<&str>,
) -> Result<u64> {
    let manifest = Manifest::read_from(manifest_path)?;
    assemble_manifest(&manifest, chunk_dir, output, password)
}

/// Decrypt and hash-check every local chunk without writing any output.
pub fn verify_file(manifest_path: &Path, chunk_dir: &LocalChunkDir, password: Option<&str>) -> Result<()> {
    let _timer = StageTimer::new("verify");
    let manifest = Manifest::read_from(manifest_path)?;
    let cipher = open_cipher(&manifest, password)?;
    verify_chunks(manifest.chunks(), chunk_dir, &cipher)?;
    tracing::info!(file = %manifest.original_name, chunks = manifest.chunk_count(), "All chunks verified");
    Ok(())
}

/// Download every chunk from its recorded replicas into `chunk_dir`, then assemble.
pub async fn download_and_assemble(
    orchestrator: &Orchestrator,
    manifest_path: &Path,
    chunk_dir: &LocalChunkDir,
    output: &Path,
    password: Option<&str>,
) -> Result<DownloadReport> {
    let manifest = Manifest::read_from(manifest_path)?;
    manifest.ensure_encryption_intent(password.is_some())?;

    let report = orchestrator.download(&manifest, chunk_dir).await?;
    assemble_manifest(&manifest, chunk_dir, output, password)?;
    Ok(report)
}

/// Remove every `*.chunk` file from `dir`; returns how many were deleted.
pub fn cleanup_chunks(dir: &Path) -> Result<usize> {
    LocalChunkDir::new(dir).cleanup()
}
