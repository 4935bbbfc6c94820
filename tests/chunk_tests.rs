mod common;

use std::collections::HashMap;
use std::io::Cursor;

use chunkstore::chunk::{self, ChunkSource};
use chunkstore::crypto::{ChunkKey, Cipher};
use chunkstore::error::{ChunkStoreError, Result};
use chunkstore::manifest::ChunkRecord;
use chunkstore::pipeline::{self, Encryption};
use chunkstore::storage::LocalChunkDir;
use proptest::prelude::*;
use tempfile::tempdir;

use common::{fast_params, test_data, write_input};

/// Stored chunks held in memory, keyed by chunk id.
struct MapSource(HashMap<String, Vec<u8>>);

impl ChunkSource for MapSource {
    fn read_chunk(&self, record: &ChunkRecord) -> Result<Vec<u8>> {
        self.0
            .get(&record.id)
            .cloned()
            .ok_or_else(|| ChunkStoreError::ChunkUnavailable {
                id: record.id.clone(),
                index: record.index,
                reason: "not in map".to_string(),
            })
    }
}

fn split_in_memory(data: &[u8], chunk_size: usize, cipher: &Cipher) -> (Vec<ChunkRecord>, MapSource) {
    let mut records = Vec::new();
    let mut stored = HashMap::new();
    for raw in chunk::split(Cursor::new(data), chunk_size).unwrap() {
        let raw = raw.unwrap();
        let payload = cipher.encrypt(&raw.data).unwrap();
        records.push(ChunkRecord::new(
            raw.id.clone(),
            raw.content_hash,
            raw.index,
            cipher.is_enabled(),
            payload.len() as u64,
        ));
        stored.insert(raw.id, payload);
    }
    (records, MapSource(stored))
}

#[test]
fn test_ten_bytes_with_chunk_size_four() {
    let dir = tempdir().unwrap();
    let input = write_input(dir.path(), "ten.bin", b"0123456789");
    let chunks = LocalChunkDir::new(dir.path().join("chunks"));
    let manifest_path = dir.path().join("ten.manifest.json");

    let manifest = pipeline::split_file(&input, &chunks, &manifest_path, &Encryption::Disabled, 4).unwrap();

    assert_eq!(manifest.chunk_count(), 3);
    assert_eq!(manifest.total_size(), 10);
    let sizes: Vec<u64> = manifest.chunks().iter().map(|c| c.size_bytes).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    for chunk in manifest.chunks() {
        assert!(chunks.contains(&chunk.id));
        assert!(!chunk.encrypted);
    }

    let output = dir.path().join("out").join("ten.bin");
    let written = pipeline::assemble_file(&manifest_path, &chunks, &output, None).unwrap();
    assert_eq!(written, 10);
    assert_eq!(std::fs::read(&output).unwrap(), b"0123456789");
}

#[test]
fn test_encrypted_file_round_trip() {
    let dir = tempdir().unwrap();
    let data = test_data(5000);
    let input = write_input(dir.path(), "secret.bin", &data);
    let chunks = LocalChunkDir::new(dir.path().join("chunks"));
    let manifest_path = dir.path().join("secret.manifest.json");
    let encryption = Encryption::Password {
        password: "correct horse",
        params: fast_params(),
    };

    let manifest = pipeline::split_file(&input, &chunks, &manifest_path, &encryption, 1024).unwrap();
    assert!(manifest.encrypted);
    assert_eq!(manifest.chunk_count(), 5);
    // nonce + tag per chunk
    assert_eq!(manifest.total_size(), 5000 + 5 * 28);

    let key_derivation = manifest.key_derivation.as_ref().unwrap();
    assert_eq!(key_derivation.algorithm, "argon2id");
    let manifest_text = std::fs::read_to_string(&manifest_path).unwrap();
    assert!(!manifest_text.contains("correct horse"));

    pipeline::verify_file(&manifest_path, &chunks, Some("correct horse")).unwrap();

    let output = dir.path().join("secret.out");
    pipeline::assemble_file(&manifest_path, &chunks, &output, Some("correct horse")).unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

#[test]
fn test_empty_input_produces_empty_output() {
    let dir = tempdir().unwrap();
    let input = write_input(dir.path(), "empty.bin", b"");
    let chunks = LocalChunkDir::new(dir.path().join("chunks"));
    let manifest_path = dir.path().join("empty.manifest.json");

    let manifest = pipeline::split_file(&input, &chunks, &manifest_path, &Encryption::Disabled, 4).unwrap();
    assert_eq!(manifest.chunk_count(), 0);
    assert_eq!(manifest.total_size(), 0);

    let output = dir.path().join("empty.out");
    assert_eq!(pipeline::assemble_file(&manifest_path, &chunks, &output, None).unwrap(), 0);
    assert!(std::fs::read(&output).unwrap().is_empty());
}

#[test]
fn test_zero_chunk_size_is_configuration_error() {
    let result = chunk::split(Cursor::new(b"abc".to_vec()), 0);
    assert!(matches!(result, Err(ChunkStoreError::Configuration(_))));

    let dir = tempdir().unwrap();
    let input = write_input(dir.path(), "abc.bin", b"abc");
    let chunks = LocalChunkDir::new(dir.path().join("chunks"));
    let result = pipeline::split_file(&input, &chunks, &dir.path().join("m.json"), &Encryption::Disabled, 0);
    assert!(matches!(result, Err(ChunkStoreError::Configuration(_))));
}

#[test]
fn test_chunk_ids_are_content_addressed() {
    let data = b"aaaabbbbaaaa";
    let raws: Vec<_> = chunk::split(Cursor::new(&data[..]), 4)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();

    assert_eq!(raws.len(), 3);
    assert_eq!(raws[0].id.len(), chunk::CHUNK_ID_BYTES * 2);
    assert_eq!(raws[0].id, raws[2].id);
    assert_ne!(raws[0].id, raws[1].id);
    assert_eq!(raws[1].content_hash, chunkstore::utils::compute_sha256(b"bbbb"));
    assert!(raws[1].content_hash.starts_with(&raws[1].id));
}

#[test]
fn test_cleanup_chunks_removes_only_chunk_files() {
    let dir = tempdir().unwrap();
    let input = write_input(dir.path(), "data.bin", &test_data(100));
    let chunk_dir = dir.path().join("chunks");
    let chunks = LocalChunkDir::new(&chunk_dir);
    pipeline::split_file(&input, &chunks, &dir.path().join("m.json"), &Encryption::Disabled, 30).unwrap();
    std::fs::write(chunk_dir.join("notes.txt"), b"keep me").unwrap();

    assert_eq!(pipeline::cleanup_chunks(&chunk_dir).unwrap(), 4);
    assert!(chunk_dir.join("notes.txt").exists());
    assert_eq!(pipeline::cleanup_chunks(&chunk_dir).unwrap(), 0);
}

proptest! {
    #[test]
    fn test_split_assemble_roundtrip(
        data in proptest::collection::vec(any::<u8>(), 0..2048),
        chunk_size in 1usize..300,
        encrypt in any::<bool>(),
    ) {
        let cipher = if encrypt {
            Cipher::new(&ChunkKey::from_bytes([7u8; 32]))
        } else {
            Cipher::disabled()
        };
        let (records, source) = split_in_memory(&data, chunk_size, &cipher);

        let mut out = Vec::new();
        let (written, file_hash) = chunk::assemble(&records, &source, &cipher, &mut out).unwrap();

        prop_assert_eq!(written, data.len() as u64);
        prop_assert_eq!(file_hash, chunkstore::utils::compute_sha256(&data));
        prop_assert_eq!(out, data);
    }

    #[test]
    fn test_chunk_indices_are_contiguous(
        data_len in 0usize..5000,
        chunk_size in 1usize..700,
    ) {
        let data = vec![0x5Au8; data_len];
        let indices: Vec<usize> = chunk::split(Cursor::new(data), chunk_size)
            .unwrap()
            .map(|raw| raw.unwrap().index)
            .collect();

        let expected = data_len.div_ceil(chunk_size);
        prop_assert_eq!(indices.len(), expected);
        prop_assert_eq!(indices, (0..expected).collect::<Vec<_>>());
    }
}
