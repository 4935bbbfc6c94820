use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::crypto::Cipher;
use crate::error::{ChunkStoreError, Result};
use crate::manifest::ChunkRecord;
use crate::utils::sha256_digest;

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Leading digest bytes used for the chunk id.
pub const CHUNK_ID_BYTES: usize = 8;

/// A plaintext piece produced by the splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub index: usize,
    pub id: String,
    pub content_hash: String,
    pub data: Vec<u8>,
}

impl RawChunk {
    fn new(index: usize, data: Vec<u8>) -> Self {
        let digest = sha256_digest(&data);
        Self {
            index,
            id: chunk_id(&digest),
            content_hash: hex::encode(digest),
            data,
        }
    }
}

/// Fixed-width id from the first bytes of a content digest.
pub fn chunk_id(digest: &[u8]) -> String {
    hex::encode(&digest[..CHUNK_ID_BYTES.min(digest.len())])
}

/// Where assembly pulls stored chunk bytes from.
pub trait ChunkSource {
    fn read_chunk(&self, record: &ChunkRecord) -> Result<Vec<u8>>;
}

/// Lazily cuts a reader into `chunk_size` pieces, holding one buffer at a time.
pub struct ChunkSplitter<R> {
    reader: R,
    chunk_size: usize,
    next_index: usize,
    finished: bool,
}

impl<R: Read> ChunkSplitter<R> {
    pub fn new(reader: R, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ChunkStoreError::config("chunk size must be positive"));
        }
        Ok(Self {
            reader,
            chunk_size,
            next_index: 0,
            finished: false,
        })
    }

    fn fill_next(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.chunk_size);
        (&mut self.reader)
            .take(self.chunk_size as u64)
            .read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read> Iterator for ChunkSplitter<R> {
    type Item = Result<RawChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.fill_next() {
            Ok(buf) if buf.is_empty() => {
                self.finished = true;
                None
            }
            Ok(buf) => {
                // a short read can only happen at end of stream
                if buf.len() < self.chunk_size {
                    self.finished = true;
                }
                let chunk = RawChunk::new(self.next_index, buf);
                self.next_index += 1;
                Some(Ok(chunk))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(ChunkStoreError::io(
                    format!("reading input for chunk {}", self.next_index),
                    e,
                )))
            }
        }
    }
}

pub fn split<R: Read>(reader: R, chunk_size: usize) -> Result<ChunkSplitter<R>> {
    ChunkSplitter::new(reader, chunk_size)
}

/// Decrypt (when enabled) and check one stored chunk against its recorded hash.
pub fn open_chunk(record: &ChunkRecord, stored: &[u8], cipher: &Cipher) -> Result<Vec<u8>> {
    let plaintext = cipher
        .decrypt(stored)
        .map_err(|source| ChunkStoreError::ChunkDecryption {
            id: record.id.clone(),
            index: record.index,
            source,
        })?;

    let actual = hex::encode(sha256_digest(&plaintext));
    if actual != record.content_hash {
        return Err(ChunkStoreError::Integrity {
            id: record.id.clone(),
            index: record.index,
            expected: record.content_hash.clone(),
            actual,
        });
    }
    Ok(plaintext)
}

fn sorted_contiguous(records: &[ChunkRecord]) -> Result<Vec<&ChunkRecord>> {
    let mut sorted: Vec<&ChunkRecord> = records.iter().collect();
    sorted.sort_by_key(|c| c.index);
    for (expected, record) in sorted.iter().enumerate() {
        if record.index != expected {
            return Err(ChunkStoreError::MalformedManifest(format!(
                "expected chunk index {}, found {} (chunk {})",
                expected, record.index, record.id
            )));
        }
    }
    Ok(sorted)
}

/// Write the original bytes to `out`; returns the number of bytes written and
/// the SHA-256 of the whole output.
pub fn assemble<W: Write>(
    records: &[ChunkRecord],
    source: &dyn ChunkSource,
    cipher: &Cipher,
    out: &mut W,
) -> Result<(u64, String)> {
    let mut written = 0u64;
    let mut file_hasher = Sha256::new();

    for record in sorted_contiguous(records)? {
        let stored = source.read_chunk(record)?;
        let plaintext = open_chunk(record, &stored, cipher)?;
        out.write_all(&plaintext)
            .map_err(|e| ChunkStoreError::io(format!("writing chunk {} to output", record.id), e))?;
        file_hasher.update(&plaintext);
        written += plaintext.len() as u64;
        tracing::trace!(chunk_id = %record.id, index = record.index, "Chunk verified");
    }

    Ok((written, hex::encode(file_hasher.finalize())))
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

/// Assemble into `output`, or leave nothing behind on failure.
///
/// Bytes go to a sibling `.partial` file that is renamed into place only once
/// every chunk (and `expected_file_hash`, when given) has verified.
pub fn assemble_to_path(
    records: &[ChunkRecord],
    source: &dyn ChunkSource,
    cipher: &Cipher,
    output: &Path,
    expected_file_hash: Option<&str>,
) -> Result<u64> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        crate::utils::create_dir_if_not_exists(parent)?;
    }
    let partial = partial_path(output);

    let result = (|| -> Result<u64> {
        let file = File::create(&partial)
            .map_err(|e| ChunkStoreError::io(format!("creating {}", partial.display()), e))?;
        let mut writer = BufWriter::new(file);
        let (written, file_hash) = assemble(records, source, cipher, &mut writer)?;
        writer
            .flush()
            .map_err(|e| ChunkStoreError::io(format!("flushing {}", partial.display()), e))?;

        if let Some(expected) = expected_file_hash {
            if expected != file_hash {
                return Err(ChunkStoreError::FileIntegrity {
                    expected: expected.to_string(),
                    actual: file_hash,
                });
            }
        }
        Ok(written)
    })();

    match result {
        Ok(written) => {
            fs::rename(&partial, output)
                .map_err(|e| ChunkStoreError::io(format!("renaming into {}", output.display()), e))?;
            Ok(written)
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

/// Verify every chunk without producing output, in parallel.
pub fn verify_chunks<S>(records: &[ChunkRecord], source: &S, cipher: &Cipher) -> Result<()>
where
    S: ChunkSource + Sync,
{
    let sorted = sorted_contiguous(records)?;
    sorted.par_iter().try_for_each(|record| {
        let stored = source.read_chunk(record)?;
        open_chunk(record, &stored, cipher).map(|_| ())
    })
}
