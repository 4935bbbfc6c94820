//! # chunkstore - Encrypted, Replicated Chunk Storage
//!
//! chunkstore splits files into fixed-size chunks, optionally encrypts each
//! chunk, records everything needed to rebuild the file in a manifest, and
//! spreads replicas of the chunks across a pool of storage accounts.
//!
//! ## Features
//!
//! - **Streaming Chunking**: Fixed-size splitting with per-chunk SHA-256 and whole-file verification
//! - **Authenticated Encryption**: AES-256-GCM per chunk with Argon2id password-derived keys
//! - **Replicated Placement**: Round-robin or seeded random placement over an explicit account pool
//! - **Bounded Transfers**: Concurrent uploads/downloads with timeouts, retries and cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use chunkstore::config::StoreConfig;
//! use chunkstore::orchestrator::Orchestrator;
//! use chunkstore::pipeline::{self, Encryption};
//! use chunkstore::storage::{BackendRegistry, LocalChunkDir};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StoreConfig::load(Path::new("chunkstore.json"))?;
//!     let chunks = LocalChunkDir::create("chunks")?;
//!     let manifest_path = Path::new("report.manifest.json");
//!
//!     let mut manifest = pipeline::split_file(
//!         Path::new("report.pdf"),
//!         &chunks,
//!         manifest_path,
//!         &Encryption::password("correct horse battery staple"),
//!         config.chunk_size(),
//!     )?;
//!
//!     let registry = Arc::new(BackendRegistry::from_config(&config.cloud).await?);
//!     let orchestrator = Orchestrator::new(registry, config.transfer_options());
//!     orchestrator.upload(&mut manifest, &chunks, &config.strategy()?).await?;
//!     manifest.write_to(manifest_path)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`chunk`] - Splitting, verification and reassembly
//! - [`crypto`] - Key derivation and per-chunk encryption
//! - [`manifest`] - The per-file manifest and its JSON form
//! - [`distribution`] - Which destinations receive which chunk
//! - [`orchestrator`] - Moving chunks to and from backends
//! - [`storage`] - Backend trait, built-in backends and the local chunk directory
//! - [`pipeline`] - End-to-end split/assemble/verify/cleanup
//! - [`config`] - Configuration loading and validation

pub mod chunk;
pub mod config;
pub mod crypto;
pub mod distribution;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod storage;
pub mod utils;

pub use chunk::{assemble, assemble_to_path, split, verify_chunks, ChunkSource, ChunkSplitter, RawChunk};
pub use config::StoreConfig;
pub use crypto::{Cipher, CipherError, KdfParams};
pub use distribution::{DistributionStrategy, PlacementPolicy};
pub use error::{ChunkStoreError, Result};
pub use manifest::{ChunkRecord, DistributionMode, Manifest, ReplicaLocation};
pub use model::{Destination, Provider};
pub use orchestrator::{DownloadReport, Orchestrator, ReplicaFailurePolicy, TransferOptions, UploadReport};
pub use pipeline::{assemble_file, cleanup_chunks, split_file, verify_file, Encryption};
pub use storage::{BackendError, BackendRegistry, ChunkBackend, LocalChunkDir};
