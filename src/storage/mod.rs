pub mod backend;
pub mod backends;
pub mod factory;
pub mod local;

pub use backend::{BackendError, BackendSpec, ChunkBackend};
pub use backends::{FolderBackend, MemoryBackend};
pub use factory::{BackendFactory, BackendRegistry};
pub use local::{LocalChunkDir, CHUNK_EXTENSION};
