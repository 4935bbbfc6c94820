pub mod folder;
pub mod memory;

pub use folder::FolderBackend;
pub use memory::MemoryBackend;
