use crate::crypto::CipherError;

/// Result alias used by the chunk, manifest, distribution and transfer layers.
pub type Result<T, E = ChunkStoreError> = std::result::Result<T, E>;

/// Failures surfaced by the core.
///
/// Every variant that concerns a single chunk carries its id and index so an
/// operator can tell exactly which piece (and destination) went wrong.
#[derive(Debug, thiserror::Error)]
pub enum ChunkStoreError {
    #[error("I/O failure while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("failed to decrypt chunk {id} (index {index}): {source}")]
    ChunkDecryption {
        id: String,
        index: usize,
        #[source]
        source: CipherError,
    },

    #[error("integrity check failed for chunk {id} (index {index}): expected {expected}, got {actual}")]
    Integrity {
        id: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("assembled file hash mismatch: expected {expected}, got {actual}")]
    FileIntegrity { expected: String, actual: String },

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("manifest has no chunk with index {index}")]
    UnknownChunk { index: usize },

    #[error("chunk {id} (index {index}) unavailable: {reason}")]
    ChunkUnavailable {
        id: String,
        index: usize,
        reason: String,
    },

    #[error("replica of chunk {id} (index {index}) failed on {destination}: {reason}")]
    ReplicaFailed {
        id: String,
        index: usize,
        destination: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ChunkStoreError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ChunkStoreError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        ChunkStoreError::Configuration(message.into())
    }

    /// Wrong password or tampered/truncated ciphertext.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            ChunkStoreError::ChunkDecryption {
                source: CipherError::Authentication | CipherError::MalformedCiphertext { .. },
                ..
            } | ChunkStoreError::Cipher(CipherError::Authentication | CipherError::MalformedCiphertext { .. })
        )
    }

    /// Bytes decrypted (or were read) fine but no longer match the recorded hash.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            ChunkStoreError::Integrity { .. } | ChunkStoreError::FileIntegrity { .. }
        )
    }
}
