//! Per-chunk authenticated encryption.
//!
//! Stored layout of an encrypted chunk is `nonce (12) || ciphertext || tag (16)`.
//! Keys come from a password through Argon2id with a per-file random salt.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use zeroize::Zeroizing;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const SALT_LEN: usize = 16;

/// Upper limits accepted for Argon2id costs (4 GiB, 64 passes, 64 lanes).
pub const MAX_KDF_MEMORY_KIB: u32 = 4 * 1024 * 1024;
pub const MAX_KDF_ITERATIONS: u32 = 64;
pub const MAX_KDF_PARALLELISM: u32 = 64;

/// Name recorded in manifests for the derivation below.
pub const KDF_ALGORITHM: &str = "argon2id";

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("ciphertext is {len} bytes, shorter than the {NONCE_LEN}-byte nonce")]
    MalformedCiphertext { len: usize },

    #[error("authentication tag did not verify (wrong password or corrupted ciphertext)")]
    Authentication,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MB
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    pub fn argon2id(iterations: u32, memory_kib: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }

    /// Reject costs Argon2 cannot run with, or that would exhaust the machine.
    pub fn check_bounds(&self) -> Result<(), CipherError> {
        if self.parallelism == 0 || self.parallelism > MAX_KDF_PARALLELISM {
            return Err(CipherError::KeyDerivation(format!(
                "parallelism {} outside 1..={}",
                self.parallelism, MAX_KDF_PARALLELISM
            )));
        }
        if self.iterations == 0 || self.iterations > MAX_KDF_ITERATIONS {
            return Err(CipherError::KeyDerivation(format!(
                "iterations {} outside 1..={}",
                self.iterations, MAX_KDF_ITERATIONS
            )));
        }
        if self.memory_kib < 8 * self.parallelism || self.memory_kib > MAX_KDF_MEMORY_KIB {
            return Err(CipherError::KeyDerivation(format!(
                "memory {} KiB outside {}..={}",
                self.memory_kib,
                8 * self.parallelism,
                MAX_KDF_MEMORY_KIB
            )));
        }
        Ok(())
    }
}

/// 256-bit key material, wiped on drop.
#[derive(Clone)]
pub struct ChunkKey(Zeroizing<[u8; KEY_LEN]>);

impl ChunkKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChunkKey(..)")
    }
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a chunk key from a human password.
pub fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> Result<ChunkKey, CipherError> {
    params.check_bounds()?;
    let start = Instant::now();
    let argon_params = argon2::Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| CipherError::KeyDerivation(format!("invalid Argon2 parameters: {}", e)))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;

    tracing::debug!(
        memory_kib = params.memory_kib,
        iterations = params.iterations,
        derivation_time_ms = start.elapsed().as_millis() as u64,
        "Key derivation completed"
    );
    Ok(ChunkKey(key))
}

/// Chunk cipher; the disabled variant passes bytes through untouched.
#[derive(Clone)]
pub enum Cipher {
    Disabled,
    Aes256Gcm(Box<Aes256Gcm>),
}

impl Cipher {
    pub fn disabled() -> Self {
        Cipher::Disabled
    }

    pub fn new(key: &ChunkKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        Cipher::Aes256Gcm(Box::new(Aes256Gcm::new(key)))
    }

    pub fn from_password(password: &str, salt: &[u8], params: &KdfParams) -> Result<Self, CipherError> {
        Ok(Self::new(&derive_key(password, salt, params)?))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Cipher::Aes256Gcm(_))
    }

    /// Encrypt under a fresh random nonce, which is prepended to the output.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let cipher = match self {
            Cipher::Disabled => return Ok(plaintext.to_vec()),
            Cipher::Aes256Gcm(cipher) => cipher,
        };

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let cipher = match self {
            Cipher::Disabled => return Ok(ciphertext.to_vec()),
            Cipher::Aes256Gcm(cipher) => cipher,
        };

        if ciphertext.len() < NONCE_LEN {
            return Err(CipherError::MalformedCiphertext {
                len: ciphertext.len(),
            });
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::Authentication)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cipher::Disabled => f.write_str("Cipher::Disabled"),
            Cipher::Aes256Gcm(_) => f.write_str("Cipher::Aes256Gcm(..)"),
        }
    }
}
