//! Passphrase-based container encryption.
//!
//! A 256-bit key is derived from the passphrase with Argon2id and a random
//! per-container salt. The body is sealed with AES-256-GCM in the STREAM
//! construction: fixed-size chunks, each with its own tag, a big-endian
//! chunk counter in the nonce and a flag on the final chunk, so reordering,
//! dropping or truncating chunks fails authentication.

use aes_gcm::{
    Aes256Gcm,
    aead::{
        KeyInit, OsRng,
        generic_array::GenericArray,
        rand_core::RngCore,
        stream::{DecryptorBE32, EncryptorBE32},
    },
};
use argon2::{Algorithm, Argon2, ParamsBuilder, Version};
use tracing::debug;

use crate::error::ArchiveError;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// STREAM nonce prefix: the 96-bit GCM nonce minus counter and flag.
pub const NONCE_LEN: usize = 7;

/// Plaintext bytes per chunk. Only the final chunk is shorter.
pub const CHUNK_LEN: usize = 64 * 1024;

/// GCM tag length.
const TAG_LEN: usize = 16;

/// Size of every sealed chunk except the final one.
pub const SEALED_CHUNK_LEN: usize = CHUNK_LEN + TAG_LEN;

/// AES-256 key length in bytes.
const KEY_LEN: usize = 32;

/// Argon2id memory cost in KiB.
const M_COST: u32 = 19 * 1024;

/// Argon2id iterations.
const T_COST: u32 = 2;

/// Argon2id lanes.
const P_COST: u32 = 1;

/// Fills a fresh array from the OS random source.
#[must_use]
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], ArchiveError> {
    let params = ParamsBuilder::new()
        .m_cost(M_COST)
        .t_cost(T_COST)
        .p_cost(P_COST)
        .output_len(KEY_LEN)
        .build()
        .map_err(|e| ArchiveError::Crypto(format!("argon2 parameters: {e}")))?;

    let mut key = [0u8; KEY_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| ArchiveError::Crypto(format!("key derivation: {e}")))?;

    debug!("derived archive key");
    Ok(key)
}

fn cipher(passphrase: &str, salt: &[u8; SALT_LEN]) -> Result<Aes256Gcm, ArchiveError> {
    let key = derive_key(passphrase, salt)?;
    Ok(Aes256Gcm::new(&key.into()))
}

/// Cuts plaintext into chunks and seals them.
pub struct Sealer {
    stream: EncryptorBE32<Aes256Gcm>,
    pending: Vec<u8>,
}

impl Sealer {
    /// Derives the key and starts a stream.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Crypto`] if key derivation fails.
    pub fn new(
        passphrase: &str,
        salt: &[u8; SALT_LEN],
        nonce: &[u8; NONCE_LEN],
    ) -> Result<Self, ArchiveError> {
        Ok(Self {
            stream: EncryptorBE32::from_aead(
                cipher(passphrase, salt)?,
                GenericArray::from_slice(nonce),
            ),
            pending: Vec::with_capacity(CHUNK_LEN),
        })
    }

    /// Buffers `data` and appends every chunk it completes to `sealed`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Crypto`] if the chunk counter overflows.
    pub fn push(&mut self, data: &[u8], sealed: &mut Vec<u8>) -> Result<(), ArchiveError> {
        self.pending.extend_from_slice(data);
        let full = self.pending.len() - self.pending.len() % CHUNK_LEN;
        for chunk in self.pending[..full].chunks_exact(CHUNK_LEN) {
            let chunk = self
                .stream
                .encrypt_next(chunk)
                .map_err(|e| ArchiveError::Crypto(format!("AES-GCM: {e}")))?;
            sealed.extend_from_slice(&chunk);
        }
        self.pending.drain(..full);
        Ok(())
    }

    /// Seals the remaining bytes, possibly none, as the final chunk.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Crypto`] if sealing fails.
    pub fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        let Self { stream, pending } = self;
        stream
            .encrypt_last(pending.as_slice())
            .map_err(|e| ArchiveError::Crypto(format!("AES-GCM: {e}")))
    }
}

/// Authenticates and decrypts chunks in order.
pub struct Opener {
    stream: DecryptorBE32<Aes256Gcm>,
}

impl Opener {
    /// Derives the key and starts a stream.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Crypto`] if key derivation fails.
    pub fn new(
        passphrase: &str,
        salt: &[u8; SALT_LEN],
        nonce: &[u8; NONCE_LEN],
    ) -> Result<Self, ArchiveError> {
        Ok(Self {
            stream: DecryptorBE32::from_aead(
                cipher(passphrase, salt)?,
                GenericArray::from_slice(nonce),
            ),
        })
    }

    /// Opens a full, non-final chunk.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Decrypt`] for a wrong passphrase or modified
    /// data.
    pub fn open_next(&mut self, sealed: &[u8]) -> Result<Vec<u8>, ArchiveError> {
        self.stream
            .decrypt_next(sealed)
            .map_err(|_| ArchiveError::Decrypt)
    }

    /// Opens the final chunk.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Decrypt`] for a wrong passphrase, modified
    /// data, or a stream cut off before its final chunk.
    pub fn open_last(self, sealed: &[u8]) -> Result<Vec<u8>, ArchiveError> {
        self.stream
            .decrypt_last(sealed)
            .map_err(|_| ArchiveError::Decrypt)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seal_all(
        passphrase: &str,
        salt: &[u8; SALT_LEN],
        nonce: &[u8; NONCE_LEN],
        data: &[u8],
    ) -> Vec<u8> {
        let mut sealer = Sealer::new(passphrase, salt, nonce).unwrap();
        let mut sealed = Vec::new();
        // Uneven pushes must not change the chunking.
        for piece in data.chunks(1000) {
            sealer.push(piece, &mut sealed).unwrap();
        }
        sealed.extend(sealer.finish().unwrap());
        sealed
    }

    fn open_all(
        passphrase: &str,
        salt: &[u8; SALT_LEN],
        nonce: &[u8; NONCE_LEN],
        sealed: &[u8],
    ) -> Result<Vec<u8>, ArchiveError> {
        let mut opener = Opener::new(passphrase, salt, nonce)?;
        let mut chunks = sealed.chunks(SEALED_CHUNK_LEN).peekable();
        let mut plain = Vec::new();
        while let Some(chunk) = chunks.next() {
            if chunks.peek().is_none() && chunk.len() < SEALED_CHUNK_LEN {
                plain.extend(opener.open_last(chunk)?);
                return Ok(plain);
            }
            plain.extend(opener.open_next(chunk)?);
        }
        opener.open_last(&[]).map(|_| plain)
    }

    #[test]
    fn chunks_seal_then_open() {
        let salt = random_bytes::<SALT_LEN>();
        let nonce = random_bytes::<NONCE_LEN>();
        let data: Vec<u8> = (0..CHUNK_LEN * 2 + 5)
            .map(|i| u8::try_from(i % 251).unwrap())
            .collect();
        let sealed = seal_all("correct horse", &salt, &nonce, &data);
        assert_eq!(sealed.len(), data.len() + 3 * TAG_LEN);
        assert_eq!(open_all("correct horse", &salt, &nonce, &sealed).unwrap(), data);
    }

    #[test]
    fn exact_multiple_ends_with_empty_chunk() {
        let salt = random_bytes::<SALT_LEN>();
        let nonce = random_bytes::<NONCE_LEN>();
        let data = vec![7u8; CHUNK_LEN];
        let sealed = seal_all("pass", &salt, &nonce, &data);
        assert_eq!(sealed.len(), SEALED_CHUNK_LEN + TAG_LEN);
        assert_eq!(open_all("pass", &salt, &nonce, &sealed).unwrap(), data);
    }

    #[test]
    fn wrong_passphrase_fails() {
        let salt = random_bytes::<SALT_LEN>();
        let nonce = random_bytes::<NONCE_LEN>();
        let sealed = seal_all("right", &salt, &nonce, b"data");
        assert!(matches!(
            open_all("wrong", &salt, &nonce, &sealed),
            Err(ArchiveError::Decrypt)
        ));
    }

    #[test]
    fn tampering_is_detected() {
        let salt = random_bytes::<SALT_LEN>();
        let nonce = random_bytes::<NONCE_LEN>();
        let mut sealed = seal_all("pass", &salt, &nonce, b"data");
        sealed[0] ^= 0x01;
        assert!(matches!(
            open_all("pass", &salt, &nonce, &sealed),
            Err(ArchiveError::Decrypt)
        ));
    }

    #[test]
    fn dropping_the_final_chunk_is_detected() {
        let salt = random_bytes::<SALT_LEN>();
        let nonce = random_bytes::<NONCE_LEN>();
        let data = vec![1u8; CHUNK_LEN + 10];
        let sealed = seal_all("pass", &salt, &nonce, &data);
        assert!(matches!(
            open_all("pass", &salt, &nonce, &sealed[..SEALED_CHUNK_LEN]),
            Err(ArchiveError::Decrypt)
        ));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(random_bytes::<SALT_LEN>(), random_bytes::<SALT_LEN>());
    }
}
