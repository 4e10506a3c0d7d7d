//! Binary container format, version 2.
//!
//! ```text
//! magic "MFAR" | version u8 | flags u8
//! [salt 16 | stream nonce 7]      only when flags bit 0 is set
//! body                            entry stream, or its sealed chunks
//!
//! entry stream: per entry
//!     path_len u16 | path | data_len u64 | data
//! closed by a zero path_len
//! ```
//!
//! All integers are big-endian. An encrypted body is the entry stream cut
//! into sealed chunks (see [`super::crypto`]). Both directions hold at most
//! one chunk and one entry in memory, so container size is bounded by the
//! disk, not by RAM. The reader checks path safety and uniqueness on every
//! entry and rejects a missing end marker or bytes after it.

use std::collections::HashSet;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ArchiveError;

use super::crypto::{self, NONCE_LEN, Opener, SALT_LEN, SEALED_CHUNK_LEN, Sealer};
use super::layout::validate_entry_path;

/// Container magic.
pub const MAGIC: &[u8; 4] = b"MFAR";

/// Current container version.
pub const VERSION: u8 = 2;

/// Flags bit marking an encrypted body.
const FLAG_ENCRYPTED: u8 = 0b0000_0001;

/// Length of magic, version and flags.
pub const PREAMBLE_LEN: usize = 6;

/// Path length that closes the entry stream.
const END_MARKER: u16 = 0;

/// Entry data is read in steps, so a hostile length runs into truncation
/// before it can force a large allocation.
const READ_STEP: usize = 64 * 1024;

/// One file in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Relative `/`-separated path.
    pub path: String,
    /// File contents.
    pub data: Vec<u8>,
}

/// Returns true if the container body is encrypted.
///
/// Only the first [`PREAMBLE_LEN`] bytes are looked at.
///
/// # Errors
///
/// Returns an error if the preamble is invalid.
pub fn is_encrypted(preamble: &[u8]) -> Result<bool, ArchiveError> {
    parse_preamble(preamble).map(|flags| flags & FLAG_ENCRYPTED != 0)
}

fn parse_preamble(preamble: &[u8]) -> Result<u8, ArchiveError> {
    if preamble.get(..MAGIC.len()) != Some(MAGIC.as_slice()) {
        return Err(ArchiveError::BadMagic);
    }
    let version = *preamble.get(4).ok_or(ArchiveError::Truncated("version"))?;
    if version != VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    preamble.get(5).copied().ok_or(ArchiveError::Truncated("flags"))
}

/// Writes a container one entry at a time.
pub struct ArchiveWriter<W> {
    out: W,
    sealer: Option<Sealer>,
    seen: HashSet<String>,
    sealed: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> ArchiveWriter<W> {
    /// Writes the preamble. The body is sealed when `passphrase` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation or the write fails.
    pub async fn create(mut out: W, passphrase: Option<&str>) -> Result<Self, ArchiveError> {
        let mut preamble = Vec::with_capacity(PREAMBLE_LEN + SALT_LEN + NONCE_LEN);
        preamble.extend_from_slice(MAGIC);
        preamble.push(VERSION);

        let sealer = match passphrase {
            Some(passphrase) => {
                let salt = crypto::random_bytes::<SALT_LEN>();
                let nonce = crypto::random_bytes::<NONCE_LEN>();
                preamble.push(FLAG_ENCRYPTED);
                preamble.extend_from_slice(&salt);
                preamble.extend_from_slice(&nonce);
                Some(Sealer::new(passphrase, &salt, &nonce)?)
            }
            None => {
                preamble.push(0);
                None
            }
        };
        out.write_all(&preamble).await?;

        Ok(Self {
            out,
            sealer,
            seen: HashSet::new(),
            sealed: Vec::new(),
        })
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsafe, duplicate or oversized path, or if
    /// the write fails.
    pub async fn add(&mut self, path: &str, data: &[u8]) -> Result<(), ArchiveError> {
        validate_entry_path(path)?;
        let path_len =
            u16::try_from(path.len()).map_err(|_| ArchiveError::TooLarge("entry path"))?;
        if !self.seen.insert(path.to_string()) {
            return Err(ArchiveError::DuplicatePath(path.to_string()));
        }

        let mut header = Vec::with_capacity(10 + path.len());
        header.extend_from_slice(&path_len.to_be_bytes());
        header.extend_from_slice(path.as_bytes());
        header.extend_from_slice(&(data.len() as u64).to_be_bytes());
        self.emit(&header).await?;
        self.emit(data).await
    }

    /// Number of entries added so far.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.seen.len()
    }

    /// Writes the end marker and the final chunk, flushes, and returns the
    /// underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if sealing or the write fails.
    pub async fn finish(mut self) -> Result<W, ArchiveError> {
        self.emit(&END_MARKER.to_be_bytes()).await?;
        if let Some(sealer) = self.sealer.take() {
            let last = sealer.finish()?;
            self.out.write_all(&last).await?;
        }
        self.out.flush().await?;
        Ok(self.out)
    }

    async fn emit(&mut self, bytes: &[u8]) -> Result<(), ArchiveError> {
        match &mut self.sealer {
            Some(sealer) => {
                self.sealed.clear();
                sealer.push(bytes, &mut self.sealed)?;
                self.out.write_all(&self.sealed).await?;
            }
            None => self.out.write_all(bytes).await?,
        }
        Ok(())
    }
}

/// Reads a container one entry at a time.
pub struct ArchiveReader<R> {
    input: R,
    /// Present while sealed chunks remain.
    opener: Option<Opener>,
    encrypted: bool,
    plain: Vec<u8>,
    pos: usize,
    seen: HashSet<String>,
    done: bool,
}

impl<R: AsyncRead + Unpin> ArchiveReader<R> {
    /// Reads and checks the preamble.
    ///
    /// A passphrase given for an unencrypted container is ignored. A wrong
    /// passphrase shows up as [`ArchiveError::Decrypt`] on the first
    /// [`next_entry`](Self::next_entry).
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::PassphraseRequired`] for an encrypted
    /// container without a passphrase, and the matching variant for a bad
    /// preamble.
    pub async fn open(mut input: R, passphrase: Option<&str>) -> Result<Self, ArchiveError> {
        let mut preamble = [0u8; PREAMBLE_LEN];
        let len = read_up_to(&mut input, &mut preamble).await?;
        let flags = parse_preamble(&preamble[..len])?;

        let opener = if flags & FLAG_ENCRYPTED == 0 {
            None
        } else {
            let passphrase = passphrase.ok_or(ArchiveError::PassphraseRequired)?;
            let mut salt = [0u8; SALT_LEN];
            read_field(&mut input, &mut salt, "salt").await?;
            let mut nonce = [0u8; NONCE_LEN];
            read_field(&mut input, &mut nonce, "nonce").await?;
            Some(Opener::new(passphrase, &salt, &nonce)?)
        };

        Ok(Self {
            input,
            encrypted: opener.is_some(),
            opener,
            plain: Vec::new(),
            pos: 0,
            seen: HashSet::new(),
            done: false,
        })
    }

    /// Reads the next entry; `None` after the end marker.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Decrypt`] for a wrong passphrase or modified
    /// data, and the matching variant for any structural problem.
    pub async fn next_entry(&mut self) -> Result<Option<Entry>, ArchiveError> {
        if self.done {
            return Ok(None);
        }

        let path_len = u16::from_be_bytes(self.array("path length").await?);
        if path_len == END_MARKER {
            self.expect_end().await?;
            self.done = true;
            return Ok(None);
        }

        let mut path = vec![0u8; usize::from(path_len)];
        self.fill(&mut path, "path").await?;
        let path = String::from_utf8(path).map_err(|e| {
            ArchiveError::UnsafePath(String::from_utf8_lossy(e.as_bytes()).into_owned())
        })?;
        validate_entry_path(&path)?;
        if !self.seen.insert(path.clone()) {
            return Err(ArchiveError::DuplicatePath(path));
        }

        let data_len = u64::from_be_bytes(self.array("data length").await?);
        let data = self.read_data(data_len).await?;
        Ok(Some(Entry { path, data }))
    }

    async fn read_data(&mut self, len: u64) -> Result<Vec<u8>, ArchiveError> {
        let len = usize::try_from(len).map_err(|_| ArchiveError::Truncated("data"))?;
        let mut data = Vec::with_capacity(len.min(READ_STEP));
        while data.len() < len {
            let start = data.len();
            data.resize(start + (len - start).min(READ_STEP), 0);
            self.fill(&mut data[start..], "data").await?;
        }
        Ok(data)
    }

    async fn array<const N: usize>(
        &mut self,
        what: &'static str,
    ) -> Result<[u8; N], ArchiveError> {
        let mut out = [0u8; N];
        self.fill(&mut out, what).await?;
        Ok(out)
    }

    /// Fills `buf` from the plaintext entry stream.
    async fn fill(&mut self, buf: &mut [u8], what: &'static str) -> Result<(), ArchiveError> {
        if !self.encrypted {
            return read_field(&mut self.input, buf, what).await;
        }

        let mut filled = 0;
        while filled < buf.len() {
            if self.pos == self.plain.len() {
                if !self.next_chunk().await? {
                    return Err(ArchiveError::Truncated(what));
                }
                continue;
            }
            let n = (buf.len() - filled).min(self.plain.len() - self.pos);
            buf[filled..filled + n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
            filled += n;
            self.pos += n;
        }
        Ok(())
    }

    /// Opens the next sealed chunk; false once the final chunk is used up.
    ///
    /// A full-size chunk is never final, so a shorter read (including an
    /// empty one at end of file) is opened as the final chunk.
    async fn next_chunk(&mut self) -> Result<bool, ArchiveError> {
        let Some(mut opener) = self.opener.take() else {
            return Ok(false);
        };

        let mut sealed = vec![0u8; SEALED_CHUNK_LEN];
        let len = read_up_to(&mut self.input, &mut sealed).await?;
        self.plain = if len == SEALED_CHUNK_LEN {
            let plain = opener.open_next(&sealed)?;
            self.opener = Some(opener);
            plain
        } else {
            opener.open_last(&sealed[..len])?
        };
        self.pos = 0;
        Ok(true)
    }

    async fn expect_end(&mut self) -> Result<(), ArchiveError> {
        if self.encrypted {
            // The marker can close a full chunk; an empty final chunk follows.
            if self.pos == self.plain.len() && self.opener.is_some() {
                self.next_chunk().await?;
            }
            if self.pos != self.plain.len() || self.opener.is_some() {
                return Err(ArchiveError::TrailingData);
            }
        }
        let mut extra = [0u8; 1];
        if self.input.read(&mut extra).await? != 0 {
            return Err(ArchiveError::TrailingData);
        }
        Ok(())
    }
}

/// Reads until `buf` is full or the input ends; returns the bytes read.
async fn read_up_to<R: AsyncRead + Unpin>(
    input: &mut R,
    buf: &mut [u8],
) -> Result<usize, ArchiveError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = input.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn read_field<R: AsyncRead + Unpin>(
    input: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), ArchiveError> {
    match input.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ArchiveError::Truncated(what))
        }
        Err(e) => Err(e.into()),
    }
}
