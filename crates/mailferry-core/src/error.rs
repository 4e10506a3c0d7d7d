//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailferry_imap::Error),

    /// MIME structure could not be parsed.
    #[error("MIME error: {0}")]
    Mime(#[from] mailferry_mime::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// No transport candidate could be connected and authenticated.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A remote operation kept failing after every retry.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Operation {
        /// Name of the operation (`fetch`, `search`, `append`, ...).
        operation: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// The error of the last attempt.
        source: Box<Error>,
    },

    /// Archive container is unreadable.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Invalid user input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if the error must abort the whole run.
    ///
    /// Only an exhausted connection attempt is fatal for a run; everything
    /// else is scoped to one mailbox pair.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Every transport candidate for a host failed.
#[derive(Debug, Error)]
#[error("could not connect to {host}: {}", .failures.join("; "))]
pub struct ConnectionError {
    /// Host that was tried.
    pub host: String,
    /// One entry per candidate, in the order they were tried.
    pub failures: Vec<String>,
}

/// Archive container integrity failures.
///
/// All of these are detected before anything is extracted or appended.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The file does not start with the container magic.
    #[error("not a mailferry archive")]
    BadMagic,

    /// The container version is not supported.
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u8),

    /// The container ended before a declared length.
    #[error("archive truncated while reading {0}")]
    Truncated(&'static str),

    /// Bytes remain after the last entry.
    #[error("unexpected trailing data in archive")]
    TrailingData,

    /// Decryption failed: wrong passphrase or tampered data.
    #[error("wrong passphrase or corrupt archive")]
    Decrypt,

    /// The archive is encrypted but no passphrase was given.
    #[error("archive is encrypted; a passphrase is required")]
    PassphraseRequired,

    /// An entry path would escape the extraction directory.
    #[error("unsafe entry path {0:?}")]
    UnsafePath(String),

    /// Two entries share a path.
    #[error("duplicate entry path {0:?}")]
    DuplicatePath(String),

    /// A field does not fit the container's length prefix.
    #[error("{0} too large for archive")]
    TooLarge(&'static str),

    /// The manifest is missing or invalid.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// Reading or writing the container failed.
    #[error("archive I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Key derivation or encryption failed.
    #[error("encryption failed: {0}")]
    Crypto(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
