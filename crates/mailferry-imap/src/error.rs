//! IMAP client errors.

use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong talking to an IMAP server.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket read, write or connect failed.
    #[error("network I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup or record layer failed.
    #[error("TLS failure: {0}")]
    Tls(#[from] rustls::Error),

    /// The host is not usable as a TLS server name.
    #[error("host is not a valid TLS server name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A server line could not be parsed.
    #[error("unparsable response at byte {position}: {message}")]
    Parse {
        /// Offset into the response line.
        position: usize,
        /// What the parser expected.
        message: String,
    },

    /// LOGIN was rejected.
    #[error("login rejected: {0}")]
    Auth(String),

    /// Tagged NO.
    #[error("server said NO: {0}")]
    No(String),

    /// Tagged BAD.
    #[error("server said BAD: {0}")]
    Bad(String),

    /// Untagged BYE; the server is hanging up.
    #[error("server said BYE: {0}")]
    Bye(String),

    /// No complete response within the I/O timeout.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The command is not valid in the client's current state.
    #[error("not allowed in current state: {0}")]
    InvalidState(String),

    /// The server broke protocol rules.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The peer closed the socket.
    #[error("connection closed by server")]
    ConnectionLost,
}

impl Error {
    /// Returns true if the connection cannot be used after this error.
    ///
    /// NO and BAD leave the connection usable.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::Bye(_) | Self::Timeout(_) | Self::ConnectionLost
        )
    }
}

/// Result alias for IMAP operations.
pub type Result<T> = std::result::Result<T, Error>;
