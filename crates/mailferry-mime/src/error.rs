//! Errors raised while taking a message apart.

use thiserror::Error;

/// Ways a message can fail to parse.
#[derive(Debug, Error)]
pub enum Error {
    /// A structured header value is unusable.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// `Content-Type` lacks a type or subtype.
    #[error("malformed content type: {0}")]
    MalformedContentType(String),

    /// A body does not match its transfer encoding.
    #[error("bad transfer encoding: {0}")]
    BadTransferEncoding(String),

    /// Base64 body is not valid base64.
    #[error("bad base64 body: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A `multipart/*` part has no boundary parameter.
    #[error("multipart part has no boundary")]
    NoBoundary,

    /// Multipart body is truncated or nested too deep.
    #[error("malformed multipart body: {0}")]
    MalformedMultipart(String),
}

/// Result alias for MIME parsing.
pub type Result<T> = std::result::Result<T, Error>;
