//! Framed I/O for IMAP protocol.
//!
//! IMAP responses are CRLF-terminated lines that may embed literals
//! (`{n}\r\n` followed by `n` raw bytes). [`FramedStream`] reads whole
//! responses, literals included, so the parser always sees complete input.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Maximum length of one protocol line (excluding literals).
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Default upper bound for a single literal.
pub const DEFAULT_MAX_LITERAL_SIZE: usize = 256 * 1024 * 1024;

/// Framed connection for IMAP protocol.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    max_literal: usize,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            max_literal: DEFAULT_MAX_LITERAL_SIZE,
        }
    }

    /// Sets the largest literal accepted from the server.
    #[must_use]
    pub const fn with_max_literal(mut self, max: usize) -> Self {
        self.max_literal = max;
        self
    }

    /// Reads one complete response, including any embedded literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = BytesMut::new();

        loop {
            self.read_line_into(&mut response).await?;

            let Some(len) = trailing_literal_length(&response) else {
                break;
            };
            if len > self.max_literal {
                return Err(Error::Protocol(format!(
                    "literal too large: {len} bytes (max {})",
                    self.max_literal
                )));
            }

            let start = response.len();
            response.resize(start + len, 0);
            self.reader
                .read_exact(&mut response[start..])
                .await
                .map_err(eof_as_connection_lost)?;
        }

        Ok(response.to_vec())
    }

    /// Reads responses until the tagged completion for `tag` arrives.
    ///
    /// The tagged response is the last element of the returned vector.
    pub async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut responses = Vec::new();
        loop {
            let response = self.read_response().await?;
            let done = is_tagged_with(&response, tag);
            responses.push(response);
            if done {
                return Ok(responses);
            }
        }
    }

    /// Appends one CRLF-terminated line to `out`.
    async fn read_line_into(&mut self, out: &mut BytesMut) -> Result<()> {
        let mut line_len = 0usize;

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::ConnectionLost);
            }

            // A CR at the end of the previous chunk pairs with an LF here.
            if buf[0] == b'\n' && out.last() == Some(&b'\r') && line_len > 0 {
                out.extend_from_slice(&buf[..1]);
                self.reader.consume(1);
                return Ok(());
            }

            if let Some(pos) = find_crlf(buf) {
                out.extend_from_slice(&buf[..pos + 2]);
                self.reader.consume(pos + 2);
                return Ok(());
            }

            let len = buf.len();
            out.extend_from_slice(buf);
            self.reader.consume(len);

            line_len += len;
            if line_len > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }
    }

    /// Writes a serialized command and flushes it.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Writes raw literal bytes followed by the closing CRLF.
    pub async fn write_literal(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;
        Ok(())
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Any buffered, unread data is dropped.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

fn eof_as_connection_lost(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::ConnectionLost
    } else {
        Error::Io(err)
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn is_tagged_with(response: &[u8], tag: &str) -> bool {
    response
        .strip_prefix(tag.as_bytes())
        .is_some_and(|rest| rest.first() == Some(&b' '))
}

/// Returns `n` if the buffer ends with a literal announcement `{n}\r\n`
/// or `{n+}\r\n`.
fn trailing_literal_length(buf: &[u8]) -> Option<usize> {
    let body = buf.strip_suffix(b"\r\n")?.strip_suffix(b"}")?;
    let body = body.strip_suffix(b"+").unwrap_or(body);
    let open = body.iter().rposition(|&b| b == b'{')?;
    let digits = &body[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
