//! MIME entity tree.

use std::fmt;

use crate::content_type::{ContentDisposition, ContentType};
use crate::encoding::{decode_base64, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::{Headers, split_header_body};

/// Nesting limit for multipart bodies.
const MAX_DEPTH: usize = 32;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// One MIME entity: headers, raw body and, for multiparts, its children.
///
/// For a multipart entity `body` holds the undecoded multipart body
/// (preamble, delimiters and all) and `children` the parsed body parts.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw bytes, still transfer-encoded).
    pub body: Vec<u8>,
    /// Body parts of a multipart entity; empty for leaves.
    pub children: Vec<Self>,
}

impl Part {
    /// Creates a leaf part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self {
            headers,
            body,
            children: Vec::new(),
        }
    }

    /// Parses a raw entity, recursing into multipart bodies.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart entity has no boundary, no delimiter
    /// line, or nests deeper than the supported limit.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Self::parse_at_depth(raw, 0)
    }

    fn parse_at_depth(raw: &[u8], depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(Error::MalformedMultipart(format!(
                "nesting deeper than {MAX_DEPTH} levels"
            )));
        }

        let (head, body) = split_header_body(raw);
        let mut part = Self::new(Headers::parse(head), body.to_vec());

        let content_type = part.content_type()?;
        if content_type.is_multipart() {
            let boundary = content_type.boundary().ok_or(Error::NoBoundary)?;
            for child in split_multipart(body, boundary)? {
                part.children.push(Self::parse_at_depth(child, depth + 1)?);
            }
        }

        Ok(part)
    }

    /// Gets the content type, defaulting to `text/plain`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Content-Type header is malformed.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }

    /// Gets the content disposition, if the part declares one.
    ///
    /// # Errors
    ///
    /// Returns an error if the Content-Disposition header is malformed.
    pub fn content_disposition(&self) -> Result<Option<ContentDisposition>> {
        self.headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
            .transpose()
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Returns true if this part has body parts.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        !self.children.is_empty()
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(&self.body),
            TransferEncoding::QuotedPrintable => decode_quoted_printable(&self.body),
            _ => Ok(self.body.clone()),
        }
    }

    /// Returns every leaf part in depth-first order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Self>) {
        if self.children.is_empty() {
            out.push(self);
        } else {
            for child in &self.children {
                child.collect_leaves(out);
            }
        }
    }
}

/// Splits a multipart body into its body parts (RFC 2046 section 5.1.1).
///
/// The line break before each delimiter belongs to the delimiter. A missing
/// close delimiter ends the last part at the end of the body.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut seen_delimiter = false;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i);
        let next = (line_end + 1).min(body.len());
        let line = body[pos..line_end]
            .strip_suffix(b"\r")
            .unwrap_or(&body[pos..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter) {
            let closing = rest.starts_with(b"--");
            if closing || rest.iter().all(|b| matches!(b, b' ' | b'\t')) {
                seen_delimiter = true;
                if let Some(start) = current.take() {
                    parts.push(strip_line_break(&body[start..pos]));
                }
                if closing {
                    return Ok(parts);
                }
                current = Some(next);
            }
        }

        pos = next;
    }

    if !seen_delimiter {
        return Err(Error::MalformedMultipart(format!(
            "no delimiter for boundary {boundary:?}"
        )));
    }
    if let Some(start) = current {
        parts.push(&body[start.min(body.len())..]);
    }
    Ok(parts)
}

fn strip_line_break(part: &[u8]) -> &[u8] {
    part.strip_suffix(b"\r\n")
        .or_else(|| part.strip_suffix(b"\n"))
        .unwrap_or(part)
}
