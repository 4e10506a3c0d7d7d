//! Top-level message access.

use crate::attachment::Attachment;
use crate::error::Result;
use crate::header::{Headers, split_header_body};
use crate::part::Part;

/// A parsed message.
#[derive(Debug, Clone)]
pub struct Message {
    root: Part,
}

impl Message {
    /// Parses a raw RFC 5322 message including its MIME structure.
    ///
    /// # Errors
    ///
    /// Returns an error if the MIME structure is malformed.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Ok(Self {
            root: Part::parse(raw)?,
        })
    }

    /// Parses only the header block of a raw message.
    ///
    /// Cheaper than [`Message::parse`] when only header fields are needed,
    /// and never fails.
    #[must_use]
    pub fn parse_headers(raw: &[u8]) -> Headers {
        Headers::parse(split_header_body(raw).0)
    }

    /// Returns the top-level entity.
    #[must_use]
    pub const fn root(&self) -> &Part {
        &self.root
    }

    /// Returns the message headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.root.headers
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.root.headers.get("message-id")
    }

    /// Extracts attachments with decoded bodies and unique, sanitized names.
    ///
    /// # Errors
    ///
    /// Returns an error if a part's headers or transfer encoding are
    /// malformed.
    pub fn attachments(&self) -> Result<Vec<Attachment>> {
        Attachment::collect(&self.root)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MIXED: &str = concat!(
        "From: sender@example.com\r\n",
        "Subject: =?utf-8?Q?Quarterly_r=C3=A9port?=\r\n",
        "Message-ID:  <q1@example.com> \r\n",
        "Content-Type: multipart/mixed; boundary=\"==b==\"\r\n",
        "\r\n",
        "--==b==\r\n",
        "Content-Type: multipart/alternative; boundary=alt\r\n",
        "\r\n",
        "--alt\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "See attached.\r\n",
        "--alt--\r\n",
        "--==b==\r\n",
        "Content-Type: image/png\r\n",
        "Content-Disposition: inline\r\n",
        "\r\n",
        "not an attachment: inline without filename\r\n",
        "--==b==\r\n",
        "Content-Type: application/pdf; name=\"report.pdf\"\r\n",
        "Content-Disposition: attachment\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "JVBERi0x\r\n",
        "--==b==\r\n",
        "Content-Type: application/pdf\r\n",
        "Content-Disposition: attachment; filename=\"report.pdf\"\r\n",
        "\r\n",
        "second\r\n",
        "--==b==\r\n",
        "Content-Type: text/plain; name=\"ignored.txt\"\r\n",
        "\r\n",
        "name without disposition\r\n",
        "--==b==--\r\n",
    );

    #[test]
    fn test_message_headers() {
        let message = Message::parse(MIXED.as_bytes()).unwrap();
        assert_eq!(message.message_id(), Some("<q1@example.com>"));
    }

    #[test]
    fn test_attachments_require_disposition_and_filename() {
        let message = Message::parse(MIXED.as_bytes()).unwrap();
        let attachments = message.attachments().unwrap();

        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].filename, "report.pdf");
        assert_eq!(attachments[0].mime_type, "application/pdf");
        assert_eq!(attachments[0].data, b"%PDF-1");
        assert_eq!(attachments[1].filename, "report-2.pdf");
        assert_eq!(attachments[1].data, b"second");
    }

    #[test]
    fn test_parse_headers_only() {
        let headers = Message::parse_headers(b"Message-ID: <x@y>\r\n\r\nbody");
        assert_eq!(headers.get("message-id"), Some("<x@y>"));
    }

    #[test]
    fn test_plain_message_has_no_attachments() {
        let message = Message::parse(b"Subject: hi\r\n\r\nbody").unwrap();
        assert!(message.attachments().unwrap().is_empty());
        assert!(message.message_id().is_none());
    }
}
