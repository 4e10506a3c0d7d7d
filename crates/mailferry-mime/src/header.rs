//! MIME header handling.

use std::fmt;

/// Collection of email headers in message order.
///
/// Lookups are case-insensitive; names keep their original spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the number of header fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no header fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a raw header block.
    ///
    /// Folded lines are unfolded. Lines that are neither a field nor a
    /// continuation are skipped, since real-world mail often carries them.
    /// Parsing stops at the first empty line.
    #[must_use]
    pub fn parse(block: &[u8]) -> Self {
        let text = String::from_utf8_lossy(block);
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value);
            }

            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                if !name.is_empty() && !name.contains(char::is_whitespace) {
                    current = Some((name.to_string(), value.trim().to_string()));
                }
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }

        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

/// Splits a raw entity into its header block and body.
///
/// The blank line separating them belongs to neither. An entity without a
/// blank line is all header.
#[must_use]
pub fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = raw.strip_prefix(b"\r\n") {
        return (&[], body);
    }
    if let Some(body) = raw.strip_prefix(b"\n") {
        return (&[], body);
    }

    let mut i = 0;
    while let Some(offset) = raw[i..].iter().position(|&b| b == b'\n') {
        let nl = i + offset;
        let rest = &raw[nl + 1..];
        if rest.starts_with(b"\r\n") {
            return (&raw[..=nl], &rest[2..]);
        }
        if rest.starts_with(b"\n") {
            return (&raw[..=nl], &rest[1..]);
        }
        i = nl + 1;
    }

    (raw, &[])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_headers_parse_folded() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "Received: from a\r\n",
            "Received: from b\r\n",
            "Content-Type: text/plain;\r\n",
            "\tcharset=utf-8\r\n",
            "\r\n",
            "Body: not a header\r\n",
        );

        let headers = Headers::parse(text.as_bytes());
        assert_eq!(headers.get("from"), Some("sender@example.com"));
        assert_eq!(headers.get("received"), Some("from a"));
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get("Content-Type"), Some("text/plain; charset=utf-8"));
        assert!(headers.get("body").is_none());
    }

    #[test]
    fn test_headers_parse_skips_garbage_lines() {
        let headers = Headers::parse(b">From someone\r\nSubject: hi\r\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("subject"), Some("hi"));
    }

    #[test]
    fn test_headers_display_keeps_order() {
        let mut headers = Headers::new();
        headers.add("To", "b@example.com");
        headers.add("From", "a@example.com");
        assert_eq!(
            headers.to_string(),
            "To: b@example.com\r\nFrom: a@example.com\r\n"
        );
    }

    #[test]
    fn test_split_header_body_crlf() {
        let (head, body) = split_header_body(b"A: 1\r\nB: 2\r\n\r\nbody\r\n");
        assert_eq!(head, b"A: 1\r\nB: 2\r\n");
        assert_eq!(body, b"body\r\n");
    }

    #[test]
    fn test_split_header_body_lf() {
        let (head, body) = split_header_body(b"A: 1\n\nbody");
        assert_eq!(head, b"A: 1\n");
        assert_eq!(body, b"body");
    }

    #[test]
    fn test_split_without_headers() {
        let (head, body) = split_header_body(b"\r\njust body");
        assert!(head.is_empty());
        assert_eq!(body, b"just body");
    }

    #[test]
    fn test_split_without_body() {
        let (head, body) = split_header_body(b"A: 1\r\n");
        assert_eq!(head, b"A: 1\r\n");
        assert!(body.is_empty());
    }
}
