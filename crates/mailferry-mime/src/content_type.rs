//! MIME content type and content disposition handling.

use std::collections::HashMap;
use std::fmt;

use crate::encoding::{decode_rfc2047, decode_rfc2231};
use crate::error::{Error, Result};

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Creates a text/plain content type, the default for parts without a
    /// Content-Type header.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "us-ascii")
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns the `type/subtype` string without parameters.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// Returns the `name` parameter if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameters.get("name").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the `type/subtype` part is missing or malformed.
    pub fn parse(s: &str) -> Result<Self> {
        let mut segments = split_parameters(s).into_iter();

        let type_str = segments
            .next()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::MalformedContentType("Empty content type".to_string()))?;

        let (main_type, sub_type) = type_str
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::MalformedContentType(format!("Missing subtype in {s:?}")))?;
        let main_type = main_type.trim().to_lowercase();
        let sub_type = sub_type.trim().to_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::MalformedContentType(format!(
                "Malformed type in {s:?}"
            )));
        }

        let mut content_type = Self::new(main_type, sub_type);
        content_type.parameters = collect_parameters(segments);
        Ok(content_type)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        let mut params: Vec<_> = self.parameters.iter().collect();
        params.sort();
        for (key, value) in params {
            if value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c)) {
                write!(f, "; {key}=\"{value}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
    }
}

/// Disposition type of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispositionKind {
    /// `inline`.
    Inline,
    /// `attachment`.
    Attachment,
    /// Any other token, lowercased.
    Other(String),
}

/// Parsed Content-Disposition header (RFC 2183).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type.
    pub kind: DispositionKind,
    /// Parameters, keyed by lowercase name.
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a Content-Disposition value.
    ///
    /// # Errors
    ///
    /// Returns an error if the disposition type is missing.
    pub fn parse(s: &str) -> Result<Self> {
        let mut segments = split_parameters(s).into_iter();
        let kind = segments
            .next()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::MalformedHeader(format!("empty Content-Disposition: {s:?}")))?;

        let kind = match kind.as_str() {
            "inline" => DispositionKind::Inline,
            "attachment" => DispositionKind::Attachment,
            _ => DispositionKind::Other(kind),
        };

        Ok(Self {
            kind,
            parameters: collect_parameters(segments),
        })
    }

    /// Returns the `filename` parameter if present.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }
}

/// Splits a header value on `;` outside quoted strings.
fn split_parameters(s: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

/// Removes surrounding quotes and backslash escapes.
fn unquote(value: &str) -> String {
    let value = value.trim();
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Builds the parameter map, resolving RFC 2231 continuations
/// (`name*0`, `name*1*`) and extended values (`name*`), and decoding
/// RFC 2047 words that some mailers put in quoted values.
fn collect_parameters(segments: impl Iterator<Item = String>) -> HashMap<String, String> {
    let mut plain = HashMap::new();
    let mut extended = HashMap::new();
    let mut sections: HashMap<String, Vec<(u32, bool, String)>> = HashMap::new();

    for segment in segments {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = unquote(value);

        if let Some((base, rest)) = key.split_once('*') {
            let encoded = rest.ends_with('*') || rest.is_empty();
            let index = rest.trim_end_matches('*');
            if index.is_empty() {
                extended.insert(base.to_string(), decode_rfc2231(&value));
            } else if let Ok(n) = index.parse::<u32>() {
                sections
                    .entry(base.to_string())
                    .or_default()
                    .push((n, encoded, value));
            }
        } else {
            plain.insert(key, decode_rfc2047(&value));
        }
    }

    for (name, mut parts) in sections {
        parts.sort_by_key(|(n, _, _)| *n);
        let any_encoded = parts.iter().any(|(_, encoded, _)| *encoded);
        let joined: String = parts.into_iter().map(|(_, _, v)| v).collect();
        let value = if any_encoded {
            decode_rfc2231(&joined)
        } else {
            joined
        };
        extended.entry(name).or_insert(value);
    }

    // Extended values take precedence over plain ones of the same name.
    plain.extend(extended);
    plain
}
