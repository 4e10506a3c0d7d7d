//! Attachment extraction.

use std::collections::HashSet;

use crate::content_type::ContentType;
use crate::encoding::decode_rfc2047;
use crate::error::Result;
use crate::part::Part;

/// Longest filename kept, in bytes.
const MAX_FILENAME_LEN: usize = 200;

/// Name used when a declared filename sanitizes to nothing.
const FALLBACK_NAME: &str = "attachment";

/// A decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Sanitized filename, unique within its message.
    pub filename: String,
    /// `type/subtype` of the part.
    pub mime_type: String,
    /// Decoded content.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Returns the attachment filename the part declares, if it is an
    /// attachment at all.
    ///
    /// A leaf is an attachment only when it carries a Content-Disposition
    /// header and a filename, taken from the disposition's `filename`
    /// parameter or else from the content type's `name` parameter.
    pub(crate) fn declared_filename(part: &Part, content_type: &ContentType) -> Result<Option<String>> {
        let Some(disposition) = part.content_disposition()? else {
            return Ok(None);
        };
        Ok(disposition
            .filename()
            .or_else(|| content_type.name())
            .map(ToString::to_string))
    }

    /// Collects the attachments found among the leaves of `root`.
    pub(crate) fn collect(root: &Part) -> Result<Vec<Self>> {
        let mut taken = HashSet::new();
        let mut attachments = Vec::new();

        for leaf in root.leaves() {
            let content_type = leaf.content_type()?;
            let Some(declared) = Self::declared_filename(leaf, &content_type)? else {
                continue;
            };

            let filename = unique_name(&sanitize_filename(&declared), &mut taken);
            attachments.push(Self {
                filename,
                mime_type: content_type.mime_type(),
                data: leaf.decode_body()?,
            });
        }

        Ok(attachments)
    }
}

/// Makes a declared filename safe to use as a single path component.
///
/// Encoded words are decoded, path separators and control characters become
/// `_`, leading dots and surrounding whitespace are dropped, and the result
/// is truncated on a character boundary.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let decoded = decode_rfc2047(name);
    let replaced: String = decoded
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_start_matches('.').trim();
    let mut out = String::new();
    for c in trimmed.chars() {
        if out.len() + c.len_utf8() > MAX_FILENAME_LEN {
            break;
        }
        out.push(c);
    }

    if out.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        out
    }
}

/// Returns `name`, or `stem-N.ext` for the first free N, and records it.
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_lowercase()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    let mut n = 2u32;
    loop {
        let candidate = ext.map_or_else(|| format!("{stem}-{n}"), |ext| format!("{stem}-{n}.{ext}"));
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}
