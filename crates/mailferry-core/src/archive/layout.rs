//! Entry paths inside an archive.
//!
//! ```text
//! manifest.json
//! <mailbox>/<uid>.eml
//! <mailbox>/<uid>/<attachment filename>
//! ```
//!
//! Mailbox names are percent-escaped so that hierarchy separators, drive
//! prefixes and leading dots cannot create extra path components.

use crate::error::ArchiveError;

/// Path of the manifest entry.
pub const MANIFEST_PATH: &str = "manifest.json";

/// Extension of message entries.
pub const MESSAGE_EXTENSION: &str = "eml";

/// Escapes a mailbox name into a single path component.
///
/// A name that would collide with the manifest entry, in any letter case,
/// gets its first letter escaped as well.
#[must_use]
pub fn escape_mailbox(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            ':' => out.push_str("%3A"),
            '.' if i == 0 => out.push_str("%2E"),
            _ => out.push(c),
        }
    }
    if out.eq_ignore_ascii_case(MANIFEST_PATH) {
        out = format!("%{:02X}{}", out.as_bytes()[0], &out[1..]);
    }
    out
}

/// Reverses [`escape_mailbox`].
///
/// Any `%XX` escape of an ASCII byte is accepted. Returns `None` for a
/// malformed escape sequence.
#[must_use]
pub fn unescape_mailbox(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        if !code.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let byte = u8::from_str_radix(code, 16).ok().filter(u8::is_ascii)?;
        out.push(char::from(byte));
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}

/// Path of a message entry.
#[must_use]
pub fn message_path(mailbox: &str, uid: u32) -> String {
    format!("{}/{uid}.{MESSAGE_EXTENSION}", escape_mailbox(mailbox))
}

/// Path of an attachment entry. `filename` must already be sanitized.
#[must_use]
pub fn attachment_path(mailbox: &str, uid: u32, filename: &str) -> String {
    format!("{}/{uid}/{filename}", escape_mailbox(mailbox))
}

/// What an entry path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// The manifest.
    Manifest,
    /// A raw message.
    Message {
        /// Unescaped mailbox name.
        mailbox: String,
        /// Source UID.
        uid: u32,
    },
    /// An extracted attachment.
    Attachment {
        /// Unescaped mailbox name.
        mailbox: String,
        /// Source UID of the owning message.
        uid: u32,
        /// Attachment filename.
        filename: String,
    },
}

/// Classifies an entry path; `None` for paths outside the layout.
#[must_use]
pub fn classify(path: &str) -> Option<EntryKind> {
    if path == MANIFEST_PATH {
        return Some(EntryKind::Manifest);
    }

    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [mailbox, file] => {
            let uid = file
                .strip_suffix(MESSAGE_EXTENSION)?
                .strip_suffix('.')?
                .parse()
                .ok()?;
            Some(EntryKind::Message {
                mailbox: unescape_mailbox(mailbox)?,
                uid,
            })
        }
        [mailbox, uid, filename] => Some(EntryKind::Attachment {
            mailbox: unescape_mailbox(mailbox)?,
            uid: uid.parse().ok()?,
            filename: (*filename).to_string(),
        }),
        _ => None,
    }
}

/// Rejects paths that could escape the extraction directory.
///
/// # Errors
///
/// Returns [`ArchiveError::UnsafePath`] for absolute paths, backslashes,
/// NUL bytes, and empty, `.` or `..` components.
pub fn validate_entry_path(path: &str) -> Result<(), ArchiveError> {
    let unsafe_path = || ArchiveError::UnsafePath(path.to_string());

    if path.is_empty() || path.contains(['\\', '\0']) {
        return Err(unsafe_path());
    }
    for component in path.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(unsafe_path());
        }
    }
    // Windows drive prefixes such as `C:`.
    if path.split('/').next().is_some_and(|first| first.contains(':')) {
        return Err(unsafe_path());
    }
    Ok(())
}
