//! Mailbox names, LIST entries and SELECT snapshots.

use std::fmt;

use base64::Engine;
use base64::alphabet::IMAP_MUTF7;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::NO_PAD;

use super::{Flags, Uid, UidValidity};

/// Modified base64 of RFC 3501 section 5.1.3.
const MODIFIED_BASE64: GeneralPurpose = GeneralPurpose::new(&IMAP_MUTF7, NO_PAD);

/// A mailbox name as the server spells it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox(pub String);

impl Mailbox {
    /// Wraps `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name with modified UTF-7 shift sequences decoded.
    ///
    /// Commands must keep using [`as_str`](Self::as_str); this form is for
    /// display and comparison. A malformed sequence is kept verbatim.
    #[must_use]
    pub fn decoded(&self) -> String {
        decode_modified_utf7(&self.0)
    }
}

/// Decodes the `&...-` sequences of a modified UTF-7 mailbox name.
#[must_use]
pub fn decode_modified_utf7(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let shifted = &rest[start + 1..];
        let Some(end) = shifted.find('-') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let encoded = &shifted[..end];
        if encoded.is_empty() {
            out.push('&');
        } else if let Some(text) = decode_utf16_run(encoded) {
            out.push_str(&text);
        } else {
            out.push_str(&rest[start..start + end + 2]);
        }
        rest = &shifted[end + 1..];
    }
    out.push_str(rest);
    out
}

fn decode_utf16_run(encoded: &str) -> Option<String> {
    let bytes = MODIFIED_BASE64.decode(encoded).ok()?;
    if !bytes.len().is_multiple_of(2) {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What SELECT reported.
#[derive(Debug, Clone, Default)]
pub struct MailboxStatus {
    /// `EXISTS`
    pub exists: u32,
    /// `RECENT`
    pub recent: u32,
    /// `UIDNEXT`, if sent.
    pub uid_next: Option<Uid>,
    /// `UIDVALIDITY`, if sent.
    pub uid_validity: Option<UidValidity>,
    /// `FLAGS`
    pub flags: Flags,
    /// Selected with `READ-ONLY`.
    pub read_only: bool,
}

/// One LIST entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    /// Name attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy separator; `None` for a flat namespace.
    pub delimiter: Option<char>,
    /// Full name.
    pub mailbox: Mailbox,
}

impl ListResponse {
    /// False for `\Noselect` and `\NonExistent` names.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.attributes.iter().any(|attribute| {
            matches!(
                attribute,
                MailboxAttribute::NoSelect | MailboxAttribute::NonExistent
            )
        })
    }
}

/// A LIST name attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// `\Noselect`
    NoSelect,
    /// `\NonExistent`
    NonExistent,
    /// `\HasChildren`
    HasChildren,
    /// `\HasNoChildren`
    HasNoChildren,
    /// `\Archive`
    Archive,
    /// `\Drafts`
    Drafts,
    /// `\Junk`
    Junk,
    /// `\Sent`
    Sent,
    /// `\Trash`
    Trash,
    /// Anything else, as sent.
    Unknown(String),
}

impl MailboxAttribute {
    /// Case-insensitive; the leading backslash is required.
    #[must_use]
    pub fn parse(atom: &str) -> Self {
        let Some(name) = atom.strip_prefix('\\') else {
            return Self::Unknown(atom.to_string());
        };
        match name.to_ascii_lowercase().as_str() {
            "noselect" => Self::NoSelect,
            "nonexistent" => Self::NonExistent,
            "haschildren" => Self::HasChildren,
            "hasnochildren" => Self::HasNoChildren,
            "archive" => Self::Archive,
            "drafts" => Self::Drafts,
            "junk" => Self::Junk,
            "sent" => Self::Sent,
            "trash" => Self::Trash,
            _ => Self::Unknown(atom.to_string()),
        }
    }
}
