//! Capabilities and status response codes.

use super::{Flag, Uid, UidValidity};

/// A server capability this client acts on; the rest are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1`
    Imap4Rev1,
    /// `IMAP4rev2`
    Imap4Rev2,
    /// `STARTTLS`
    StartTls,
    /// `LOGINDISABLED`
    LoginDisabled,
    /// `UIDPLUS`, APPEND reports the new UID.
    UidPlus,
    /// `AUTH=mechanism`, upper-cased.
    Auth(String),
    /// Anything else, as sent.
    Unknown(String),
}

impl Capability {
    /// Case-insensitive.
    #[must_use]
    pub fn parse(atom: &str) -> Self {
        let upper = atom.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "UIDPLUS" => Self::UidPlus,
            _ => upper.strip_prefix("AUTH=").map_or_else(
                || Self::Unknown(atom.to_string()),
                |mechanism| Self::Auth(mechanism.to_string()),
            ),
        }
    }
}

/// The `[...]` code of a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `ALERT`
    Alert,
    /// `CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `PERMANENTFLAGS (...)`
    PermanentFlags(Vec<Flag>),
    /// `READ-ONLY`
    ReadOnly,
    /// `READ-WRITE`
    ReadWrite,
    /// `TRYCREATE`, the target mailbox is missing.
    TryCreate,
    /// `UIDNEXT n`
    UidNext(Uid),
    /// `UIDVALIDITY n`
    UidValidity(UidValidity),
    /// `APPENDUID validity uid`
    AppendUid {
        /// Of the target mailbox.
        uidvalidity: UidValidity,
        /// Of the appended message.
        uid: Uid,
    },
    /// Any other code name; arguments are dropped.
    Unknown(String),
}
