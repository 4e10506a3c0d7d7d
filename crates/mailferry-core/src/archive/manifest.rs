//! The `manifest.json` entry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mailferry_imap::{Flag, Flags};
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

use super::format::VERSION;

/// Archive-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Container format version the archive was written with.
    pub version: u8,
    /// When the backup was taken.
    pub created_at: DateTime<Utc>,
    /// Archived mailboxes, in backup order.
    pub mailboxes: Vec<ManifestMailbox>,
}

/// One archived mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMailbox {
    /// Original mailbox name.
    pub name: String,
    /// UIDVALIDITY at backup time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid_validity: Option<u32>,
    /// Archived messages.
    pub messages: Vec<ManifestMessage>,
}

/// One archived message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMessage {
    /// Source UID, also the entry's file stem.
    pub uid: u32,
    /// Flags as IMAP tokens, server-managed ones excluded.
    #[serde(default)]
    pub flags: Vec<String>,
    /// Message-ID, if the message had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Payload size in bytes.
    pub size: u64,
    /// Attachment filenames under `<mailbox>/<uid>/`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl Manifest {
    /// Creates an empty manifest stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: VERSION,
            created_at: Utc::now(),
            mailboxes: Vec::new(),
        }
    }

    /// Serializes to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Manifest`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, ArchiveError> {
        serde_json::to_vec_pretty(self).map_err(|e| ArchiveError::Manifest(e.to_string()))
    }

    /// Parses the manifest entry.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Manifest`] for invalid JSON or a version
    /// newer than this build understands.
    pub fn from_json(data: &[u8]) -> Result<Self, ArchiveError> {
        let manifest: Self =
            serde_json::from_slice(data).map_err(|e| ArchiveError::Manifest(e.to_string()))?;
        if manifest.version > VERSION {
            return Err(ArchiveError::Manifest(format!(
                "written by format version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    /// Looks up an archived mailbox by its original name.
    #[must_use]
    pub fn mailbox(&self, name: &str) -> Option<&ManifestMailbox> {
        self.mailboxes.iter().find(|m| m.name == name)
    }
}

impl ManifestMailbox {
    /// Recorded flags keyed by UID.
    #[must_use]
    pub fn flags_by_uid(&self) -> HashMap<u32, Flags> {
        self.messages
            .iter()
            .map(|msg| {
                let flags = Flags::from_vec(msg.flags.iter().map(|f| Flag::parse(f)).collect());
                (msg.uid, flags)
            })
            .collect()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders flags as the tokens stored in the manifest.
#[must_use]
pub fn flag_tokens(flags: &Flags) -> Vec<String> {
    flags.settable().iter().map(|f| f.as_str().to_string()).collect()
}
