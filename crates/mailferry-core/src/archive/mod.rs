//! Backup and restore through a versioned archive container.
//!
//! A backup is a stream of entries (raw messages, decoded attachments and
//! finally the manifest) written to one file and optionally sealed with a
//! passphrase. See [`format`] for the byte layout and [`layout`] for entry
//! paths.

mod backup;
mod crypto;
pub mod format;
pub mod layout;
pub mod manifest;
mod restore;

pub use backup::run_backup;
pub use format::{ArchiveReader, ArchiveWriter, Entry, PREAMBLE_LEN, is_encrypted};
pub use manifest::Manifest;
pub use restore::{MailboxMapping, run_restore};
