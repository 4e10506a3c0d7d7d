//! # mailferry-core
//!
//! The mail transfer engine behind `mailferry`.
//!
//! This crate provides:
//! - Self-healing store sessions with bounded retry ([`Session`])
//! - Mailbox matching by name and folder role ([`match_mailboxes`])
//! - `Message-ID` based duplicate detection ([`MessageIdentity`], [`DedupIndex`])
//! - Sequential mailbox transfer ([`run_transfer`])
//! - Encrypted backup archives ([`run_backup`], [`run_restore`])
//!
//! Stores are reached through the [`Connector`] and [`MailStore`] traits;
//! [`ImapConnector`] is the IMAP implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod config;
pub mod deliver;
mod error;
pub mod identity;
pub mod matcher;
pub mod report;
pub mod session;
pub mod store;
pub mod transfer;

pub use archive::{MailboxMapping, run_backup, run_restore};
pub use config::{DedupStrategy, TransferConfig};
pub use deliver::{Outcome, deliver};
pub use error::{ArchiveError, ConnectionError, Error, Result};
pub use identity::{DedupIndex, MessageIdentity};
pub use matcher::{MailboxPair, match_mailbox, match_mailboxes};
pub use report::{
    BackupReport, MailboxBackup, MailboxFailure, PairFailure, PairReport, RunReport,
    TransferRecord, Warning,
};
pub use session::{RetryPolicy, Session};
pub use store::{
    Candidate, Connector, Endpoint, FetchedMessage, ImapConnector, ImapStore, MailStore,
    SelectInfo, default_candidates,
};
pub use transfer::{PairSelection, TransferEngine, run_transfer};
