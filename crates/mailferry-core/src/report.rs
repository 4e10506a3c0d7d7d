//! Structured results of transfer, backup and restore runs.

use serde::Serialize;
use tracing::{error, info};

use crate::error::Result;

/// Per-pair counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    /// Messages appended to the destination.
    pub transferred: u64,
    /// Messages skipped because the destination already had them.
    pub duplicates: u64,
    /// Bytes appended.
    pub bytes: u64,
    /// Source UIDs excluded by the UID prefilter.
    pub prefiltered: u64,
}

impl TransferRecord {
    /// Adds another record's counters to this one.
    pub const fn absorb(&mut self, other: &Self) {
        self.transferred += other.transferred;
        self.duplicates += other.duplicates;
        self.bytes += other.bytes;
        self.prefiltered += other.prefiltered;
    }
}

/// Outcome of one source/destination mailbox pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairReport {
    /// Source mailbox (or archive mailbox for restores).
    pub source: String,
    /// Destination mailbox.
    pub destination: String,
    /// Counters for this pair.
    pub record: TransferRecord,
}

/// A pair that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairFailure {
    /// Source mailbox.
    pub source: String,
    /// Destination mailbox.
    pub destination: String,
    /// Rendered error.
    pub error: String,
    /// True if the failure stopped the run.
    pub fatal: bool,
}

/// Non-fatal conditions worth reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The duplicate check failed, so the message was appended anyway.
    DuplicateCheckDegraded {
        /// Destination mailbox.
        mailbox: String,
        /// Message-ID that could not be checked.
        message_id: String,
    },
    /// UIDVALIDITY changed across a reconnect.
    UidValidityChanged {
        /// Mailbox that was reselected.
        mailbox: String,
    },
    /// A UID from enumeration returned no data when fetched.
    MessageVanished {
        /// Source mailbox.
        mailbox: String,
        /// The missing UID.
        uid: u32,
    },
    /// An archive mailbox had no entry in the restore mapping.
    UnmappedMailbox {
        /// Archive mailbox name.
        mailbox: String,
    },
    /// Attachments of a message could not be extracted; the message itself
    /// was still archived.
    AttachmentsSkipped {
        /// Source mailbox.
        mailbox: String,
        /// Message UID.
        uid: u32,
        /// Why extraction failed.
        reason: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateCheckDegraded {
                mailbox,
                message_id,
            } => write!(
                f,
                "{mailbox}: duplicate check failed for {message_id}, appended anyway"
            ),
            Self::UidValidityChanged { mailbox } => {
                write!(f, "{mailbox}: UIDVALIDITY changed after reconnect")
            }
            Self::MessageVanished { mailbox, uid } => {
                write!(f, "{mailbox}: UID {uid} vanished before it was fetched")
            }
            Self::UnmappedMailbox { mailbox } => {
                write!(f, "{mailbox}: not in mailbox mapping, skipped")
            }
            Self::AttachmentsSkipped {
                mailbox,
                uid,
                reason,
            } => write!(f, "{mailbox}: attachments of UID {uid} skipped: {reason}"),
        }
    }
}

/// Result of a transfer or restore run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Pairs in processing order, including partially processed ones.
    pub pairs: Vec<PairReport>,
    /// Pairs that failed.
    pub errors: Vec<PairFailure>,
    /// Warnings collected during the run.
    pub warnings: Vec<Warning>,
}

impl RunReport {
    /// Sums the counters of every pair.
    #[must_use]
    pub fn totals(&self) -> TransferRecord {
        let mut total = TransferRecord::default();
        for pair in &self.pairs {
            total.absorb(&pair.record);
        }
        total
    }

    /// Returns true if a fatal error stopped the run early.
    #[must_use]
    pub fn aborted(&self) -> bool {
        self.errors.iter().any(|e| e.fatal)
    }

    /// Returns true if every pair completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records a finished pair, partial counters included.
    ///
    /// Returns false if `result` is a fatal error and the run must stop.
    pub fn finish_pair(
        &mut self,
        source: &str,
        destination: &str,
        record: TransferRecord,
        result: Result<()>,
    ) -> bool {
        info!(
            source,
            destination,
            transferred = record.transferred,
            duplicates = record.duplicates,
            bytes = record.bytes,
            "mailbox pair finished"
        );
        self.pairs.push(PairReport {
            source: source.to_string(),
            destination: destination.to_string(),
            record,
        });

        let Err(e) = result else {
            return true;
        };
        let fatal = e.is_fatal();
        error!(source, destination, error = %e, fatal, "mailbox pair failed");
        self.errors.push(PairFailure {
            source: source.to_string(),
            destination: destination.to_string(),
            error: e.to_string(),
            fatal,
        });
        !fatal
    }
}

/// Per-mailbox backup counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxBackup {
    /// Mailbox name.
    pub name: String,
    /// Messages archived.
    pub messages: u64,
    /// Attachment entries written.
    pub attachments: u64,
}

/// A mailbox that could not be backed up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxFailure {
    /// Mailbox name.
    pub mailbox: String,
    /// Rendered error.
    pub error: String,
}

/// Result of a backup run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    /// Mailboxes archived.
    pub mailboxes: Vec<MailboxBackup>,
    /// Total entry bytes before encryption.
    pub bytes: u64,
    /// Mailboxes that failed.
    pub errors: Vec<MailboxFailure>,
    /// Warnings collected during the run.
    pub warnings: Vec<Warning>,
}

impl BackupReport {
    /// Total messages archived.
    #[must_use]
    pub fn messages(&self) -> u64 {
        self.mailboxes.iter().map(|m| m.messages).sum()
    }

    /// Total attachments archived.
    #[must_use]
    pub fn attachments(&self) -> u64 {
        self.mailboxes.iter().map(|m| m.attachments).sum()
    }
}
