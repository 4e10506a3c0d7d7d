//! Duplicate-aware append, shared by transfer and restore.

use mailferry_imap::{Flag, Flags};
use tracing::{debug, warn};

use crate::error::Result;
use crate::identity::{DedupIndex, MessageIdentity};
use crate::report::{TransferRecord, Warning};
use crate::session::Session;
use crate::store::Connector;

/// What happened to one delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The message was appended.
    Appended {
        /// Size of the appended payload.
        bytes: u64,
    },
    /// The destination already had it.
    Duplicate,
}

impl Outcome {
    /// Adds this outcome to `record`.
    pub const fn count(self, record: &mut TransferRecord) {
        match self {
            Self::Appended { bytes } => {
                record.transferred += 1;
                record.bytes += bytes;
            }
            Self::Duplicate => record.duplicates += 1,
        }
    }
}

/// Appends `message` to `mailbox` unless its identity is already there.
///
/// A failed duplicate check is not an error: the message is appended and a
/// [`Warning::DuplicateCheckDegraded`] is pushed. Server-managed flags such
/// as `\Recent` are dropped before the append.
///
/// # Errors
///
/// Returns the append error, or a fatal connection error from the check.
pub async fn deliver<C: Connector>(
    session: &mut Session<C>,
    index: &mut DedupIndex,
    mailbox: &str,
    message: &[u8],
    flags: &Flags,
    warnings: &mut Vec<Warning>,
) -> Result<Outcome> {
    let identity = MessageIdentity::from_message(message);

    match index.exists_in_target(session, mailbox, &identity).await {
        Ok(true) => {
            debug!(mailbox, %identity, "duplicate, skipping");
            return Ok(Outcome::Duplicate);
        }
        Ok(false) => {}
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(mailbox, %identity, error = %e, "duplicate check failed, appending anyway");
            warnings.push(Warning::DuplicateCheckDegraded {
                mailbox: mailbox.to_string(),
                message_id: identity.to_string(),
            });
        }
    }

    let flags = writable_flags(flags);
    session.append(mailbox, message, &flags).await?;
    index.record(&identity);

    Ok(Outcome::Appended {
        bytes: message.len() as u64,
    })
}

/// Flags that may be set by APPEND.
#[must_use]
pub fn writable_flags(flags: &Flags) -> Vec<Flag> {
    flags.settable().iter().cloned().collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn recent_is_never_written() {
        let flags = Flags::from_vec(vec![Flag::Seen, Flag::Recent, Flag::Flagged]);
        let writable = writable_flags(&flags);
        assert!(!writable.contains(&Flag::Recent));
        assert_eq!(writable, vec![Flag::Seen, Flag::Flagged]);
    }

    #[test]
    fn outcomes_accumulate() {
        let mut record = TransferRecord::default();
        Outcome::Appended { bytes: 10 }.count(&mut record);
        Outcome::Appended { bytes: 5 }.count(&mut record);
        Outcome::Duplicate.count(&mut record);
        assert_eq!(record.transferred, 2);
        assert_eq!(record.duplicates, 1);
        assert_eq!(record.bytes, 15);
    }
}
