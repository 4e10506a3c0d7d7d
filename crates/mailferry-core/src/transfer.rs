//! Mailbox-to-mailbox transfer.
//!
//! The engine processes one mailbox pair at a time and one message at a
//! time, in source UID order. Duplicates are detected by `Message-ID`, so a
//! transfer can simply be run again after an interruption.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::config::TransferConfig;
use crate::deliver::deliver;
use crate::error::{Error, Result};
use crate::identity::DedupIndex;
use crate::matcher::{MailboxPair, match_mailboxes};
use crate::report::{RunReport, TransferRecord, Warning};
use crate::session::{RetryPolicy, Session};
use crate::store::Connector;

/// Which mailbox pairs to transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairSelection {
    /// Match source mailboxes to destination mailboxes by name and role.
    AutoMatch,
    /// Transfer exactly these pairs.
    Explicit(Vec<MailboxPair>),
}

impl PairSelection {
    /// Selects exactly `pairs`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty list.
    pub fn explicit(pairs: Vec<MailboxPair>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(Error::InvalidInput("no mailbox pairs selected".into()));
        }
        Ok(Self::Explicit(pairs))
    }
}

/// Run context holding both sessions and the report being built.
#[derive(Debug)]
pub struct TransferEngine<S: Connector, D: Connector> {
    source: Session<S>,
    dest: Session<D>,
    config: TransferConfig,
    report: RunReport,
    processed: u64,
}

impl<S: Connector, D: Connector> TransferEngine<S, D> {
    /// Creates an engine over two connected sessions.
    #[must_use]
    pub fn new(source: Session<S>, dest: Session<D>, config: TransferConfig) -> Self {
        Self {
            source,
            dest,
            config,
            report: RunReport::default(),
            processed: 0,
        }
    }

    /// Returns the source session.
    pub const fn source(&mut self) -> &mut Session<S> {
        &mut self.source
    }

    /// Returns the destination session.
    pub const fn dest(&mut self) -> &mut Session<D> {
        &mut self.dest
    }

    /// Turns a selection into concrete pairs.
    ///
    /// # Errors
    ///
    /// Returns the error of listing either side's mailboxes.
    pub async fn resolve_pairs(&mut self, selection: PairSelection) -> Result<Vec<MailboxPair>> {
        match selection {
            PairSelection::Explicit(pairs) => Ok(pairs),
            PairSelection::AutoMatch => {
                let sources = self.source.list_mailboxes().await?;
                let destinations = self.dest.list_mailboxes().await?;
                let pairs = match_mailboxes(&sources, &destinations);
                info!(
                    sources = sources.len(),
                    destinations = destinations.len(),
                    matched = pairs.len(),
                    "matched mailboxes"
                );
                Ok(pairs)
            }
        }
    }

    /// Transfers every pair and returns the report.
    ///
    /// A failing pair is recorded and the run moves on, unless the failure
    /// is fatal, in which case the remaining pairs are skipped. Completed
    /// pairs are never rolled back.
    pub async fn run(mut self, pairs: &[MailboxPair]) -> RunReport {
        for pair in pairs {
            let mut record = TransferRecord::default();
            let result = self.transfer_pair(pair, &mut record).await;
            self.collect_session_warnings();

            if !self
                .report
                .finish_pair(&pair.source, &pair.destination, record, result)
            {
                break;
            }
        }

        self.source.logout().await;
        self.dest.logout().await;
        self.report
    }

    async fn transfer_pair(&mut self, pair: &MailboxPair, record: &mut TransferRecord) -> Result<()> {
        info!(source = %pair.source, destination = %pair.destination, "transferring mailbox");

        self.source.select(&pair.source).await?;
        self.dest.select(&pair.destination).await?;

        let mut uids = self.source.search_all().await?;
        if self.config.uid_prefilter {
            let existing: HashSet<_> = self.dest.search_all().await?.into_iter().collect();
            let before = uids.len();
            uids.retain(|uid| !existing.contains(uid));
            record.prefiltered = (before - uids.len()) as u64;
        }

        let mut index =
            DedupIndex::prepare(&mut self.dest, &pair.destination, self.config.dedup).await?;

        for uid in uids {
            match self.source.fetch(uid).await? {
                Some(message) => {
                    let outcome = deliver(
                        &mut self.dest,
                        &mut index,
                        &pair.destination,
                        &message.body,
                        &message.flags,
                        &mut self.report.warnings,
                    )
                    .await?;
                    outcome.count(record);
                }
                None => {
                    warn!(mailbox = %pair.source, uid = uid.get(), "message vanished");
                    self.report.warnings.push(Warning::MessageVanished {
                        mailbox: pair.source.clone(),
                        uid: uid.get(),
                    });
                }
            }

            self.processed += 1;
            if self
                .processed
                .is_multiple_of(u64::from(self.config.keepalive_interval))
            {
                self.source.probe().await;
                self.dest.probe().await;
            }
        }

        Ok(())
    }

    fn collect_session_warnings(&mut self) {
        self.report.warnings.extend(self.source.take_warnings());
        self.report.warnings.extend(self.dest.take_warnings());
    }
}

/// Connects both endpoints and transfers the selected mailbox pairs.
///
/// With [`PairSelection::AutoMatch`] and nothing matched, an empty report is
/// returned.
///
/// # Errors
///
/// Returns [`Error::Config`] for an invalid configuration,
/// [`Error::Connection`] if either endpoint cannot be reached, or the
/// listing error when auto-matching. Per-pair failures are reported in the
/// [`RunReport`] instead.
pub async fn run_transfer<S: Connector, D: Connector>(
    source: S,
    dest: D,
    selection: PairSelection,
    config: &TransferConfig,
) -> Result<RunReport> {
    config.validate()?;
    let policy = RetryPolicy::from_config(config);

    let source = Session::connect(source, policy).await?;
    let dest = Session::connect(dest, policy).await?;
    let mut engine = TransferEngine::new(source, dest, config.clone());

    let pairs = match engine.resolve_pairs(selection).await {
        Ok(pairs) => pairs,
        Err(e) => {
            engine.source().logout().await;
            engine.dest().logout().await;
            return Err(e);
        }
    };
    if pairs.is_empty() {
        warn!("no mailbox pairs to transfer");
    }

    Ok(engine.run(&pairs).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_explicit_selection_is_rejected() {
        assert!(matches!(
            PairSelection::explicit(Vec::new()),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            PairSelection::explicit(vec![MailboxPair::new("INBOX", "INBOX")]),
            Ok(PairSelection::Explicit(p)) if p.len() == 1
        ));
    }
}
