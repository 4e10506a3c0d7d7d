//! Command line definition.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mailferry_core::{DedupStrategy, MailboxPair, TransferConfig};

#[derive(Parser, Debug)]
#[clap(
    name = "mailferry",
    version,
    about = "Copy, back up and restore IMAP mailboxes.",
    long_about = "Copies mail between IMAP accounts without creating duplicates, and backs \
                  mailboxes up into (optionally encrypted) archives that can be restored later."
)]
pub struct Cli {
    /// Config file [default: <config dir>/mailferry/config.toml].
    #[clap(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log debug output.
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Print reports as JSON.
    #[clap(long, global = true)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy mailboxes from one account to another, skipping duplicates.
    Transfer(TransferArgs),

    /// Back up mailboxes into an archive file.
    Backup(BackupArgs),

    /// Restore an archive into an account, skipping duplicates.
    Restore(RestoreArgs),

    /// List the mailboxes of an account.
    Mailboxes(MailboxesArgs),
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Source IMAP host.
    #[clap(long)]
    pub source_host: Option<String>,

    /// Source login name.
    #[clap(long)]
    pub source_user: Option<String>,
}

#[derive(Args, Debug)]
pub struct DestArgs {
    /// Destination IMAP host.
    #[clap(long)]
    pub dest_host: Option<String>,

    /// Destination login name.
    #[clap(long)]
    pub dest_user: Option<String>,
}

#[derive(Args, Debug)]
pub struct TransferArgs {
    #[clap(flatten)]
    pub source: SourceArgs,

    #[clap(flatten)]
    pub dest: DestArgs,

    /// Pair mailboxes by name and folder role instead of asking.
    #[clap(long, conflicts_with = "pairs")]
    pub auto_match: bool,

    /// Copy SRC into DEST; may be repeated.
    #[clap(long = "pair", value_name = "SRC=DEST")]
    pub pairs: Vec<MailboxPair>,

    #[clap(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    #[clap(flatten)]
    pub source: SourceArgs,

    /// Mailbox to back up; may be repeated. Asks when omitted.
    #[clap(long = "mailbox", value_name = "NAME")]
    pub mailboxes: Vec<String>,

    /// Archive file to write.
    #[clap(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Encrypt the archive with a passphrase.
    #[clap(long)]
    pub encrypt: bool,

    /// Overwrite an existing archive file.
    #[clap(long)]
    pub force: bool,

    #[clap(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Archive file to restore.
    #[clap(long, value_name = "FILE")]
    pub archive: PathBuf,

    #[clap(flatten)]
    pub dest: DestArgs,

    /// Restore archive mailbox SRC into DEST; may be repeated. Without any,
    /// every mailbox is restored under its own name.
    #[clap(long = "map", value_name = "SRC=DEST")]
    pub map: Vec<String>,

    /// Ask for a passphrase even if the archive header says it is plain.
    #[clap(long)]
    pub encrypted: bool,

    #[clap(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Args, Debug)]
pub struct MailboxesArgs {
    /// IMAP host [default: source host from the config file].
    #[clap(long)]
    pub host: Option<String>,

    /// Login name [default: source user from the config file].
    #[clap(long)]
    pub user: Option<String>,

    #[clap(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DedupArg {
    /// One header search per message.
    Search,
    /// Fetch all destination Message-IDs once per mailbox.
    Materialize,
}

impl From<DedupArg> for DedupStrategy {
    fn from(arg: DedupArg) -> Self {
        match arg {
            DedupArg::Search => Self::Search,
            DedupArg::Materialize => Self::Materialize,
        }
    }
}

/// Overrides for the `[transfer]` table of the config file.
#[derive(Args, Debug, Default)]
pub struct TuningArgs {
    /// Attempts per remote operation.
    #[clap(long, value_name = "N")]
    pub retry_attempts: Option<u32>,

    /// Seconds between attempts.
    #[clap(long, value_name = "SECS")]
    pub retry_delay: Option<f64>,

    /// Messages between keepalive NOOPs.
    #[clap(long, value_name = "N")]
    pub keepalive_interval: Option<u32>,

    /// Duplicate detection strategy.
    #[clap(long, value_enum)]
    pub dedup: Option<DedupArg>,

    /// Also skip source UIDs that exist as destination UIDs.
    #[clap(long)]
    pub uid_prefilter: bool,

    /// Fall back to unencrypted port 143.
    #[clap(long)]
    pub allow_plaintext: bool,

    /// Directory for restore extraction.
    #[clap(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,
}

impl TuningArgs {
    /// Applies the overrides on top of `config`.
    pub fn apply(&self, mut config: TransferConfig) -> Result<TransferConfig> {
        if let Some(attempts) = self.retry_attempts {
            config.retry_attempts = attempts;
        }
        if let Some(secs) = self.retry_delay {
            config.retry_delay =
                Duration::try_from_secs_f64(secs).context("invalid --retry-delay")?;
        }
        if let Some(interval) = self.keepalive_interval {
            config.keepalive_interval = interval;
        }
        if let Some(dedup) = self.dedup {
            config.dedup = dedup.into();
        }
        if self.uid_prefilter {
            config.uid_prefilter = true;
        }
        if self.allow_plaintext {
            config.allow_plaintext = true;
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = Some(dir.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn transfer_with_pairs() {
        let cli = Cli::try_parse_from([
            "mailferry",
            "transfer",
            "--source-host",
            "imap.old.example",
            "--pair",
            "INBOX=INBOX",
            "--pair",
            "Sent=Sent Items",
            "--dedup",
            "materialize",
        ])
        .unwrap();
        let Commands::Transfer(args) = cli.command else {
            panic!("expected transfer");
        };
        assert_eq!(args.pairs[1], MailboxPair::new("Sent", "Sent Items"));
        assert_eq!(args.source.source_host.as_deref(), Some("imap.old.example"));

        let config = args.tuning.apply(TransferConfig::default()).unwrap();
        assert_eq!(config.dedup, DedupStrategy::Materialize);
    }

    #[test]
    fn auto_match_conflicts_with_pairs() {
        assert!(
            Cli::try_parse_from(["mailferry", "transfer", "--auto-match", "--pair", "A=B"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["mailferry", "transfer", "--pair", "nonsense"]).is_err());
    }

    #[test]
    fn overrides_are_validated() {
        let tuning = TuningArgs {
            retry_attempts: Some(0),
            ..TuningArgs::default()
        };
        assert!(tuning.apply(TransferConfig::default()).is_err());

        let tuning = TuningArgs {
            retry_delay: Some(-1.0),
            ..TuningArgs::default()
        };
        assert!(tuning.apply(TransferConfig::default()).is_err());
    }

    #[test]
    fn backup_requires_output() {
        assert!(Cli::try_parse_from(["mailferry", "backup", "--mailbox", "INBOX"]).is_err());
        let cli = Cli::try_parse_from([
            "mailferry", "backup", "--mailbox", "INBOX", "-o", "mail.mfar", "--encrypt", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Backup(ref b) if b.encrypt));
    }
}
