//! Restoring an archive into a mail store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use mailferry_imap::Flags;
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::deliver::deliver;
use crate::error::{ArchiveError, Result};
use crate::identity::DedupIndex;
use crate::matcher::MailboxPair;
use crate::report::{RunReport, TransferRecord, Warning};
use crate::session::{RetryPolicy, Session};
use crate::store::Connector;

use super::format::{ArchiveReader, Entry};
use super::layout::{MANIFEST_PATH, MESSAGE_EXTENSION, unescape_mailbox};
use super::manifest::Manifest;

/// Maps archive mailbox names to destination mailbox names.
///
/// An empty mapping restores every mailbox under its own name. Otherwise
/// only the mapped mailboxes are restored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxMapping {
    entries: Vec<(String, String)>,
}

impl MailboxMapping {
    /// The identity mapping.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Adds a mapping.
    pub fn insert(&mut self, source: impl Into<String>, destination: impl Into<String>) {
        let source = source.into();
        self.entries.retain(|(s, _)| *s != source);
        self.entries.push((source, destination.into()));
    }

    /// Parses `SOURCE=DEST` items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`](crate::Error::InvalidInput) for an
    /// item without `=` or with an empty side.
    pub fn parse<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        let mut mapping = Self::default();
        for item in items {
            let pair: MailboxPair = item.as_ref().parse()?;
            mapping.insert(pair.source, pair.destination);
        }
        Ok(mapping)
    }

    /// Returns true if no mapping was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destination for an archive mailbox; `None` if it is not restored.
    #[must_use]
    pub fn resolve<'a>(&'a self, source: &'a str) -> Option<&'a str> {
        if self.is_empty() {
            return Some(source);
        }
        self.entries
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, d)| d.as_str())
    }
}

/// A message file found in the work directory.
#[derive(Debug)]
struct MessageFile {
    uid: Option<u32>,
    path: PathBuf,
}

/// Restores an archive into `dest`.
///
/// The container is streamed into a fresh work directory, one entry at a
/// time, before the destination is contacted; any integrity failure removes
/// that directory and ends the restore with nothing appended. The work
/// directory's first-level directories are the archived mailboxes; every
/// `*.eml` file directly inside one that the manifest lists is appended with
/// the same duplicate check a transfer uses. The work directory is removed
/// after a fully successful restore and kept otherwise.
///
/// # Errors
///
/// Returns an [`ArchiveError`] for an unreadable container or wrong
/// passphrase, [`Error::Connection`](crate::Error::Connection) if `dest`
/// cannot be reached, or an I/O error while extracting. Per-mailbox
/// failures are reported in the [`RunReport`].
pub async fn run_restore<C: Connector>(
    dest: C,
    archive: &Path,
    passphrase: Option<&str>,
    mapping: &MailboxMapping,
    config: &TransferConfig,
) -> Result<RunReport> {
    config.validate()?;

    let work_dir = work_dir(config);
    let passphrase = passphrase.filter(|p| !p.is_empty());
    let manifest = match unpack(archive, passphrase, &work_dir).await {
        Ok(manifest) => manifest,
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&work_dir).await {
                debug!(path = %work_dir.display(), error = %cleanup, "no work directory to remove");
            }
            return Err(e);
        }
    };
    info!(
        path = %archive.display(),
        created_at = %manifest.created_at,
        mailboxes = manifest.mailboxes.len(),
        "archive verified"
    );

    let report = restore_from(dest, &work_dir, &manifest, mapping, config).await;
    match &report {
        Ok(report) if report.is_success() => {
            if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
                warn!(path = %work_dir.display(), error = %e, "could not remove work directory");
            }
        }
        _ => warn!(path = %work_dir.display(), "restore incomplete, work directory kept"),
    }
    report
}

fn work_dir(config: &TransferConfig) -> PathBuf {
    let base = config
        .work_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    base.join(format!(
        "mailferry-restore-{}-{}",
        Utc::now().timestamp_millis(),
        std::process::id()
    ))
}

/// Streams every entry of `archive` into `dir` and returns the manifest.
async fn unpack(archive: &Path, passphrase: Option<&str>, dir: &Path) -> Result<Manifest> {
    let file = File::open(archive).await?;
    let mut reader = ArchiveReader::open(BufReader::new(file), passphrase).await?;
    tokio::fs::create_dir_all(dir).await?;

    let mut manifest = None;
    let mut entries = 0u64;
    while let Some(entry) = reader.next_entry().await? {
        if entry.path == MANIFEST_PATH {
            manifest = Some(Manifest::from_json(&entry.data)?);
        }
        extract(&entry, dir).await?;
        entries += 1;
    }
    debug!(path = %dir.display(), entries, "archive extracted");

    manifest.ok_or_else(|| ArchiveError::Manifest("missing manifest.json".into()).into())
}

async fn extract(entry: &Entry, dir: &Path) -> Result<()> {
    // Paths were validated by the reader.
    let path = dir.join(&entry.path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &entry.data).await?;
    Ok(())
}

async fn restore_from<C: Connector>(
    dest: C,
    work_dir: &Path,
    manifest: &Manifest,
    mapping: &MailboxMapping,
    config: &TransferConfig,
) -> Result<RunReport> {
    let mut session = Session::connect(dest, RetryPolicy::from_config(config)).await?;
    let mut report = RunReport::default();
    let mut processed = 0;

    for (mailbox, dir) in mailbox_dirs(work_dir).await? {
        let Some(archived) = manifest.mailbox(&mailbox) else {
            debug!(mailbox = %mailbox, "not in manifest, skipping");
            continue;
        };
        let Some(destination) = mapping.resolve(&mailbox).map(ToString::to_string) else {
            warn!(mailbox = %mailbox, "not in mailbox mapping, skipping");
            report.warnings.push(Warning::UnmappedMailbox { mailbox });
            continue;
        };

        info!(source = %mailbox, destination = %destination, "restoring mailbox");
        let mut record = TransferRecord::default();
        let result = restore_mailbox(
            &mut session,
            &dir,
            &destination,
            &archived.flags_by_uid(),
            config,
            &mut processed,
            &mut record,
            &mut report.warnings,
        )
        .await;
        report.warnings.extend(session.take_warnings());

        if !report.finish_pair(&mailbox, &destination, record, result) {
            break;
        }
    }

    session.logout().await;
    Ok(report)
}

/// First-level directories of the work directory, sorted by mailbox name.
async fn mailbox_dirs(work_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    let mut read = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = read.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let raw = entry.file_name().to_string_lossy().into_owned();
        let mailbox = unescape_mailbox(&raw).unwrap_or(raw);
        dirs.push((mailbox, entry.path()));
    }
    dirs.sort();
    Ok(dirs)
}

/// `*.eml` files directly inside `dir`, in UID order.
async fn message_files(dir: &Path) -> Result<Vec<MessageFile>> {
    let mut files = Vec::new();
    let mut read = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(MESSAGE_EXTENSION)
        {
            continue;
        }
        let uid = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok());
        files.push(MessageFile { uid, path });
    }
    // Numeric stems first in UID order, anything else after by name.
    files.sort_by(|a, b| {
        (a.uid.is_none(), a.uid, &a.path).cmp(&(b.uid.is_none(), b.uid, &b.path))
    });
    Ok(files)
}

#[allow(clippy::too_many_arguments)]
async fn restore_mailbox<C: Connector>(
    session: &mut Session<C>,
    dir: &Path,
    destination: &str,
    recorded: &HashMap<u32, Flags>,
    config: &TransferConfig,
    processed: &mut u64,
    record: &mut TransferRecord,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    session.select(destination).await?;
    let mut index = DedupIndex::prepare(session, destination, config.dedup).await?;

    for file in message_files(dir).await? {
        let message = tokio::fs::read(&file.path).await?;
        let flags = file
            .uid
            .and_then(|uid| recorded.get(&uid))
            .cloned()
            .unwrap_or_default();

        let outcome = deliver(session, &mut index, destination, &message, &flags, warnings).await?;
        outcome.count(record);

        *processed += 1;
        if processed.is_multiple_of(u64::from(config.keepalive_interval)) {
            session.probe().await;
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_mapping_is_identity() {
        let mapping = MailboxMapping::identity();
        assert_eq!(mapping.resolve("INBOX"), Some("INBOX"));
    }

    #[test]
    fn explicit_mapping_restricts() {
        let mapping = MailboxMapping::parse(&["INBOX=Restored", " Sent = Sent Items "]).unwrap();
        assert_eq!(mapping.resolve("INBOX"), Some("Restored"));
        assert_eq!(mapping.resolve("Sent"), Some("Sent Items"));
        assert_eq!(mapping.resolve("Trash"), None);
    }

    #[test]
    fn later_mapping_wins() {
        let mapping = MailboxMapping::parse(&["INBOX=A", "INBOX=B"]).unwrap();
        assert_eq!(mapping.resolve("INBOX"), Some("B"));
    }

    #[test]
    fn malformed_mapping() {
        for bad in ["INBOX", "=x", "x=", " = "] {
            assert!(
                matches!(MailboxMapping::parse(&[bad]), Err(Error::InvalidInput(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[tokio::test]
    async fn message_files_sort_by_uid() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["10.eml", "9.eml", "notes.txt", "x.eml"] {
            tokio::fs::write(dir.path().join(name), b"m").await.unwrap();
        }
        tokio::fs::create_dir(dir.path().join("9")).await.unwrap();

        let files = message_files(dir.path()).await.unwrap();
        let uids: Vec<_> = files.iter().map(|f| f.uid).collect();
        assert_eq!(uids, [Some(9), Some(10), None]);
    }

    #[tokio::test]
    async fn extraction_creates_mailbox_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for (path, data) in [
            ("manifest.json", b"{}".as_slice()),
            ("Work%2F2024/3.eml", b"m"),
            ("Work%2F2024/3/a.txt", b"a"),
        ] {
            let entry = Entry {
                path: path.into(),
                data: data.to_vec(),
            };
            extract(&entry, dir.path()).await.unwrap();
        }

        let dirs = mailbox_dirs(dir.path()).await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].0, "Work/2024");
        let files = message_files(&dirs[0].1).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].uid, Some(3));
    }
}
