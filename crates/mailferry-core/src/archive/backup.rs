//! Mailbox backup into an archive container.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use mailferry_mime::Message;
use tokio::fs::File;
use tokio::io::BufWriter;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::identity::MessageIdentity;
use crate::report::{BackupReport, MailboxBackup, MailboxFailure, Warning};
use crate::session::{RetryPolicy, Session};
use crate::store::Connector;

use super::format::ArchiveWriter;
use super::layout::{MANIFEST_PATH, attachment_path, message_path};
use super::manifest::{Manifest, ManifestMailbox, ManifestMessage, flag_tokens};

type Writer = ArchiveWriter<BufWriter<File>>;

/// What one mailbox contributed, recorded only once it completes.
struct MailboxArchive {
    manifest: ManifestMailbox,
    summary: MailboxBackup,
    bytes: u64,
}

/// Errors from the archive file itself end the backup; the rest stay with
/// their mailbox.
enum MailboxError {
    Source(Error),
    Archive(Error),
}

impl From<Error> for MailboxError {
    fn from(e: Error) -> Self {
        Self::Source(e)
    }
}

/// Backs up `mailboxes` from `source` into a container at `output`.
///
/// Each message is stored raw under `<mailbox>/<uid>.eml`; attachments
/// found in its MIME tree are stored decoded under `<mailbox>/<uid>/`.
/// Entries are written as they are fetched, and the manifest closes the
/// container. A mailbox that fails is left out of the manifest, which makes
/// restore ignore whatever of it was already written, and is reported; the
/// others are still archived. The container is written to a `.partial`
/// sibling and renamed into place once complete. It is encrypted when a
/// non-empty `passphrase` is given.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an empty mailbox list,
/// [`Error::Connection`] if the source cannot be reached, or an I/O or
/// archive error while writing `output`.
pub async fn run_backup<C: Connector>(
    source: C,
    mailboxes: &[String],
    output: &Path,
    passphrase: Option<&str>,
    config: &TransferConfig,
) -> Result<BackupReport> {
    config.validate()?;
    if mailboxes.is_empty() {
        return Err(Error::InvalidInput("no mailboxes selected for backup".into()));
    }
    let passphrase = passphrase.filter(|p| !p.is_empty());

    let mut session = Session::connect(source, RetryPolicy::from_config(config)).await?;
    let partial = partial_path(output);
    let result = write_archive(&mut session, mailboxes, &partial, passphrase, config).await;
    session.logout().await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                debug!(path = %partial.display(), error = %cleanup, "no partial archive to remove");
            }
            return Err(e);
        }
    };
    if let Err(e) = tokio::fs::rename(&partial, output).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }
    info!(
        path = %output.display(),
        bytes = report.bytes,
        encrypted = passphrase.is_some(),
        "archive written"
    );
    Ok(report)
}

/// `<output>.partial`, the file a backup is written to before the rename.
fn partial_path(output: &Path) -> PathBuf {
    let mut partial: OsString = output.as_os_str().to_owned();
    partial.push(".partial");
    PathBuf::from(partial)
}

async fn write_archive<C: Connector>(
    session: &mut Session<C>,
    mailboxes: &[String],
    path: &Path,
    passphrase: Option<&str>,
    config: &TransferConfig,
) -> Result<BackupReport> {
    let file = File::create(path).await?;
    let mut writer = ArchiveWriter::create(BufWriter::new(file), passphrase).await?;
    let mut report = BackupReport::default();
    let mut manifest = Manifest::new();
    let mut processed = 0;
    let mut seen = HashSet::new();

    for name in mailboxes {
        if !seen.insert(name.as_str()) {
            debug!(mailbox = %name, "mailbox listed twice, archived once");
            continue;
        }
        info!(mailbox = %name, "backing up mailbox");
        let result = backup_mailbox(
            session,
            &mut writer,
            name,
            config,
            &mut processed,
            &mut report.warnings,
        )
        .await;
        report.warnings.extend(session.take_warnings());

        match result {
            Ok(archived) => {
                info!(
                    mailbox = %name,
                    messages = archived.summary.messages,
                    attachments = archived.summary.attachments,
                    "mailbox archived"
                );
                manifest.mailboxes.push(archived.manifest);
                report.mailboxes.push(archived.summary);
                report.bytes += archived.bytes;
            }
            Err(MailboxError::Source(e)) if !e.is_fatal() => {
                warn!(mailbox = %name, error = %e, "mailbox backup failed");
                report.errors.push(MailboxFailure {
                    mailbox: name.clone(),
                    error: e.to_string(),
                });
            }
            Err(MailboxError::Source(e) | MailboxError::Archive(e)) => return Err(e),
        }
    }

    writer.add(MANIFEST_PATH, &manifest.to_json()?).await?;
    let entries = writer.entries();
    let out = writer.finish().await?;
    out.into_inner().sync_all().await?;
    debug!(entries, "archive closed");
    Ok(report)
}

async fn backup_mailbox<C: Connector>(
    session: &mut Session<C>,
    writer: &mut Writer,
    name: &str,
    config: &TransferConfig,
    processed: &mut u64,
    warnings: &mut Vec<Warning>,
) -> std::result::Result<MailboxArchive, MailboxError> {
    if name.is_empty() {
        return Err(Error::InvalidInput("empty mailbox name".into()).into());
    }

    let info = session.select(name).await?;
    let uids = session.search_all().await?;

    let mut archive = MailboxArchive {
        manifest: ManifestMailbox {
            name: name.to_string(),
            uid_validity: info.uid_validity,
            messages: Vec::with_capacity(uids.len()),
        },
        summary: MailboxBackup {
            name: name.to_string(),
            messages: 0,
            attachments: 0,
        },
        bytes: 0,
    };

    for uid in uids {
        let uid_number = uid.get();
        let Some(message) = session.fetch(uid).await? else {
            warn!(mailbox = name, uid = uid_number, "message vanished");
            warnings.push(Warning::MessageVanished {
                mailbox: name.to_string(),
                uid: uid_number,
            });
            continue;
        };

        let mut record = ManifestMessage {
            uid: uid_number,
            flags: flag_tokens(&message.flags),
            message_id: MessageIdentity::from_message(&message.body)
                .message_id()
                .map(ToString::to_string),
            size: message.body.len() as u64,
            attachments: Vec::new(),
        };

        match Message::parse(&message.body).and_then(|m| m.attachments()) {
            Ok(attachments) => {
                for attachment in attachments {
                    let path = attachment_path(name, uid_number, &attachment.filename);
                    writer
                        .add(&path, &attachment.data)
                        .await
                        .map_err(|e| MailboxError::Archive(e.into()))?;
                    archive.bytes += attachment.data.len() as u64;
                    record.attachments.push(attachment.filename);
                    archive.summary.attachments += 1;
                }
            }
            Err(e) => {
                warn!(mailbox = name, uid = uid_number, error = %e, "attachments not extracted");
                warnings.push(Warning::AttachmentsSkipped {
                    mailbox: name.to_string(),
                    uid: uid_number,
                    reason: e.to_string(),
                });
            }
        }

        writer
            .add(&message_path(name, uid_number), &message.body)
            .await
            .map_err(|e| MailboxError::Archive(e.into()))?;
        archive.bytes += message.body.len() as u64;
        archive.manifest.messages.push(record);
        archive.summary.messages += 1;

        *processed += 1;
        if processed.is_multiple_of(u64::from(config.keepalive_interval)) {
            session.probe().await;
        }
    }

    Ok(archive)
}
