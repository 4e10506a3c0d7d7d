//! Report rendering.

use std::io::Write;

use anyhow::Result;
use mailferry_core::{BackupReport, RunReport, Warning};
use serde::Serialize;

/// Writes `value` as pretty JSON.
pub fn json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Writes a transfer or restore report.
pub fn run_report<W: Write>(out: &mut W, report: &RunReport) -> Result<()> {
    if report.pairs.is_empty() && report.errors.is_empty() {
        writeln!(out, "No mailbox pairs were processed.")?;
    }
    for pair in &report.pairs {
        let record = &pair.record;
        write!(
            out,
            "{} -> {}: {} copied, {} duplicates, {} bytes",
            pair.source, pair.destination, record.transferred, record.duplicates, record.bytes
        )?;
        if record.prefiltered > 0 {
            write!(out, ", {} skipped by UID", record.prefiltered)?;
        }
        writeln!(out)?;
    }

    let totals = report.totals();
    writeln!(
        out,
        "\nTotal: {} copied, {} duplicates, {} bytes",
        totals.transferred, totals.duplicates, totals.bytes
    )?;

    warnings(out, &report.warnings)?;
    if !report.errors.is_empty() {
        writeln!(out, "\nFailed:")?;
        for failure in &report.errors {
            writeln!(
                out,
                "  {} -> {}: {}",
                failure.source, failure.destination, failure.error
            )?;
        }
        if report.aborted() {
            writeln!(out, "The run stopped early; remaining mailboxes were skipped.")?;
        }
    }
    Ok(())
}

/// Writes a backup report.
pub fn backup_report<W: Write>(out: &mut W, report: &BackupReport) -> Result<()> {
    for mailbox in &report.mailboxes {
        writeln!(
            out,
            "{}: {} messages, {} attachments",
            mailbox.name, mailbox.messages, mailbox.attachments
        )?;
    }
    writeln!(
        out,
        "\nTotal: {} messages, {} attachments, {} bytes",
        report.messages(),
        report.attachments(),
        report.bytes
    )?;

    warnings(out, &report.warnings)?;
    if !report.errors.is_empty() {
        writeln!(out, "\nFailed:")?;
        for failure in &report.errors {
            writeln!(out, "  {}: {}", failure.mailbox, failure.error)?;
        }
    }
    Ok(())
}

fn warnings<W: Write>(out: &mut W, warnings: &[Warning]) -> Result<()> {
    if warnings.is_empty() {
        return Ok(());
    }
    writeln!(out, "\nWarnings:")?;
    for warning in warnings {
        writeln!(out, "  {warning}")?;
    }
    Ok(())
}
