//! `mailferry` - copy, back up and restore IMAP mailboxes.
//!
//! Transfers skip messages whose `Message-ID` already exists in the
//! destination, so every command can be re-run after an interruption.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod output;
mod prompt;
mod settings;

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mailferry_core::archive::{PREAMBLE_LEN, is_encrypted};
use mailferry_core::{
    Endpoint, ImapConnector, MailboxMapping, MailboxPair, PairSelection, RetryPolicy, RunReport,
    Session, TransferConfig, TransferEngine, run_backup, run_restore, run_transfer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{BackupArgs, Cli, Commands, MailboxesArgs, RestoreArgs, TransferArgs};
use settings::{AccountSettings, Settings};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "mailferry=debug,mailferry_core=debug,mailferry_imap=debug"
    } else {
        "mailferry=info,mailferry_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let settings = Settings::load(cli.config.as_deref())?;

    let success = match cli.command {
        Commands::Transfer(args) => transfer(args, &settings, cli.json).await?,
        Commands::Backup(args) => backup(args, &settings, cli.json).await?,
        Commands::Restore(args) => restore(args, &settings, cli.json).await?,
        Commands::Mailboxes(args) => mailboxes(args, &settings).await?,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Which account an endpoint is for.
#[derive(Clone, Copy)]
enum Side {
    Source,
    Dest,
}

impl Side {
    const fn label(self) -> &'static str {
        match self {
            Self::Source => "Source",
            Self::Dest => "Destination",
        }
    }

    const fn password_env(self) -> &'static str {
        match self {
            Self::Source => prompt::SOURCE_PASSWORD_ENV,
            Self::Dest => prompt::DEST_PASSWORD_ENV,
        }
    }
}

/// Resolves host and user from flags, then the config file, then a prompt,
/// and reads the password.
fn endpoint(
    side: Side,
    host: Option<String>,
    user: Option<String>,
    defaults: &AccountSettings,
) -> Result<Endpoint> {
    let mut input = io::stdin().lock();
    let mut out = io::stderr();
    let label = side.label();

    let host = match host.or_else(|| defaults.host.clone()) {
        Some(host) => host,
        None => prompt::line(&mut input, &mut out, &format!("{label} IMAP host"))?,
    };
    let user = match user.or_else(|| defaults.user.clone()) {
        Some(user) => user,
        None => prompt::line(&mut input, &mut out, &format!("{label} user"))?,
    };
    let password = prompt::secret(
        side.password_env(),
        &format!("{label} password for {user}@{host}: "),
    )?;
    Ok(Endpoint::new(host, user, password))
}

fn print_run_report(report: &RunReport, json: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    if json {
        output::json(&mut out, report)
    } else {
        output::run_report(&mut out, report)
    }
}

async fn transfer(args: TransferArgs, settings: &Settings, json: bool) -> Result<bool> {
    let config = args.tuning.apply(settings.transfer.clone())?;
    let source = ImapConnector::new(
        endpoint(
            Side::Source,
            args.source.source_host,
            args.source.source_user,
            &settings.source,
        )?,
        &config,
    );
    let dest = ImapConnector::new(
        endpoint(
            Side::Dest,
            args.dest.dest_host,
            args.dest.dest_user,
            &settings.dest,
        )?,
        &config,
    );

    let report = if args.auto_match {
        run_transfer(source, dest, PairSelection::AutoMatch, &config).await?
    } else if !args.pairs.is_empty() {
        run_transfer(source, dest, PairSelection::explicit(args.pairs)?, &config).await?
    } else {
        interactive_transfer(source, dest, config).await?
    };

    print_run_report(&report, json)?;
    Ok(report.is_success())
}

/// Connects both accounts and lets the user build the pairs from menus.
async fn interactive_transfer(
    source: ImapConnector,
    dest: ImapConnector,
    config: TransferConfig,
) -> Result<RunReport> {
    config.validate()?;
    let policy = RetryPolicy::from_config(&config);
    let source = Session::connect(source, policy).await?;
    let dest = Session::connect(dest, policy).await?;
    let mut engine = TransferEngine::new(source, dest, config);

    let pairs = match choose_pairs(&mut engine).await {
        Ok(pairs) => pairs,
        Err(e) => {
            engine.source().logout().await;
            engine.dest().logout().await;
            return Err(e);
        }
    };
    Ok(engine.run(&pairs).await)
}

async fn choose_pairs(
    engine: &mut TransferEngine<ImapConnector, ImapConnector>,
) -> Result<Vec<MailboxPair>> {
    let sources = engine.source().list_mailboxes().await?;
    let destinations = engine.dest().list_mailboxes().await?;
    prompt::choose_pairs(
        &mut io::stdin().lock(),
        &mut io::stderr(),
        &sources,
        &destinations,
    )
}

/// Logs in once to list the mailboxes of `connector`.
async fn list_mailboxes(connector: ImapConnector, config: &TransferConfig) -> Result<Vec<String>> {
    let mut session = Session::connect(connector, RetryPolicy::from_config(config)).await?;
    let mailboxes = session.list_mailboxes().await;
    session.logout().await;
    Ok(mailboxes?)
}

async fn backup(args: BackupArgs, settings: &Settings, json: bool) -> Result<bool> {
    if args.output.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        );
    }
    let config = args.tuning.apply(settings.transfer.clone())?;
    let source = ImapConnector::new(
        endpoint(
            Side::Source,
            args.source.source_host,
            args.source.source_user,
            &settings.source,
        )?,
        &config,
    );

    let mailboxes = if args.mailboxes.is_empty() {
        let available = list_mailboxes(source.clone(), &config).await?;
        let chosen = prompt::choose_many(
            &mut io::stdin().lock(),
            &mut io::stderr(),
            "Mailboxes to back up:",
            &available,
        )?;
        chosen.into_iter().map(|i| available[i].clone()).collect()
    } else {
        args.mailboxes
    };

    let passphrase = if args.encrypt {
        Some(prompt::new_passphrase()?)
    } else {
        None
    };

    info!(output = %args.output.display(), mailboxes = mailboxes.len(), "starting backup");
    let report = run_backup(
        source,
        &mailboxes,
        &args.output,
        passphrase.as_deref(),
        &config,
    )
    .await?;

    let mut out = io::stdout().lock();
    if json {
        output::json(&mut out, &report)?;
    } else {
        output::backup_report(&mut out, &report)?;
    }
    Ok(report.errors.is_empty())
}

/// Reads just enough of `path` to tell whether it is encrypted.
fn archive_is_encrypted(path: &Path) -> Result<bool> {
    use std::io::Read;

    let mut header = [0u8; PREAMBLE_LEN];
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("opening archive {}", path.display()))?;
    file.read_exact(&mut header)
        .with_context(|| format!("{} is not a mailferry archive", path.display()))?;
    Ok(is_encrypted(&header)?)
}

async fn restore(args: RestoreArgs, settings: &Settings, json: bool) -> Result<bool> {
    let config = args.tuning.apply(settings.transfer.clone())?;
    let mapping = MailboxMapping::parse(&args.map)?;

    let passphrase = if args.encrypted || archive_is_encrypted(&args.archive)? {
        Some(prompt::secret(prompt::PASSPHRASE_ENV, "Archive passphrase: ")?)
    } else {
        None
    };

    let dest = ImapConnector::new(
        endpoint(
            Side::Dest,
            args.dest.dest_host,
            args.dest.dest_user,
            &settings.dest,
        )?,
        &config,
    );

    info!(archive = %args.archive.display(), "starting restore");
    let report = run_restore(
        dest,
        &args.archive,
        passphrase.as_deref(),
        &mapping,
        &config,
    )
    .await?;

    print_run_report(&report, json)?;
    Ok(report.is_success())
}

async fn mailboxes(args: MailboxesArgs, settings: &Settings) -> Result<bool> {
    let config = args.tuning.apply(settings.transfer.clone())?;
    let connector = ImapConnector::new(
        endpoint(Side::Source, args.host, args.user, &settings.source)?,
        &config,
    );

    let names = list_mailboxes(connector, &config).await?;
    let mut out = io::stdout().lock();
    for name in &names {
        writeln!(out, "{name}")?;
    }
    Ok(true)
}

