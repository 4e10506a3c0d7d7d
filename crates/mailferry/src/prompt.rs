//! Interactive prompts: secrets and numbered mailbox menus.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use mailferry_core::MailboxPair;

/// Environment variable holding the source password.
pub const SOURCE_PASSWORD_ENV: &str = "MAILFERRY_SOURCE_PASSWORD";

/// Environment variable holding the destination password.
pub const DEST_PASSWORD_ENV: &str = "MAILFERRY_DEST_PASSWORD";

/// Environment variable holding the archive passphrase.
pub const PASSPHRASE_ENV: &str = "MAILFERRY_PASSPHRASE";

/// Reads a secret from `env`, or prompts for it without echo.
pub fn secret(env: &str, prompt: &str) -> Result<String> {
    if let Ok(value) = std::env::var(env)
        && !value.is_empty()
    {
        return Ok(value);
    }
    rpassword::prompt_password(prompt).with_context(|| format!("reading {env}"))
}

/// Reads a new passphrase, asking twice unless it comes from the
/// environment.
pub fn new_passphrase() -> Result<String> {
    if let Ok(value) = std::env::var(PASSPHRASE_ENV)
        && !value.is_empty()
    {
        return Ok(value);
    }
    loop {
        let first = rpassword::prompt_password("Archive passphrase: ")?;
        if first.is_empty() {
            eprintln!("The passphrase must not be empty.");
            continue;
        }
        let second = rpassword::prompt_password("Repeat passphrase: ")?;
        if first == second {
            return Ok(first);
        }
        eprintln!("Passphrases do not match, please try again.");
    }
}

fn read_line<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("input closed");
    }
    Ok(line.trim().to_string())
}

/// Asks for a non-empty line of text.
pub fn line<R: BufRead, W: Write>(input: &mut R, out: &mut W, prompt: &str) -> Result<String> {
    loop {
        write!(out, "{prompt}: ")?;
        out.flush()?;
        let answer = read_line(input)?;
        if !answer.is_empty() {
            return Ok(answer);
        }
    }
}

fn print_menu<W: Write>(out: &mut W, title: &str, options: &[String]) -> Result<()> {
    writeln!(out, "\n{title}")?;
    for (i, option) in options.iter().enumerate() {
        writeln!(out, "{:>3}. {option}", i + 1)?;
    }
    Ok(())
}

/// Asks for one option by number until a valid one is given.
pub fn choose<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    title: &str,
    options: &[String],
) -> Result<usize> {
    if options.is_empty() {
        bail!("nothing to choose from");
    }
    print_menu(out, title, options)?;
    loop {
        write!(out, "Choose a mailbox (by number): ")?;
        out.flush()?;
        match read_line(input)?.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
            _ => writeln!(out, "Invalid choice, please try again.")?,
        }
    }
}

/// Asks for any number of options: comma-separated numbers or `all`.
pub fn choose_many<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    title: &str,
    options: &[String],
) -> Result<Vec<usize>> {
    if options.is_empty() {
        bail!("nothing to choose from");
    }
    print_menu(out, title, options)?;
    loop {
        write!(out, "Choose mailboxes (numbers separated by commas, or 'all'): ")?;
        out.flush()?;
        match parse_selection(&read_line(input)?, options.len()) {
            Some(chosen) => return Ok(chosen),
            None => writeln!(out, "Invalid choice, please try again.")?,
        }
    }
}

/// Parses `1,3, 4` or `all` into zero-based indices; `None` if invalid or
/// empty.
fn parse_selection(line: &str, len: usize) -> Option<Vec<usize>> {
    if line.eq_ignore_ascii_case("all") {
        return Some((0..len).collect());
    }
    let mut chosen = Vec::new();
    for item in line.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let n: usize = item.parse().ok()?;
        if !(1..=len).contains(&n) {
            return None;
        }
        if !chosen.contains(&(n - 1)) {
            chosen.push(n - 1);
        }
    }
    (!chosen.is_empty()).then_some(chosen)
}

fn confirm<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> Result<bool> {
    write!(out, "{question} [y/N]: ")?;
    out.flush()?;
    let answer = read_line(input)?;
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Builds mailbox pairs from menus until the user stops.
pub fn choose_pairs<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    sources: &[String],
    destinations: &[String],
) -> Result<Vec<MailboxPair>> {
    let mut pairs = Vec::new();
    loop {
        let source = choose(input, out, "Source mailboxes:", sources)?;
        let dest = choose(input, out, "Destination mailboxes:", destinations)?;
        pairs.push(MailboxPair::new(
            sources[source].as_str(),
            destinations[dest].as_str(),
        ));
        if !confirm(input, out, "Add another mailbox pair?")? {
            return Ok(pairs);
        }
    }
}
