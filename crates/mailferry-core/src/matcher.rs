//! Pairs source mailboxes with destination mailboxes.

use std::str::FromStr;

use mailferry_imap::decode_modified_utf7;
use serde::Serialize;

use crate::error::Error;

/// A source mailbox and the destination mailbox it is copied into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxPair {
    /// Source mailbox name.
    pub source: String,
    /// Destination mailbox name.
    pub destination: String,
}

impl MailboxPair {
    /// Creates a pair.
    #[must_use]
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

impl FromStr for MailboxPair {
    type Err = Error;

    /// Parses `SOURCE=DEST`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_once('=')
            .map(|(source, dest)| (source.trim(), dest.trim()))
            .filter(|(source, dest)| !source.is_empty() && !dest.is_empty())
            .map(|(source, dest)| Self::new(source, dest))
            .ok_or_else(|| Error::InvalidInput(format!("mailbox pair {s:?} is not SOURCE=DEST")))
    }
}

/// Folder roles and the names providers commonly use for them, lowercase.
const ROLE_ALIASES: &[(&str, &[&str])] = &[
    ("inbox", &["inbox", "posteingang"]),
    (
        "sent",
        &[
            "sent",
            "sent items",
            "sent mail",
            "sent messages",
            "[gmail]/sent mail",
            "inbox.sent",
            "gesendet",
        ],
    ),
    (
        "trash",
        &[
            "trash",
            "deleted items",
            "deleted messages",
            "bin",
            "[gmail]/trash",
            "[gmail]/bin",
            "inbox.trash",
            "papierkorb",
        ],
    ),
    (
        "archive",
        &["archive", "archives", "all mail", "[gmail]/all mail", "inbox.archive"],
    ),
    (
        "spam",
        &["spam", "junk", "junk e-mail", "junk email", "bulk mail", "[gmail]/spam", "inbox.spam"],
    ),
    (
        "drafts",
        &["drafts", "draft", "[gmail]/drafts", "inbox.drafts", "entwürfe"],
    ),
];

/// Returns the aliases of the role named exactly `name`.
fn role_aliases(name: &str) -> Option<&'static [&'static str]> {
    ROLE_ALIASES
        .iter()
        .find(|(role, _)| *role == name)
        .map(|(_, aliases)| *aliases)
}

/// Lowercase form of a wire name with modified UTF-7 decoded.
fn comparable(name: &str) -> String {
    decode_modified_utf7(name).to_lowercase()
}

/// Finds the destination for one source mailbox.
///
/// An exact case-insensitive match wins. Otherwise, when the source is
/// named after a role, the first destination whose name is one of that
/// role's aliases. Names are compared with modified UTF-7 decoded.
#[must_use]
pub fn match_mailbox<'a>(source: &str, destinations: &'a [String]) -> Option<&'a str> {
    let lower = comparable(source);
    if let Some(exact) = destinations.iter().find(|d| comparable(d) == lower) {
        return Some(exact);
    }

    let aliases = role_aliases(&lower)?;
    destinations
        .iter()
        .find(|d| aliases.contains(&comparable(d).as_str()))
        .map(String::as_str)
}

/// Pairs every source mailbox that has a destination, in source order.
///
/// An empty result means nothing could be matched automatically.
#[must_use]
pub fn match_mailboxes(sources: &[String], destinations: &[String]) -> Vec<MailboxPair> {
    sources
        .iter()
        .filter_map(|source| {
            match_mailbox(source, destinations).map(|dest| MailboxPair::new(source.as_str(), dest))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn exact_match_ignores_case() {
        let pairs = match_mailboxes(&names(&["INBOX", "Projects"]), &names(&["Inbox", "projects"]));
        assert_eq!(
            pairs,
            vec![
                MailboxPair::new("INBOX", "Inbox"),
                MailboxPair::new("Projects", "projects"),
            ]
        );
    }

    #[test]
    fn sent_matches_sent_items_only() {
        let pairs = match_mailboxes(&names(&["Sent"]), &names(&["Sent Items", "Archive"]));
        assert_eq!(pairs, vec![MailboxPair::new("Sent", "Sent Items")]);
    }

    #[test]
    fn exact_match_beats_alias() {
        let dest = names(&["Sent Items", "Sent"]);
        assert_eq!(match_mailbox("sent", &dest), Some("Sent"));
    }

    #[test]
    fn only_role_names_use_the_alias_table() {
        let pairs = match_mailboxes(
            &names(&["Deleted Items", "All Mail"]),
            &names(&["Trash", "Archive"]),
        );
        assert!(pairs.is_empty());
        assert_eq!(match_mailbox("Trash", &names(&["Deleted Items"])), Some("Deleted Items"));
    }

    #[test]
    fn utf7_destination_matches_alias() {
        let dest = names(&["INBOX", "Entw&APw-rfe"]);
        assert_eq!(match_mailbox("Drafts", &dest), Some("Entw&APw-rfe"));
        assert_eq!(match_mailbox("entw&APw-rfe", &dest), Some("Entw&APw-rfe"));
    }

    #[test]
    fn first_destination_wins() {
        let dest = names(&["Junk", "Spam Folder", "Bulk Mail"]);
        assert_eq!(match_mailbox("Spam", &dest), Some("Junk"));
    }

    #[test]
    fn unmatched_sources_are_left_out() {
        let pairs = match_mailboxes(&names(&["Receipts", "Drafts"]), &names(&["Draft"]));
        assert_eq!(pairs, vec![MailboxPair::new("Drafts", "Draft")]);
        assert!(match_mailboxes(&names(&["Receipts"]), &names(&["Other"])).is_empty());
    }

    #[test]
    fn pair_from_str() {
        let pair: MailboxPair = "Sent = Sent Items".parse().unwrap();
        assert_eq!(pair, MailboxPair::new("Sent", "Sent Items"));
        assert!("INBOX".parse::<MailboxPair>().is_err());
        assert!("=INBOX".parse::<MailboxPair>().is_err());
    }

    #[test]
    fn output_follows_source_order() {
        let pairs = match_mailboxes(
            &names(&["Trash", "INBOX", "Sent"]),
            &names(&["Sent", "INBOX", "Trash"]),
        );
        let sources: Vec<_> = pairs.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, ["Trash", "INBOX", "Sent"]);
    }
}
