//! Message identity and duplicate detection.
//!
//! UIDs are local to one store, so the `Message-ID` header is the only
//! identity that survives a copy. Messages without one are never treated
//! as duplicates.

use std::collections::HashSet;

use mailferry_mime::{Headers, Message};
use tracing::{debug, warn};

use crate::config::DedupStrategy;
use crate::error::Result;
use crate::session::Session;
use crate::store::Connector;

/// Header carrying the identity.
const MESSAGE_ID: &str = "Message-ID";

/// The portable identity of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageIdentity {
    /// A non-empty, trimmed `Message-ID` value.
    MessageId(String),
    /// The message has no usable `Message-ID`.
    NoIdentity,
}

impl MessageIdentity {
    /// Extracts the identity from a raw message.
    #[must_use]
    pub fn from_message(raw: &[u8]) -> Self {
        Self::from_headers(&Message::parse_headers(raw))
    }

    /// Extracts the identity from parsed headers.
    #[must_use]
    pub fn from_headers(headers: &Headers) -> Self {
        match headers.get(MESSAGE_ID).map(str::trim) {
            Some(id) if !id.is_empty() => Self::MessageId(id.to_string()),
            _ => Self::NoIdentity,
        }
    }

    /// Returns the Message-ID, if there is one.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::MessageId(id) => Some(id),
            Self::NoIdentity => None,
        }
    }
}

impl std::fmt::Display for MessageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MessageId(id) => f.write_str(id),
            Self::NoIdentity => f.write_str("<no message-id>"),
        }
    }
}

/// Answers "is this message already in the destination mailbox?".
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    /// Destination identities; `None` means search per message.
    known: Option<HashSet<String>>,
}

impl DedupIndex {
    /// An index that runs one header search per lookup.
    #[must_use]
    pub fn search() -> Self {
        Self { known: None }
    }

    /// Builds the index for `mailbox` on `session`.
    ///
    /// With [`DedupStrategy::Materialize`] every destination Message-ID is
    /// fetched once. If that fails with a non-fatal error the index falls
    /// back to per-message search.
    ///
    /// # Errors
    ///
    /// Returns fatal connection errors.
    pub async fn prepare<C: Connector>(
        session: &mut Session<C>,
        mailbox: &str,
        strategy: DedupStrategy,
    ) -> Result<Self> {
        match strategy {
            DedupStrategy::Search => Ok(Self::search()),
            DedupStrategy::Materialize => match materialize(session, mailbox).await {
                Ok(known) => {
                    debug!(mailbox, count = known.len(), "materialized destination identities");
                    Ok(Self { known: Some(known) })
                }
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    warn!(mailbox, error = %e, "could not materialize identities, searching per message");
                    Ok(Self::search())
                }
            },
        }
    }

    /// Returns true if the index holds a materialized identity set.
    #[must_use]
    pub const fn is_materialized(&self) -> bool {
        self.known.is_some()
    }

    /// Returns true if `identity` already exists in `mailbox`.
    ///
    /// Always false for [`MessageIdentity::NoIdentity`]. A header search
    /// matches substrings, so its hits are confirmed by fetching their
    /// Message-ID fields and comparing them exactly.
    ///
    /// # Errors
    ///
    /// Returns the search or fetch error when searching per message.
    pub async fn exists_in_target<C: Connector>(
        &self,
        session: &mut Session<C>,
        mailbox: &str,
        identity: &MessageIdentity,
    ) -> Result<bool> {
        let MessageIdentity::MessageId(id) = identity else {
            return Ok(false);
        };

        if let Some(known) = &self.known {
            return Ok(known.contains(id));
        }

        if session.selected() != Some(mailbox) {
            session.select(mailbox).await?;
        }
        let hits = session.search_header(MESSAGE_ID, id).await?;
        if hits.is_empty() {
            return Ok(false);
        }

        let headers = session.fetch_message_ids(&hits).await?;
        let exact = headers
            .iter()
            .any(|(_, block)| MessageIdentity::from_message(block) == *identity);
        if !exact {
            debug!(
                mailbox,
                message_id = %id,
                hits = hits.len(),
                "header search hits differ from Message-ID"
            );
        }
        Ok(exact)
    }

    /// Notes that `identity` now exists in the destination.
    pub fn record(&mut self, identity: &MessageIdentity) {
        if let (Some(known), MessageIdentity::MessageId(id)) = (self.known.as_mut(), identity) {
            known.insert(id.clone());
        }
    }
}

async fn materialize<C: Connector>(
    session: &mut Session<C>,
    mailbox: &str,
) -> Result<HashSet<String>> {
    if session.selected() != Some(mailbox) {
        session.select(mailbox).await?;
    }
    let uids = session.search_all().await?;
    if uids.is_empty() {
        return Ok(HashSet::new());
    }

    let headers = session.fetch_message_ids(&uids).await?;
    Ok(headers
        .iter()
        .filter_map(|(_, block)| match MessageIdentity::from_message(block) {
            MessageIdentity::MessageId(id) => Some(id),
            MessageIdentity::NoIdentity => None,
        })
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn message_id_is_trimmed() {
        let raw = b"From: a@example.com\r\nMessage-ID:   <abc@example.com>  \r\n\r\nbody";
        assert_eq!(
            MessageIdentity::from_message(raw),
            MessageIdentity::MessageId("<abc@example.com>".into())
        );
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let raw = b"message-id: <x@y>\r\n\r\n";
        assert_eq!(MessageIdentity::from_message(raw).message_id(), Some("<x@y>"));
    }

    #[test]
    fn missing_or_blank_is_sentinel() {
        assert_eq!(
            MessageIdentity::from_message(b"Subject: hi\r\n\r\nbody"),
            MessageIdentity::NoIdentity
        );
        assert_eq!(
            MessageIdentity::from_message(b"Message-ID:   \r\n\r\nbody"),
            MessageIdentity::NoIdentity
        );
        assert_eq!(MessageIdentity::from_message(b""), MessageIdentity::NoIdentity);
    }

    #[test]
    fn header_block_from_fetch_parses() {
        // BODY[HEADER.FIELDS (MESSAGE-ID)] returns the field and a blank line.
        let block = b"Message-ID: <k@host>\r\n\r\n";
        assert_eq!(
            MessageIdentity::from_message(block),
            MessageIdentity::MessageId("<k@host>".into())
        );
    }

    #[test]
    fn record_only_fills_materialized_index() {
        let id = MessageIdentity::MessageId("<a@b>".into());

        let mut search = DedupIndex::search();
        search.record(&id);
        assert!(!search.is_materialized());

        let mut index = DedupIndex {
            known: Some(HashSet::new()),
        };
        index.record(&id);
        index.record(&MessageIdentity::NoIdentity);
        assert_eq!(index.known.as_ref().unwrap().len(), 1);
    }
}
