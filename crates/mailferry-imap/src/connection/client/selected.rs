//! Commands on a selected mailbox.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

use super::{Authenticated, Client, SelectFailed, SelectResult, Selected};
use crate::Result;
use crate::command::{Command, FetchAttribute, SearchCriteria};
use crate::parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
use crate::types::{ListResponse, MailboxStatus, Uid, UidSet};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Name of the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.state.mailbox
    }

    /// Status as of the SELECT.
    #[must_use]
    pub const fn status(&self) -> &MailboxStatus {
        &self.state.status
    }

    /// SELECTs another mailbox. If that fails the previous mailbox is no
    /// longer selected either.
    pub async fn select(mut self, mailbox: &str) -> SelectResult<S> {
        match self.select_status(mailbox).await {
            Ok(status) => {
                self.state = Selected {
                    mailbox: mailbox.to_string(),
                    status: status.clone(),
                };
                Ok((self, status))
            }
            Err(error) => Err(Box::new(SelectFailed {
                client: self.into_state(Authenticated),
                error,
            })),
        }
    }

    /// LIST `pattern` under `reference`.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        self.list_entries(reference, pattern).await
    }

    /// UID SEARCH; UIDs come back in server order.
    pub async fn uid_search(&mut self, criteria: SearchCriteria) -> Result<Vec<Uid>> {
        let responses = self.run(&Command::UidSearch(criteria)).await?;

        Ok(responses
            .iter()
            .filter_map(|bytes| match ResponseParser::parse(bytes) {
                Ok(Response::Untagged(UntaggedResponse::Search(hits))) => Some(hits),
                _ => None,
            })
            .flatten()
            .filter_map(Uid::new)
            .collect())
    }

    /// UID FETCH; one item list per FETCH response.
    ///
    /// Unsolicited FETCH responses for other messages can show up too, so
    /// callers pick results by their `UID` item.
    pub async fn uid_fetch(
        &mut self,
        uids: &UidSet,
        attributes: &[FetchAttribute],
    ) -> Result<Vec<Vec<FetchItem>>> {
        let fetch = Command::UidFetch {
            uids: uids.clone(),
            attributes: attributes.to_vec(),
        };
        let responses = self.run(&fetch).await?;

        let mut messages = Vec::new();
        for bytes in &responses {
            match ResponseParser::parse(bytes) {
                Ok(Response::Untagged(UntaggedResponse::Fetch { items, .. })) => {
                    messages.push(items);
                }
                Ok(_) => {}
                Err(error) => warn!(%error, "unparseable FETCH response skipped"),
            }
        }
        Ok(messages)
    }
}

