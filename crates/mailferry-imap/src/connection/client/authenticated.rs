//! LIST and SELECT.

use tokio::io::{AsyncRead, AsyncWrite};

use super::{Authenticated, Client, Selected};
use crate::command::Command;
use crate::{Error, Result};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{ListResponse, Mailbox, MailboxStatus, ResponseCode};

/// A SELECT that did not complete.
///
/// After a refused SELECT no mailbox is selected, so the connection comes
/// back authenticated. It is only worth keeping when `error` is a NO or BAD
/// answer.
pub struct SelectFailed<S> {
    /// The connection, back in the authenticated state.
    pub client: Client<S, Authenticated>,
    /// Why the SELECT failed.
    pub error: Error,
}

impl<S> std::fmt::Debug for SelectFailed<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectFailed")
            .field("client", &self.client)
            .field("error", &self.error)
            .finish()
    }
}

impl<S> From<Box<SelectFailed<S>>> for Error {
    fn from(failed: Box<SelectFailed<S>>) -> Self {
        failed.error
    }
}

/// Outcome of a SELECT.
pub type SelectResult<S> =
    std::result::Result<(Client<S, Selected>, MailboxStatus), Box<SelectFailed<S>>>;

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// SELECTs `mailbox` read-write.
    pub async fn select(mut self, mailbox: &str) -> SelectResult<S> {
        match self.select_status(mailbox).await {
            Ok(status) => {
                let state = Selected {
                    mailbox: mailbox.to_string(),
                    status: status.clone(),
                };
                Ok((self.into_state(state), status))
            }
            Err(error) => Err(Box::new(SelectFailed {
                client: self,
                error,
            })),
        }
    }

    /// LIST `pattern` under `reference`.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        self.list_entries(reference, pattern).await
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(super) async fn list_entries(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<ListResponse>> {
        let list = Command::List {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
        };
        let responses = self.run(&list).await?;

        Ok(responses
            .iter()
            .filter_map(|bytes| match ResponseParser::parse(bytes) {
                Ok(Response::Untagged(UntaggedResponse::List(entry))) => Some(entry),
                _ => None,
            })
            .collect())
    }

    pub(super) async fn select_status(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        let select = Command::Select {
            mailbox: Mailbox::new(mailbox),
        };
        let responses = self.run(&select).await?;
        Ok(mailbox_status(&responses))
    }
}

/// Folds the data a SELECT returned into a status snapshot.
fn mailbox_status(responses: &[Vec<u8>]) -> MailboxStatus {
    let mut status = MailboxStatus::default();

    for response in responses.iter().filter_map(|b| ResponseParser::parse(b).ok()) {
        let code = match response {
            Response::Untagged(UntaggedResponse::Exists(n)) => {
                status.exists = n;
                continue;
            }
            Response::Untagged(UntaggedResponse::Recent(n)) => {
                status.recent = n;
                continue;
            }
            Response::Untagged(UntaggedResponse::Flags(flags)) => {
                status.flags = flags;
                continue;
            }
            Response::Untagged(UntaggedResponse::Status { code, .. })
            | Response::Tagged { code, .. } => code,
            _ => continue,
        };

        match code {
            Some(ResponseCode::UidValidity(v)) => status.uid_validity = Some(v),
            Some(ResponseCode::UidNext(v)) => status.uid_next = Some(v),
            Some(ResponseCode::ReadOnly) => status.read_only = true,
            _ => {}
        }
    }

    status
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn select_snapshot() {
        let responses: Vec<Vec<u8>> = vec![
            b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n".to_vec(),
            b"* 172 EXISTS\r\n".to_vec(),
            b"* 1 RECENT\r\n".to_vec(),
            b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n".to_vec(),
            b"* OK [UIDNEXT 4392] Predicted next UID\r\n".to_vec(),
            b"A0002 OK [READ-ONLY] SELECT completed\r\n".to_vec(),
        ];

        let status = mailbox_status(&responses);
        assert_eq!(
            (status.exists, status.recent, status.flags.len()),
            (172, 1, 5)
        );
        assert_eq!(status.uid_validity.unwrap().get(), 3_857_529_045);
        assert_eq!(status.uid_next.unwrap().get(), 4392);
        assert!(status.read_only);
    }

    #[test]
    fn read_write_by_default() {
        let status = mailbox_status(&[b"A0002 OK [READ-WRITE] done\r\n".to_vec()]);
        assert!(!status.read_only);
        assert_eq!(status.uid_validity, None);
    }
}
