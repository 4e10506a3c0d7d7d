//! Type-state IMAP client.
//!
//! A [`Client`] starts [`NotAuthenticated`], becomes [`Authenticated`] after
//! LOGIN and [`Selected`] after SELECT. Commands only exist on the states
//! that allow them.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;

pub use authenticated::{SelectFailed, SelectResult};

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use super::framed::FramedStream;
use super::stream::with_timeout;
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseParser, Status, UntaggedResponse};
use crate::types::{Capability, Flag, Mailbox, MailboxStatus, ResponseCode, Uid};
use crate::{Error, Result};

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(120);

/// Before LOGIN.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// Logged in, no mailbox selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// A mailbox is selected.
#[derive(Debug, Clone)]
pub struct Selected {
    mailbox: String,
    status: MailboxStatus,
}

/// An IMAP connection in protocol state `State`.
pub struct Client<S, State> {
    stream: FramedStream<S>,
    tags: TagGenerator,
    capabilities: Vec<Capability>,
    io_timeout: Duration,
    state: State,
}

impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Capabilities last advertised by the server.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Returns true if the server advertised `cap`.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Bounds every later command round trip by `timeout`.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// NOOP. A dead connection fails here with an I/O, timeout or
    /// [`Error::ConnectionLost`] error.
    pub async fn noop(&mut self) -> Result<()> {
        self.run(&Command::Noop).await.map(drop)
    }

    /// Re-reads the capability list.
    pub async fn capability(&mut self) -> Result<Vec<Capability>> {
        let responses = self.run(&Command::Capability).await?;
        self.absorb_capabilities(&responses);
        Ok(self.capabilities.clone())
    }

    /// APPENDs `message` to `mailbox` with `flags`. Allowed whether or not a
    /// mailbox is selected.
    ///
    /// Returns the new message's UID when the server reports APPENDUID.
    pub async fn append(
        &mut self,
        mailbox: &str,
        flags: &[Flag],
        message: &[u8],
    ) -> Result<Option<Uid>> {
        let tag = self.tags.next_tag();
        let head = Command::Append {
            mailbox: Mailbox::new(mailbox),
            flags: flags.to_vec(),
            size: message.len(),
        }
        .serialize_pieces(&tag);

        let stream = &mut self.stream;
        let responses = with_timeout(self.io_timeout, async {
            send_pieces(stream, &head).await?;
            await_continuation(stream).await?;
            stream.write_literal(message).await?;
            stream.read_until_tagged(&tag).await
        })
        .await?;

        match completion(&responses, &tag)? {
            Some(ResponseCode::AppendUid { uid, .. }) => Ok(Some(uid)),
            _ => Ok(None),
        }
    }

    /// LOGOUT, consuming the connection.
    pub async fn logout(mut self) -> Result<()> {
        // The server answers BYE and may close before the tagged OK.
        let _ = self.run(&Command::Logout).await;
        Ok(())
    }

    /// Sends `command` and returns every response up to and including its
    /// tagged completion, failing unless that completion is OK.
    async fn run(&mut self, command: &Command) -> Result<Vec<Vec<u8>>> {
        let tag = self.tags.next_tag();
        let pieces = command.serialize_pieces(&tag);

        let stream = &mut self.stream;
        let responses = with_timeout(self.io_timeout, async {
            send_pieces(stream, &pieces).await?;
            stream.read_until_tagged(&tag).await
        })
        .await?;

        completion(&responses, &tag)?;
        Ok(responses)
    }

    fn absorb_capabilities(&mut self, responses: &[Vec<u8>]) {
        for bytes in responses {
            if let Ok(
                Response::Untagged(UntaggedResponse::Capability(caps))
                | Response::Tagged {
                    code: Some(ResponseCode::Capability(caps)),
                    ..
                },
            ) = ResponseParser::parse(bytes)
            {
                self.capabilities = caps;
            }
        }
    }

    fn into_state<Next>(self, state: Next) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tags: self.tags,
            capabilities: self.capabilities,
            io_timeout: self.io_timeout,
            state,
        }
    }
}

/// Writes a command's pieces, waiting for a continuation before each one
/// after the first.
async fn send_pieces<S>(stream: &mut FramedStream<S>, pieces: &[Vec<u8>]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for (i, piece) in pieces.iter().enumerate() {
        if i > 0 {
            await_continuation(stream).await?;
        }
        stream.write_command(piece).await?;
    }
    Ok(())
}

/// Reads the server's go-ahead for a literal. A tagged answer instead is
/// the command being refused.
async fn await_continuation<S>(stream: &mut FramedStream<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match ResponseParser::parse(&stream.read_response().await?)? {
        Response::Continuation { .. } => Ok(()),
        Response::Tagged { status, text, .. } => Err(refusal(status, text)),
        Response::Untagged(other) => Err(Error::Protocol(format!(
            "{other:?} where a literal continuation was expected"
        ))),
    }
}

/// Finds the tagged completion for `tag` and returns its response code.
fn completion(responses: &[Vec<u8>], tag: &str) -> Result<Option<ResponseCode>> {
    let tagged = responses.iter().rev().find_map(|bytes| match ResponseParser::parse(bytes) {
        Ok(Response::Tagged {
            tag: done,
            status,
            code,
            text,
        }) if done.as_str() == tag => Some((status, code, text)),
        _ => None,
    });

    match tagged {
        Some((Status::Ok, code, _)) => Ok(code),
        Some((status, _, text)) => Err(refusal(status, text)),
        None => Err(Error::Protocol(format!("no completion for {tag}"))),
    }
}

fn refusal(status: Status, text: String) -> Error {
    match status {
        Status::No => Error::No(text),
        Status::Bad => Error::Bad(text),
        Status::Bye => Error::Bye(text),
        Status::Ok | Status::PreAuth => Error::Protocol(format!("{status:?} {text}")),
    }
}
