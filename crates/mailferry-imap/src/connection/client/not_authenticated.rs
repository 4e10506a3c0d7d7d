//! Greeting, STARTTLS and LOGIN.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::{Authenticated, Client, DEFAULT_IO_TIMEOUT, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::connection::stream::ImapStream;
use crate::parser::{Response, ResponseParser, Status, UntaggedResponse};
use crate::types::{Capability, ResponseCode};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the server greeting from a freshly connected stream.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut stream = FramedStream::new(stream);

        let capabilities = match ResponseParser::parse(&stream.read_response().await?)? {
            Response::Untagged(UntaggedResponse::Status {
                status: Status::Ok | Status::PreAuth,
                code,
                ..
            }) => match code {
                Some(ResponseCode::Capability(caps)) => caps,
                _ => Vec::new(),
            },
            Response::Untagged(UntaggedResponse::Status {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            other => return Err(Error::Protocol(format!("greeting was {other:?}"))),
        };

        Ok(Self {
            stream,
            tags: TagGenerator::default(),
            capabilities,
            io_timeout: DEFAULT_IO_TIMEOUT,
            state: NotAuthenticated,
        })
    }

    /// LOGIN with a username and password.
    ///
    /// A NO answer becomes [`Error::Auth`].
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        if self.has_capability(&Capability::LoginDisabled) {
            return Err(Error::Auth("LOGINDISABLED on this connection".to_string()));
        }

        let login = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        let responses = self.run(&login).await.map_err(|e| match e {
            Error::No(text) => Error::Auth(text),
            other => other,
        })?;
        self.absorb_capabilities(&responses);

        debug!(username, "logged in");
        Ok(self.into_state(Authenticated))
    }
}

impl Client<ImapStream, NotAuthenticated> {
    /// Switches the connection to TLS and re-reads capabilities over it.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        // Some greetings omit capabilities entirely.
        if !self.has_capability(&Capability::StartTls) {
            self.capability().await?;
        }
        if !self.has_capability(&Capability::StartTls) {
            return Err(Error::InvalidState("STARTTLS not offered".to_string()));
        }
        self.run(&Command::StartTls).await?;

        let Self {
            stream,
            tags,
            io_timeout,
            ..
        } = self;
        let mut upgraded = Self {
            stream: FramedStream::new(stream.into_inner().upgrade_to_tls(host).await?),
            tags,
            capabilities: Vec::new(),
            io_timeout,
            state: NotAuthenticated,
        };
        upgraded.capability().await?;
        Ok(upgraded)
    }
}
