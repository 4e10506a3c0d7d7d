//! Plain and TLS byte streams.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::config::{Config, Security};
use crate::{Error, Result};

/// A TCP connection, possibly wrapped in TLS.
pub enum ImapStream {
    /// Cleartext.
    Plain(TcpStream),
    /// TLS (boxed, the session state is large).
    Tls(Box<TlsStream<TcpStream>>),
}

impl ImapStream {
    /// Runs the TLS handshake on a cleartext stream.
    ///
    /// # Errors
    ///
    /// Fails on an already encrypted stream, an invalid server name or a
    /// failed handshake.
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        let Self::Plain(tcp) = self else {
            return Err(Error::InvalidState("stream is already encrypted".into()));
        };
        handshake(host, tcp).await
    }

    /// Returns true once the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

macro_rules! delegate {
    ($self:ident.$method:ident($($arg:expr),*)) => {
        match $self.get_mut() {
            ImapStream::Plain(s) => Pin::new(s).$method($($arg),*),
            ImapStream::Tls(s) => Pin::new(s).$method($($arg),*),
        }
    };
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        delegate!(self.poll_read(cx, buf))
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        delegate!(self.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        delegate!(self.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        delegate!(self.poll_shutdown(cx))
    }
}

/// TLS client setup trusting the Mozilla root set from `webpki-roots`.
fn tls_connector() -> TlsConnector {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn handshake(host: &str, tcp: TcpStream) -> Result<ImapStream> {
    let server_name = ServerName::try_from(host.to_string())?;
    let tls = tls_connector().connect(server_name, tcp).await?;
    Ok(ImapStream::Tls(Box::new(tls)))
}

/// Opens the transport described by `config` within its connect timeout.
///
/// For [`Security::StartTls`] the stream stays cleartext; the client
/// upgrades it after reading the greeting, see
/// [`Client::starttls`](super::Client::starttls).
///
/// # Errors
///
/// Returns the TCP or TLS failure, or [`Error::Timeout`].
pub async fn connect(config: &Config) -> Result<ImapStream> {
    with_timeout(config.connect_timeout, async {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
        match config.security {
            Security::Implicit => handshake(&config.host, tcp).await,
            Security::StartTls | Security::None => Ok(ImapStream::Plain(tcp)),
        }
    })
    .await
}

pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(limit))?
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_is_reported() {
        let result: Result<()> = with_timeout(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn refused_connect_is_io_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = Config::new("127.0.0.1", Security::None).on_port(port);
        assert!(matches!(connect(&config).await, Err(Error::Io(_))));
    }
}
