//! Mail store abstraction and its IMAP implementation.
//!
//! [`MailStore`] is one live, authenticated connection. [`Connector`]
//! creates them, which is what lets a [`Session`](crate::Session) replace a
//! dead connection with a fresh one.

use std::time::Duration;

use async_trait::async_trait;
use mailferry_imap::{
    Authenticated, Client, Config, FetchAttribute, FetchItem, Flag, Flags, ImapStream,
    NotAuthenticated, SearchCriteria, Security, SelectFailed, Selected, Uid, UidSet,
};
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::error::{ConnectionError, Error, Result};

/// UIDs per header FETCH when materializing Message-IDs.
const HEADER_BATCH: usize = 500;

/// Host and credentials of one account.
#[derive(Clone)]
pub struct Endpoint {
    /// Server hostname.
    pub host: String,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What SELECT reported about a mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectInfo {
    /// Number of messages.
    pub exists: u32,
    /// UIDVALIDITY, if the server sent one.
    pub uid_validity: Option<u32>,
}

/// One message as fetched from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Store-local unique id.
    pub uid: Uid,
    /// Flags as stored, server-managed ones included.
    pub flags: Flags,
    /// Size reported by the server.
    pub size: u32,
    /// Raw RFC 5322 bytes.
    pub body: Vec<u8>,
}

/// Operations the engine needs from a mail store.
///
/// Everything except `list_mailboxes`, `append` and `noop` is scoped to the
/// currently selected mailbox.
#[async_trait]
pub trait MailStore: Send {
    /// Lists selectable mailbox names.
    async fn list_mailboxes(&mut self) -> Result<Vec<String>>;

    /// Selects a mailbox.
    async fn select(&mut self, mailbox: &str) -> Result<SelectInfo>;

    /// Returns every UID in the selected mailbox.
    async fn search_all(&mut self) -> Result<Vec<Uid>>;

    /// Returns the UIDs whose header `name` contains `value`.
    async fn search_header(&mut self, name: &str, value: &str) -> Result<Vec<Uid>>;

    /// Fetches one message with flags and size; `None` if it no longer
    /// exists.
    async fn fetch(&mut self, uid: Uid) -> Result<Option<FetchedMessage>>;

    /// Fetches the Message-ID header block of each UID.
    async fn fetch_message_ids(&mut self, uids: &[Uid]) -> Result<Vec<(Uid, Vec<u8>)>>;

    /// Appends a message to `mailbox`.
    async fn append(&mut self, mailbox: &str, message: &[u8], flags: &[Flag]) -> Result<()>;

    /// Sends a no-op; fails if the connection is dead.
    async fn noop(&mut self) -> Result<()>;

    /// Closes the connection politely.
    async fn logout(&mut self) -> Result<()>;
}

/// Opens authenticated [`MailStore`] connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The store type produced.
    type Store: MailStore;

    /// Connects and authenticates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when no transport candidate succeeds.
    async fn connect(&self) -> Result<Self::Store>;

    /// Short label for logs and reports.
    fn label(&self) -> &str;
}

/// One (port, security) pair to try when connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// TCP port.
    pub port: u16,
    /// Transport security.
    pub security: Security,
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.port, self.security)
    }
}

/// The ordered connect candidates.
///
/// Implicit TLS first, then STARTTLS, then plaintext if allowed.
#[must_use]
pub fn default_candidates(allow_plaintext: bool) -> Vec<Candidate> {
    let mut candidates = vec![
        Candidate {
            port: 993,
            security: Security::Implicit,
        },
        Candidate {
            port: 143,
            security: Security::StartTls,
        },
    ];
    if allow_plaintext {
        candidates.push(Candidate {
            port: 143,
            security: Security::None,
        });
    }
    candidates
}

/// Connects to an IMAP server, trying each candidate in order.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    endpoint: Endpoint,
    candidates: Vec<Candidate>,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl ImapConnector {
    /// Creates a connector using the candidates and timeouts from `config`.
    #[must_use]
    pub fn new(endpoint: Endpoint, config: &TransferConfig) -> Self {
        Self {
            endpoint,
            candidates: default_candidates(config.allow_plaintext),
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
        }
    }

    /// Replaces the candidate list.
    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Returns the candidates in the order they are tried.
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    async fn try_candidate(&self, candidate: Candidate) -> Result<ImapStore> {
        let config = Config::new(&self.endpoint.host, candidate.security)
            .on_port(candidate.port)
            .with_timeouts(self.connect_timeout, self.io_timeout);

        let stream = mailferry_imap::connection::connect(&config).await?;
        let mut client: Client<ImapStream, NotAuthenticated> = Client::from_stream(stream)
            .await?
            .with_io_timeout(self.io_timeout);
        if candidate.security == Security::StartTls {
            client = client.starttls(&self.endpoint.host).await?;
        }

        let client = client
            .login(&self.endpoint.username, &self.endpoint.password)
            .await?;
        Ok(ImapStore {
            state: StoreState::Authenticated(client),
        })
    }
}

#[async_trait]
impl Connector for ImapConnector {
    type Store = ImapStore;

    async fn connect(&self) -> Result<ImapStore> {
        let mut failures = Vec::new();
        for &candidate in &self.candidates {
            debug!(host = %self.endpoint.host, %candidate, "trying transport");
            match self.try_candidate(candidate).await {
                Ok(store) => {
                    info!(host = %self.endpoint.host, %candidate, "connected");
                    return Ok(store);
                }
                Err(e) => {
                    warn!(host = %self.endpoint.host, %candidate, error = %e, "transport failed");
                    failures.push(format!("{candidate}: {e}"));
                }
            }
        }

        Err(Error::Connection(ConnectionError {
            host: self.endpoint.host.clone(),
            failures,
        }))
    }

    fn label(&self) -> &str {
        &self.endpoint.host
    }
}

/// Connection state, moved out and back with `std::mem::replace` around
/// state-changing commands.
enum StoreState {
    Disconnected,
    Authenticated(Client<ImapStream, Authenticated>),
    Selected(Client<ImapStream, Selected>),
}

/// A live IMAP connection.
pub struct ImapStore {
    state: StoreState,
}

impl std::fmt::Debug for ImapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            StoreState::Disconnected => "disconnected".to_string(),
            StoreState::Authenticated(_) => "authenticated".to_string(),
            StoreState::Selected(client) => format!("selected {}", client.mailbox()),
        };
        f.debug_struct("ImapStore").field("state", &state).finish()
    }
}

impl ImapStore {
    fn selected(&mut self) -> Result<&mut Client<ImapStream, Selected>> {
        match &mut self.state {
            StoreState::Selected(client) => Ok(client),
            _ => Err(mailferry_imap::Error::InvalidState("no mailbox selected".into()).into()),
        }
    }

    fn disconnected() -> Error {
        mailferry_imap::Error::ConnectionLost.into()
    }
}

#[async_trait]
impl MailStore for ImapStore {
    async fn list_mailboxes(&mut self) -> Result<Vec<String>> {
        let listed = match &mut self.state {
            StoreState::Authenticated(client) => client.list("", "*").await?,
            StoreState::Selected(client) => client.list("", "*").await?,
            StoreState::Disconnected => return Err(Self::disconnected()),
        };
        Ok(listed
            .into_iter()
            .filter(mailferry_imap::ListResponse::is_selectable)
            .map(|item| item.mailbox.0)
            .collect())
    }

    async fn select(&mut self, mailbox: &str) -> Result<SelectInfo> {
        let outcome = match std::mem::replace(&mut self.state, StoreState::Disconnected) {
            StoreState::Authenticated(client) => client.select(mailbox).await,
            StoreState::Selected(client) => client.select(mailbox).await,
            StoreState::Disconnected => return Err(Self::disconnected()),
        };
        let (client, status) = match outcome {
            Ok(selected) => selected,
            Err(failed) => {
                let SelectFailed { client, error } = *failed;
                // The server answered, so the connection is still good.
                if matches!(error, mailferry_imap::Error::No(_) | mailferry_imap::Error::Bad(_)) {
                    debug!(mailbox, error = %error, "SELECT refused, connection kept");
                    self.state = StoreState::Authenticated(client);
                }
                return Err(error.into());
            }
        };
        self.state = StoreState::Selected(client);
        Ok(SelectInfo {
            exists: status.exists,
            uid_validity: status.uid_validity.map(|v| v.get()),
        })
    }

    async fn search_all(&mut self) -> Result<Vec<Uid>> {
        Ok(self.selected()?.uid_search(SearchCriteria::All).await?)
    }

    async fn search_header(&mut self, name: &str, value: &str) -> Result<Vec<Uid>> {
        let criteria = SearchCriteria::Header(name.to_string(), value.to_string());
        Ok(self.selected()?.uid_search(criteria).await?)
    }

    async fn fetch(&mut self, uid: Uid) -> Result<Option<FetchedMessage>> {
        let attributes = [
            FetchAttribute::Uid,
            FetchAttribute::Flags,
            FetchAttribute::Rfc822Size,
            FetchAttribute::Body {
                section: None,
                peek: true,
            },
        ];
        let responses = self
            .selected()?
            .uid_fetch(&UidSet::single(uid), &attributes)
            .await?;

        Ok(responses
            .into_iter()
            .find_map(|items| message_from_items(uid, items)))
    }

    async fn fetch_message_ids(&mut self, uids: &[Uid]) -> Result<Vec<(Uid, Vec<u8>)>> {
        let client = self.selected()?;
        let mut out = Vec::with_capacity(uids.len());

        let attributes = [
            FetchAttribute::Uid,
            FetchAttribute::Body {
                section: Some("HEADER.FIELDS (MESSAGE-ID)".to_string()),
                peek: true,
            },
        ];
        for chunk in uids.chunks(HEADER_BATCH) {
            let Some(set) = UidSet::from_uids(chunk) else {
                continue;
            };
            for items in client.uid_fetch(&set, &attributes).await? {
                let mut uid = None;
                let mut header = None;
                for item in items {
                    match item {
                        FetchItem::Uid(u) => uid = Some(u),
                        FetchItem::Body { data, .. } => header = data,
                        _ => {}
                    }
                }
                if let (Some(uid), Some(header)) = (uid, header) {
                    out.push((uid, header));
                }
            }
        }

        Ok(out)
    }

    async fn append(&mut self, mailbox: &str, message: &[u8], flags: &[Flag]) -> Result<()> {
        match &mut self.state {
            StoreState::Authenticated(client) => client.append(mailbox, flags, message).await?,
            StoreState::Selected(client) => client.append(mailbox, flags, message).await?,
            StoreState::Disconnected => return Err(Self::disconnected()),
        };
        Ok(())
    }

    async fn noop(&mut self) -> Result<()> {
        match &mut self.state {
            StoreState::Authenticated(client) => client.noop().await?,
            StoreState::Selected(client) => client.noop().await?,
            StoreState::Disconnected => return Err(Self::disconnected()),
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, StoreState::Disconnected) {
            StoreState::Authenticated(client) => client.logout().await?,
            StoreState::Selected(client) => client.logout().await?,
            StoreState::Disconnected => {}
        }
        Ok(())
    }
}

/// Builds a [`FetchedMessage`] from one FETCH response, if it is for `uid`
/// and carries a body.
fn message_from_items(uid: Uid, items: Vec<FetchItem>) -> Option<FetchedMessage> {
    let mut found_uid = None;
    let mut flags = Flags::new();
    let mut size = 0;
    let mut body = None;

    for item in items {
        match item {
            FetchItem::Uid(u) => found_uid = Some(u),
            FetchItem::Flags(f) => flags = f,
            FetchItem::Rfc822Size(s) => size = s,
            FetchItem::Body {
                section: None,
                data,
            } => body = data,
            FetchItem::Body { .. } => {}
        }
    }

    if found_uid != Some(uid) {
        return None;
    }
    let body = body?;
    Some(FetchedMessage {
        uid,
        flags,
        size,
        body,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;
    use crate::session::{RetryPolicy, Session};

    #[test]
    fn candidates_without_plaintext() {
        let candidates = default_candidates(false);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].to_string(), "993/TLS");
        assert_eq!(candidates[1].to_string(), "143/STARTTLS");
    }

    #[test]
    fn plaintext_is_last_resort() {
        let candidates = default_candidates(true);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[2].security, Security::None);
    }

    #[tokio::test]
    async fn every_failed_candidate_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = ImapConnector::new(
            Endpoint::new("127.0.0.1", "alice", "secret"),
            &TransferConfig::default(),
        )
        .with_candidates(vec![Candidate {
            port,
            security: Security::None,
        }]);
        assert_eq!(connector.candidates().len(), 1);

        let Err(Error::Connection(failure)) = connector.connect().await else {
            panic!("connecting to a closed port succeeded");
        };
        assert_eq!(failure.host, "127.0.0.1");
        assert_eq!(failure.failures.len(), 1);
        assert!(failure.failures[0].starts_with(&format!("{port}/plaintext: ")));
    }

    /// Accepts connections, answers every command OK except SELECT, which
    /// is refused, and counts the connections.
    async fn refusing_select_server() -> (u16, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&accepts);

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut lines = BufReader::new(read).lines();
                    write.write_all(b"* OK [CAPABILITY IMAP4rev1] ready\r\n").await.unwrap();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let (tag, command) = line.split_once(' ').unwrap();
                        let reply = if command.starts_with("SELECT") {
                            format!("{tag} NO no such mailbox\r\n")
                        } else {
                            format!("{tag} OK done\r\n")
                        };
                        if write.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        (port, accepts)
    }

    #[tokio::test]
    async fn refused_select_keeps_the_connection() {
        let (port, accepts) = refusing_select_server().await;
        let connector = ImapConnector::new(
            Endpoint::new("127.0.0.1", "alice", "secret"),
            &TransferConfig::default(),
        )
        .with_candidates(vec![Candidate {
            port,
            security: Security::None,
        }]);

        let mut store = connector.connect().await.unwrap();
        let err = store.select("Missing").await.unwrap_err();
        assert!(matches!(err, Error::Imap(mailferry_imap::Error::No(_))));
        assert_eq!(format!("{store:?}"), "ImapStore { state: \"authenticated\" }");
        store.noop().await.unwrap();

        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        };
        let mut session = Session::connect(connector, policy).await.unwrap();
        let err = session.select("Missing").await.unwrap_err();
        assert!(matches!(err, Error::Operation { attempts: 3, .. }));
        assert_eq!(session.reconnect_count(), 0);
        assert_eq!(accepts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn endpoint_debug_hides_password() {
        let endpoint = Endpoint::new("imap.example.com", "alice", "hunter2");
        let rendered = format!("{endpoint:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn unsolicited_fetch_is_ignored() {
        let uid = Uid::new(9).unwrap();
        let other = vec![
            FetchItem::Uid(Uid::new(3).unwrap()),
            FetchItem::Flags(Flags::from_vec(vec![Flag::Seen])),
        ];
        assert!(message_from_items(uid, other).is_none());

        let mine = vec![
            FetchItem::Uid(uid),
            FetchItem::Flags(Flags::from_vec(vec![Flag::Seen, Flag::Recent])),
            FetchItem::Rfc822Size(5),
            FetchItem::Body {
                section: None,
                data: Some(b"hello".to_vec()),
            },
        ];
        let message = message_from_items(uid, mine).unwrap();
        assert_eq!(message.size, 5);
        assert_eq!(message.body, b"hello");
        assert!(message.flags.contains(&Flag::Recent));
    }
}
