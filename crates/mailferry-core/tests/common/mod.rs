//! In-memory mail store with failure injection.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use mailferry_core::{
    ConnectionError, Connector, Error, FetchedMessage, MailStore, Result, SelectInfo,
    TransferConfig,
};
use mailferry_imap::{Flag, Flags, Uid};
use mailferry_mime::Message;

/// Configuration that does not sleep between retries.
pub fn fast_config() -> TransferConfig {
    TransferConfig {
        retry_delay: Duration::ZERO,
        ..TransferConfig::default()
    }
}

/// Builds a small RFC 5322 message.
pub fn message(message_id: Option<&str>, subject: &str) -> Vec<u8> {
    let mut raw = String::from("From: alice@example.com\r\nTo: bob@example.com\r\n");
    if let Some(id) = message_id {
        raw.push_str(&format!("Message-ID: {id}\r\n"));
    }
    raw.push_str(&format!("Subject: {subject}\r\n\r\nBody of {subject}\r\n"));
    raw.into_bytes()
}

/// A message with one text attachment.
pub fn message_with_attachment(message_id: &str, filename: &str) -> Vec<u8> {
    format!(
        "Message-ID: {message_id}\r\n\
         Subject: with attachment\r\n\
         Content-Type: multipart/mixed; boundary=\"sep\"\r\n\
         \r\n\
         --sep\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         See attached.\r\n\
         --sep\r\n\
         Content-Type: text/plain; name=\"{filename}\"\r\n\
         Content-Disposition: attachment; filename=\"{filename}\"\r\n\
         Content-Transfer-Encoding: base64\r\n\
         \r\n\
         aGVsbG8gd29ybGQ=\r\n\
         --sep--\r\n"
    )
    .into_bytes()
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub uid: u32,
    pub body: Vec<u8>,
    pub flags: Vec<Flag>,
}

#[derive(Debug, Clone)]
struct MemoryMailbox {
    uid_validity: u32,
    uid_next: u32,
    messages: Vec<StoredMessage>,
}

impl MemoryMailbox {
    fn new(uid_validity: u32) -> Self {
        Self {
            uid_validity,
            uid_next: 1,
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    mailboxes: BTreeMap<String, MemoryMailbox>,
    /// Bumped to kill every open connection.
    generation: u64,
    connects: u32,
    refuse_connects: bool,
    max_connects: Option<u32>,
    fail_header_searches: u32,
    fail_fetches: u32,
    /// Fetches that succeed before `fail_fetches` applies.
    fetch_grace: u32,
    fail_id_fetches: u32,
    fail_appends: u32,
    drop_after_appends: Option<usize>,
    appended: Vec<(String, Vec<Flag>)>,
    fetches: HashMap<(String, u32), u32>,
    noops: u32,
}

/// A fake server shared by every connection made to it.
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn with_mailbox(self, name: &str) -> Self {
        let validity = 1000 + u32::try_from(self.lock().mailboxes.len()).unwrap();
        self.lock()
            .mailboxes
            .insert(name.to_string(), MemoryMailbox::new(validity));
        self
    }

    /// Stores a message directly, bypassing APPEND bookkeeping.
    pub fn add(&self, mailbox: &str, body: Vec<u8>, flags: Vec<Flag>) -> u32 {
        let mut state = self.lock();
        let mailbox = state
            .mailboxes
            .entry(mailbox.to_string())
            .or_insert_with(|| MemoryMailbox::new(1));
        let uid = mailbox.uid_next;
        mailbox.uid_next += 1;
        mailbox.messages.push(StoredMessage { uid, body, flags });
        uid
    }

    pub fn messages(&self, mailbox: &str) -> Vec<StoredMessage> {
        self.lock()
            .mailboxes
            .get(mailbox)
            .map(|m| m.messages.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, mailbox: &str) -> usize {
        self.messages(mailbox).len()
    }

    pub fn connector(&self, host: &str) -> MemoryConnector {
        MemoryConnector {
            host: host.to_string(),
            server: self.clone(),
        }
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub fn noops(&self) -> u32 {
        self.lock().noops
    }

    pub fn appended(&self) -> Vec<(String, Vec<Flag>)> {
        self.lock().appended.clone()
    }

    pub fn fetch_count(&self, mailbox: &str, uid: u32) -> u32 {
        self.lock()
            .fetches
            .get(&(mailbox.to_string(), uid))
            .copied()
            .unwrap_or(0)
    }

    pub fn refuse_connects(&self) {
        self.lock().refuse_connects = true;
    }

    /// Refuses connections once `n` have been made.
    pub fn limit_connects(&self, n: u32) {
        self.lock().max_connects = Some(n);
    }

    /// Kills every open connection.
    pub fn drop_connections(&self) {
        self.lock().generation += 1;
    }

    /// Kills every open connection right after the `n`th successful append.
    pub fn drop_after_appends(&self, n: usize) {
        self.lock().drop_after_appends = Some(n);
    }

    pub fn fail_header_searches(&self, n: u32) {
        self.lock().fail_header_searches = n;
    }

    pub fn fail_fetches(&self, n: u32) {
        self.lock().fail_fetches = n;
    }

    /// Lets `succeed` fetches through, then fails the next `fail`.
    pub fn fail_fetches_after(&self, succeed: u32, fail: u32) {
        let mut state = self.lock();
        state.fetch_grace = succeed;
        state.fail_fetches = fail;
    }

    /// Fails the next `n` Message-ID header fetches.
    pub fn fail_id_fetches(&self, n: u32) {
        self.lock().fail_id_fetches = n;
    }

    pub fn fail_appends(&self, n: u32) {
        self.lock().fail_appends = n;
    }

    pub fn set_uid_validity(&self, mailbox: &str, value: u32) {
        if let Some(m) = self.lock().mailboxes.get_mut(mailbox) {
            m.uid_validity = value;
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    host: String,
    server: MemoryServer,
}

#[async_trait]
impl Connector for MemoryConnector {
    type Store = MemoryStore;

    async fn connect(&self) -> Result<MemoryStore> {
        let mut state = self.server.lock();
        if state.refuse_connects || state.max_connects.is_some_and(|max| state.connects >= max) {
            return Err(Error::Connection(ConnectionError {
                host: self.host.clone(),
                failures: vec!["993/TLS: connection refused".into()],
            }));
        }
        state.connects += 1;
        Ok(MemoryStore {
            server: self.server.clone(),
            generation: state.generation,
            selected: None,
        })
    }

    fn label(&self) -> &str {
        &self.host
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    server: MemoryServer,
    generation: u64,
    selected: Option<String>,
}

fn no(text: &str) -> Error {
    Error::Imap(mailferry_imap::Error::No(text.to_string()))
}

impl MemoryStore {
    fn live(&self) -> Result<MutexGuard<'_, ServerState>> {
        let state = self.server.lock();
        if state.generation != self.generation {
            return Err(Error::Imap(mailferry_imap::Error::ConnectionLost));
        }
        Ok(state)
    }

    fn selected(&self) -> Result<String> {
        self.selected
            .clone()
            .ok_or_else(|| no("no mailbox selected"))
    }
}

fn header_matches(body: &[u8], name: &str, value: &str) -> bool {
    Message::parse_headers(body)
        .get(name)
        .is_some_and(|v| v.contains(value))
}

#[async_trait]
impl MailStore for MemoryStore {
    async fn list_mailboxes(&mut self) -> Result<Vec<String>> {
        Ok(self.live()?.mailboxes.keys().cloned().collect())
    }

    async fn select(&mut self, mailbox: &str) -> Result<SelectInfo> {
        let info = {
            let state = self.live()?;
            let m = state
                .mailboxes
                .get(mailbox)
                .ok_or_else(|| no("mailbox does not exist"))?;
            SelectInfo {
                exists: u32::try_from(m.messages.len()).unwrap(),
                uid_validity: Some(m.uid_validity),
            }
        };
        self.selected = Some(mailbox.to_string());
        Ok(info)
    }

    async fn search_all(&mut self) -> Result<Vec<Uid>> {
        let selected = self.selected()?;
        let state = self.live()?;
        Ok(state.mailboxes[&selected]
            .messages
            .iter()
            .filter_map(|m| Uid::new(m.uid))
            .collect())
    }

    async fn search_header(&mut self, name: &str, value: &str) -> Result<Vec<Uid>> {
        let selected = self.selected()?;
        let mut state = self.live()?;
        if state.fail_header_searches > 0 {
            state.fail_header_searches -= 1;
            return Err(no("search failed"));
        }
        Ok(state.mailboxes[&selected]
            .messages
            .iter()
            .filter(|m| header_matches(&m.body, name, value))
            .filter_map(|m| Uid::new(m.uid))
            .collect())
    }

    async fn fetch(&mut self, uid: Uid) -> Result<Option<FetchedMessage>> {
        let selected = self.selected()?;
        let mut state = self.live()?;
        if state.fetch_grace > 0 {
            state.fetch_grace -= 1;
        } else if state.fail_fetches > 0 {
            state.fail_fetches -= 1;
            return Err(no("fetch failed"));
        }
        *state
            .fetches
            .entry((selected.clone(), uid.get()))
            .or_default() += 1;

        Ok(state.mailboxes[&selected]
            .messages
            .iter()
            .find(|m| m.uid == uid.get())
            .map(|m| {
                // Servers report \Recent on fetch.
                let mut flags = Flags::from_vec(m.flags.clone());
                flags.insert(Flag::Recent);
                FetchedMessage {
                    uid,
                    flags,
                    size: u32::try_from(m.body.len()).unwrap(),
                    body: m.body.clone(),
                }
            }))
    }

    async fn fetch_message_ids(&mut self, uids: &[Uid]) -> Result<Vec<(Uid, Vec<u8>)>> {
        let selected = self.selected()?;
        let mut state = self.live()?;
        if state.fail_id_fetches > 0 {
            state.fail_id_fetches -= 1;
            return Err(no("header fetch failed"));
        }
        let messages = &state.mailboxes[&selected].messages;
        Ok(uids
            .iter()
            .filter_map(|uid| {
                let m = messages.iter().find(|m| m.uid == uid.get())?;
                let id = Message::parse_headers(&m.body)
                    .get("Message-ID")
                    .map(|id| format!("Message-ID: {id}\r\n\r\n"))
                    .unwrap_or_else(|| "\r\n".to_string());
                Some((*uid, id.into_bytes()))
            })
            .collect())
    }

    async fn append(&mut self, mailbox: &str, message: &[u8], flags: &[Flag]) -> Result<()> {
        let mut state = self.live()?;
        if state.fail_appends > 0 {
            state.fail_appends -= 1;
            return Err(no("append failed"));
        }
        if flags.contains(&Flag::Recent) {
            return Err(Error::Imap(mailferry_imap::Error::Bad(
                "\\Recent cannot be set".into(),
            )));
        }

        let target = state
            .mailboxes
            .get_mut(mailbox)
            .ok_or_else(|| no("[TRYCREATE] mailbox does not exist"))?;
        let uid = target.uid_next;
        target.uid_next += 1;
        target.messages.push(StoredMessage {
            uid,
            body: message.to_vec(),
            flags: flags.to_vec(),
        });
        state.appended.push((mailbox.to_string(), flags.to_vec()));

        if state.drop_after_appends == Some(state.appended.len()) {
            state.generation += 1;
        }
        Ok(())
    }

    async fn noop(&mut self) -> Result<()> {
        self.live()?.noops += 1;
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.live()?;
        Ok(())
    }
}
