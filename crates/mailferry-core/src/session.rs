//! Self-healing mail store session.
//!
//! A [`Session`] owns one [`MailStore`] connection plus everything needed to
//! replace it: the [`Connector`], the selected mailbox and its UIDVALIDITY.
//! Remote operations go through [`Session::call`], which checks the
//! connection, reconnects and reselects when it is dead, and retries a
//! bounded number of times.

use std::time::Duration;

use mailferry_imap::{Flag, Uid};
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::report::Warning;
use crate::store::{Connector, FetchedMessage, MailStore, SelectInfo};

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Takes the policy from a run configuration.
    #[must_use]
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            delay: config.retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

/// A connection that repairs itself.
pub struct Session<C: Connector> {
    connector: C,
    store: Option<C::Store>,
    selected: Option<String>,
    uid_validity: Option<u32>,
    policy: RetryPolicy,
    reconnects: u32,
    warnings: Vec<Warning>,
}

impl<C: Connector> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.connector.label())
            .field("connected", &self.store.is_some())
            .field("selected", &self.selected)
            .field("reconnects", &self.reconnects)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Session<C> {
    /// Connects with `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if no transport works.
    pub async fn connect(connector: C, policy: RetryPolicy) -> Result<Self> {
        let store = connector.connect().await?;
        Ok(Self {
            connector,
            store: Some(store),
            selected: None,
            uid_validity: None,
            policy,
            reconnects: 0,
            warnings: Vec::new(),
        })
    }

    /// Host label of the underlying connector.
    #[must_use]
    pub fn label(&self) -> &str {
        self.connector.label()
    }

    /// Currently selected mailbox, if any.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Number of reconnects performed so far.
    #[must_use]
    pub const fn reconnect_count(&self) -> u32 {
        self.reconnects
    }

    /// Drains warnings raised while healing the connection.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Makes sure the connection answers, reconnecting and reselecting the
    /// current mailbox if it does not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if reconnecting fails, or the SELECT
    /// error if the mailbox cannot be reselected.
    pub async fn ensure_alive(&mut self) -> Result<()> {
        if let Some(store) = self.store.as_mut() {
            match store.noop().await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(host = self.connector.label(), error = %e, "liveness check failed"),
            }
        }
        self.reconnect().await
    }

    async fn reconnect(&mut self) -> Result<()> {
        // The old connection is gone either way.
        self.store = None;

        info!(host = self.connector.label(), "reconnecting");
        let mut store = self.connector.connect().await?;
        self.reconnects += 1;

        if let Some(mailbox) = self.selected.clone() {
            warn!(
                host = self.connector.label(),
                mailbox = %mailbox,
                "reselecting after reconnect; previously fetched UIDs are assumed stable"
            );
            let info = store.select(&mailbox).await?;
            if info.uid_validity != self.uid_validity {
                warn!(
                    mailbox = %mailbox,
                    before = ?self.uid_validity,
                    after = ?info.uid_validity,
                    "UIDVALIDITY changed across reconnect"
                );
                self.warnings.push(Warning::UidValidityChanged {
                    mailbox: mailbox.clone(),
                });
                self.uid_validity = info.uid_validity;
            }
        }

        self.store = Some(store);
        Ok(())
    }

    /// Runs `op` against the live connection with retry.
    ///
    /// Before every attempt the connection is checked and healed. Fatal
    /// errors are returned at once; anything else is retried after the
    /// policy delay and, once attempts run out, wrapped in
    /// [`Error::Operation`].
    ///
    /// # Errors
    ///
    /// Returns the fatal error, or [`Error::Operation`] with the last
    /// attempt's error.
    pub async fn call<T, F>(&mut self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: AsyncFnMut(&mut C::Store) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match self.ensure_alive().await {
                Ok(()) => match self.store.as_mut() {
                    Some(store) => op(store).await,
                    None => Err(mailferry_imap::Error::ConnectionLost.into()),
                },
                Err(e) => Err(e),
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => e,
            };

            if attempt >= self.policy.attempts {
                return Err(Error::Operation {
                    operation,
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            warn!(
                host = self.connector.label(),
                operation,
                attempt,
                error = %error,
                "operation failed, retrying"
            );
            tokio::time::sleep(self.policy.delay).await;
            attempt += 1;
        }
    }

    /// Sends an advisory NOOP. The outcome is only logged; a dead
    /// connection is repaired by the next [`call`](Self::call).
    pub async fn probe(&mut self) {
        if let Some(store) = self.store.as_mut()
            && let Err(e) = store.noop().await
        {
            debug!(host = self.connector.label(), error = %e, "advisory NOOP failed");
        }
    }

    /// Lists selectable mailboxes.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn list_mailboxes(&mut self) -> Result<Vec<String>> {
        self.call("list", async |store: &mut C::Store| store.list_mailboxes().await)
            .await
    }

    /// Selects `mailbox` and remembers it for reselection.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn select(&mut self, mailbox: &str) -> Result<SelectInfo> {
        // A refused SELECT leaves no mailbox selected on the server.
        self.selected = None;
        self.uid_validity = None;
        let info = self
            .call("select", async |store: &mut C::Store| store.select(mailbox).await)
            .await?;
        self.selected = Some(mailbox.to_string());
        self.uid_validity = info.uid_validity;
        Ok(info)
    }

    /// All UIDs of the selected mailbox.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn search_all(&mut self) -> Result<Vec<Uid>> {
        self.call("search", async |store: &mut C::Store| store.search_all().await)
            .await
    }

    /// UIDs of the selected mailbox whose header `name` matches `value`.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn search_header(&mut self, name: &str, value: &str) -> Result<Vec<Uid>> {
        self.call("search", async |store: &mut C::Store| {
            store.search_header(name, value).await
        })
        .await
    }

    /// Fetches one message of the selected mailbox.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn fetch(&mut self, uid: Uid) -> Result<Option<FetchedMessage>> {
        self.call("fetch", async |store: &mut C::Store| store.fetch(uid).await)
            .await
    }

    /// Fetches the Message-ID header blocks of `uids`.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn fetch_message_ids(&mut self, uids: &[Uid]) -> Result<Vec<(Uid, Vec<u8>)>> {
        self.call("fetch", async |store: &mut C::Store| {
            store.fetch_message_ids(uids).await
        })
        .await
    }

    /// Appends a message to `mailbox`.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn append(&mut self, mailbox: &str, message: &[u8], flags: &[Flag]) -> Result<()> {
        self.call("append", async |store: &mut C::Store| {
            store.append(mailbox, message, flags).await
        })
        .await
    }

    /// Logs out. Errors are logged and otherwise ignored.
    pub async fn logout(&mut self) {
        if let Some(mut store) = self.store.take()
            && let Err(e) = store.logout().await
        {
            debug!(host = self.connector.label(), error = %e, "logout failed");
        }
    }
}
