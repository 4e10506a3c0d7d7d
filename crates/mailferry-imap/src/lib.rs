//! # mailferry-imap
//!
//! The async IMAP client underneath mailferry. It covers the command subset
//! needed to copy mail between accounts and back it up: LOGIN, STARTTLS,
//! LIST, SELECT, UID SEARCH, UID FETCH, APPEND and NOOP.
//!
//! ## Connection States
//!
//! The client uses the type-state pattern so that commands are only
//! available in states where the protocol allows them:
//!
//! ```text
//! NotAuthenticated ── login() ──→ Authenticated ── select() ──→ Selected
//!                                                                 │
//!                                                  select() ←─────┘
//! ```
//!
//! `APPEND`, `NOOP` and `CAPABILITY` are valid in every state.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailferry_imap::{Client, Config, FetchAttribute, SearchCriteria, Security, UidSet};
//!
//! # async fn run() -> mailferry_imap::Result<()> {
//! let config = Config::new("imap.example.com", Security::Implicit);
//! let stream = mailferry_imap::connection::connect(&config).await?;
//! let client = Client::from_stream(stream).await?;
//! let client = client.login("user@example.com", "password").await?;
//!
//! let (mut client, status) = client.select("INBOX").await?;
//! println!("{} messages", status.exists);
//!
//! let uids = client.uid_search(SearchCriteria::All).await?;
//! if let Some(set) = UidSet::from_uids(&uids) {
//!     let messages = client.uid_fetch(&set, &[FetchAttribute::Uid, FetchAttribute::Flags]).await?;
//!     println!("fetched {}", messages.len());
//! }
//! client.logout().await
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchAttribute, SearchCriteria, TagGenerator};
pub use connection::{
    Authenticated, Client, Config, FramedStream, ImapStream, NotAuthenticated,
    Security, SelectFailed, SelectResult, Selected,
};
pub use error::{Error, Result};
pub use parser::{FetchItem, Response, ResponseParser, Status, UntaggedResponse};
pub use types::{
    Capability, Flag, Flags, ListResponse, Mailbox, MailboxAttribute, MailboxStatus, ResponseCode,
    Tag, Uid, UidSet, UidValidity, decode_modified_utf7,
};
