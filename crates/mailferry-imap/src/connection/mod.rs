//! IMAP connection management.
//!
//! - Configuration (host, port, security mode, timeouts)
//! - TLS/plaintext stream abstraction with STARTTLS upgrade
//! - Framed I/O for the IMAP wire format
//! - Type-state client

mod client;
mod config;
mod framed;
mod stream;

pub use client::{
    Authenticated, Client, NotAuthenticated, SelectFailed, SelectResult, Selected,
};
pub use config::{Config, Security};
pub use framed::FramedStream;
pub use stream::{ImapStream, connect};
