//! # mailferry-mime
//!
//! Just enough MIME for mailferry: header lookup, content types and
//! dispositions, a recursive multipart walk and transfer decoding.
//!
//! Messages are never re-encoded. The raw bytes fetched from a server are
//! what gets stored and appended; this crate only looks inside them to find
//! the `Message-ID` and to pull out attachments for backups.
//!
//! ## Quick Start
//!
//! ```
//! use mailferry_mime::Message;
//!
//! let raw = b"Message-ID: <1@example.com>\r\n\
//! Content-Type: multipart/mixed; boundary=b1\r\n\
//! \r\n\
//! --b1\r\n\
//! Content-Type: text/plain\r\n\
//! \r\n\
//! Hello\r\n\
//! --b1\r\n\
//! Content-Type: text/plain; name=notes.txt\r\n\
//! Content-Disposition: attachment\r\n\
//! \r\n\
//! some notes\r\n\
//! --b1--\r\n";
//!
//! let message = Message::parse(raw).unwrap();
//! assert_eq!(message.message_id(), Some("<1@example.com>"));
//!
//! let attachments = message.attachments().unwrap();
//! assert_eq!(attachments[0].filename, "notes.txt");
//! assert_eq!(attachments[0].data, b"some notes");
//! ```

#![forbid(unsafe_code)]

mod attachment;
mod content_type;
mod error;
mod header;
mod message;
mod part;

pub mod encoding;

pub use attachment::{Attachment, sanitize_filename};
pub use content_type::{ContentDisposition, ContentType, DispositionKind};
pub use error::{Error, Result};
pub use header::{Headers, split_header_body};
pub use message::Message;
pub use part::{Part, TransferEncoding};
