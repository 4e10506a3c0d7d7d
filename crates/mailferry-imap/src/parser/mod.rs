//! IMAP protocol parser.
//!
//! A sans-I/O parser for IMAP server responses. Raw bytes are split into
//! tokens by the [`Lexer`]; the [`ResponseParser`] turns one complete
//! response (including any literals) into a [`Response`].
//!
//! # Example
//!
//! ```
//! use mailferry_imap::parser::{ResponseParser, Response, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 12 EXISTS\r\n").unwrap();
//! assert!(matches!(response, Response::Untagged(UntaggedResponse::Exists(12))));
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{Lexer, Token};
pub use response::{FetchItem, Response, ResponseParser, Status, UntaggedResponse};
