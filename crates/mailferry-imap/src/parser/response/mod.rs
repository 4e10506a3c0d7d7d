//! Server response parsing.
//!
//! [`ResponseParser::parse`] takes one complete response, literals included,
//! as cut by [`FramedStream`](crate::connection::FramedStream).

mod data;
mod fetch;

use crate::parser::lexer::{Lexer, Token};
use crate::types::{Capability, Flags, ListResponse, ResponseCode, Tag, Uid};
use crate::{Error, Result};

/// Status keyword of a status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `OK`
    Ok,
    /// `NO`
    No,
    /// `BAD`
    Bad,
    /// `PREAUTH`, only in greetings.
    PreAuth,
    /// `BYE`
    Bye,
}

impl Status {
    fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword.to_ascii_uppercase().as_str() {
            "OK" => Self::Ok,
            "NO" => Self::No,
            "BAD" => Self::Bad,
            "PREAUTH" => Self::PreAuth,
            "BYE" => Self::Bye,
            _ => return None,
        })
    }
}

/// One data item of a FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// `FLAGS (...)`
    Flags(Flags),
    /// `UID n`
    Uid(Uid),
    /// `RFC822.SIZE n`
    Rfc822Size(u32),
    /// `BODY[section]`, `RFC822` and similar.
    Body {
        /// Section text; `None` for the whole message.
        section: Option<String>,
        /// Contents; `None` when the server sent NIL.
        data: Option<Vec<u8>>,
    },
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// `* OK|NO|BAD|PREAUTH|BYE [code] text`
    Status {
        /// Keyword.
        status: Status,
        /// Bracketed response code.
        code: Option<ResponseCode>,
        /// Remaining text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `* FLAGS (...)`
    Flags(Flags),
    /// `* LIST ...`
    List(ListResponse),
    /// `* SEARCH ...`, UIDs after UID SEARCH.
    Search(Vec<u32>),
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(u32),
    /// `* n FETCH (...)`
    Fetch {
        /// Sequence number.
        seq: u32,
        /// Data items.
        items: Vec<FetchItem>,
    },
    /// Data this client does not interpret, as text.
    Other(String),
}

/// A parsed response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Command completion.
    Tagged {
        /// Tag of the completed command.
        tag: Tag,
        /// Outcome.
        status: Status,
        /// Bracketed response code.
        code: Option<ResponseCode>,
        /// Remaining text.
        text: String,
    },
    /// Server data.
    Untagged(UntaggedResponse),
    /// `+ text`, the server waits for a literal.
    Continuation {
        /// Text after `+`, if any.
        text: Option<String>,
    },
}

/// Entry point for response parsing.
#[derive(Debug)]
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the bytes are not a valid response.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);
        match lexer.next_token()? {
            Token::Asterisk => {
                lexer.expect_space()?;
                untagged(&mut lexer).map(Response::Untagged)
            }
            Token::Plus => {
                skip_space(&mut lexer);
                let text = lexer.read_text_until_crlf();
                Ok(Response::Continuation {
                    text: (!text.is_empty()).then_some(text),
                })
            }
            Token::Atom(tag) => {
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?;
                let status = Status::from_keyword(keyword)
                    .ok_or_else(|| lexer.error(&format!("{keyword} is not a status")))?;
                let (code, text) = resp_text(&mut lexer)?;
                Ok(Response::Tagged {
                    tag: Tag::new(tag),
                    status,
                    code,
                    text,
                })
            }
            other => Err(Error::Parse {
                position: 0,
                message: format!("response starts with {other:?}"),
            }),
        }
    }
}

fn untagged(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    match lexer.next_token()? {
        Token::Number(n) => numbered(lexer, n),
        Token::Atom(keyword) => {
            if let Some(status) = Status::from_keyword(keyword) {
                let (code, text) = resp_text(lexer)?;
                return Ok(UntaggedResponse::Status { status, code, text });
            }
            Ok(match keyword.to_ascii_uppercase().as_str() {
                "CAPABILITY" => UntaggedResponse::Capability(data::capabilities(lexer)?),
                "FLAGS" => {
                    lexer.expect_space()?;
                    UntaggedResponse::Flags(data::flag_list(lexer)?)
                }
                "LIST" => {
                    lexer.expect_space()?;
                    UntaggedResponse::List(data::list_entry(lexer)?)
                }
                "SEARCH" => UntaggedResponse::Search(data::search_hits(lexer)?),
                _ => UntaggedResponse::Other(format!("{keyword}{}", lexer.read_text_until_crlf())),
            })
        }
        other => Err(lexer.error(&format!("untagged response starts with {other:?}"))),
    }
}

/// `* n KEYWORD ...`
fn numbered(lexer: &mut Lexer<'_>, n: u32) -> Result<UntaggedResponse> {
    lexer.expect_space()?;
    let keyword = lexer.read_atom_string()?;
    Ok(match keyword.to_ascii_uppercase().as_str() {
        "EXISTS" => UntaggedResponse::Exists(n),
        "RECENT" => UntaggedResponse::Recent(n),
        "EXPUNGE" => UntaggedResponse::Expunge(n),
        "FETCH" => {
            lexer.expect_space()?;
            UntaggedResponse::Fetch {
                seq: n,
                items: fetch::items(lexer)?,
            }
        }
        _ => UntaggedResponse::Other(format!("{n} {keyword}{}", lexer.read_text_until_crlf())),
    })
}

fn skip_space(lexer: &mut Lexer<'_>) {
    if lexer.peek() == Some(b' ') {
        lexer.advance();
    }
}

/// `[SP] ["[" code "]"] [SP] text`; servers may omit any part.
fn resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
    skip_space(lexer);
    let code = if lexer.peek() == Some(b'[') {
        Some(data::response_code(lexer)?)
    } else {
        None
    };
    skip_space(lexer);
    Ok((code, lexer.read_text_until_crlf()))
}
