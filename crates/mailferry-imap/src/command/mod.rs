//! Client commands and their wire encoding.

mod tag;

use crate::types::{Flag, Mailbox, UidSet};

pub use tag::TagGenerator;

/// A data item requested by UID FETCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// `UID`
    Uid,
    /// `FLAGS`
    Flags,
    /// `RFC822.SIZE`
    Rfc822Size,
    /// `BODY[section]`, or `BODY.PEEK[section]` which leaves `\Seen` alone.
    Body {
        /// Section such as `HEADER.FIELDS (MESSAGE-ID)`; the whole message
        /// when `None`.
        section: Option<String>,
        /// Use `BODY.PEEK`.
        peek: bool,
    },
}

/// What UID SEARCH matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// Every message.
    All,
    /// Messages whose header field (name, value) contains the value.
    Header(String, String),
}

/// A command the client can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `CAPABILITY`
    Capability,
    /// `NOOP`
    Noop,
    /// `LOGOUT`
    Logout,
    /// `STARTTLS`
    StartTls,
    /// `LOGIN user pass`
    Login {
        /// Login name.
        username: String,
        /// Password.
        password: String,
    },
    /// `SELECT mailbox`
    Select {
        /// Mailbox to open.
        mailbox: Mailbox,
    },
    /// `LIST reference pattern`
    List {
        /// Reference name, usually empty.
        reference: String,
        /// Pattern with `*`/`%` wildcards.
        pattern: String,
    },
    /// `APPEND mailbox (flags) {size}`
    ///
    /// Encodes up to the literal announcement; the message itself is sent
    /// after the server's continuation.
    Append {
        /// Target mailbox.
        mailbox: Mailbox,
        /// Flags to store with the message.
        flags: Vec<Flag>,
        /// Literal length in bytes.
        size: usize,
    },
    /// `UID SEARCH criteria`
    UidSearch(SearchCriteria),
    /// `UID FETCH set (attributes)`
    UidFetch {
        /// Messages to fetch.
        uids: UidSet,
        /// Data items.
        attributes: Vec<FetchAttribute>,
    },
}

impl Command {
    /// Encodes the whole command, CRLF included, under `tag`.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        self.serialize_pieces(tag).concat()
    }

    /// Encodes the command under `tag`, split after every literal
    /// announcement. Each piece after the first may only be sent once the
    /// server has answered the previous one with a continuation.
    #[must_use]
    pub fn serialize_pieces(&self, tag: &str) -> Vec<Vec<u8>> {
        let mut out = Encoder::new();
        out.raw(tag).raw(" ");

        match self {
            Self::Capability => {
                out.raw("CAPABILITY");
            }
            Self::Noop => {
                out.raw("NOOP");
            }
            Self::Logout => {
                out.raw("LOGOUT");
            }
            Self::StartTls => {
                out.raw("STARTTLS");
            }
            Self::Login { username, password } => {
                out.raw("LOGIN ").astring(username).raw(" ").astring(password);
            }
            Self::Select { mailbox } => {
                out.raw("SELECT ").astring(mailbox.as_str());
            }
            Self::List { reference, pattern } => {
                out.raw("LIST ").astring(reference).raw(" ").astring(pattern);
            }
            Self::Append {
                mailbox,
                flags,
                size,
            } => {
                out.raw("APPEND ").astring(mailbox.as_str());
                if !flags.is_empty() {
                    out.raw(" ").list(flags.as_slice(), |out, flag| {
                        out.raw(flag.as_str());
                    });
                }
                out.raw(&format!(" {{{size}}}"));
            }
            Self::UidSearch(criteria) => {
                out.raw("UID SEARCH ");
                match criteria {
                    SearchCriteria::All => {
                        out.raw("ALL");
                    }
                    SearchCriteria::Header(name, value) => {
                        if !name.is_ascii() || !value.is_ascii() {
                            out.raw("CHARSET UTF-8 ");
                        }
                        out.raw("HEADER ").astring(name).raw(" ").astring(value);
                    }
                }
            }
            Self::UidFetch { uids, attributes } => {
                out.raw("UID FETCH ").raw(&uids.to_string()).raw(" ");
                if let [single] = attributes.as_slice() {
                    out.attribute(single);
                } else {
                    out.list(attributes.as_slice(), Encoder::attribute);
                }
            }
        }

        out.finish()
    }
}

/// Appends protocol tokens; a literal closes the current piece.
struct Encoder {
    pieces: Vec<Vec<u8>>,
    line: Vec<u8>,
}

impl Encoder {
    fn new() -> Self {
        Self {
            pieces: Vec::new(),
            line: Vec::with_capacity(64),
        }
    }

    fn raw(&mut self, text: &str) -> &mut Self {
        self.line.extend_from_slice(text.as_bytes());
        self
    }

    /// Writes `text` as an atom when it can be one, as a literal when a
    /// quoted string cannot carry it, otherwise quoted.
    fn astring(&mut self, text: &str) -> &mut Self {
        if text.bytes().any(needs_literal) {
            return self.literal(text.as_bytes());
        }
        if !text.is_empty() && !text.bytes().any(needs_quoting) {
            return self.raw(text);
        }
        self.line.push(b'"');
        for b in text.bytes() {
            if matches!(b, b'"' | b'\\') {
                self.line.push(b'\\');
            }
            self.line.push(b);
        }
        self.line.push(b'"');
        self
    }

    /// `{n}` CRLF, then `data` at the start of the next piece.
    fn literal(&mut self, data: &[u8]) -> &mut Self {
        self.raw(&format!("{{{}}}\r\n", data.len()));
        self.pieces.push(std::mem::take(&mut self.line));
        self.line.extend_from_slice(data);
        self
    }

    fn finish(mut self) -> Vec<Vec<u8>> {
        self.line.extend_from_slice(b"\r\n");
        self.pieces.push(self.line);
        self.pieces
    }

    /// Writes a parenthesized, space-separated list.
    fn list<T>(&mut self, items: &[T], mut write: impl FnMut(&mut Self, &T)) -> &mut Self {
        self.line.push(b'(');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.line.push(b' ');
            }
            write(self, item);
        }
        self.line.push(b')');
        self
    }

    fn attribute(&mut self, attribute: &FetchAttribute) {
        match attribute {
            FetchAttribute::Uid => self.raw("UID"),
            FetchAttribute::Flags => self.raw("FLAGS"),
            FetchAttribute::Rfc822Size => self.raw("RFC822.SIZE"),
            FetchAttribute::Body { section, peek } => self
                .raw(if *peek { "BODY.PEEK[" } else { "BODY[" })
                .raw(section.as_deref().unwrap_or(""))
                .raw("]"),
        };
    }
}

/// Bytes a quoted string cannot carry.
const fn needs_literal(b: u8) -> bool {
    matches!(b, b'\0' | b'\r' | b'\n') || b >= 0x80
}

/// Bytes that cannot appear in an atom.
const fn needs_quoting(b: u8) -> bool {
    b < 0x20
        || b >= 0x7F
        || matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']')
}
