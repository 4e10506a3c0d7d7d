//! Tokenizer for server responses.
//!
//! Literal payloads are borrowed from the input, so a message body is only
//! copied once, when the parser takes ownership of it.

use crate::{Error, Result};

/// One lexical unit of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Bare word, including flags such as `\Seen`.
    Atom(&'a str),
    /// `"..."` with escapes resolved.
    QuotedString(String),
    /// Payload of a `{n}` literal.
    Literal(&'a [u8]),
    /// Run of digits.
    Number(u32),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// A single space.
    Space,
    /// `*`
    Asterisk,
    /// `+`
    Plus,
    /// `NIL` in any case.
    Nil,
    /// Line end.
    Crlf,
    /// Input exhausted.
    Eof,
}

/// Cursor over one response.
#[derive(Debug)]
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Starts at the beginning of `input`.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns true once all input is consumed.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// The byte under the cursor.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Consumes and returns the byte under the cursor.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn rest(&self) -> &'a [u8] {
        &self.input[self.pos.min(self.input.len())..]
    }

    fn at_crlf(&self) -> bool {
        self.rest().starts_with(b"\r\n")
    }

    /// Reads the next token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for bytes that start no valid token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        let punct = match byte {
            b' ' => Token::Space,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'*' => Token::Asterisk,
            b'+' => Token::Plus,
            b'\r' if self.at_crlf() => {
                self.pos += 2;
                return Ok(Token::Crlf);
            }
            b'"' => return self.quoted(),
            b'{' => return self.literal(),
            b if is_atom_char(b) => return self.word(),
            b => return Err(self.error(&format!("unexpected byte {b:#04x}"))),
        };
        self.pos += 1;
        Ok(punct)
    }

    fn quoted(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let mut text = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(escaped @ (b'"' | b'\\')) => text.push(escaped),
                    Some(other) => {
                        return Err(self.error(&format!("bad escape \\{}", char::from(other))));
                    }
                    None => return Err(self.error("unterminated quoted string")),
                },
                Some(b) => text.push(b),
                None => return Err(self.error("unterminated quoted string")),
            }
        }
        // Raw 8-bit mailbox names happen; keep what decodes.
        Ok(Token::QuotedString(String::from_utf8_lossy(&text).into_owned()))
    }

    /// `{n}` or `{n+}`, CRLF, then `n` bytes.
    fn literal(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let digits = self.rest().iter().take_while(|b| b.is_ascii_digit()).count();
        let size: usize = std::str::from_utf8(&self.rest()[..digits])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("bad literal length"))?;
        self.pos += digits;

        if self.peek() == Some(b'+') {
            self.pos += 1;
        }
        if !self.rest().starts_with(b"}\r\n") {
            return Err(self.error("literal length not followed by }CRLF"));
        }
        self.pos += 3;

        let Some(data) = self.rest().get(..size) else {
            return Err(self.error("literal shorter than announced"));
        };
        self.pos += size;
        Ok(Token::Literal(data))
    }

    /// Atom, number or NIL.
    fn word(&mut self) -> Result<Token<'a>> {
        let len = self.rest().iter().take_while(|b| is_atom_char(**b)).count();
        let word = std::str::from_utf8(&self.rest()[..len])
            .map_err(|_| self.error("atom is not UTF-8"))?;
        self.pos += len;

        if word.bytes().all(|b| b.is_ascii_digit()) {
            return word
                .parse()
                .map(Token::Number)
                .map_err(|_| self.error("number out of range"));
        }
        if word.eq_ignore_ascii_case("NIL") {
            return Ok(Token::Nil);
        }
        Ok(Token::Atom(word))
    }

    /// A parse error at the cursor.
    pub(crate) fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Consumes a token of the same kind as `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on any other token.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let found = self.next_token()?;
        if std::mem::discriminant(&found) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("wanted {expected:?}, found {found:?}")))
        }
    }

    /// Consumes a space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on any other token.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Reads an atom, number, quoted string or literal as text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on any other token.
    pub fn read_astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(n) => Ok(n.to_string()),
            Token::QuotedString(s) => Ok(s),
            Token::Literal(data) => Ok(String::from_utf8_lossy(data).into_owned()),
            other => Err(self.error(&format!("wanted a string, found {other:?}"))),
        }
    }

    /// Reads a number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on any other token.
    pub fn read_number(&mut self) -> Result<u32> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            other => Err(self.error(&format!("wanted a number, found {other:?}"))),
        }
    }

    /// Reads an atom.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on any other token.
    pub fn read_atom_string(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            other => Err(self.error(&format!("wanted an atom, found {other:?}"))),
        }
    }

    /// Consumes up to, not including, the next CRLF.
    pub fn read_text_until_crlf(&mut self) -> String {
        let rest = self.rest();
        let len = rest
            .windows(2)
            .position(|pair| pair == b"\r\n")
            .unwrap_or(rest.len());
        self.pos += len;
        String::from_utf8_lossy(&rest[..len]).into_owned()
    }
}

/// Returns true for bytes allowed in an atom.
///
/// `\` is allowed so system flags lex as one atom; brackets are not, so
/// `BODY[...]` splits around its section.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b, 0x21..=0x7E) && !matches!(b, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'[' | b']')
}
