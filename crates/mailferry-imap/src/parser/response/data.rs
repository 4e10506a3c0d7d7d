//! Response codes and the data lists shared by several responses.

use crate::Result;
use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    Capability, Flag, Flags, ListResponse, Mailbox, MailboxAttribute, ResponseCode, Uid,
    UidValidity,
};

fn uid(lexer: &mut Lexer<'_>) -> Result<Uid> {
    lexer.expect_space()?;
    let n = lexer.read_number()?;
    Uid::new(n).ok_or_else(|| lexer.error("UID 0"))
}

fn uid_validity(lexer: &mut Lexer<'_>) -> Result<UidValidity> {
    lexer.expect_space()?;
    let n = lexer.read_number()?;
    UidValidity::new(n).ok_or_else(|| lexer.error("UIDVALIDITY 0"))
}

/// `[CODE args]`. Arguments of codes this client ignores are skipped.
pub fn response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;
    let name = lexer.read_atom_string()?;

    let code = match name.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDNEXT" => ResponseCode::UidNext(uid(lexer)?),
        "UIDVALIDITY" => ResponseCode::UidValidity(uid_validity(lexer)?),
        "APPENDUID" => ResponseCode::AppendUid {
            uidvalidity: uid_validity(lexer)?,
            uid: uid(lexer)?,
        },
        "CAPABILITY" => ResponseCode::Capability(capabilities(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(flag_list(lexer)?.into_iter().collect())
        }
        _ => ResponseCode::Unknown(name.to_string()),
    };

    while !lexer.is_eof() && lexer.peek() != Some(b']') {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;
    Ok(code)
}

/// Space-prefixed capability atoms up to the end of the line or code.
pub fn capabilities(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut found = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Atom(name) = lexer.next_token()? {
            found.push(Capability::parse(name));
        }
    }
    Ok(found)
}

/// `(flag ...)`
pub fn flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;
    let mut flags = Flags::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => return Ok(flags),
            // PERMANENTFLAGS' `\*` lexes as `\` then `*`.
            Token::Space | Token::Asterisk | Token::Atom("\\") => {}
            Token::Atom(name) => flags.insert(Flag::parse(name)),
            other => return Err(lexer.error(&format!("{other:?} in flag list"))),
        }
    }
}

/// `(attributes) delimiter name`
pub fn list_entry(lexer: &mut Lexer<'_>) -> Result<ListResponse> {
    lexer.expect(Token::LParen)?;
    let mut attributes = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => attributes.push(MailboxAttribute::parse(name)),
            other => return Err(lexer.error(&format!("{other:?} in LIST attributes"))),
        }
    }

    lexer.expect_space()?;
    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::QuotedString(s) => s.chars().next(),
        other => return Err(lexer.error(&format!("{other:?} as hierarchy delimiter"))),
    };

    lexer.expect_space()?;
    Ok(ListResponse {
        attributes,
        delimiter,
        mailbox: Mailbox::new(lexer.read_astring()?),
    })
}

/// Numbers of a SEARCH response.
pub fn search_hits(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut hits = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.advance();
        match lexer.next_token()? {
            Token::Number(n) if n > 0 => hits.push(n),
            // `(MODSEQ n)` from CONDSTORE servers.
            Token::LParen => skip_list(lexer)?,
            _ => {}
        }
    }
    Ok(hits)
}

/// Skips to the `)` matching an already consumed `(`.
pub fn skip_list(lexer: &mut Lexer<'_>) -> Result<()> {
    let mut open = 1usize;
    while open > 0 {
        match lexer.next_token()? {
            Token::LParen => open += 1,
            Token::RParen => open -= 1,
            Token::Eof | Token::Crlf => return Err(lexer.error("unbalanced parentheses")),
            _ => {}
        }
    }
    Ok(())
}
