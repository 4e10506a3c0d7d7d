//! FETCH response parsing.

use crate::Result;
use crate::parser::lexer::{Lexer, Token};
use crate::types::Uid;

use super::FetchItem;
use super::data::{flag_list, skip_list};

/// Parses the parenthesized item list of a FETCH response.
pub fn items(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => match name.to_uppercase().as_str() {
                "FLAGS" => {
                    lexer.expect_space()?;
                    items.push(FetchItem::Flags(flag_list(lexer)?));
                }
                "UID" => {
                    lexer.expect_space()?;
                    let n = lexer.read_number()?;
                    let uid = Uid::new(n).ok_or_else(|| lexer.error("UID cannot be 0"))?;
                    items.push(FetchItem::Uid(uid));
                }
                "RFC822.SIZE" => {
                    lexer.expect_space()?;
                    items.push(FetchItem::Rfc822Size(lexer.read_number()?));
                }
                "BODY" | "BINARY" | "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => {
                    let section = read_section(lexer)?;
                    // BODY without a section is BODYSTRUCTURE's short form.
                    if name.eq_ignore_ascii_case("BODY") && section.is_none() {
                        lexer.expect_space()?;
                        skip_value(lexer)?;
                        continue;
                    }
                    lexer.expect_space()?;
                    let data = read_nstring_bytes(lexer)?;
                    items.push(FetchItem::Body {
                        section: section.filter(|s| !s.is_empty()),
                        data,
                    });
                }
                _ => {
                    let _ = read_section(lexer)?;
                    lexer.expect_space()?;
                    skip_value(lexer)?;
                }
            },
            token => {
                return Err(lexer.error(&format!("Unexpected token in FETCH: {token:?}")));
            }
        }
    }

    Ok(items)
}

/// Reads an optional `[section]<origin>` suffix.
///
/// Returns `Some("")` for `BODY[]` and `None` when no bracket follows.
/// The section is taken verbatim since it may contain spaces and
/// parentheses, e.g. `HEADER.FIELDS (MESSAGE-ID)`.
fn read_section(lexer: &mut Lexer<'_>) -> Result<Option<String>> {
    if lexer.peek() != Some(b'[') {
        return Ok(None);
    }
    lexer.advance();

    let mut section = Vec::new();
    loop {
        match lexer.advance() {
            Some(b']') => break,
            Some(b) => section.push(b),
            None => return Err(lexer.error("Unterminated section")),
        }
    }

    if lexer.peek() == Some(b'<') {
        while let Some(b) = lexer.advance() {
            if b == b'>' {
                break;
            }
        }
    }

    Ok(Some(String::from_utf8_lossy(&section).into_owned()))
}

fn read_nstring_bytes(lexer: &mut Lexer<'_>) -> Result<Option<Vec<u8>>> {
    match lexer.next_token()? {
        Token::Nil => Ok(None),
        Token::Literal(data) => Ok(Some(data.to_vec())),
        Token::QuotedString(s) => Ok(Some(s.into_bytes())),
        token => Err(lexer.error(&format!("Expected nstring, got {token:?}"))),
    }
}

/// Skips one value: an atom, number, string, literal, NIL or nested list.
fn skip_value(lexer: &mut Lexer<'_>) -> Result<()> {
    match lexer.next_token()? {
        Token::LParen => skip_list(lexer),
        Token::Eof | Token::Crlf | Token::RParen => Err(lexer.error("Expected value")),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::types::Flag;

    use super::*;

    #[test]
    fn full_message_literal() {
        let input = b"(UID 7 FLAGS (\\Seen \\Recent) RFC822.SIZE 5 BODY[] {5}\r\nhello)";
        let items = items(&mut Lexer::new(input)).unwrap();

        assert!(items.contains(&FetchItem::Uid(Uid::new(7).unwrap())));
        assert!(items.contains(&FetchItem::Rfc822Size(5)));
        assert!(items.iter().any(
            |i| matches!(i, FetchItem::Flags(f) if f.contains(&Flag::Recent) && f.contains(&Flag::Seen))
        ));
        assert!(items.contains(&FetchItem::Body {
            section: None,
            data: Some(b"hello".to_vec()),
        }));
    }

    #[test]
    fn header_fields_section() {
        let input =
            b"(UID 3 BODY[HEADER.FIELDS (MESSAGE-ID)] {23}\r\nMessage-ID: <a@b.c>\r\n\r\n)";
        let items = items(&mut Lexer::new(input)).unwrap();

        assert_eq!(
            items[1],
            FetchItem::Body {
                section: Some("HEADER.FIELDS (MESSAGE-ID)".to_string()),
                data: Some(b"Message-ID: <a@b.c>\r\n\r\n".to_vec()),
            }
        );
    }

    #[test]
    fn nil_body() {
        let items = items(&mut Lexer::new(b"(BODY[] NIL)")).unwrap();
        assert_eq!(
            items,
            vec![FetchItem::Body {
                section: None,
                data: None
            }]
        );
    }

    #[test]
    fn skips_unknown_items() {
        let input = b"(INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" MODSEQ (12) UID 9)";
        let items = items(&mut Lexer::new(input)).unwrap();
        assert_eq!(items, vec![FetchItem::Uid(Uid::new(9).unwrap())]);
    }

    #[test]
    fn skips_envelope_with_nested_lists() {
        let input = b"(ENVELOPE (NIL \"subj\" ((NIL NIL \"a\" \"b.c\")) NIL NIL NIL NIL NIL NIL NIL) UID 2)";
        let items = items(&mut Lexer::new(input)).unwrap();
        assert_eq!(items, vec![FetchItem::Uid(Uid::new(2).unwrap())]);
    }
}
