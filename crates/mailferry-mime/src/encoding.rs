//! Transfer and header decoding.
//!
//! Base64 and Quoted-Printable bodies (RFC 2045), encoded words in header
//! values (RFC 2047) and extended parameter values (RFC 2231).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Decodes a Base64 body.
///
/// Line breaks and other whitespace are ignored, as mail bodies wrap
/// encoded data at 76 columns.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes a Quoted-Printable body (RFC 2045).
///
/// Soft line breaks (`=` at the end of a line) are removed.
///
/// # Errors
///
/// Returns an error if the input contains an invalid escape sequence.
pub fn decode_quoted_printable(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        match (input.get(i + 1), input.get(i + 2)) {
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) => i += 2,
            // Trailing `=` at the very end of the body.
            (None, _) => i += 1,
            (Some(hi), Some(lo)) => {
                let value = hex_value(*hi)
                    .zip(hex_value(*lo))
                    .map(|(h, l)| (h << 4) | l)
                    .ok_or_else(|| {
                        Error::BadTransferEncoding(format!(
                            "invalid escape =\\x{hi:02x}\\x{lo:02x} at byte {i}"
                        ))
                    })?;
                out.push(value);
                i += 3;
            }
            (Some(_), None) => {
                return Err(Error::BadTransferEncoding(
                    "incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    Ok(out)
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes RFC 2047 encoded words inside a header value.
///
/// Whitespace between two adjacent encoded words is dropped. Words that
/// cannot be decoded are kept verbatim.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = decode_encoded_word(candidate) {
            if !(after_word && before.trim().is_empty()) {
                out.push_str(before);
            }
            out.push_str(&decoded);
            rest = &candidate[consumed..];
            after_word = true;
        } else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }

    out.push_str(rest);
    out
}

/// Decodes one `=?charset?encoding?text?=` word at the start of `s`.
///
/// Returns the decoded text and the number of bytes consumed.
fn decode_encoded_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let (charset, after) = inner.split_once('?')?;
    let (encoding, after) = after.split_once('?')?;
    let end = after.find("?=")?;
    let payload = &after[..end];
    if payload.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(payload.as_bytes()).ok()?,
        "Q" | "q" => decode_q(payload)?,
        _ => return None,
    };

    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((decode_charset(charset, &bytes), consumed))
}

/// The RFC 2047 "Q" encoding: quoted-printable with `_` for space.
fn decode_q(payload: &str) -> Option<Vec<u8>> {
    let replaced = payload.replace('_', " ");
    decode_quoted_printable(replaced.as_bytes()).ok()
}

/// Converts bytes in `charset` to a string.
///
/// UTF-8 and Latin-1 are decoded exactly; anything else is treated as UTF-8
/// with replacement characters.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    // RFC 2231 allows a language suffix: `utf-8*en`.
    let charset = charset.split('*').next().unwrap_or(charset);
    if charset.eq_ignore_ascii_case("iso-8859-1") || charset.eq_ignore_ascii_case("latin1") {
        bytes.iter().map(|&b| char::from(b)).collect()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Decodes an RFC 2231 extended value: `charset'language'percent-encoded`.
///
/// Values without the two `'` separators are percent-decoded as UTF-8.
#[must_use]
pub fn decode_rfc2231(value: &str) -> String {
    let mut pieces = value.splitn(3, '\'');
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(charset), Some(_language), Some(encoded)) => {
            decode_charset(charset, &percent_decode(encoded))
        }
        _ => String::from_utf8_lossy(&percent_decode(value)).into_owned(),
    }
}

/// Percent-decodes `%XX` sequences, leaving malformed ones untouched.
#[must_use]
pub fn percent_decode(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let (Some(&hi), Some(&lo)) = (bytes.get(i + 1), bytes.get(i + 2))
            && let (Some(h), Some(l)) = (hex_value(hi), hex_value(lo))
        {
            out.push((h << 4) | l);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}
