//! Tokenizer for the assembly dialect.
//!
//! Tokens carry their byte offset and length so errors can point back at
//! the source. The stream always ends with a zero-length newline
//! sentinel, which lets the parser treat "line" uniformly even when the
//! source has no trailing newline.

use thiserror::Error;

/// What a token is, plus its payload where one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A run of spaces and tabs.
    Space,
    /// `#` to end of line.
    Comment,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `\n` or `\r`.
    NewLine,
    /// A decimal or `0x` hexadecimal number, optionally signed.
    Number(i64),
    /// An identifier: mnemonic, register, label, or directive name.
    Literal(String),
}

/// One token with its span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token's kind and payload.
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
    /// Length in bytes; zero only for the trailing newline sentinel.
    pub length: usize,
}

/// A character sequence no token matches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unable to lex '{line}' at byte {offset}")]
pub struct LexError {
    /// The full source line containing the bad character.
    pub line: String,
    /// Byte offset of the bad character within the source.
    pub offset: usize,
}

fn is_literal_start(c: char) -> bool {
    c.is_alphabetic() || c == '-' || c == '_'
}

fn is_literal_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// Matches a run of spaces and tabs.
fn lex_space(rest: &str) -> Option<(TokenKind, usize)> {
    let length = rest
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count();
    (length > 0).then_some((TokenKind::Space, length))
}

/// Matches `#` up to (not including) the end of the line.
fn lex_comment(rest: &str) -> Option<(TokenKind, usize)> {
    if !rest.starts_with('#') {
        return None;
    }
    let length = rest
        .bytes()
        .take_while(|b| *b != b'\n' && *b != b'\r')
        .count();
    Some((TokenKind::Comment, length))
}

fn lex_punctuation(rest: &str) -> Option<(TokenKind, usize)> {
    let kind = match rest.bytes().next()? {
        b':' => TokenKind::Colon,
        b'.' => TokenKind::Dot,
        b',' => TokenKind::Comma,
        b'\n' | b'\r' => TokenKind::NewLine,
        _ => return None,
    };
    Some((kind, 1))
}

/// Matches `[+-]?`, then `0x` hex digits or decimal digits.
fn lex_number(rest: &str) -> Option<(TokenKind, usize)> {
    let (sign, digits_at) = match rest.bytes().next()? {
        b'+' => (1i64, 1),
        b'-' => (-1i64, 1),
        _ => (1i64, 0),
    };
    let digits = &rest[digits_at..];

    let (radix, body_at) = if digits.starts_with("0x")
        && digits[2..].bytes().next().is_some_and(|b| b.is_ascii_hexdigit())
    {
        (16, digits_at + 2)
    } else {
        (10, digits_at)
    };

    let body_length = rest[body_at..]
        .bytes()
        .take_while(|b| (*b as char).is_digit(radix))
        .count();
    if body_length == 0 {
        return None;
    }

    let value = i64::from_str_radix(&rest[body_at..body_at + body_length], radix).ok()?;
    Some((TokenKind::Number(sign * value), body_at + body_length))
}

fn lex_literal(rest: &str) -> Option<(TokenKind, usize)> {
    let first = rest.chars().next()?;
    if !is_literal_start(first) {
        return None;
    }
    let length = rest
        .chars()
        .take_while(|c| is_literal_continue(*c))
        .map(char::len_utf8)
        .sum();
    Some((TokenKind::Literal(rest[..length].to_owned()), length))
}

/// The source line containing `offset`, for error reporting.
fn line_at(input: &str, offset: usize) -> String {
    let start = input[..offset]
        .rfind(['\n', '\r'])
        .map_or(0, |at| at + 1);
    let end = input[offset..]
        .find(['\n', '\r'])
        .map_or(input.len(), |at| offset + at);
    input[start..end].to_owned()
}

/// Splits `input` into tokens, ending with a zero-length newline sentinel.
///
/// # Errors
///
/// Returns a [`LexError`] naming the line and byte offset where no token
/// matched.
///
/// # Panics
///
/// Panics if a matcher claims a zero-length match; no matcher does.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let matchers: [fn(&str) -> Option<(TokenKind, usize)>; 5] = [
        lex_space,
        lex_comment,
        lex_punctuation,
        lex_number,
        lex_literal,
    ];

    let mut tokens = Vec::new();
    let mut offset = 0;

    'input: while offset < input.len() {
        for matcher in matchers {
            if let Some((kind, length)) = matcher(&input[offset..]) {
                assert!(length > 0, "matcher produced an empty {kind:?}");
                tokens.push(Token {
                    kind,
                    offset,
                    length,
                });
                offset += length;
                continue 'input;
            }
        }
        return Err(LexError {
            line: line_at(input, offset),
            offset,
        });
    }

    tokens.push(Token {
        kind: TokenKind::NewLine,
        offset,
        length: 0,
    });
    Ok(tokens)
}
