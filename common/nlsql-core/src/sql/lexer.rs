//! Minimal SQL scanner
//!
//! Splits statement text into tokens with byte spans and parenthesis depth.
//! String literals, quoted identifiers and comments are recognized so that a
//! `;` or keyword inside them is never mistaken for structure.

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keyword or unquoted identifier, stored upper-cased
    Word(String),
    /// `"ident"`, `` `ident` `` or `[ident]`
    QuotedIdent(String),
    /// `'text'`
    StringLit,
    /// Integer or decimal literal
    Number(String),
    /// Bind parameter such as `?`, `?1`, `:name`, `@name`, `$1`
    Param,
    Semicolon,
    OpenParen,
    CloseParen,
    Comma,
    /// Any other operator or punctuation
    Symbol(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// Parenthesis nesting level the token sits at
    pub depth: usize,
}

impl Token {
    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w == word)
    }
}

/// Tokenize `sql`, skipping whitespace and comments
pub fn tokenize(sql: &str) -> CoreResult<Vec<Token>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut depth: usize = 0;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        if c == b'/' && bytes.get(i + 1) == Some(&b'*') {
            let close = sql[i + 2..]
                .find("*/")
                .ok_or_else(|| CoreError::QueryRejected("unterminated block comment".into()))?;
            i += 2 + close + 2;
            continue;
        }

        let kind = match c {
            b'\'' => {
                i = scan_quoted(bytes, i, b'\'')
                    .ok_or_else(|| CoreError::QueryRejected("unterminated string literal".into()))?;
                TokenKind::StringLit
            }
            b'"' | b'`' => {
                i = scan_quoted(bytes, i, c).ok_or_else(|| {
                    CoreError::QueryRejected("unterminated quoted identifier".into())
                })?;
                TokenKind::QuotedIdent(unquote(&sql[start..i]))
            }
            b'[' => {
                let close = sql[i + 1..].find(']').ok_or_else(|| {
                    CoreError::QueryRejected("unterminated quoted identifier".into())
                })?;
                i += 1 + close + 1;
                TokenKind::QuotedIdent(sql[start + 1..i - 1].to_string())
            }
            b';' => {
                i += 1;
                TokenKind::Semicolon
            }
            b'(' => {
                i += 1;
                depth += 1;
                TokenKind::OpenParen
            }
            b')' => {
                i += 1;
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| CoreError::QueryRejected("unbalanced parentheses".into()))?;
                TokenKind::CloseParen
            }
            b',' => {
                i += 1;
                TokenKind::Comma
            }
            b'?' | b':' | b'@' | b'$' => {
                i += 1;
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                if i == start + 1 && c != b'?' {
                    TokenKind::Symbol(c as char)
                } else {
                    TokenKind::Param
                }
            }
            b'0'..=b'9' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
                TokenKind::Number(sql[start..i].to_string())
            }
            b'.' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                TokenKind::Number(sql[start..i].to_string())
            }
            _ if is_ident_start(c) => {
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                TokenKind::Word(sql[start..i].to_ascii_uppercase())
            }
            _ => {
                // Advance over a whole UTF-8 character
                let ch = sql[i..].chars().next().unwrap_or('\u{fffd}');
                i += ch.len_utf8().max(1);
                TokenKind::Symbol(ch)
            }
        };

        let token_depth = if kind == TokenKind::OpenParen { depth - 1 } else { depth };
        tokens.push(Token {
            kind,
            start,
            end: i,
            depth: token_depth,
        });
    }

    if depth != 0 {
        return Err(CoreError::QueryRejected("unbalanced parentheses".into()));
    }
    Ok(tokens)
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 0x80
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80
}

/// Return the index just past the closing quote; doubled quotes are escapes
fn scan_quoted(bytes: &[u8], open: usize, quote: u8) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

fn unquote(raw: &str) -> String {
    let quote = &raw[..1];
    let inner = &raw[1..raw.len() - 1];
    inner.replace(&format!("{0}{0}", quote), quote)
}
