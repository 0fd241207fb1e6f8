//! Statement policy
//!
//! A statement is accepted only if it is a single read-only `SELECT` (or a
//! `WITH ... SELECT`). Accepted statements get a top-level `LIMIT` that never
//! exceeds the caller's limit.

use crate::error::{CoreError, CoreResult};
use crate::sql::lexer::{tokenize, Token, TokenKind};

/// Verbs that write, change schema, or reach outside the database
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "MERGE", "UPSERT",
    "GRANT", "REVOKE", "ATTACH", "DETACH", "VACUUM", "REINDEX", "PRAGMA",
];

/// Leading verbs that start a read
const READ_VERBS: &[&str] = &["SELECT", "WITH"];

/// A statement that passed inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectedStatement {
    tokens: Vec<Token>,
    /// Byte offset just past the last token of the statement
    end: usize,
}

impl InspectedStatement {
    /// Top-level `LIMIT` count, if the statement has one
    pub fn limit(&self, sql: &str) -> CoreResult<Option<LimitClause>> {
        find_limit(sql, &self.tokens)
    }
}

/// Location and value of the row count in a top-level `LIMIT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitClause {
    pub count: u64,
    pub start: usize,
    pub end: usize,
}

/// Check that `sql` is exactly one read-only statement
///
/// Forbidden verbs are reported before structural problems so that
/// `SELECT 1; DROP TABLE t` surfaces as a forbidden operation.
pub fn inspect(sql: &str) -> CoreResult<InspectedStatement> {
    let tokens = tokenize(sql)?;

    for token in &tokens {
        if let TokenKind::Word(word) = &token.kind {
            if FORBIDDEN_KEYWORDS.contains(&word.as_str()) {
                tracing::warn!(verb = %word, "Rejected statement with forbidden verb");
                return Err(CoreError::ForbiddenOperation(format!(
                    "{} statements are not allowed",
                    word
                )));
            }
        }
    }

    // Comments never become tokens, so only a real token after `;` counts
    let body_len = tokens
        .iter()
        .rposition(|t| t.kind != TokenKind::Semicolon)
        .map(|p| p + 1)
        .ok_or_else(|| CoreError::QueryRejected("statement is empty".into()))?;
    let mut tokens = tokens;
    tokens.truncate(body_len);

    if tokens.iter().any(|t| t.kind == TokenKind::Semicolon) {
        tracing::warn!("Rejected multi-statement input");
        return Err(CoreError::QueryRejected(
            "only a single statement may be executed".into(),
        ));
    }

    match &tokens[0].kind {
        TokenKind::Word(verb) if READ_VERBS.contains(&verb.as_str()) => {}
        TokenKind::Word(verb) if verb == "REPLACE" => {
            return Err(CoreError::ForbiddenOperation(
                "REPLACE statements are not allowed".into(),
            ));
        }
        TokenKind::Word(verb) => {
            return Err(CoreError::QueryRejected(format!(
                "only SELECT statements may be executed, found {}",
                verb
            )));
        }
        _ => {
            return Err(CoreError::QueryRejected(
                "statement must start with SELECT".into(),
            ));
        }
    }

    if tokens.iter().any(|t| t.kind == TokenKind::Param) {
        return Err(CoreError::QueryRejected(
            "bind parameters are not supported".into(),
        ));
    }

    let end = tokens.last().map(|t| t.end).unwrap_or(0);
    Ok(InspectedStatement { tokens, end })
}

/// Inspect `sql` and rewrite it so that at most `limit` rows come back
///
/// A missing top-level `LIMIT` is appended; a larger one is clamped down.
pub fn enforce_limit(sql: &str, limit: usize) -> CoreResult<String> {
    let statement = inspect(sql)?;
    let body = &sql[..statement.end];

    match statement.limit(sql)? {
        Some(clause) if clause.count <= limit as u64 => Ok(body.to_string()),
        Some(clause) => {
            tracing::debug!(from = clause.count, to = limit, "Clamped LIMIT");
            Ok(format!("{}{}{}", &sql[..clause.start], limit, &body[clause.end..]))
        }
        None => Ok(format!("{} LIMIT {}", body, limit)),
    }
}

fn parse_count(token: &Token) -> CoreResult<u64> {
    match &token.kind {
        TokenKind::Number(n) => n.parse::<u64>().map_err(|_| {
            CoreError::QueryRejected(format!("LIMIT must be a non-negative integer, got {}", n))
        }),
        _ => Err(CoreError::QueryRejected(
            "LIMIT must be an integer literal".into(),
        )),
    }
}

/// Locate the last top-level `LIMIT` and the token holding its row count
///
/// Handles `LIMIT n`, `LIMIT n OFFSET m` and SQLite's `LIMIT m, n`.
fn find_limit(sql: &str, tokens: &[Token]) -> CoreResult<Option<LimitClause>> {
    let Some(pos) = tokens
        .iter()
        .rposition(|t| t.depth == 0 && t.is_word("LIMIT"))
    else {
        return Ok(None);
    };

    let rest = &tokens[pos + 1..];
    let count_token = match rest {
        [n] => n,
        [n, offset_kw, m] if offset_kw.is_word("OFFSET") => {
            parse_count(m)?;
            n
        }
        [m, comma, n] if comma.kind == TokenKind::Comma => {
            parse_count(m)?;
            n
        }
        _ => {
            return Err(CoreError::QueryRejected(format!(
                "unsupported LIMIT clause: {}",
                sql[tokens[pos].start..].trim()
            )))
        }
    };

    let count = parse_count(count_token)?;
    Ok(Some(LimitClause {
        count,
        start: count_token.start,
        end: count_token.end,
    }))
}
