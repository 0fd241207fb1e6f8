//! SQL text handling shared by the synthesizer and the executor
//!
//! - `lexer`: token scanner aware of literals, quoted identifiers and comments
//! - `policy`: single-statement / read-only checks and `LIMIT` enforcement

pub mod lexer;
pub mod policy;

pub use policy::{enforce_limit, inspect, InspectedStatement, FORBIDDEN_KEYWORDS};

/// Words that must be quoted when used as identifiers
const RESERVED_WORDS: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "COLUMN", "CONSTRAINT",
    "CROSS", "DEFAULT", "DESC", "DISTINCT", "ELSE", "END", "EXCEPT", "EXISTS", "FROM", "FULL",
    "GROUP", "HAVING", "IN", "INDEX", "INNER", "INTERSECT", "INTO", "IS", "JOIN", "KEY", "LEFT",
    "LIKE", "LIMIT", "NATURAL", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER",
    "PRIMARY", "REFERENCES", "REPLACE", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TO",
    "UNION", "UNIQUE", "USER", "USING", "VALUES", "VIEW", "WHEN", "WHERE", "WITH",
];

/// Quote an identifier unless it is a plain, non-reserved word
///
/// Plain means ASCII letters, digits and underscores, not starting with a
/// digit. Embedded double quotes are doubled.
pub fn quote_ident(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    let upper = name.to_ascii_uppercase();
    let reserved = RESERVED_WORDS.contains(&upper.as_str())
        || FORBIDDEN_KEYWORDS.contains(&upper.as_str());

    if plain && !reserved {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Render a string as a single-quoted SQL literal
///
/// Control characters are dropped; single quotes are doubled.
pub fn quote_literal(value: &str) -> String {
    let cleaned: String = value.chars().filter(|c| !c.is_control()).collect();
    format!("'{}'", cleaned.replace('\'', "''"))
}
