//! Read vs. mutation intent detection

use serde::{Deserialize, Serialize};

use super::words::{clauses, tokenize, NlToken};

/// What the request asks the database to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Read,
    Mutation(MutationKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
    Drop,
    Create,
    Alter,
    Truncate,
}

impl MutationKind {
    pub fn verb(&self) -> &'static str {
        match self {
            MutationKind::Insert => "INSERT",
            MutationKind::Update => "UPDATE",
            MutationKind::Delete => "DELETE",
            MutationKind::Drop => "DROP",
            MutationKind::Create => "CREATE",
            MutationKind::Alter => "ALTER",
            MutationKind::Truncate => "TRUNCATE",
        }
    }

    /// Whether the mutation targets existing rows that a read can preview
    pub fn touches_existing_rows(&self) -> bool {
        matches!(self, MutationKind::Update | MutationKind::Delete)
    }
}

/// How mutation requests are answered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPolicy {
    /// Refuse every mutation request
    #[default]
    Decline,
    /// Answer update/delete requests with a `SELECT` of the rows they would
    /// touch; refuse the rest
    PreviewAffectedRows,
}

/// Words that may precede the actual verb of a request
const COURTESY: &[&str] = &[
    "please", "pls", "kindly", "can", "could", "would", "will", "you", "i", "we", "want",
    "need", "like", "to", "let", "lets", "us", "go", "ahead", "and", "now", "just", "quickly",
    "hey", "ok", "okay",
];

/// Words that open a further clause inside one request
const CLAUSE_WORDS: &[&str] = &["and", "then", "also"];

fn verb_kind(tokens: &[NlToken], i: usize) -> Option<MutationKind> {
    let word = tokens.get(i)?.word()?;
    let next = tokens.get(i + 1).and_then(NlToken::word);
    match word {
        "delete" | "remove" | "erase" | "purge" | "wipe" | "destroy" | "clear" => {
            Some(MutationKind::Delete)
        }
        "update" | "change" | "modify" | "set" | "edit" | "replace" | "overwrite" => {
            Some(MutationKind::Update)
        }
        // "add up the totals" is arithmetic, not an insert
        "add" if next == Some("up") => None,
        "insert" | "add" | "append" => Some(MutationKind::Insert),
        "create" => Some(MutationKind::Create),
        "drop" => Some(MutationKind::Drop),
        "alter" | "rename" => Some(MutationKind::Alter),
        "truncate" => Some(MutationKind::Truncate),
        _ => None,
    }
}

/// Destructive phrases recognized anywhere in the request
fn destructive_phrase(tokens: &[NlToken], i: usize) -> Option<MutationKind> {
    let first = tokens.get(i)?.word()?;
    let second = tokens.get(i + 1).and_then(NlToken::word)?;
    match (first, second) {
        ("drop", "table" | "database" | "column" | "index" | "schema" | "view") => {
            Some(MutationKind::Drop)
        }
        ("delete", "from") => Some(MutationKind::Delete),
        ("truncate", "table") => Some(MutationKind::Truncate),
        ("alter", "table") => Some(MutationKind::Alter),
        ("insert", "into") => Some(MutationKind::Insert),
        ("create", "table" | "index" | "view" | "database") => Some(MutationKind::Create),
        _ => None,
    }
}

/// Verb opening the clause that starts at `start`, past courtesy and joiner words
fn clause_verb(tokens: &[NlToken], start: usize) -> Option<MutationKind> {
    let head = (start..tokens.len())
        .find(|&i| !tokens[i].is_any(COURTESY) && !tokens[i].is_any(CLAUSE_WORDS))?;
    verb_kind(tokens, head)
}

/// Classify one clause by its leading verb, the verb after any joiner
/// ("and", "then", "also") and any destructive phrase
pub fn classify(tokens: &[NlToken]) -> Intent {
    let heads = std::iter::once(0).chain(
        tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_any(CLAUSE_WORDS))
            .map(|(i, _)| i + 1),
    );
    if let Some(kind) = heads.into_iter().find_map(|i| clause_verb(tokens, i)) {
        return Intent::Mutation(kind);
    }

    (0..tokens.len())
        .find_map(|i| destructive_phrase(tokens, i))
        .map(Intent::Mutation)
        .unwrap_or(Intent::Read)
}

/// Classify a whole request; the first mutating clause decides
pub fn classify_request(text: &str) -> Intent {
    clauses(text)
        .into_iter()
        .map(|clause| classify(&tokenize(clause)))
        .find(|intent| *intent != Intent::Read)
        .unwrap_or(Intent::Read)
}
