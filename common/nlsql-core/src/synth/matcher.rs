//! Grounding request words in schema identifiers

use std::collections::BTreeMap;

use super::words::{identifier_words, singular, NlToken};
use crate::model::{ColumnDescriptor, SchemaSnapshot};

/// A run of tokens that names a schema object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos < self.end()
    }
}

/// The table a request is about, and where it was named (if it was)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMatch<'s> {
    pub name: &'s str,
    pub columns: &'s [ColumnDescriptor],
    pub mention: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMention<'s> {
    pub column: &'s ColumnDescriptor,
    pub span: Span,
}

/// Length of the match of `name` starting at token `i`, if any
///
/// A single token may spell the whole identifier (`order_items`); otherwise
/// each identifier word must line up with one token. Plurals are folded.
fn match_name_at(tokens: &[NlToken], i: usize, name: &str) -> Option<usize> {
    let first = tokens.get(i)?.word()?;
    if singular(first) == singular(name) {
        return Some(1);
    }

    let parts = identifier_words(name);
    if parts.len() < 2 {
        return None;
    }
    for (k, part) in parts.iter().enumerate() {
        let word = tokens.get(i + k)?.word()?;
        if singular(word) != singular(part) {
            return None;
        }
    }
    Some(parts.len())
}

/// Pick the table a request refers to
///
/// Preference: longest explicit mention, earliest mention, then a synonym,
/// then the table with the most column mentions, then the first table.
pub fn resolve_table<'s>(
    tokens: &[NlToken],
    schema: &'s SchemaSnapshot,
    synonyms: &BTreeMap<String, String>,
) -> Option<TableMatch<'s>> {
    let mut best: Option<(usize, usize, &'s str, &'s [ColumnDescriptor])> = None;

    for i in 0..tokens.len() {
        for (name, columns) in schema.tables() {
            let Some(len) = match_name_at(tokens, i, name) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((best_len, _, _, _)) => len > best_len,
            };
            if better {
                best = Some((len, i, name, columns));
            }
        }
    }

    if best.is_none() {
        'outer: for (i, token) in tokens.iter().enumerate() {
            let Some(word) = token.word() else {
                continue;
            };
            for (alias, target) in synonyms {
                if singular(word) != singular(alias) {
                    continue;
                }
                if let Some((name, columns)) =
                    schema.tables().find(|(n, _)| *n == target.as_str())
                {
                    best = Some((1, i, name, columns));
                    break 'outer;
                }
            }
        }
    }

    if let Some((len, start, name, columns)) = best {
        return Some(TableMatch {
            name,
            columns,
            mention: Some(Span { start, len }),
        });
    }

    let mut by_columns: Option<(usize, &'s str, &'s [ColumnDescriptor])> = None;
    for (name, columns) in schema.tables() {
        let count = column_mentions(tokens, columns, None).len();
        if count > 0 && by_columns.map_or(true, |(c, _, _)| count > c) {
            by_columns = Some((count, name, columns));
        }
    }
    if let Some((_, name, columns)) = by_columns {
        return Some(TableMatch {
            name,
            columns,
            mention: None,
        });
    }

    let name = schema.first_table()?;
    let columns = schema.columns(name)?;
    Some(TableMatch {
        name,
        columns,
        mention: None,
    })
}

/// Non-overlapping column mentions in text order, longest match first
pub fn column_mentions<'s>(
    tokens: &[NlToken],
    columns: &'s [ColumnDescriptor],
    exclude: Option<Span>,
) -> Vec<ColumnMention<'s>> {
    let mut mentions = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if exclude.is_some_and(|span| span.contains(i)) {
            i += 1;
            continue;
        }
        let found = columns
            .iter()
            .filter_map(|c| match_name_at(tokens, i, &c.column_name).map(|len| (len, c)))
            .filter(|(len, _)| {
                exclude.map_or(true, |span| !(i..i + len).any(|p| span.contains(p)))
            })
            .max_by_key(|(len, _)| *len);
        match found {
            Some((len, column)) => {
                mentions.push(ColumnMention {
                    column,
                    span: Span { start: i, len },
                });
                i += len;
            }
            None => i += 1,
        }
    }
    mentions
}

/// Whether the token at `pos` names any table or column in the snapshot
pub fn names_schema_object(tokens: &[NlToken], pos: usize, schema: &SchemaSnapshot) -> bool {
    schema.tables().any(|(name, columns)| {
        match_name_at(tokens, pos, name).is_some()
            || columns
                .iter()
                .any(|c| match_name_at(tokens, pos, &c.column_name).is_some())
    })
}
