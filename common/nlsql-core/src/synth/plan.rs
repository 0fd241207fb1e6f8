//! Query plan: the structured form of a request before it becomes SQL
//!
//! Every identifier in a plan comes from the [`TableMatch`] it was built
//! against, and every value is rendered as a quoted literal.

use super::matcher::{column_mentions, names_schema_object, ColumnMention, TableMatch};
use super::words::{NlToken, STOPWORDS};
use crate::model::{ColumnDescriptor, SchemaSnapshot, DEFAULT_QUERY_LIMIT, MAX_ROW_LIMIT};
use crate::sql::{quote_ident, quote_literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateFn {
    fn sql(&self) -> &'static str {
        match self {
            AggregateFn::Avg => "AVG",
            AggregateFn::Sum => "SUM",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "average" | "avg" | "mean" => Some(AggregateFn::Avg),
            "sum" => Some(AggregateFn::Sum),
            "min" | "minimum" => Some(AggregateFn::Min),
            "max" | "maximum" => Some(AggregateFn::Max),
            _ => None,
        }
    }

    fn needs_numeric(&self) -> bool {
        matches!(self, AggregateFn::Avg | AggregateFn::Sum)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
    Count,
    Aggregate { func: AggregateFn, column: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    IsNull,
    IsNotNull,
}

impl Comparison {
    fn needs_value(&self) -> bool {
        !matches!(self, Comparison::IsNull | Comparison::IsNotNull)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Number(String),
    Text(String),
}

impl Literal {
    fn render(&self) -> String {
        match self {
            Literal::Number(n) if n.parse::<f64>().is_ok_and(f64::is_finite) => n.clone(),
            Literal::Number(n) | Literal::Text(n) => quote_literal(n),
        }
    }

    fn text(&self) -> &str {
        match self {
            Literal::Number(n) | Literal::Text(n) => n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: Comparison,
    pub value: Option<Literal>,
}

impl Filter {
    fn render(&self) -> String {
        let column = quote_ident(&self.column);
        let value = || self.value.as_ref().map(Literal::render).unwrap_or_default();
        match self.op {
            Comparison::Eq => format!("{} = {}", column, value()),
            Comparison::NotEq => format!("{} <> {}", column, value()),
            Comparison::Gt => format!("{} > {}", column, value()),
            Comparison::Ge => format!("{} >= {}", column, value()),
            Comparison::Lt => format!("{} < {}", column, value()),
            Comparison::Le => format!("{} <= {}", column, value()),
            Comparison::Like => {
                let needle = self.value.as_ref().map(Literal::text).unwrap_or_default();
                format!("{} LIKE {}", column, quote_literal(&format!("%{}%", needle)))
            }
            Comparison::IsNull => format!("{} IS NULL", column),
            Comparison::IsNotNull => format!("{} IS NOT NULL", column),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub table: String,
    pub projection: Projection,
    pub distinct: bool,
    pub filters: Vec<Filter>,
    pub group_by: Option<String>,
    pub order: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl QueryPlan {
    /// Every column name the rendered statement will reference
    pub fn columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        match &self.projection {
            Projection::Columns(cols) => out.extend(cols.iter().map(String::as_str)),
            Projection::Aggregate { column, .. } => out.push(column.as_str()),
            Projection::All | Projection::Count => {}
        }
        out.extend(self.filters.iter().map(|f| f.column.as_str()));
        out.extend(self.group_by.as_deref());
        out.extend(self.order.as_ref().map(|(c, _)| c.as_str()));
        out
    }

    pub fn render(&self) -> String {
        let group = self.group_by.as_deref().map(quote_ident);
        let mut select: Vec<String> = Vec::new();
        let grouped_or_listing = match &self.projection {
            Projection::All => {
                select.push("*".to_string());
                true
            }
            Projection::Columns(cols) => {
                select.extend(cols.iter().map(|c| quote_ident(c)));
                true
            }
            Projection::Count => {
                select.extend(group.clone());
                select.push("COUNT(*) AS count".to_string());
                group.is_some()
            }
            Projection::Aggregate { func, column } => {
                select.extend(group.clone());
                let alias = quote_ident(&format!("{}_{}", func.sql().to_lowercase(), column));
                select.push(format!("{}({}) AS {}", func.sql(), quote_ident(column), alias));
                group.is_some()
            }
        };

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&select.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&quote_ident(&self.table));

        if !self.filters.is_empty() {
            let clauses: Vec<String> = self.filters.iter().map(Filter::render).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some(group) = &group {
            sql.push_str(" GROUP BY ");
            sql.push_str(group);
        }
        if let Some((column, direction)) = &self.order {
            sql.push_str(" ORDER BY ");
            sql.push_str(&quote_ident(column));
            sql.push_str(match direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
        }
        if grouped_or_listing {
            let limit = self.limit.unwrap_or(DEFAULT_QUERY_LIMIT).min(MAX_ROW_LIMIT);
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }
}

/// Knobs the synthesizer sets from the request's intent
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Only parse filters from column mentions at or after this token
    pub filters_from: usize,
    /// Always project every column (previews of affected rows)
    pub select_all: bool,
}

const COUNT_PHRASES: &[&[&str]] = &[&["how", "many"], &["number", "of"], &["count"]];
const FILTER_CONTEXT: &[&str] = &["where", "with", "whose", "having", "when"];
const NULL_WORDS: &[&str] = &["null", "empty", "missing", "blank", "unset"];
const COPULAS: &[&str] = &["is", "are", "was", "were", "be", "being"];
const SORT_WORDS: &[&str] = &["sorted", "ordered", "order", "sort", "sorting", "arranged", "ranked"];
const DESC_WORDS: &[&str] = &[
    "desc", "descending", "highest", "largest", "biggest", "greatest", "most", "top", "latest",
    "newest", "recent", "decreasing",
];
const ASC_WORDS: &[&str] = &[
    "asc", "ascending", "lowest", "smallest", "least", "fewest", "bottom", "oldest", "earliest",
    "increasing",
];
const TEMPORAL_SUPERLATIVES: &[&str] = &["latest", "newest", "recent", "oldest", "earliest"];
const LIMIT_LEADS: &[&str] = &["top", "first", "last", "limit", "only", "latest", "newest", "recent"];
const ROW_NOUNS: &[&str] = &[
    "rows", "row", "records", "record", "results", "result", "entries", "entry", "items",
];
const GROUP_WORDS: &[&str] = &["per", "by", "each"];

struct Builder<'t, 's> {
    tokens: &'t [NlToken],
    table: &'t TableMatch<'s>,
    schema: &'s SchemaSnapshot,
    mentions: Vec<ColumnMention<'s>>,
    used: Vec<bool>,
    consumed: Vec<bool>,
}

/// Build a plan for `tokens` against the already-resolved table
pub fn build_plan(
    tokens: &[NlToken],
    table: &TableMatch<'_>,
    schema: &SchemaSnapshot,
    options: PlanOptions,
) -> QueryPlan {
    let mentions = column_mentions(tokens, table.columns, table.mention);
    let mut builder = Builder {
        tokens,
        table,
        schema,
        used: vec![false; mentions.len()],
        mentions,
        consumed: vec![false; tokens.len()],
    };
    if let Some(span) = table.mention {
        builder.consume(span.start, span.end());
    }

    let mut projection = if options.select_all {
        Projection::All
    } else {
        builder.aggregate().or_else(|| builder.count()).unwrap_or(Projection::All)
    };
    let grouping = matches!(projection, Projection::Count | Projection::Aggregate { .. });
    let group_by = if grouping { builder.group_by() } else { None };

    let filters = builder.filters(options.filters_from);
    let mut order = builder.order();
    if grouping && order.as_ref().map(|(c, _)| Some(c)) != Some(group_by.as_ref()) {
        order = None;
    }
    let limit = builder.limit();

    let mut distinct = false;
    if !options.select_all && matches!(projection, Projection::All) {
        let columns = builder.projected_columns();
        if !columns.is_empty() {
            distinct = builder.tokens.iter().any(|t| t.is_any(&["distinct", "unique"]));
            projection = Projection::Columns(columns);
        }
    }

    QueryPlan {
        table: table.name.to_string(),
        projection,
        distinct,
        filters,
        group_by,
        order,
        limit,
    }
}

impl<'t, 's> Builder<'t, 's> {
    fn word(&self, pos: usize) -> Option<&'t str> {
        self.tokens.get(pos).and_then(NlToken::word)
    }

    fn is_any(&self, pos: usize, words: &[&str]) -> bool {
        self.tokens.get(pos).is_some_and(|t| t.is_any(words))
    }

    fn consume(&mut self, from: usize, to: usize) {
        for pos in from..to.min(self.consumed.len()) {
            self.consumed[pos] = true;
        }
    }

    fn in_mention(&self, pos: usize) -> bool {
        self.mentions.iter().any(|m| m.span.contains(pos))
    }

    /// Unused mention starting in `from..=to`
    fn mention_between(&self, from: usize, to: usize) -> Option<usize> {
        self.mentions
            .iter()
            .enumerate()
            .find(|(idx, m)| !self.used[*idx] && m.span.start >= from && m.span.start <= to)
            .map(|(idx, _)| idx)
    }

    fn take_mention(&mut self, idx: usize) -> &'s ColumnDescriptor {
        self.used[idx] = true;
        let span = self.mentions[idx].span;
        self.consume(span.start, span.end());
        self.mentions[idx].column
    }

    fn aggregate(&mut self) -> Option<Projection> {
        for i in 0..self.tokens.len() {
            let Some(word) = self.word(i) else { continue };
            let func = match AggregateFn::from_word(word) {
                Some(func) if !self.in_mention(i) => func,
                // "total of <col>" is a sum even when a column is named total
                None if word == "total" && self.word(i + 1) == Some("of") => AggregateFn::Sum,
                _ => continue,
            };
            let Some(idx) = self.mention_between(i + 1, i + 3) else {
                continue;
            };
            let column = self.mentions[idx].column;
            if func.needs_numeric() && !column.is_numeric() {
                continue;
            }
            // The word "total" itself may have been matched as a column
            if let Some(own) = self.mentions.iter().position(|m| m.span.start == i) {
                self.used[own] = true;
            }
            self.consume(i, i + 1);
            let column = self.take_mention(idx);
            return Some(Projection::Aggregate {
                func,
                column: column.column_name.clone(),
            });
        }
        None
    }

    fn count(&mut self) -> Option<Projection> {
        for i in 0..self.tokens.len() {
            for phrase in COUNT_PHRASES {
                let hit = phrase
                    .iter()
                    .enumerate()
                    .all(|(k, w)| self.word(i + k) == Some(*w) && !self.in_mention(i + k));
                if hit {
                    self.consume(i, i + phrase.len());
                    return Some(Projection::Count);
                }
            }
        }
        None
    }

    fn group_by(&mut self) -> Option<String> {
        for i in 0..self.tokens.len() {
            if !self.is_any(i, GROUP_WORDS) || self.consumed[i] {
                continue;
            }
            if i > 0 && self.is_any(i - 1, SORT_WORDS) {
                continue;
            }
            if let Some(idx) = self.mention_between(i + 1, i + 2) {
                self.consume(i, i + 1);
                return Some(self.take_mention(idx).column_name.clone());
            }
        }
        None
    }

    fn filters(&mut self, from: usize) -> Vec<Filter> {
        let mut filters: Vec<Filter> = Vec::new();
        for idx in 0..self.mentions.len() {
            if self.used[idx] || self.mentions[idx].span.start < from {
                continue;
            }
            if let Some((filter, end)) = self.parse_filter(idx) {
                let span = self.mentions[idx].span;
                self.used[idx] = true;
                self.consume(span.start, end);
                if !filters.contains(&filter) {
                    filters.push(filter);
                }
            }
        }
        filters
    }

    fn parse_filter(&self, idx: usize) -> Option<(Filter, usize)> {
        let mention = &self.mentions[idx];
        let column = mention.column;
        let start = mention.span.start;
        let after = mention.span.end();
        let prev = start.checked_sub(1);

        let filter = |op: Comparison, value: Option<Literal>| Filter {
            column: column.column_name.clone(),
            op,
            value,
        };

        if prev.is_some_and(|p| self.is_any(p, &["without", "missing"])) {
            return Some((filter(Comparison::IsNull, None), after));
        }

        let (op, value_pos) = match self.parse_operator(after) {
            Some(found) => found,
            None if prev.is_some_and(|p| self.is_any(p, FILTER_CONTEXT)) => (Comparison::Eq, after),
            None => return None,
        };

        if !op.needs_value() {
            return Some((filter(op, None), value_pos));
        }
        let value = self.parse_value(value_pos, column, op)?;
        Some((filter(op, Some(value)), value_pos + 1))
    }

    fn parse_operator(&self, pos: usize) -> Option<(Comparison, usize)> {
        match self.tokens.get(pos)? {
            NlToken::Op(op) => Some((symbol_comparison(op)?, pos + 1)),
            NlToken::Word(w) if COPULAS.contains(&w.as_str()) => {
                if self.word(pos + 1) == Some("not") {
                    if self.is_any(pos + 2, NULL_WORDS) {
                        return Some((Comparison::IsNotNull, pos + 3));
                    }
                    return Some((Comparison::NotEq, pos + 2));
                }
                if self.is_any(pos + 1, NULL_WORDS) {
                    return Some((Comparison::IsNull, pos + 2));
                }
                self.comparative(pos + 1)
                    .or(Some((Comparison::Eq, pos + 1)))
            }
            NlToken::Word(_) => self.comparative(pos),
            _ => None,
        }
    }

    fn comparative(&self, pos: usize) -> Option<(Comparison, usize)> {
        if let Some(NlToken::Op(op)) = self.tokens.get(pos) {
            return Some((symbol_comparison(op)?, pos + 1));
        }
        let word = self.word(pos)?;
        let or_equal = |p: usize| {
            self.word(p) == Some("or")
                && self.is_any(p + 1, &["equal", "equals"])
                && self.word(p + 2) == Some("to")
        };
        match word {
            "greater" | "more" | "higher" | "larger" | "bigger" if self.word(pos + 1) == Some("than") => {
                if or_equal(pos + 2) {
                    Some((Comparison::Ge, pos + 5))
                } else {
                    Some((Comparison::Gt, pos + 2))
                }
            }
            "less" | "fewer" | "lower" | "smaller" if self.word(pos + 1) == Some("than") => {
                if or_equal(pos + 2) {
                    Some((Comparison::Le, pos + 5))
                } else {
                    Some((Comparison::Lt, pos + 2))
                }
            }
            "above" | "over" | "exceeding" | "exceeds" | "after" | "since" => {
                Some((Comparison::Gt, pos + 1))
            }
            "below" | "under" | "before" => Some((Comparison::Lt, pos + 1)),
            "at" if self.word(pos + 1) == Some("least") => Some((Comparison::Ge, pos + 2)),
            "at" if self.word(pos + 1) == Some("most") => Some((Comparison::Le, pos + 2)),
            "equals" | "equal" if self.word(pos + 1) == Some("to") => Some((Comparison::Eq, pos + 2)),
            "equals" | "equal" => Some((Comparison::Eq, pos + 1)),
            "not" if self.is_any(pos + 1, NULL_WORDS) => Some((Comparison::IsNotNull, pos + 2)),
            "not" => Some((Comparison::NotEq, pos + 1)),
            "contains" | "containing" | "like" | "includes" | "including" | "matching"
            | "matches" => Some((Comparison::Like, pos + 1)),
            _ => None,
        }
    }

    fn parse_value(&self, pos: usize, column: &ColumnDescriptor, op: Comparison) -> Option<Literal> {
        let numeric = column.is_numeric();
        if op == Comparison::Like && numeric {
            return None;
        }
        match self.tokens.get(pos)? {
            NlToken::Number(n) if numeric => Some(Literal::Number(n.clone())),
            NlToken::Number(n) => Some(Literal::Text(n.clone())),
            NlToken::Quoted(s) if numeric => {
                let trimmed = s.trim();
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(|_| Literal::Number(trimmed.to_string()))
            }
            NlToken::Quoted(s) => Some(Literal::Text(s.clone())),
            NlToken::Word(w) => {
                if STOPWORDS.contains(&w.as_str())
                    || names_schema_object(self.tokens, pos, self.schema)
                {
                    return None;
                }
                if column.data_type == "boolean" {
                    return match w.as_str() {
                        "true" | "yes" => Some(Literal::Number("1".into())),
                        "false" | "no" => Some(Literal::Number("0".into())),
                        _ => None,
                    };
                }
                if numeric {
                    return None;
                }
                Some(Literal::Text(w.clone()))
            }
            NlToken::Op(_) => None,
        }
    }

    fn order(&mut self) -> Option<(String, Direction)> {
        self.explicit_order().or_else(|| self.superlative_order())
    }

    /// "sorted by <col> [asc|desc]"
    fn explicit_order(&mut self) -> Option<(String, Direction)> {
        for i in 0..self.tokens.len() {
            if self.consumed[i] || !self.is_any(i, SORT_WORDS) || self.word(i + 1) != Some("by") {
                continue;
            }
            let Some(idx) = self.mention_between(i + 2, i + 3) else {
                continue;
            };
            let end = self.mentions[idx].span.end();
            let direction = if (end..end + 2).any(|p| self.is_any(p, DESC_WORDS)) {
                Direction::Desc
            } else {
                Direction::Asc
            };
            self.consume(i, end);
            let column = self.take_mention(idx);
            return Some((column.column_name.clone(), direction));
        }
        None
    }

    /// "highest total", "top 5 orders by total", "the latest orders"
    fn superlative_order(&mut self) -> Option<(String, Direction)> {
        for i in 0..self.tokens.len() {
            if self.consumed[i] {
                continue;
            }
            let direction = if self.is_any(i, DESC_WORDS) {
                Direction::Desc
            } else if self.is_any(i, ASC_WORDS) {
                Direction::Asc
            } else {
                continue;
            };

            if let Some(idx) = self.mention_between(i + 1, i + 3).or_else(|| self.by_mention(i)) {
                self.consume(i, i + 1);
                let column = self.take_mention(idx);
                return Some((column.column_name.clone(), direction));
            }
            if self.is_any(i, TEMPORAL_SUPERLATIVES) {
                if let Some(column) = self.table.columns.iter().find(|c| c.is_temporal()) {
                    self.consume(i, i + 1);
                    return Some((column.column_name.clone(), direction));
                }
            }
        }
        None
    }

    /// Unused mention right after a later "by", as in "top 5 orders by total"
    fn by_mention(&self, after: usize) -> Option<usize> {
        (after + 1..self.tokens.len())
            .filter(|&p| self.word(p) == Some("by") && !self.consumed[p])
            .find_map(|p| self.mention_between(p + 1, p + 2))
    }

    fn limit(&mut self) -> Option<usize> {
        for i in 0..self.tokens.len() {
            if self.consumed[i] {
                continue;
            }
            let NlToken::Number(n) = &self.tokens[i] else {
                continue;
            };
            let led = i > 0 && self.is_any(i - 1, LIMIT_LEADS);
            let counted = self.is_any(i + 1, ROW_NOUNS)
                || self.table.mention.is_some_and(|span| span.start == i + 1);
            if !(led || counted) {
                continue;
            }
            if let Ok(count) = n.parse::<usize>() {
                if count > 0 {
                    self.consume(i, i + 1);
                    return Some(count.min(MAX_ROW_LIMIT));
                }
            }
        }
        None
    }

    fn projected_columns(&self) -> Vec<String> {
        let before = self.table.mention.map(|span| span.start);
        let mut columns: Vec<String> = Vec::new();
        for (idx, mention) in self.mentions.iter().enumerate() {
            if self.used[idx] || before.is_some_and(|b| mention.span.start > b) {
                continue;
            }
            let name = &mention.column.column_name;
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
        columns
    }
}

fn symbol_comparison(op: &str) -> Option<Comparison> {
    match op {
        "=" => Some(Comparison::Eq),
        "!=" | "<>" => Some(Comparison::NotEq),
        ">" => Some(Comparison::Gt),
        ">=" => Some(Comparison::Ge),
        "<" => Some(Comparison::Lt),
        "<=" => Some(Comparison::Le),
        _ => None,
    }
}
