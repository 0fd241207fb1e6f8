//! Natural language to SQL synthesis
//!
//! The synthesizer is the trust boundary between free-form text and SQL:
//! whatever it returns names only objects from the snapshot it was given and
//! passes the same statement policy the executor applies.

pub mod intent;
pub mod matcher;
pub mod plan;
pub mod words;

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::model::{SchemaSnapshot, SynthesizedQuery};
use crate::sql;
use intent::{classify_request, Intent, MutationKind};
pub use intent::MutationPolicy;
use plan::{build_plan, PlanOptions, QueryPlan};

/// Turns a natural-language request into one read-only statement
pub trait QuerySynthesizer: Send + Sync {
    fn convert_to_sql(&self, nl_query: &str, schema: &SchemaSnapshot)
        -> CoreResult<SynthesizedQuery>;

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Deterministic keyword-driven synthesizer
///
/// Holds only immutable configuration, so one instance can be shared by
/// every request handler.
#[derive(Debug, Clone, Default)]
pub struct HeuristicSynthesizer {
    policy: MutationPolicy,
    synonyms: BTreeMap<String, String>,
}

/// Words after which an update request names the rows it targets
const TARGET_WORDS: &[&str] = &["where", "whose", "for", "with"];

impl HeuristicSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: MutationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Map extra words (lower-case) onto table names
    pub fn with_synonyms(mut self, synonyms: BTreeMap<String, String>) -> Self {
        self.synonyms = synonyms
            .into_iter()
            .map(|(word, table)| (word.to_lowercase(), table))
            .collect();
        self
    }

    pub fn policy(&self) -> MutationPolicy {
        self.policy
    }

    fn plan_options(&self, tokens: &[words::NlToken], intent: Intent) -> CoreResult<PlanOptions> {
        let kind = match intent {
            Intent::Read => return Ok(PlanOptions::default()),
            Intent::Mutation(kind) => kind,
        };
        match self.policy {
            MutationPolicy::PreviewAffectedRows if kind.touches_existing_rows() => {
                debug!(verb = kind.verb(), "Rewriting mutation request as a preview");
                let filters_from = match kind {
                    // "set status to 'x' where id = 3": only the target rows filter
                    MutationKind::Update => tokens
                        .iter()
                        .position(|t| t.is_any(TARGET_WORDS))
                        .unwrap_or(tokens.len()),
                    _ => 0,
                };
                Ok(PlanOptions {
                    filters_from,
                    select_all: true,
                })
            }
            _ => Err(CoreError::UnsupportedIntent(kind.verb().to_string())),
        }
    }
}

impl QuerySynthesizer for HeuristicSynthesizer {
    fn convert_to_sql(
        &self,
        nl_query: &str,
        schema: &SchemaSnapshot,
    ) -> CoreResult<SynthesizedQuery> {
        let text = nl_query.trim();
        if text.is_empty() {
            return Err(CoreError::Synthesis("query text is empty".to_string()));
        }
        if schema.is_empty() {
            return Err(CoreError::EmptySchema);
        }

        let tokens = words::tokenize(text);
        let options = self.plan_options(&tokens, classify_request(text))?;

        let table = matcher::resolve_table(&tokens, schema, &self.synonyms)
            .ok_or(CoreError::EmptySchema)?;
        let plan = build_plan(&tokens, &table, schema, options);
        ensure_grounded(&plan, schema)?;

        let sql_text = plan.render();
        finalize(sql_text, vec![plan.table])
    }
}

/// Last check on generated text: it must pass the executor's statement policy
fn finalize(sql_text: String, tables: Vec<String>) -> CoreResult<SynthesizedQuery> {
    sql::inspect(&sql_text)
        .map_err(|e| CoreError::Synthesis(format!("generated unsafe SQL: {}", e)))?;

    debug!(tables = ?tables, sql = %sql_text, "Synthesized query");
    Ok(SynthesizedQuery { sql_text, tables })
}

fn ensure_grounded(plan: &QueryPlan, schema: &SchemaSnapshot) -> CoreResult<()> {
    if !schema.contains_table(&plan.table) {
        return Err(CoreError::Synthesis(format!(
            "table '{}' is not in the schema",
            plan.table
        )));
    }
    for column in plan.columns() {
        if schema.column(&plan.table, column).is_none() {
            return Err(CoreError::Synthesis(format!(
                "column '{}' is not in table '{}'",
                column, plan.table
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnDescriptor;

    fn orders_schema() -> SchemaSnapshot {
        SchemaSnapshot::new().with_table(
            "orders",
            vec![
                ColumnDescriptor::new("id", "integer", false),
                ColumnDescriptor::new("total", "numeric", true),
            ],
        )
    }

    fn shop_schema() -> SchemaSnapshot {
        orders_schema()
            .with_table(
                "customers",
                vec![
                    ColumnDescriptor::new("id", "integer", false),
                    ColumnDescriptor::new("name", "text", false),
                    ColumnDescriptor::new("city", "text", true),
                ],
            )
            .with_table(
                "Order Notes",
                vec![ColumnDescriptor::new("body", "text", true)],
            )
    }

    #[test]
    fn test_round_trip_orders() {
        let query = HeuristicSynthesizer::new()
            .convert_to_sql("show me all orders", &orders_schema())
            .unwrap();
        assert_eq!(query.sql_text, "SELECT * FROM orders LIMIT 50");
        assert_eq!(query.tables, vec!["orders".to_string()]);
    }

    #[test]
    fn test_empty_text() {
        let err = HeuristicSynthesizer::new()
            .convert_to_sql("   ", &orders_schema())
            .unwrap_err();
        assert!(matches!(err, CoreError::Synthesis(_)));
    }

    #[test]
    fn test_empty_schema() {
        let err = HeuristicSynthesizer::new()
            .convert_to_sql("show me all orders", &SchemaSnapshot::new())
            .unwrap_err();
        assert_eq!(err, CoreError::EmptySchema);
    }

    #[test]
    fn test_degenerate_input_uses_first_table() {
        let query = HeuristicSynthesizer::new()
            .convert_to_sql("show me stuff", &shop_schema())
            .unwrap();
        // BTreeMap order puts "Order Notes" first
        assert_eq!(query.sql_text, "SELECT * FROM \"Order Notes\" LIMIT 50");
    }

    #[test]
    fn test_deterministic() {
        let synth = HeuristicSynthesizer::new();
        let schema = shop_schema();
        let text = "top 3 customers where city is 'Oslo' sorted by name";
        let first = synth.convert_to_sql(text, &schema).unwrap();
        for _ in 0..5 {
            assert_eq!(synth.convert_to_sql(text, &schema).unwrap(), first);
        }
        assert_eq!(
            first.sql_text,
            "SELECT * FROM customers WHERE city = 'Oslo' ORDER BY name ASC LIMIT 3"
        );
    }

    #[test]
    fn test_injection_in_values_stays_a_literal() {
        let query = HeuristicSynthesizer::new()
            .convert_to_sql(
                "customers whose name is \"x'; SELECT 1; --\"",
                &shop_schema(),
            )
            .unwrap();
        assert_eq!(
            query.sql_text,
            "SELECT * FROM customers WHERE name = 'x''; SELECT 1; --' LIMIT 50"
        );
        assert!(sql::inspect(&query.sql_text).is_ok());
    }

    #[test]
    fn test_mutations_declined_by_default() {
        let synth = HeuristicSynthesizer::new();
        let schema = shop_schema();
        for (text, verb) in [
            ("delete all orders", "DELETE"),
            ("please update the customers", "UPDATE"),
            ("insert a new customer", "INSERT"),
            ("drop the orders table", "DROP"),
            ("show customers; drop table customers", "DROP"),
            ("list orders and delete them", "DELETE"),
            ("show customers then remove customer 5", "DELETE"),
            ("get all orders, then truncate orders", "TRUNCATE"),
        ] {
            let err = synth.convert_to_sql(text, &schema).unwrap_err();
            assert_eq!(err, CoreError::UnsupportedIntent(verb.to_string()), "{}", text);
        }
    }

    #[test]
    fn test_preview_policy_rewrites_row_mutations() {
        let synth = HeuristicSynthesizer::new().with_policy(MutationPolicy::PreviewAffectedRows);
        let schema = shop_schema();

        let query = synth
            .convert_to_sql("delete orders where total < 5", &schema)
            .unwrap();
        assert_eq!(query.sql_text, "SELECT * FROM orders WHERE total < 5 LIMIT 50");

        let query = synth
            .convert_to_sql("set city to 'Bergen' for customers where name is 'Ann'", &schema)
            .unwrap();
        assert_eq!(
            query.sql_text,
            "SELECT * FROM customers WHERE name = 'Ann' LIMIT 50"
        );

        let err = synth.convert_to_sql("drop table orders", &schema).unwrap_err();
        assert_eq!(err, CoreError::UnsupportedIntent("DROP".to_string()));
    }

    #[test]
    fn test_synonyms() {
        let mut synonyms = BTreeMap::new();
        synonyms.insert("Clients".to_string(), "customers".to_string());
        let synth = HeuristicSynthesizer::new().with_synonyms(synonyms);
        let query = synth
            .convert_to_sql("list clients from Oslo", &shop_schema())
            .unwrap();
        assert_eq!(query.sql_text, "SELECT * FROM customers LIMIT 50");
    }

    #[test]
    fn test_grounding() {
        let schema = shop_schema();
        let synth = HeuristicSynthesizer::new();
        for text in [
            "how many customers",
            "average total of orders",
            "name and city of customers sorted by id desc",
            "orders where discount is 5",
        ] {
            let query = synth.convert_to_sql(text, &schema).unwrap();
            let table = &query.tables[0];
            assert!(schema.contains_table(table));
            assert!(query.sql_text.contains(&sql::quote_ident(table)));
        }
    }

    #[test]
    fn test_finalize_rejects_unsafe_text() {
        for sql_text in ["SELECT 1; DROP TABLE t", "DELETE FROM t", "SELECT 1; SELECT 2"] {
            let err = finalize(sql_text.to_string(), vec!["t".into()]).unwrap_err();
            assert!(matches!(err, CoreError::Synthesis(_)), "{}", sql_text);
            assert!(err.to_string().contains("generated unsafe SQL"));
        }

        let query = finalize("SELECT * FROM t LIMIT 5".to_string(), vec!["t".into()]).unwrap();
        assert_eq!(query.tables, vec!["t".to_string()]);
    }

    #[test]
    fn test_ensure_grounded_rejects_unknown_columns() {
        let plan = QueryPlan {
            table: "orders".into(),
            projection: plan::Projection::Columns(vec!["ghost".into()]),
            distinct: false,
            filters: vec![],
            group_by: None,
            order: None,
            limit: None,
        };
        assert!(matches!(
            ensure_grounded(&plan, &orders_schema()),
            Err(CoreError::Synthesis(_))
        ));
    }
}
