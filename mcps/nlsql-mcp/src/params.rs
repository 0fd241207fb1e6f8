//! Tool parameter types

use nlsql_core::{NlQueryRequest, DEFAULT_QUERY_LIMIT};
use schemars::JsonSchema;
use serde::Deserialize;

/// Parameters for describe_table tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DescribeTableParams {
    /// Name of the table to describe, exactly as returned by list_tables
    pub table_name: String,
}

/// Parameters for sample_table tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SampleTableParams {
    /// Name of the table to sample, exactly as returned by list_tables
    pub table_name: String,
    /// Number of rows to return (default 5, at most 50)
    pub limit: Option<usize>,
}

/// Parameters for nl_query tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct NlQueryParams {
    /// Question about the data in plain language, e.g. "top 5 orders by total"
    pub nl_query: String,
    /// Maximum rows to return (default 50, values above 50 are capped)
    pub limit: Option<usize>,
}

impl From<NlQueryParams> for NlQueryRequest {
    fn from(params: NlQueryParams) -> Self {
        NlQueryRequest {
            nl_query: params.nl_query,
            limit: Some(params.limit.unwrap_or(DEFAULT_QUERY_LIMIT)),
        }
    }
}
