//! Tool handlers
//!
//! Each handler delegates to the [`QueryService`] and turns the outcome into
//! a JSON tool result. Failures keep the stable error kind in `data` so
//! clients can branch on it without parsing messages.

use nlsql_core::{CoreError, NlQueryRequest, QueryService};
use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::params::*;

// ============================================================================
// Helper Functions
// ============================================================================

/// Pretty-printed JSON tool result
pub fn json_success<T: Serialize>(data: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

pub fn core_error_to_mcp(err: CoreError) -> McpError {
    let data = Some(json!({ "kind": err.kind() }));
    if let CoreError::TableNotFound(_) = err {
        return McpError::resource_not_found(err.to_string(), data);
    }
    if err.is_rejection() {
        warn!(kind = err.kind(), "Request rejected: {}", err);
        McpError::invalid_params(err.to_string(), data)
    } else {
        error!(kind = err.kind(), "{}", err);
        McpError::internal_error(err.to_string(), data)
    }
}

// ============================================================================
// Schema Handlers
// ============================================================================

pub async fn list_tables(service: &QueryService) -> Result<CallToolResult, McpError> {
    let tables = service.list_tables().await.map_err(core_error_to_mcp)?;
    json_success(&tables)
}

pub async fn describe_table(
    service: &QueryService,
    params: DescribeTableParams,
) -> Result<CallToolResult, McpError> {
    let schema = service
        .describe_table(&params.table_name)
        .await
        .map_err(core_error_to_mcp)?;
    json_success(&schema)
}

pub async fn sample_table(
    service: &QueryService,
    params: SampleTableParams,
) -> Result<CallToolResult, McpError> {
    let sample = service
        .sample_table(&params.table_name, params.limit)
        .await
        .map_err(core_error_to_mcp)?;
    json_success(&sample)
}

// ============================================================================
// Query Handlers
// ============================================================================

pub async fn nl_query(
    service: &QueryService,
    params: NlQueryParams,
) -> Result<CallToolResult, McpError> {
    let request = NlQueryRequest::from(params);
    let result = service
        .answer_nl_query(&request)
        .await
        .map_err(core_error_to_mcp)?;
    json_success(&result)
}
