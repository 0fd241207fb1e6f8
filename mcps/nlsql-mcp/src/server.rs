//! MCP Server implementation
//!
//! # Tool Groups
//!
//! Schema tools are always available. `nl_query` is only routed when the
//! service reports the `nl_query` capability, so clients never see a tool
//! that would fail on every call.

use nlsql_core::QueryService;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde_json::Value;

use crate::handlers;
use crate::params::*;

/// Read-only natural-language SQL MCP server
#[derive(Clone)]
pub struct NlsqlMcpServer {
    service: QueryService,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Schema Tools (always available)
// ============================================================================

#[tool_router]
impl NlsqlMcpServer {
    #[tool(description = "List all user tables with their column counts")]
    async fn list_tables(&self) -> Result<CallToolResult, McpError> {
        handlers::list_tables(&self.service).await
    }

    #[tool(description = "Describe the columns of a table: name, normalized data type and nullability")]
    async fn describe_table(
        &self,
        Parameters(params): Parameters<DescribeTableParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::describe_table(&self.service, params).await
    }

    #[tool(description = "Return the first rows of a table (default 5, at most 50)")]
    async fn sample_table(
        &self,
        Parameters(params): Parameters<SampleTableParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::sample_table(&self.service, params).await
    }
}

// ============================================================================
// Query Tools (nl_query capability)
// ============================================================================

#[tool_router(router = nl_tool_router)]
impl NlsqlMcpServer {
    #[tool(
        description = "Answer a plain-language question about the data. Returns the generated read-only SQL and at most 50 rows. Mutation requests are declined"
    )]
    async fn nl_query(
        &self,
        Parameters(params): Parameters<NlQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::nl_query(&self.service, params).await
    }
}

impl NlsqlMcpServer {
    pub fn new(service: QueryService) -> Self {
        let router = Self::tool_router();
        let router = if service.capabilities().nl_query {
            router + Self::nl_tool_router()
        } else {
            router
        };

        Self {
            service,
            tool_router: router,
        }
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    /// Dispatch a tool call by name with JSON arguments
    pub async fn call_tool(&self, name: &str, params: Value) -> Result<CallToolResult, McpError> {
        if !self.list_tools().iter().any(|t| t.name == name) {
            return Err(McpError::invalid_params(format!("unknown tool: {}", name), None));
        }
        let parse_err = |e: serde_json::Error| McpError::invalid_params(e.to_string(), None);

        match name {
            "list_tables" => self.list_tables().await,
            "describe_table" => {
                let params: DescribeTableParams = serde_json::from_value(params).map_err(parse_err)?;
                self.describe_table(Parameters(params)).await
            }
            "sample_table" => {
                let params: SampleTableParams = serde_json::from_value(params).map_err(parse_err)?;
                self.sample_table(Parameters(params)).await
            }
            "nl_query" => {
                let params: NlQueryParams = serde_json::from_value(params).map_err(parse_err)?;
                self.nl_query(Parameters(params)).await
            }
            _ => Err(McpError::invalid_params(format!("unknown tool: {}", name), None)),
        }
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for NlsqlMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut instructions = String::from(
            "NLSQL MCP Server - read-only access to a SQLite database. \
             Use list_tables and describe_table to explore the schema and \
             sample_table to preview rows.",
        );
        if self.service.capabilities().nl_query {
            instructions.push_str(
                " Use nl_query to ask questions in plain language; \
                 results are capped at 50 rows and writes are never executed.",
            );
        }

        ServerInfo {
            instructions: Some(instructions),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
