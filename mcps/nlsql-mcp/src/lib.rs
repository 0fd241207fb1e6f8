//! NLSQL MCP Library
//!
//! Transports for the `nlsql_core` query service: an MCP server over stdio
//! and a REST API over HTTP. Both expose the same four operations and hide
//! `nl_query` when natural-language querying is disabled.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use nlsql_mcp::{config::Config, NlsqlMcpServer};
//!
//! let config = Config::load(None).config;
//! let server = NlsqlMcpServer::new(config.build_service()?);
//! let tools = server.list_tools();
//! ```

pub mod config;
pub mod handlers;
pub mod http;
pub mod params;
pub mod server;
pub mod telemetry;

pub use server::NlsqlMcpServer;

// Re-export parameter types for direct API usage
pub use params::{DescribeTableParams, NlQueryParams, SampleTableParams};
