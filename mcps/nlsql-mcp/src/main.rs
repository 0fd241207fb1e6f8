//! NLSQL MCP Server
//!
//! Serves read-only natural-language queries over a SQLite database,
//! via MCP on stdio (default) or a REST API over HTTP.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rmcp::ServiceExt;

use nlsql_mcp::config::Config;
use nlsql_mcp::telemetry::{self, LogFormat};
use nlsql_mcp::{http, NlsqlMcpServer};

#[derive(Parser)]
#[command(name = "nlsql-mcp")]
#[command(about = "Read-only natural-language SQL over MCP or HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: searched in standard locations)
    #[arg(long, env = "NLSQL_CONFIG_PATH", global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides [database].path)
    #[arg(long, env = "NLSQL_DATABASE", global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdin/stdout
    Stdio,
    /// Serve the REST API
    Http {
        /// Address to bind (overrides [http].host)
        #[arg(long, env = "HOST")]
        host: Option<String>,
        /// Port to bind (overrides [http].port)
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(cli.config.as_deref());
    let mut config = loaded.config;
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    telemetry::init_tracing("nlsql_mcp", LogFormat::resolve(config.logging.format))?;

    for (path, err) in &loaded.skipped {
        tracing::warn!("Failed to parse config {}: {}", path.display(), err);
    }
    match &loaded.source {
        Some(path) => tracing::info!("Loaded config from {}", path.display()),
        None => tracing::info!("No config file found, using defaults"),
    }

    let service = config.build_service()?;
    tracing::info!(
        database = %config.database.path.display(),
        nl_query = service.capabilities().nl_query,
        "Query service ready"
    );

    match cli.command.unwrap_or(Commands::Stdio) {
        Commands::Stdio => {
            tracing::info!("Starting nlsql_mcp MCP Server");
            let server = NlsqlMcpServer::new(service);
            let running = server.serve(rmcp::transport::stdio()).await?;

            tracing::info!("Server running, waiting for requests...");
            running.waiting().await?;
            tracing::info!("Server shutting down");
        }
        Commands::Http { host, port } => {
            let host = host.unwrap_or(config.http.host);
            let port = port.unwrap_or(config.http.port);
            http::serve(service, &host, port).await?;
        }
    }

    Ok(())
}
