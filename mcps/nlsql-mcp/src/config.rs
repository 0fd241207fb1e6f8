//! Configuration for the NLSQL server

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use nlsql_core::{
    HeuristicSynthesizer, MutationPolicy, QueryService, SqliteDatabase, DEFAULT_QUERY_LIMIT,
    MAX_ROW_LIMIT,
};
use serde::{Deserialize, Serialize};

use crate::telemetry::LogFormat;

/// NLSQL server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub synthesizer: SynthesizerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// How long to wait on a locked database, in seconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("database.db")
}

fn default_busy_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Rows returned by NL queries that do not pass a limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Row ceiling; can only lower the built-in cap of 50
    #[serde(default = "default_limit")]
    pub max_limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_QUERY_LIMIT
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    /// Serve natural-language queries at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mutation_policy: MutationPolicy,
    /// Extra words that name a table, e.g. `customers = "users"`
    #[serde(default)]
    pub synonyms: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mutation_policy: MutationPolicy::default(),
            synonyms: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Schema snapshot lifetime in seconds; 0 disables the cache
    #[serde(default)]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Result of searching the standard config locations
#[derive(Debug, Default)]
pub struct LoadedConfig {
    pub config: Config,
    /// File the config came from, `None` for built-in defaults
    pub source: Option<PathBuf>,
    /// Files that existed but could not be read or parsed
    pub skipped: Vec<(PathBuf, String)>,
}

impl Config {
    /// Parse a TOML document and apply the row-limit ceiling
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Load config from standard file locations
    ///
    /// An explicit path is tried alone. Otherwise the first parseable file
    /// among these wins:
    /// 1. `NLSQL_CONFIG_PATH` env var
    /// 2. `~/.nlsql/config.toml`
    /// 3. `./nlsql-mcp.toml`
    /// 4. `$XDG_CONFIG_HOME/nlsql-mcp/config.toml`
    ///
    /// Tracing may not be initialized yet, so problems are returned in
    /// [`LoadedConfig::skipped`] rather than logged here.
    pub fn load(explicit: Option<&Path>) -> LoadedConfig {
        let candidates = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => Self::search_paths(),
        };

        let mut skipped = Vec::new();
        for path in candidates {
            if !path.exists() {
                if explicit.is_some() {
                    skipped.push((path, "file does not exist".to_string()));
                }
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| Self::from_toml(&content).map_err(|e| e.to_string()));
            match parsed {
                Ok(config) => {
                    return LoadedConfig {
                        config,
                        source: Some(path),
                        skipped,
                    }
                }
                Err(e) => skipped.push((path, e)),
            }
        }

        LoadedConfig {
            config: Config::default(),
            source: None,
            skipped,
        }
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(env_path) = std::env::var("NLSQL_CONFIG_PATH") {
            paths.push(PathBuf::from(env_path));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".nlsql").join("config.toml"));
        }
        paths.push(PathBuf::from("nlsql-mcp.toml"));
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("nlsql-mcp").join("config.toml"));
        }
        paths
    }

    fn normalize(&mut self) {
        self.limits.max_limit = self.limits.max_limit.clamp(1, MAX_ROW_LIMIT);
        self.limits.default_limit = self.limits.default_limit.clamp(1, self.limits.max_limit);
    }

    /// Open the database and assemble the query service
    ///
    /// NL querying is only wired in when the synthesizer is enabled, which is
    /// what the transports read back as the `nl_query` capability.
    pub fn build_service(&self) -> Result<QueryService> {
        let db = SqliteDatabase::open(
            &self.database.path,
            Duration::from_secs(self.database.busy_timeout_secs),
        )
        .with_context(|| format!("Failed to open database at {:?}", self.database.path))?;
        tracing::info!("Opened database {}", db.path().display());

        let mut service = QueryService::new(Arc::new(db))
            .with_limits(self.limits.default_limit, self.limits.max_limit)
            .with_schema_cache(Duration::from_secs(self.cache.ttl_secs));

        if self.synthesizer.enabled {
            let synthesizer = HeuristicSynthesizer::new()
                .with_policy(self.synthesizer.mutation_policy)
                .with_synonyms(self.synthesizer.synonyms.clone());
            tracing::info!(policy = ?synthesizer.policy(), "Natural-language querying enabled");
            service = service.with_synthesizer(Arc::new(synthesizer));
        }
        Ok(service)
    }
}
