//! Configuration file parsing for `quarry.toml`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex_lite::Regex;

use crate::error::{SchemaError, SchemaResult};

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Main configuration structure for `quarry.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuarryConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Connection pool settings.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Query execution settings.
    #[serde(default)]
    pub query: QueryConfig,

    /// Environment-specific overrides.
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentOverride>,
}

impl QuarryConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        content.parse()
    }

    /// Get the database URL.
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// Apply environment-specific overrides.
    pub fn with_environment(mut self, env: &str) -> Self {
        if let Some(overrides) = self.environments.remove(env) {
            if let Some(url) = overrides.url {
                self.database.url = url;
            }
            if let Some(pool) = overrides.pool {
                self.pool = pool;
            }
            if let Some(log_queries) = overrides.log_queries {
                self.query.log_queries = log_queries;
            }
            if let Some(timeout) = overrides.statement_timeout_ms {
                self.query.statement_timeout_ms = timeout;
            }
        }
        self
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> SchemaResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(SchemaError::config("database.url must not be empty"));
        }
        if self.pool.max_connections == 0 {
            return Err(SchemaError::config("pool.max_connections must be at least 1"));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(SchemaError::config(format!(
                "pool.min_connections ({}) exceeds pool.max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        Ok(())
    }
}

impl std::str::FromStr for QuarryConfig {
    type Err = SchemaError;

    /// Parse configuration from a TOML string, expanding `${VAR}` references.
    fn from_str(content: &str) -> SchemaResult<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| SchemaError::TomlError { source: e })?;
        config.validate()?;
        Ok(config)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL: `sqlite::memory:`, `sqlite://path` or `file:path`.
    /// Supports `${ENV_VAR}` interpolation.
    #[serde(default = "default_url")]
    pub url: String,

    /// Enforce foreign keys.
    #[serde(default = "default_true")]
    pub foreign_keys: bool,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,

    /// Journal mode (`wal`, `delete`, `truncate`, `persist`, `memory`, `off`).
    #[serde(default = "default_journal_mode")]
    pub journal_mode: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            foreign_keys: true,
            busy_timeout_ms: default_busy_timeout(),
            journal_mode: default_journal_mode(),
        }
    }
}

fn default_url() -> String { "sqlite::memory:".to_string() }
fn default_true() -> bool { true }
fn default_busy_timeout() -> u32 { 5000 }
fn default_journal_mode() -> String { "wal".to_string() }

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Minimum number of idle connections kept open.
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,

    /// Idle connection timeout in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl PoolConfig {
    /// Idle timeout as a duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn default_max_connections() -> usize { 5 }
fn default_min_connections() -> usize { 1 }
fn default_idle_timeout() -> u64 { 300 }

/// How a transaction acquires its locks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionBehavior {
    /// Locks are taken on first use.
    Deferred,
    /// A write lock is taken at `BEGIN`.
    #[default]
    Immediate,
    /// An exclusive lock is taken at `BEGIN`.
    Exclusive,
}

impl TransactionBehavior {
    /// The `BEGIN` statement for this behavior.
    pub fn begin_sql(&self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED",
            Self::Immediate => "BEGIN IMMEDIATE",
            Self::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// Query execution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Per-statement timeout in milliseconds. `0` disables the timeout.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_ms: u64,

    /// Log every statement at `info` instead of `debug`.
    #[serde(default)]
    pub log_queries: bool,

    /// Statements slower than this are logged at `warn`.
    #[serde(default = "default_slow_query_threshold")]
    pub slow_query_threshold_ms: u64,

    /// Lock behavior of transactions.
    #[serde(default)]
    pub transaction_behavior: TransactionBehavior,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            statement_timeout_ms: default_statement_timeout(),
            log_queries: false,
            slow_query_threshold_ms: default_slow_query_threshold(),
            transaction_behavior: TransactionBehavior::default(),
        }
    }
}

impl QueryConfig {
    /// Statement timeout, or `None` when disabled.
    pub fn statement_timeout(&self) -> Option<Duration> {
        (self.statement_timeout_ms > 0).then(|| Duration::from_millis(self.statement_timeout_ms))
    }

    /// Slow statement threshold.
    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }
}

fn default_statement_timeout() -> u64 { 30_000 }
fn default_slow_query_threshold() -> u64 { 500 }

/// Environment-specific configuration overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentOverride {
    /// Override connection URL.
    pub url: Option<String>,

    /// Override pool settings.
    pub pool: Option<PoolConfig>,

    /// Override `query.log_queries`.
    pub log_queries: Option<bool>,

    /// Override `query.statement_timeout_ms`.
    pub statement_timeout_ms: Option<u64>,
}

/// Expand environment variables in the format `${VAR_NAME}`. Unset variables
/// are left as written.
fn expand_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &regex_lite::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
