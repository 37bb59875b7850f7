//! Connection pool for SQLite.
//!
//! - File databases: connections share the file, so idle connections are
//!   reused up to `max_connections`.
//! - In-memory databases: every connection would see its own empty
//!   database, so the pool opens one connection and hands out the same
//!   handle to one holder at a time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use quarry_schema::config::QueryConfig;
use tokio::sync::Semaphore;
use tokio_rusqlite::Connection;
use tracing::{debug, info, trace};

use crate::config::SqliteConfig;
use crate::connection::{PooledConnection, SqliteConnection};
use crate::error::{SqliteError, SqliteResult};

/// A connection pool for SQLite.
///
/// ```rust,ignore
/// use quarry_sqlite::{SqliteConfig, SqlitePool};
///
/// let pool = SqlitePool::new(SqliteConfig::file("data.db")).await?;
/// let conn = pool.get().await?;
/// // Returned to the pool when dropped
/// ```
#[derive(Clone)]
pub struct SqlitePool {
    config: Arc<SqliteConfig>,
    /// Limits concurrent holders.
    semaphore: Arc<Semaphore>,
    /// Idle connections of a file database.
    idle_connections: Arc<Mutex<VecDeque<PooledConnection>>>,
    /// The single connection of an in-memory database.
    shared: Option<PooledConnection>,
    pool_config: Arc<PoolConfig>,
    settings: Arc<QueryConfig>,
    stats: Arc<Mutex<PoolStats>>,
}

/// Statistics about pool usage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of connection reuses.
    pub reuses: u64,
    /// Number of new connections opened.
    pub opens: u64,
    /// Number of connections closed due to expiration.
    pub expirations: u64,
}

impl SqlitePool {
    /// Create a new connection pool from configuration.
    pub async fn new(config: SqliteConfig) -> SqliteResult<Self> {
        Self::with_settings(config, PoolConfig::default(), QueryConfig::default()).await
    }

    /// Create a new connection pool with pool and statement settings.
    pub async fn with_settings(
        config: SqliteConfig,
        pool_config: PoolConfig,
        settings: QueryConfig,
    ) -> SqliteResult<Self> {
        if pool_config.max_connections == 0 {
            return Err(SqliteError::config("max_connections must be at least 1"));
        }

        // Fails early on a bad path, and becomes the shared connection
        // of an in-memory database.
        let first = Self::open_connection(&config).await?;
        let is_memory = config.path.is_memory();
        let permits = if is_memory { 1 } else { pool_config.max_connections };

        info!(
            path = %config.path_str(),
            max_connections = permits,
            "SQLite connection pool created"
        );

        let (shared, idle) = if is_memory {
            (Some(first), VecDeque::new())
        } else {
            let mut idle = VecDeque::with_capacity(permits);
            idle.push_back(first);
            (None, idle)
        };

        let pool = Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            idle_connections: Arc::new(Mutex::new(idle)),
            shared,
            config: Arc::new(config),
            pool_config: Arc::new(pool_config),
            settings: Arc::new(settings),
            stats: Arc::new(Mutex::new(PoolStats { opens: 1, ..PoolStats::default() })),
        };

        // Pre-warm the pool with min_connections
        if !is_memory {
            let missing = pool.pool_config.min_connections.saturating_sub(1).min(permits - 1);
            debug!("Pre-warming pool with {} connections", missing);
            for _ in 0..missing {
                if let Ok(conn) = Self::open_connection(&pool.config).await {
                    pool.stats.lock().opens += 1;
                    pool.idle_connections.lock().push_back(conn);
                }
            }
        }

        Ok(pool)
    }

    /// Open a new connection and run the configuration pragmas on it.
    async fn open_connection(config: &SqliteConfig) -> SqliteResult<PooledConnection> {
        let init_sql = config.init_sql();

        let conn = if config.path.is_memory() {
            Connection::open_in_memory().await?
        } else {
            Connection::open(config.path_str()).await?
        };

        let interrupt = conn
            .call(move |conn| {
                conn.execute_batch(&init_sql)?;
                Ok(conn.get_interrupt_handle())
            })
            .await?;

        Ok(PooledConnection::new(conn, interrupt))
    }

    /// Get a connection from the pool, waiting at most the configured
    /// connection timeout for one to free up.
    pub async fn get(&self) -> SqliteResult<SqliteConnection> {
        trace!("Acquiring connection from pool");

        let acquire = self.semaphore.clone().acquire_owned();
        let permit = match self.pool_config.connection_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire).await.map_err(|_| {
                SqliteError::pool(format!(
                    "no connection available within {}ms",
                    timeout.as_millis()
                ))
            })?,
            None => acquire.await,
        }
        .map_err(|e| SqliteError::pool(format!("failed to acquire permit: {}", e)))?;

        if let Some(shared) = &self.shared {
            self.stats.lock().reuses += 1;
            return Ok(SqliteConnection::new_pooled(
                shared.clone(),
                permit,
                None,
                self.settings.clone(),
                true,
            ));
        }

        // Try to get an idle connection, dropping expired ones
        let reused = {
            let mut idle = self.idle_connections.lock();
            let mut found = None;
            while let Some(pooled) = idle.pop_front() {
                let lifetime_over = self
                    .pool_config
                    .max_lifetime
                    .is_some_and(|lifetime| pooled.created_at.elapsed() > lifetime);
                let idle_over = self
                    .pool_config
                    .idle_timeout
                    .is_some_and(|timeout| pooled.last_used.elapsed() > timeout);

                if lifetime_over || idle_over {
                    self.stats.lock().expirations += 1;
                    continue;
                }
                found = Some(pooled);
                break;
            }
            found
        };

        let pooled = match reused {
            Some(pooled) => {
                self.stats.lock().reuses += 1;
                pooled
            }
            None => {
                debug!("No idle connections, opening new connection");
                let pooled = Self::open_connection(&self.config).await?;
                self.stats.lock().opens += 1;
                pooled
            }
        };

        Ok(SqliteConnection::new_pooled(
            pooled,
            permit,
            Some(self.idle_connections.clone()),
            self.settings.clone(),
            false,
        ))
    }

    /// Get the database configuration.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Get the pool settings.
    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    /// Get the statement settings handed to connections.
    pub fn settings(&self) -> &QueryConfig {
        &self.settings
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.lock().clone()
    }

    /// Get the number of available permits.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the number of idle connections in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle_connections.lock().len()
    }

    /// Check that a connection can be acquired and answers a query.
    pub async fn is_healthy(&self) -> bool {
        match self.get().await {
            Ok(conn) => conn.execute_batch("SELECT 1").await.is_ok(),
            Err(_) => false,
        }
    }

    /// Create a builder for configuring the pool.
    pub fn builder() -> SqlitePoolBuilder {
        SqlitePoolBuilder::new()
    }
}

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of concurrent connections.
    pub max_connections: usize,
    /// Minimum number of connections to keep in the pool.
    pub min_connections: usize,
    /// How long `get` waits for a free connection.
    pub connection_timeout: Option<Duration>,
    /// Maximum idle time before a connection is closed.
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime of a connection before it's recycled.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            connection_timeout: Some(Duration::from_secs(30)),
            idle_timeout: Some(Duration::from_secs(300)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl From<&quarry_schema::config::PoolConfig> for PoolConfig {
    fn from(config: &quarry_schema::config::PoolConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            idle_timeout: Some(config.idle_timeout()),
            ..Self::default()
        }
    }
}

/// Builder for creating a connection pool.
#[derive(Debug, Default)]
pub struct SqlitePoolBuilder {
    config: Option<SqliteConfig>,
    url: Option<String>,
    pool_config: PoolConfig,
    settings: QueryConfig,
}

impl SqlitePoolBuilder {
    /// Create a new pool builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: SqliteConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.pool_config.max_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.connection_timeout = Some(timeout);
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.idle_timeout = Some(timeout);
        self
    }

    /// Set the per-statement settings.
    pub fn query_config(mut self, settings: QueryConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Build the connection pool.
    pub async fn build(self) -> SqliteResult<SqlitePool> {
        let config = if let Some(config) = self.config {
            config
        } else if let Some(url) = self.url {
            SqliteConfig::from_url(url)?
        } else {
            return Err(SqliteError::config("no database URL or config provided"));
        };

        SqlitePool::with_settings(config, self.pool_config, self.settings).await
    }
}
