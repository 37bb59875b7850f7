//! SQLite connection wrapper.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use quarry_query::{BoxFuture, Executor, QueryError, QueryResult, RawRow, Value};
use quarry_schema::config::QueryConfig;
use rusqlite::InterruptHandle;
use smol_str::SmolStr;
use tokio::sync::OwnedSemaphorePermit;
use tokio_rusqlite::Connection;
use tracing::{debug, info, trace, warn};

use crate::error::SqliteError;
use crate::types::{from_sqlite, to_sqlite};

/// An open connection, as kept by the pool.
#[derive(Clone)]
pub(crate) struct PooledConnection {
    /// The underlying connection.
    pub conn: Connection,
    /// Interrupts the statement running on `conn`.
    pub interrupt: Arc<InterruptHandle>,
    /// When this connection was created.
    pub created_at: Instant,
    /// When this connection was last used.
    pub last_used: Instant,
}

impl PooledConnection {
    pub fn new(conn: Connection, interrupt: InterruptHandle) -> Self {
        let now = Instant::now();
        Self {
            conn,
            interrupt: Arc::new(interrupt),
            created_at: now,
            last_used: now,
        }
    }
}

/// A connection checked out of a [`SqlitePool`](crate::SqlitePool).
///
/// Returned to the pool on drop, unless [`discard`](Self::discard)ed.
pub struct SqliteConnection {
    inner: Option<PooledConnection>,
    _permit: OwnedSemaphorePermit,
    /// Idle queue to return the connection to.
    return_to_pool: Option<Arc<Mutex<VecDeque<PooledConnection>>>>,
    settings: Arc<QueryConfig>,
    shared: bool,
}

impl SqliteConnection {
    pub(crate) fn new_pooled(
        inner: PooledConnection,
        permit: OwnedSemaphorePermit,
        return_to_pool: Option<Arc<Mutex<VecDeque<PooledConnection>>>>,
        settings: Arc<QueryConfig>,
        shared: bool,
    ) -> Self {
        Self {
            inner: Some(inner),
            _permit: permit,
            return_to_pool,
            settings,
            shared,
        }
    }

    fn inner(&self) -> QueryResult<&PooledConnection> {
        self.inner
            .as_ref()
            .ok_or_else(|| QueryError::connection("connection already released"))
    }

    /// Whether this is the single connection of an in-memory database.
    /// Such a connection is never closed by the pool.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Run a statement that returns rows.
    pub async fn fetch_rows(&self, sql: &str, params: Vec<Value>) -> QueryResult<Vec<RawRow>> {
        let inner = self.inner()?;
        let statement = sql.to_string();
        let params: Vec<rusqlite::types::Value> = params.iter().map(to_sqlite).collect();

        let call = inner.conn.call(move |conn| {
            let mut stmt = conn.prepare_cached(&statement)?;
            let columns: Arc<[SmolStr]> = stmt.column_names().into_iter().map(SmolStr::new).collect();
            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns.len());
                for index in 0..columns.len() {
                    values.push(from_sqlite(row.get_ref(index)?));
                }
                out.push(RawRow::new(columns.clone(), values));
            }
            Ok(out)
        });

        self.timed(sql, call).await
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute_statement(&self, sql: &str, params: Vec<Value>) -> QueryResult<u64> {
        let inner = self.inner()?;
        let statement = sql.to_string();
        let params: Vec<rusqlite::types::Value> = params.iter().map(to_sqlite).collect();

        let call = inner.conn.call(move |conn| {
            let mut stmt = conn.prepare_cached(&statement)?;
            let affected = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
            Ok(affected as u64)
        });

        self.timed(sql, call).await
    }

    /// Execute several statements without parameters.
    pub async fn execute_batch(&self, sql: &str) -> QueryResult<()> {
        let inner = self.inner()?;
        let statements = sql.to_string();
        let call = inner
            .conn
            .call(move |conn| Ok(conn.execute_batch(&statements)?));
        self.timed(sql, call).await
    }

    /// Close the connection instead of returning it to the pool. Closing
    /// rolls back any transaction still open on it.
    pub fn discard(mut self) {
        debug!(shared = self.shared, "Discarding connection");
        self.return_to_pool = None;
    }

    /// Interrupt the statement currently running on this connection, if any.
    pub fn interrupt(&self) {
        if let Some(inner) = &self.inner {
            inner.interrupt.interrupt();
        }
    }

    /// Await a driver call under the statement timeout, logging its
    /// duration. The running statement is interrupted on timeout, and
    /// also when the returned future is dropped before the call finishes.
    async fn timed<T>(
        &self,
        sql: &str,
        call: impl Future<Output = Result<T, tokio_rusqlite::Error>>,
    ) -> QueryResult<T> {
        let guard = InterruptOnDrop::new(&self.inner()?.interrupt);
        let started = Instant::now();
        let result = match self.settings.statement_timeout() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    let limit_ms = limit.as_millis() as u64;
                    warn!(sql = %sql, timeout_ms = limit_ms, "Statement timed out, interrupting");
                    return Err(SqliteError::Timeout(limit_ms).into());
                }
            },
            None => call.await,
        };
        guard.disarm();

        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed >= self.settings.slow_query_threshold() {
            warn!(sql = %sql, elapsed_ms, "Slow statement");
        } else if self.settings.log_queries {
            info!(sql = %sql, elapsed_ms, "Executed statement");
        } else {
            debug!(sql = %sql, elapsed_ms, "Executed statement");
        }

        result.map_err(|e| SqliteError::from(e).into())
    }
}

/// Interrupts the connection's running statement when dropped while armed.
struct InterruptOnDrop<'a> {
    handle: &'a InterruptHandle,
    armed: bool,
}

impl<'a> InterruptOnDrop<'a> {
    fn new(handle: &'a InterruptHandle) -> Self {
        Self { handle, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InterruptOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            trace!("Driver call abandoned, interrupting statement");
            self.handle.interrupt();
        }
    }
}

impl Executor for SqliteConnection {
    fn fetch(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<Vec<RawRow>>> {
        let sql = sql.to_string();
        Box::pin(async move { self.fetch_rows(&sql, params).await })
    }

    fn execute(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<u64>> {
        let sql = sql.to_string();
        Box::pin(async move { self.execute_statement(&sql, params).await })
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let (Some(pool), Some(mut inner)) = (self.return_to_pool.take(), self.inner.take()) {
            trace!("Returning connection to pool");
            inner.last_used = Instant::now();
            pool.lock().push_back(inner);
        }
    }
}
