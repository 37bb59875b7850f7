//! Transactions over one pooled connection.

use parking_lot::Mutex;
use quarry_query::{
    BoxFuture, CompiledBlock, CompiledProgram, CompiledStatement, Engine, Executor, Params, QueryError,
    QueryOutput, QueryResult, RawRow, TransactionConfig, TransactionState, Value,
};
use tracing::{info, instrument, warn};

use crate::connection::SqliteConnection;

/// An open transaction.
///
/// Statements run through [`run`](Self::run), or through the
/// [`Executor`] impl. The first failure aborts the transaction: later
/// statements are rejected and it can only roll back. A transaction
/// dropped without commit or rollback closes its connection, so SQLite
/// rolls it back.
pub struct Transaction {
    conn: Option<SqliteConnection>,
    state: Mutex<TransactionState>,
    config: TransactionConfig,
    engine: Engine,
}

impl Transaction {
    /// Issue `BEGIN` on `conn`.
    pub(crate) async fn begin(
        conn: SqliteConnection,
        engine: Engine,
        config: TransactionConfig,
    ) -> QueryResult<Self> {
        conn.execute_batch(config.begin_sql()).await?;
        Ok(Self {
            conn: Some(conn),
            state: Mutex::new(TransactionState::Open),
            config,
            engine,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// The transaction settings.
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Interrupt the statement currently running inside this transaction.
    pub fn interrupt(&self) {
        if let Some(conn) = &self.conn {
            conn.interrupt();
        }
    }

    fn conn(&self) -> QueryResult<&SqliteConnection> {
        self.conn.as_ref().ok_or_else(QueryError::transaction_closed)
    }

    /// Mark the transaction aborted after `err`.
    fn abort(&self, err: QueryError) -> QueryError {
        let mut state = self.state.lock();
        if *state == TransactionState::Open {
            warn!(code = %err.code, "Statement failed, transaction aborted");
            *state = TransactionState::Aborted;
        }
        err
    }

    fn track<T>(&self, result: QueryResult<T>) -> QueryResult<T> {
        result.map_err(|e| self.abort(e))
    }

    /// Parse, compile and run one statement inside this transaction.
    /// A `@transaction` block is rejected.
    #[instrument(skip(self, params))]
    pub async fn run(&self, source: &str, params: &Params) -> QueryResult<QueryOutput> {
        self.state.lock().ensure_usable()?;
        let compiled = match self.engine.compile_program(source, params) {
            Ok(CompiledProgram::Statement(compiled)) => compiled,
            Ok(CompiledProgram::Transaction(_)) => {
                return Err(self.abort(QueryError::nested_transaction()));
            }
            Err(err) => return Err(self.abort(err)),
        };
        self.run_compiled(&compiled).await
    }

    /// Run an already compiled statement inside this transaction.
    pub async fn run_compiled(&self, compiled: &CompiledStatement) -> QueryResult<QueryOutput> {
        self.state.lock().ensure_usable()?;
        let result = self.engine.execute(self, compiled).await;
        self.track(result)
    }

    /// Run a compiled `@transaction` block's statements in order.
    pub async fn run_block(&self, block: &CompiledBlock) -> QueryResult<QueryOutput> {
        self.state.lock().ensure_usable()?;
        let result = self.engine.run_block(self, block).await;
        self.track(result)
    }

    /// Commit. An aborted transaction rolls back instead and the abort
    /// error is returned.
    pub async fn commit(mut self) -> QueryResult<()> {
        let committable = self.state.lock().ensure_committable();
        if let Err(err) = committable {
            if self.state().needs_rollback() {
                let _ = self.finish_rollback().await;
            }
            return Err(err);
        }

        *self.state.lock() = TransactionState::Committing;
        let result = match self.conn() {
            Ok(conn) => conn.execute_batch(self.config.commit_sql()).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                *self.state.lock() = TransactionState::Committed;
                info!("Transaction committed");
                Ok(())
            }
            Err(err) => {
                *self.state.lock() = TransactionState::Aborted;
                let _ = self.finish_rollback().await;
                Err(err.with_context("commit"))
            }
        }
    }

    /// Roll back.
    pub async fn rollback(mut self) -> QueryResult<()> {
        if !self.state().needs_rollback() {
            return Err(QueryError::transaction_closed());
        }
        self.finish_rollback().await
    }

    async fn finish_rollback(&mut self) -> QueryResult<()> {
        *self.state.lock() = TransactionState::RollingBack;
        let result = match self.conn() {
            Ok(conn) => conn.execute_batch(self.config.rollback_sql()).await,
            Err(err) => Err(err),
        };
        *self.state.lock() = TransactionState::RolledBack;

        match result {
            Ok(()) => {
                info!("Transaction rolled back");
                Ok(())
            }
            Err(err) => {
                // An interrupted statement can end the transaction before
                // ROLLBACK runs; the connection is not reused either way.
                warn!(error = %err, "ROLLBACK failed, discarding connection");
                if let Some(conn) = self.conn.take() {
                    if !conn.is_shared() {
                        conn.discard();
                    }
                }
                Err(err)
            }
        }
    }
}

impl Executor for Transaction {
    fn fetch(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<Vec<RawRow>>> {
        let sql = sql.to_string();
        Box::pin(async move {
            self.state.lock().ensure_usable()?;
            let result = self.conn()?.fetch_rows(&sql, params).await;
            self.track(result)
        })
    }

    fn execute(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<u64>> {
        let sql = sql.to_string();
        Box::pin(async move {
            self.state.lock().ensure_usable()?;
            let result = self.conn()?.execute_statement(&sql, params).await;
            self.track(result)
        })
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.state.get_mut().needs_rollback() {
            return;
        }
        let Some(conn) = self.conn.take() else {
            return;
        };

        warn!("Transaction dropped while open, rolling back");
        if !conn.is_shared() {
            conn.discard();
            return;
        }

        // The shared in-memory connection outlives this holder, so the
        // rollback is issued before the connection is released.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = conn.execute_batch("ROLLBACK").await {
                        warn!(error = %err, "ROLLBACK of dropped transaction failed");
                    }
                });
            }
            Err(_) => warn!("No runtime to roll back dropped transaction"),
        }
    }
}
