//! SQLite engine facade: compile, run and transact against a pool.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use quarry_query::{
    BoxFuture, Clauses, CompiledProgram, CompiledStatement, Engine, OperationKind, Outcome,
    Params, QueryError, QueryOutput, QueryResult, Terminal, TransactionConfig,
};
use quarry_schema::{Catalog, QuarryConfig, create_catalog_sql};
use tracing::{debug, info, instrument, warn};

use crate::config::SqliteConfig;
use crate::pool::{PoolConfig, SqlitePool};
use crate::transaction::Transaction;

/// Runs Quarry statements on a SQLite pool.
///
/// ```rust,ignore
/// use quarry_sqlite::SqliteEngine;
///
/// let engine = SqliteEngine::from_config(&config, catalog).await?;
/// let adults = engine
///     .run("@query(Users | age >= {age} ??-> id, name)", &Params::new().set("age", 18))
///     .await?;
/// ```
#[derive(Clone)]
pub struct SqliteEngine {
    pool: SqlitePool,
    engine: Engine,
    transaction: TransactionConfig,
}

impl SqliteEngine {
    /// Create an engine over `pool`. Transactions use the pool's
    /// configured lock behavior.
    pub fn new(pool: SqlitePool, catalog: Arc<Catalog>) -> Self {
        let transaction = TransactionConfig::new().behavior(pool.settings().transaction_behavior);
        Self {
            pool,
            engine: Engine::new(catalog),
            transaction,
        }
    }

    /// Open a pool as described by `quarry.toml`.
    pub async fn from_config(config: &QuarryConfig, catalog: Arc<Catalog>) -> QueryResult<Self> {
        config.validate()?;
        let sqlite = SqliteConfig::from_database_config(&config.database)?;
        let pool = SqlitePool::with_settings(
            sqlite,
            PoolConfig::from(&config.pool),
            config.query.clone(),
        )
        .await?;
        Ok(Self::new(pool, catalog))
    }

    /// Replace the settings used by [`transaction`](Self::transaction).
    pub fn with_transaction_config(mut self, config: TransactionConfig) -> Self {
        self.transaction = config;
        self
    }

    /// The connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The store-independent engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        self.engine.catalog()
    }

    /// Create the table of every binding, if missing.
    pub async fn create_tables(&self) -> QueryResult<()> {
        let conn = self.pool.get().await?;
        for sql in create_catalog_sql(self.catalog()) {
            conn.execute_batch(&sql).await?;
        }
        info!(tables = self.catalog().bindings().count(), "Tables created");
        Ok(())
    }

    /// Execute raw SQL statements without parameters.
    pub async fn execute_batch(&self, sql: &str) -> QueryResult<()> {
        let conn = self.pool.get().await?;
        conn.execute_batch(sql).await
    }

    /// Parse, compile and run DSL source. A `@transaction` block runs
    /// inside one transaction.
    #[instrument(skip(self, params))]
    pub async fn run(&self, source: &str, params: &Params) -> QueryResult<QueryOutput> {
        match self.engine.compile_program(source, params)? {
            CompiledProgram::Statement(compiled) => self.run_compiled(&compiled).await,
            CompiledProgram::Transaction(block) => {
                self.transaction(move |tx| Box::pin(async move { tx.run_block(&block).await }))
                    .await
            }
        }
    }

    /// Run a compiled statement on a pooled connection.
    pub async fn run_compiled(&self, compiled: &CompiledStatement) -> QueryResult<QueryOutput> {
        let conn = self.pool.get().await?;
        self.engine.execute(&conn, compiled).await
    }

    /// Compile a statement given as parts and run it, reporting failure
    /// as [`Outcome::Failed`].
    #[instrument(skip(self, clauses, terminal, params), fields(operation = %kind.as_str()))]
    pub async fn compile_and_run(
        &self,
        binding: &str,
        kind: OperationKind,
        clauses: Clauses,
        terminal: Terminal,
        params: &Params,
    ) -> Outcome {
        let result = match self.engine.compile_parts(binding, kind, clauses, terminal, params) {
            Ok(compiled) => self.run_compiled(&compiled).await,
            Err(err) => Err(err),
        };
        outcome(result)
    }

    /// [`run`](Self::run), reporting failure as [`Outcome::Failed`].
    pub async fn run_script(&self, source: &str, params: &Params) -> Outcome {
        outcome(self.run(source, params).await)
    }

    /// Run `f` inside a transaction on one pooled connection.
    ///
    /// Commits when `f` returns `Ok` and rolls back when it returns `Err`
    /// or panics. If a statement failed inside `f`, the commit is refused
    /// with [`TransactionAborted`](quarry_query::ErrorCode::TransactionAborted)
    /// even when `f` swallowed the error.
    ///
    /// On an in-memory database the transaction holds the only
    /// connection; statements inside `f` must go through `tx`.
    ///
    /// ```rust,ignore
    /// let id = engine
    ///     .transaction(|tx| {
    ///         Box::pin(async move {
    ///             tx.run("@insert(Users |< email: \"a@b.c\" ?-> id)", &Params::new()).await
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, F>(&self, f: F) -> QueryResult<T>
    where
        F: for<'t> FnOnce(&'t Transaction) -> BoxFuture<'t, QueryResult<T>>,
    {
        let conn = self.pool.get().await?;
        let tx = Transaction::begin(conn, self.engine.clone(), self.transaction).await?;

        let body = AssertUnwindSafe(f(&tx)).catch_unwind();
        let finished = match self.transaction.timeout {
            Some(limit) => match tokio::time::timeout(limit, body).await {
                Ok(finished) => finished,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "Transaction timed out");
                    tx.interrupt();
                    Ok(Err(QueryError::timeout(limit.as_millis() as u64)))
                }
            },
            None => body.await,
        };

        match finished {
            Ok(Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(Err(err)) => {
                debug!(code = %err.code, "Transaction body failed");
                if tx.state().needs_rollback() {
                    let _ = tx.rollback().await;
                }
                Err(err)
            }
            Err(panic) => {
                warn!("Transaction body panicked, rolling back");
                let _ = tx.rollback().await;
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// [`transaction`](Self::transaction), reporting failure as
    /// [`Outcome::Failed`].
    pub async fn transaction_outcome<F>(&self, f: F) -> Outcome
    where
        F: for<'t> FnOnce(&'t Transaction) -> BoxFuture<'t, QueryResult<QueryOutput>>,
    {
        outcome(self.transaction(f).await)
    }
}

fn outcome(result: QueryResult<QueryOutput>) -> Outcome {
    if let Err(err) = &result {
        debug!(code = %err.code, message = %err.message, "Reporting failed outcome");
    }
    Outcome::from(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quarry_query::{ErrorCode, ErrorKind, Executor, Record, TransactionState, Value};
    use quarry_schema::{BindingOptions, SchemaRegistry};

    const SCHEMA: &str = r#"
        @schema User {
            id: int,
            email: string(unique: true),
            name: string,
            posts: [Post] via author_id,
        }
        @schema Post {
            id: int,
            author_id: int,
            title: string,
            deleted_at: datetime?,
            author: User via author_id,
        }
    "#;

    fn catalog() -> Arc<Catalog> {
        let mut registry = SchemaRegistry::new();
        registry.load(SCHEMA).unwrap();
        let mut catalog = Catalog::new(registry);
        catalog.bind("Users", "User", "users", BindingOptions::new()).unwrap();
        catalog
            .bind("Posts", "Post", "posts", BindingOptions::new().soft_delete("deleted_at"))
            .unwrap();
        Arc::new(catalog)
    }

    async fn file_engine() -> (tempfile::TempDir, SqliteEngine) {
        let dir = tempfile::tempdir().unwrap();
        let pool = SqlitePool::new(SqliteConfig::file(dir.path().join("engine.db")))
            .await
            .unwrap();
        let engine = SqliteEngine::new(pool, catalog());
        engine.create_tables().await.unwrap();
        (dir, engine)
    }

    async fn insert_user(engine: &SqliteEngine, email: &str, name: &str) -> i64 {
        let params = Params::new().set("email", email).set("name", name);
        let output = engine
            .run("@insert(Users |< email: {email} |< name: {name} ?-> id)", &params)
            .await
            .unwrap();
        output.row().and_then(|row| row.get("id")).and_then(Value::as_int).unwrap()
    }

    #[tokio::test]
    async fn test_insert_query_and_eager_load() {
        let (_dir, engine) = file_engine().await;
        let ada = insert_user(&engine, "ada@example.com", "Ada").await;

        for title in ["First", "Second"] {
            let params = Params::new().set("author", ada).set("title", title);
            engine
                .run("@insert(Posts |< author_id: {author} |< title: {title} .)", &params)
                .await
                .unwrap();
        }

        let output = engine
            .run(
                "@query(Users | email == {email} | with posts(order title desc) ?-> name)",
                &Params::new().set("email", "ada@example.com"),
            )
            .await
            .unwrap();
        let user = output.row().unwrap();
        assert_eq!(user.get("name"), Some(&Value::from("Ada")));

        let posts = user.get("posts").and_then(Value::as_list).unwrap();
        let titles: Vec<_> = posts
            .iter()
            .filter_map(|post| post.as_record()?.get("title")?.as_str())
            .collect();
        assert_eq!(titles, vec!["Second", "First"]);
    }

    #[tokio::test]
    async fn test_batch_insert() {
        let (_dir, engine) = file_engine().await;
        let people: Vec<Record> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                Record::from([
                    ("email", Value::from(format!("{}@example.com", name))),
                    ("name", Value::from(name)),
                ])
            })
            .collect();
        let src = "@insert(Users * each {people} as p |< email: {p.email} |< name: {p.name} .-> count)";

        let inserted = engine
            .run(src, &Params::new().set("people", people[..2].to_vec()))
            .await
            .unwrap();
        assert_eq!(inserted, QueryOutput::Count(2));

        let empty = engine
            .run(src, &Params::new().set("people", Vec::<Record>::new()))
            .await
            .unwrap();
        assert_eq!(empty, QueryOutput::Count(0));

        let output = engine
            .run(
                "@insert(Users * each {people} as p |< email: {p.email} |< name: {p.name} ??-> name)",
                &Params::new().set("people", people[2..].to_vec()),
            )
            .await
            .unwrap();
        let names: Vec<_> = output
            .rows()
            .unwrap()
            .iter()
            .filter_map(|row| row.get("name")?.as_str())
            .collect();
        assert_eq!(names, vec!["c"]);

        // One duplicate fails the whole batch
        let mixed = vec![people[0].clone(), Record::from([
            ("email", Value::from("d@example.com")),
            ("name", Value::from("d")),
        ])];
        let err = engine
            .run(src, &Params::new().set("people", mixed))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UniqueConstraint);

        let count = engine.run("@query(Users ?-> count)", &Params::new()).await.unwrap();
        assert_eq!(count.count(), Some(3));
    }

    #[tokio::test]
    async fn test_single_row_with_no_match_is_none() {
        let (_dir, engine) = file_engine().await;
        let output = engine
            .run("@query(Users | id == 42 ?-> *)", &Params::new())
            .await
            .unwrap();
        assert_eq!(output, QueryOutput::Row(None));
    }

    #[tokio::test]
    async fn test_constraint_error_carries_context() {
        let (_dir, engine) = file_engine().await;
        insert_user(&engine, "dup@example.com", "A").await;

        let params = Params::new().set("email", "dup@example.com").set("name", "B");
        let err = engine
            .run("@insert(Users |< email: {email} |< name: {name} .)", &params)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UniqueConstraint);
        assert_eq!(err.context.binding.as_deref(), Some("Users"));
        assert!(err.context.sql.is_some());
    }

    #[tokio::test]
    async fn test_transaction_commits_on_ok() {
        let (_dir, engine) = file_engine().await;
        let id = engine
            .transaction(|tx| {
                Box::pin(async move {
                    let params = Params::new().set("email", "tx@example.com").set("name", "Tx");
                    let output = tx
                        .run("@insert(Users |< email: {email} |< name: {name} ?-> id)", &params)
                        .await?;
                    Ok(output.row().and_then(|row| row.get("id")).and_then(Value::as_int))
                })
            })
            .await
            .unwrap();
        assert!(id.is_some());

        let count = engine.run("@query(Users ?-> count)", &Params::new()).await.unwrap();
        assert_eq!(count.count(), Some(1));
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_err() {
        let (_dir, engine) = file_engine().await;
        let err = engine
            .transaction(|tx| {
                Box::pin(async move {
                    let params = Params::new().set("email", "x@example.com").set("name", "X");
                    tx.run("@insert(Users |< email: {email} |< name: {name} .)", &params)
                        .await?;
                    tx.run("@insert(Users |< email: {email} |< name: {name} .)", &params)
                        .await?;
                    Ok(())
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UniqueConstraint);

        let count = engine.run("@query(Users ?-> count)", &Params::new()).await.unwrap();
        assert_eq!(count.count(), Some(0));
    }

    #[tokio::test]
    async fn test_swallowed_failure_cannot_commit() {
        let (_dir, engine) = file_engine().await;
        let err = engine
            .transaction(|tx| {
                Box::pin(async move {
                    let params = Params::new().set("email", "s@example.com").set("name", "S");
                    tx.run("@insert(Users |< email: {email} |< name: {name} .)", &params)
                        .await?;
                    let _ = tx.run("@query(Nobody ??-> *)", &Params::new()).await;
                    assert_eq!(tx.state(), TransactionState::Aborted);
                    Ok(())
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TransactionAborted);

        let count = engine.run("@query(Users ?-> count)", &Params::new()).await.unwrap();
        assert_eq!(count.count(), Some(0));
    }

    #[tokio::test]
    async fn test_transaction_block_returns_early() {
        let (_dir, engine) = file_engine().await;
        let params = Params::new().set("email", "b@example.com");
        let output = engine
            .run(
                "@transaction {
                    @insert(Users |< email: {email} |< name: \"B\" .);
                    return @query(Users | email == {email} ?-> name);
                    @delete(Users | email == {email} .)
                }",
                &params,
            )
            .await
            .unwrap();
        let expected: Record = [("name", Value::from("B"))].into();
        assert_eq!(output, QueryOutput::Row(Some(expected)));

        let still_there = engine
            .run("@query(Users | email == {email} ?-> exists)", &params)
            .await
            .unwrap();
        assert_eq!(still_there, QueryOutput::Exists(true));
    }

    #[tokio::test]
    async fn test_compile_and_run_outcomes() {
        let (_dir, engine) = file_engine().await;
        insert_user(&engine, "o@example.com", "O").await;

        let outcome = engine
            .compile_and_run(
                "Users",
                OperationKind::Query,
                Clauses::new(),
                Terminal::Count,
                &Params::new(),
            )
            .await;
        assert_eq!(outcome, Outcome::Count { count: 1 });

        let outcome = engine
            .compile_and_run(
                "Ghosts",
                OperationKind::Query,
                Clauses::new(),
                Terminal::Count,
                &Params::new(),
            )
            .await;
        match outcome {
            Outcome::Failed { error, kind, .. } => {
                assert!(error);
                assert_eq!(kind, ErrorKind::Schema);
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let outcome = engine.run_script("@query(Users |", &Params::new()).await;
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn test_statement_timeout_interrupts() {
        let dir = tempfile::tempdir().unwrap();
        let settings = quarry_schema::config::QueryConfig {
            statement_timeout_ms: 50,
            ..Default::default()
        };
        let pool = SqlitePool::builder()
            .config(SqliteConfig::file(dir.path().join("slow.db")))
            .query_config(settings)
            .build()
            .await
            .unwrap();

        let conn = pool.get().await.unwrap();
        let err = conn
            .fetch_rows(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c",
                vec![],
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_transaction_timeout_interrupts_running_statement() {
        let (_dir, engine) = file_engine().await;
        let engine = engine
            .with_transaction_config(TransactionConfig::new().timeout(std::time::Duration::from_millis(200)));

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            engine.transaction(|tx| {
                Box::pin(async move {
                    tx.fetch(
                        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c",
                        vec![],
                    )
                    .await?;
                    Ok(())
                })
            }),
        )
        .await
        .expect("transaction timeout should end the transaction");

        let err = result.unwrap_err();
        assert!(err.is_timeout());

        // The connection is usable again once the statement is interrupted
        let count = engine.run("@query(Users ?-> count)", &Params::new()).await.unwrap();
        assert_eq!(count.count(), Some(0));
    }

    #[tokio::test]
    async fn test_dropped_statement_is_interrupted() {
        let (_dir, engine) = file_engine().await;
        let conn = engine.pool().get().await.unwrap();

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            conn.fetch_rows(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c",
                vec![],
            ),
        )
        .await;
        assert!(abandoned.is_err());

        let rows = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            conn.fetch_rows("SELECT 1", vec![]),
        )
        .await
        .expect("connection should be free after the interrupt")
        .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_from_config_memory() {
        let config: QuarryConfig = r#"
            [database]
            url = "sqlite::memory:"

            [query]
            transaction_behavior = "exclusive"
        "#
        .parse()
        .unwrap();
        let engine = SqliteEngine::from_config(&config, catalog()).await.unwrap();
        assert_eq!(engine.pool().available_permits(), 1);

        engine.create_tables().await.unwrap();
        insert_user(&engine, "m@example.com", "M").await;
        let count = engine.run("@query(Users ?-> count)", &Params::new()).await.unwrap();
        assert_eq!(count.count(), Some(1));
    }
}
