//! Running compiled statements.
//!
//! The [`Engine`] owns the shared [`Catalog`] and turns source text into
//! results: parse, compile, run through an [`Executor`], map rows, load
//! relations. It holds no connection; every call takes the executor to run
//! on, which is how statements end up inside or outside a transaction.

use std::sync::Arc;
use std::time::Instant;

use quarry_schema::{Binding, Catalog};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::compiler::{CompiledStatement, Compiler, ResultShape};
use crate::dsl::{Clauses, OperationKind, Program, Statement, Terminal, TransactionBlock, parse_program};
use crate::error::{ErrorKind, QueryError, QueryResult};
use crate::mapping::map_rows;
use crate::relations::RelationLoader;
use crate::row::RawValue;
use crate::traits::Executor;
use crate::value::{Params, Record, Value};

/// Result of running one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// `??->`
    Rows(Vec<Record>),
    /// `?->`
    Row(Option<Record>),
    /// `?-> count` or `.-> count`
    Count(i64),
    /// `?-> exists`
    Exists(bool),
    /// `.`
    Done,
}

impl QueryOutput {
    /// The rows, if this is a multi-row result.
    pub fn rows(&self) -> Option<&[Record]> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// The row, if this is a single-row result that found one.
    pub fn row(&self) -> Option<&Record> {
        match self {
            Self::Row(row) => row.as_ref(),
            _ => None,
        }
    }

    /// The count, if this is a count result.
    pub fn count(&self) -> Option<i64> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }
}

/// A host-facing result that never fails: errors become data.
///
/// Serializes to `{"rows": [...]}`, `{"row": ...}`, `{"count": n}`,
/// `{"exists": b}`, `{}` or `{"error": true, "kind": "...", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    /// Rows of a multi-row terminal.
    Rows {
        /// The rows.
        rows: Vec<Record>,
    },
    /// Row of a single-row terminal.
    Row {
        /// The row, or null.
        row: Option<Record>,
    },
    /// Count or affected rows.
    Count {
        /// The count.
        count: i64,
    },
    /// Existence check.
    Exists {
        /// Whether a row matched.
        exists: bool,
    },
    /// The statement or transaction failed.
    Failed {
        /// Always `true`.
        error: bool,
        /// Error category.
        kind: ErrorKind,
        /// Error message, including its code.
        message: String,
    },
    /// Nothing to return.
    Done {},
}

impl Outcome {
    /// Whether this is a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl From<QueryOutput> for Outcome {
    fn from(output: QueryOutput) -> Self {
        match output {
            QueryOutput::Rows(rows) => Self::Rows { rows },
            QueryOutput::Row(row) => Self::Row { row },
            QueryOutput::Count(count) => Self::Count { count },
            QueryOutput::Exists(exists) => Self::Exists { exists },
            QueryOutput::Done => Self::Done {},
        }
    }
}

impl From<&QueryError> for Outcome {
    fn from(err: &QueryError) -> Self {
        Self::Failed {
            error: true,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<QueryResult<QueryOutput>> for Outcome {
    fn from(result: QueryResult<QueryOutput>) -> Self {
        match result {
            Ok(output) => output.into(),
            Err(err) => (&err).into(),
        }
    }
}

/// A compiled `@transaction` block.
#[derive(Debug, Clone)]
pub struct CompiledBlock {
    /// Statements in order, with their `return` flag.
    pub items: Vec<(CompiledStatement, bool)>,
}

/// A compiled program.
#[derive(Debug, Clone)]
pub enum CompiledProgram {
    /// One statement.
    Statement(CompiledStatement),
    /// A transaction block. Must run inside a transaction.
    Transaction(CompiledBlock),
}

/// Compiles and runs statements against a shared catalog.
#[derive(Debug, Clone)]
pub struct Engine {
    catalog: Arc<Catalog>,
}

impl Engine {
    /// Create an engine over `catalog`.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// The catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Parse and compile a program.
    pub fn compile_program(&self, source: &str, params: &Params) -> QueryResult<CompiledProgram> {
        match parse_program(source)? {
            Program::Statement(statement) => self.compile(&statement, params).map(CompiledProgram::Statement),
            Program::Transaction(block) => self.compile_block(&block, params).map(CompiledProgram::Transaction),
        }
    }

    /// Compile a parsed statement.
    pub fn compile(&self, statement: &Statement, params: &Params) -> QueryResult<CompiledStatement> {
        Compiler::new(&self.catalog).compile(statement, params)
    }

    /// Compile a statement given as parts rather than source text.
    pub fn compile_parts(
        &self,
        binding: &str,
        kind: OperationKind,
        clauses: Clauses,
        terminal: Terminal,
        params: &Params,
    ) -> QueryResult<CompiledStatement> {
        let statement = Statement {
            kind,
            source: binding.into(),
            clauses,
            terminal,
        };
        self.compile(&statement, params)
    }

    /// Compile a statement against a binding object.
    pub fn compile_bound(
        &self,
        binding: &Arc<Binding>,
        statement: &Statement,
        params: &Params,
    ) -> QueryResult<CompiledStatement> {
        Compiler::new(&self.catalog).compile_bound(binding, statement, params)
    }

    /// Compile every statement of a block. Nothing runs if any fails.
    pub fn compile_block(&self, block: &TransactionBlock, params: &Params) -> QueryResult<CompiledBlock> {
        let items = block
            .items
            .iter()
            .map(|item| Ok((self.compile(&item.statement, params)?, item.returns)))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(CompiledBlock { items })
    }

    /// Run a compiled statement on `executor`.
    #[instrument(skip_all, fields(binding = %compiled.binding.name(), operation = %compiled.operation))]
    pub async fn execute<E: Executor + ?Sized>(
        &self,
        executor: &E,
        compiled: &CompiledStatement,
    ) -> QueryResult<QueryOutput> {
        if compiled.is_noop() {
            debug!("Nothing to run");
            return Ok(match compiled.shape {
                ResultShape::Rows => QueryOutput::Rows(Vec::new()),
                ResultShape::Row => QueryOutput::Row(None),
                ResultShape::Count | ResultShape::Affected => QueryOutput::Count(0),
                ResultShape::Exists => QueryOutput::Exists(false),
                ResultShape::Done => QueryOutput::Done,
            });
        }

        let started = Instant::now();
        let params: Vec<Value> = compiled.bound_values().into_iter().cloned().collect();
        crate::quarry_debug!(sql = %compiled.sql, params = ?params, "Running statement");

        let wrap = |e: QueryError| {
            e.with_binding(compiled.binding.name())
                .with_context(compiled.operation.as_str())
                .with_sql(compiled.sql.as_str())
        };

        let output = match compiled.shape {
            ResultShape::Rows | ResultShape::Row => {
                let mut rows = executor.fetch(&compiled.sql, params).await.map_err(wrap)?;
                if compiled.shape == ResultShape::Row {
                    rows.truncate(1);
                }
                let mut records = map_rows(compiled.binding.schema(), &rows).map_err(wrap)?;
                if !compiled.relations.is_empty() {
                    RelationLoader::new(executor)
                        .load(&compiled.relations, &mut records)
                        .await?;
                }
                for record in &mut records {
                    for column in &compiled.hidden_columns {
                        record.remove(column);
                    }
                }
                match compiled.shape {
                    ResultShape::Row => QueryOutput::Row(records.into_iter().next()),
                    _ => QueryOutput::Rows(records),
                }
            }
            ResultShape::Count => {
                let rows = executor.fetch(&compiled.sql, params).await.map_err(wrap)?;
                let count = match rows.first().and_then(|row| row.values.first()) {
                    Some(RawValue::Integer(n)) => *n,
                    other => {
                        return Err(wrap(QueryError::internal(format!(
                            "COUNT(*) returned {:?}",
                            other
                        ))));
                    }
                };
                QueryOutput::Count(count)
            }
            ResultShape::Exists => {
                let rows = executor.fetch(&compiled.sql, params).await.map_err(wrap)?;
                QueryOutput::Exists(!rows.is_empty())
            }
            ResultShape::Done => {
                executor.execute(&compiled.sql, params).await.map_err(wrap)?;
                QueryOutput::Done
            }
            ResultShape::Affected => {
                let affected = executor.execute(&compiled.sql, params).await.map_err(wrap)?;
                QueryOutput::Count(i64::try_from(affected).unwrap_or(i64::MAX))
            }
        };

        debug!(
            elapsed_us = started.elapsed().as_micros() as u64,
            relations = compiled.relations.len(),
            "Statement finished"
        );
        Ok(output)
    }

    /// Run a block's statements in order on `executor`, which the caller
    /// has put inside a transaction. Stops at the first `return` and yields
    /// its value; otherwise yields the last statement's value.
    pub async fn run_block<E: Executor + ?Sized>(
        &self,
        executor: &E,
        block: &CompiledBlock,
    ) -> QueryResult<QueryOutput> {
        let mut last = QueryOutput::Done;
        for (index, (compiled, returns)) in block.items.iter().enumerate() {
            last = self
                .execute(executor, compiled)
                .await
                .map_err(|e| e.with_context(format!("transaction statement {}", index + 1)))?;
            if *returns {
                debug!(statement = index + 1, "Transaction block returned early");
                break;
            }
        }
        Ok(last)
    }
}
