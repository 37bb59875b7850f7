//! # quarry-query
//!
//! Parser, compiler and runtime for the Quarry query language.
//!
//! This crate provides:
//! - A pest grammar and AST for `@query`, `@insert`, `@update`, `@delete`
//!   and `@transaction` sources
//! - Schema-checked compilation to parameterized SQLite statements
//! - Batched eager loading of declared relations
//! - Row mapping to typed [`Record`]s
//! - The [`Executor`] seam a store implements, and an [`Engine`] running
//!   compiled statements through it
//!
//! ## Compiling
//!
//! ```rust
//! use std::sync::Arc;
//! use quarry_query::{CompiledProgram, Engine, Params};
//! use quarry_schema::{BindingOptions, Catalog, SchemaRegistry};
//!
//! let mut registry = SchemaRegistry::new();
//! registry
//!     .load("@schema User { id: int, email: string, age: int? }")
//!     .unwrap();
//! let mut catalog = Catalog::new(registry);
//! catalog.bind("Users", "User", "users", BindingOptions::new()).unwrap();
//!
//! let engine = Engine::new(Arc::new(catalog));
//! let params = Params::new().set("email", "ada@example.com");
//! let CompiledProgram::Statement(compiled) = engine
//!     .compile_program("@query(Users | email == {email} ?-> id, age)", &params)
//!     .unwrap()
//! else {
//!     unreachable!()
//! };
//!
//! assert_eq!(compiled.sql, "SELECT id, age FROM users WHERE email = ? LIMIT 1");
//! assert_eq!(compiled.bound_values().len(), 1);
//! ```
//!
//! ## Errors
//!
//! Every failure is a [`QueryError`] with a stable [`ErrorCode`]. Parse,
//! schema, relation and compile errors are raised before any statement
//! reaches the store.

pub mod compiler;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod relations;
pub mod row;
pub mod sql;
pub mod traits;
pub mod transaction;
pub mod value;

pub use compiler::{CompiledStatement, Compiler, ConditionCompiler, ResultShape};
pub use dsl::{
    Clauses, Condition, EagerLoad, OperationKind, Operand, Operator, Program, Projection,
    SortDirection, Statement, Terminal, TransactionBlock, parse_condition, parse_program,
    parse_statement,
};
pub use engine::{CompiledBlock, CompiledProgram, Engine, Outcome, QueryOutput};
pub use error::{ErrorCode, ErrorContext, ErrorKind, QueryError, QueryResult, SourceLocation};
pub use relations::{RelationLoader, RelationPlan, RelationPlanner};
pub use row::{RawRow, RawValue};
pub use sql::{SqlBuilder, SqlFragment};
pub use traits::{BoxFuture, Executor};
pub use transaction::{TransactionConfig, TransactionState};
pub use value::{Params, Record, Value};

pub use quarry_schema::TransactionBehavior;

pub use logging::{get_log_format, get_log_level, init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::dsl::{Clauses, Condition, EagerLoad, Operand, SortDirection, Terminal};
    pub use crate::engine::{CompiledProgram, Engine, Outcome, QueryOutput};
    pub use crate::error::{ErrorCode, ErrorKind, QueryError, QueryResult};
    pub use crate::traits::Executor;
    pub use crate::transaction::TransactionConfig;
    pub use crate::value::{Params, Record, Value};
}
