//! # Quarry
//!
//! A schema-aware query language embedded in Rust, compiled to
//! parameterized SQLite statements.
//!
//! Quarry provides:
//! - `@schema` declarations bound to tables, with optional soft deletes
//! - `@query`, `@insert`, `@update` and `@delete` statements checked
//!   against the schema before anything reaches the database
//! - Batched eager loading of declared relations with `with`
//! - Transactions, from Rust closures or `@transaction { ... }` blocks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quarry::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueryError> {
//!     let mut registry = SchemaRegistry::new();
//!     registry.load(r#"
//!         @schema User { id: int, email: string(unique: true), posts: [Post] via author_id }
//!         @schema Post { id: int, author_id: int, title: string }
//!     "#)?;
//!     let mut catalog = Catalog::new(registry);
//!     catalog.bind("Users", "User", "users", BindingOptions::new())?;
//!     catalog.bind("Posts", "Post", "posts", BindingOptions::new())?;
//!
//!     let config: QuarryConfig = "[database]\nurl = \"sqlite://app.db\"".parse()?;
//!     let engine = SqliteEngine::from_config(&config, Arc::new(catalog)).await?;
//!     engine.create_tables().await?;
//!
//!     let params = Params::new().set("email", "ada@example.com");
//!     let ada = engine
//!         .run("@query(Users | email == {email} | with posts ?-> *)", &params)
//!         .await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Schema declarations, bindings, DDL and configuration.
pub mod schema {
    pub use quarry_schema::*;
}

/// The query language: parser, compiler and engine.
pub mod query {
    pub use quarry_query::*;
}

/// The SQLite store.
pub mod sqlite {
    pub use quarry_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::schema::{BindingOptions, Catalog, QuarryConfig, SchemaRegistry};
    pub use crate::sqlite::{SqliteConfig, SqliteEngine, SqlitePool, Transaction};
    pub use quarry_query::prelude::*;
}

// Re-export key types at the crate root
pub use quarry_query::{Outcome, Params, QueryError, QueryOutput, QueryResult, Record, Value};
pub use quarry_schema::{Catalog, SchemaError};
pub use quarry_sqlite::SqliteEngine;
