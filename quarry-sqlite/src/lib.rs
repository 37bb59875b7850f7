//! SQLite store for Quarry.
//!
//! This crate runs compiled Quarry statements on SQLite through
//! `tokio-rusqlite`.
//!
//! # Features
//!
//! - Connection pooling, with one shared connection for in-memory databases
//! - Per-statement timeouts that interrupt the running statement
//! - Transactions with commit on success and rollback on failure, panic or drop
//! - Constraint violations classified from SQLite's extended result codes
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quarry_query::Params;
//! use quarry_sqlite::{SqliteConfig, SqliteEngine, SqlitePool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = SqlitePool::new(SqliteConfig::from_url("sqlite://./app.db")?).await?;
//!     let engine = SqliteEngine::new(pool, Arc::new(catalog));
//!     engine.create_tables().await?;
//!
//!     let users = engine.run("@query(Users ??-> *)", &Params::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod pool;
pub mod transaction;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use connection::SqliteConnection;
pub use engine::SqliteEngine;
pub use error::{SqliteError, SqliteResult};
pub use pool::{PoolConfig, PoolStats, SqlitePool, SqlitePoolBuilder};
pub use transaction::Transaction;
