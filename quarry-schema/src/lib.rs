//! # quarry-schema
//!
//! Schema model for the Quarry query language.
//!
//! This crate provides:
//! - Typed schemas with fields and relations, held in a [`SchemaRegistry`]
//! - Bindings of schemas to tables, collected in a shared [`Catalog`]
//! - A parser for `@schema` declarations
//! - `CREATE TABLE` generation for bound schemas
//! - Configuration parser for `quarry.toml` files
//!
//! ## Example
//!
//! ```rust
//! use quarry_schema::{BindingOptions, Catalog, SchemaRegistry, create_table_sql};
//!
//! let mut registry = SchemaRegistry::new();
//! registry
//!     .load(
//!         r#"
//!         @schema User {
//!             id: int,
//!             email: string(unique: true),
//!             deleted_at: datetime?,
//!             posts: [Post] via author_id,
//!         }
//!         @schema Post {
//!             id: int,
//!             title: string,
//!             author_id: int,
//!             author: User via author_id,
//!         }
//!         "#,
//!     )
//!     .unwrap();
//! registry.validate().unwrap();
//!
//! let mut catalog = Catalog::new(registry);
//! let users = catalog
//!     .bind("Users", "User", "users", BindingOptions::new().soft_delete("deleted_at"))
//!     .unwrap();
//! catalog.bind("Posts", "Post", "posts", BindingOptions::new()).unwrap();
//!
//! assert!(create_table_sql(&users, Some(&catalog)).starts_with("CREATE TABLE IF NOT EXISTS users"));
//! ```

pub mod ast;
pub mod binding;
pub mod config;
pub mod ddl;
pub mod error;
pub mod parser;
pub mod registry;

pub use ast::*;
pub use binding::{Binding, BindingOptions, Catalog};
pub use config::{QuarryConfig, TransactionBehavior};
pub use ddl::{create_catalog_sql, create_table_sql, quote_identifier};
pub use error::{SchemaError, SchemaResult};
pub use parser::{SchemaDeclaration, parse_declarations, parse_declarations_file};
pub use registry::SchemaRegistry;
