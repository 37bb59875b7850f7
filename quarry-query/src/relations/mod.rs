//! Eager loading of schema relations.
//!
//! Planning happens at compile time ([`RelationPlanner`]); loading runs after
//! the parent statement, one batched statement per relation and level
//! ([`RelationLoader`]).

mod loader;
mod plan;

pub use loader::{ROW_NUMBER_COLUMN, RelationLoader, build_query};
pub use plan::{RelationPlan, RelationPlanner};
