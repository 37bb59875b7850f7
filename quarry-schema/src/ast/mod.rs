//! Schema model types.

mod field;
mod relation;
mod schema;
mod types;

pub use field::*;
pub use relation::*;
pub use schema::*;
pub use types::*;
