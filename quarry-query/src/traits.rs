//! The seam between compiled statements and a store.

use std::future::Future;
use std::pin::Pin;

use crate::error::QueryResult;
use crate::row::RawRow;
use crate::value::Value;

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs parameterized statements against one connection or transaction.
///
/// Parameters are bound positionally in the order given. Implementations map
/// store failures into [`QueryError`](crate::error::QueryError) codes.
pub trait Executor: Send + Sync {
    /// Run a statement that returns rows.
    fn fetch(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<Vec<RawRow>>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<u64>>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn fetch(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<Vec<RawRow>>> {
        (**self).fetch(sql, params)
    }

    fn execute(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<u64>> {
        (**self).execute(sql, params)
    }
}
