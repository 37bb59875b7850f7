//! SQL text assembly with positional `?` parameters.

pub use quarry_schema::quote_identifier;

use crate::value::Value;

/// A rendered piece of SQL and the values bound to its placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    /// Statement text.
    pub sql: String,
    /// Values in placeholder order.
    pub params: Vec<Value>,
}

/// Accumulates statement text and parameters side by side, so that the
/// parameter list always follows placeholder order.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push literal SQL.
    pub fn push(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.sql.push_str(sql.as_ref());
        self
    }

    /// Push a placeholder bound to `value`.
    pub fn push_param(&mut self, value: Value) -> &mut Self {
        self.sql.push('?');
        self.params.push(value);
        self
    }

    /// Push `?, ?, ...`, one placeholder per value.
    pub fn push_params(&mut self, values: impl IntoIterator<Item = Value>) -> &mut Self {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.push_param(value);
        }
        self
    }

    /// Push an identifier, quoted if needed.
    pub fn push_identifier(&mut self, name: &str) -> &mut Self {
        self.sql.push_str(&quote_identifier(name));
        self
    }

    /// Push a comma-separated identifier list.
    pub fn push_identifiers<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> &mut Self {
        for (i, name) in names.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.push_identifier(name);
        }
        self
    }

    /// Append a fragment, text and parameters.
    pub fn push_fragment(&mut self, fragment: &SqlFragment) -> &mut Self {
        self.sql.push_str(&fragment.sql);
        self.params.extend(fragment.params.iter().cloned());
        self
    }

    /// The text so far.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The parameters so far.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Check if nothing was pushed.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Finish into a fragment.
    pub fn build(self) -> SqlFragment {
        SqlFragment {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Largest row count SQLite accepts in `LIMIT`/`OFFSET`.
pub const MAX_ROW_COUNT: u64 = i64::MAX as u64;

/// Render `LIMIT`/`OFFSET`. An offset without a limit needs `LIMIT -1` in SQLite.
pub fn limit_offset(limit: Option<u64>, offset: Option<u64>) -> String {
    let limit = limit.map(|n| n.min(MAX_ROW_COUNT));
    let offset = offset.map(|n| n.min(MAX_ROW_COUNT));
    match (limit, offset) {
        (None, None) => String::new(),
        (Some(limit), None) => format!(" LIMIT {}", limit),
        (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
        (None, Some(offset)) => format!(" LIMIT -1 OFFSET {}", offset),
    }
}
