//! Driver-level rows, before mapping to schema types.

use std::sync::Arc;

use smol_str::SmolStr;

/// A column value as the store returned it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// SQL NULL.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// Double precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Binary data.
    Blob(Vec<u8>),
}

impl RawValue {
    /// Storage class name, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Real(_) => "REAL",
            Self::Text(_) => "TEXT",
            Self::Blob(_) => "BLOB",
        }
    }
}

/// One row of a result set. Column names are shared by every row of a set.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Column names in select order.
    pub columns: Arc<[SmolStr]>,
    /// Values, parallel to `columns`.
    pub values: Vec<RawValue>,
}

impl RawRow {
    /// Create a row.
    pub fn new(columns: Arc<[SmolStr]>, values: Vec<RawValue>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column name.
    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.columns.iter().map(|c| c.as_str()).zip(self.values.iter())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_column() {
        let columns: Arc<[SmolStr]> = vec![SmolStr::new("id"), SmolStr::new("name")].into();
        let row = RawRow::new(
            columns,
            vec![RawValue::Integer(1), RawValue::Text("Ada".into())],
        );

        assert_eq!(row.get("name"), Some(&RawValue::Text("Ada".into())));
        assert_eq!(row.get("email"), None);
        assert_eq!(row.iter().count(), 2);
    }
}
