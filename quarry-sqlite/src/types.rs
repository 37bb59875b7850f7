//! Type conversion between Quarry values and SQLite storage classes.

use quarry_query::value::DATETIME_FORMAT;
use quarry_query::{RawValue, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};

/// Convert a bound parameter to a SQLite value.
///
/// Booleans are stored as 0/1 and date-times in SQLite's `datetime()`
/// format. JSON, lists and records are stored as JSON text.
pub fn to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
        Value::Json(json) => SqlValue::Text(json.to_string()),
        Value::Param(param) => to_sqlite(&param.value),
        list_or_record => SqlValue::Text(list_or_record.to_json().to_string()),
    }
}

/// Convert a column value read from a row.
pub fn from_sqlite(value: ValueRef<'_>) -> RawValue {
    match value {
        ValueRef::Null => RawValue::Null,
        ValueRef::Integer(i) => RawValue::Integer(i),
        ValueRef::Real(f) => RawValue::Real(f),
        ValueRef::Text(bytes) => RawValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => RawValue::Blob(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_query::value::parse_datetime;

    #[test]
    fn test_to_sqlite() {
        assert_eq!(to_sqlite(&Value::Bool(true)), SqlValue::Integer(1));
        assert_eq!(to_sqlite(&Value::from("x")), SqlValue::Text("x".into()));
        assert_eq!(
            to_sqlite(&Value::Json(serde_json::json!({"a": 1}))),
            SqlValue::Text(r#"{"a":1}"#.into())
        );

        let dt = parse_datetime("2024-03-01T10:30:00Z").unwrap();
        assert_eq!(
            to_sqlite(&Value::DateTime(dt)),
            SqlValue::Text("2024-03-01 10:30:00".into())
        );
    }

    #[test]
    fn test_from_sqlite() {
        assert_eq!(from_sqlite(ValueRef::Integer(3)), RawValue::Integer(3));
        assert_eq!(from_sqlite(ValueRef::Text(b"hi")), RawValue::Text("hi".into()));
        assert_eq!(from_sqlite(ValueRef::Blob(&[1, 2])), RawValue::Blob(vec![1, 2]));
    }
}
