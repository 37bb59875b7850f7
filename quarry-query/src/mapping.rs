//! Mapping driver rows to typed records.

use chrono::{DateTime, Utc};
use quarry_schema::{Field, FieldType, Schema};

use crate::error::{QueryError, QueryResult};
use crate::row::{RawRow, RawValue};
use crate::value::{Record, Value, parse_datetime};

/// Map every row of a result set.
pub fn map_rows(schema: &Schema, rows: &[RawRow]) -> QueryResult<Vec<Record>> {
    rows.iter().map(|row| map_row(schema, row)).collect()
}

/// Map one row. Columns the schema does not declare keep their driver type.
pub fn map_row(schema: &Schema, row: &RawRow) -> QueryResult<Record> {
    let mut record = Record::with_capacity(row.len());
    for (column, raw) in row.iter() {
        let value = match schema.field(column) {
            Some(field) => map_value(field, raw)?,
            None => native(raw),
        };
        record.insert(column, value);
    }
    Ok(record)
}

/// Convert a stored value to the declared type of `field`.
pub fn map_value(field: &Field, raw: &RawValue) -> QueryResult<Value> {
    if let RawValue::Null = raw {
        return Ok(Value::Null);
    }

    let unmappable = || {
        QueryError::unmappable(
            field.name(),
            format!("{} value does not fit type {}", raw.type_name(), field.field_type),
        )
    };

    let value = match (&field.field_type, raw) {
        (FieldType::Int | FieldType::Money, RawValue::Integer(i)) => Value::Int(*i),
        (FieldType::Int | FieldType::Money, RawValue::Real(f))
            if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f) =>
        {
            Value::Int(*f as i64)
        }
        (FieldType::Int | FieldType::Money, RawValue::Text(s)) => {
            Value::Int(s.trim().parse().map_err(|_| unmappable())?)
        }

        (FieldType::Bool, RawValue::Integer(0)) => Value::Bool(false),
        (FieldType::Bool, RawValue::Integer(1)) => Value::Bool(true),

        (FieldType::Float, RawValue::Real(f)) => Value::Float(*f),
        (FieldType::Float, RawValue::Integer(i)) => Value::Float(*i as f64),
        (FieldType::Float, RawValue::Text(s)) => {
            Value::Float(s.trim().parse().map_err(|_| unmappable())?)
        }

        (FieldType::DateTime, RawValue::Text(s)) => {
            Value::DateTime(parse_datetime(s).ok_or_else(unmappable)?)
        }
        (FieldType::DateTime, RawValue::Integer(secs)) => {
            Value::DateTime(DateTime::<Utc>::from_timestamp(*secs, 0).ok_or_else(unmappable)?)
        }

        (FieldType::Json, RawValue::Text(s)) => {
            Value::Json(serde_json::from_str(s).map_err(|e| {
                QueryError::unmappable(field.name(), format!("invalid JSON: {}", e))
            })?)
        }
        (FieldType::Json, RawValue::Integer(i)) => Value::Json((*i).into()),
        (FieldType::Json, RawValue::Real(f)) => Value::Json(serde_json::json!(*f)),

        (FieldType::Enum(variants), RawValue::Text(s)) => {
            if !variants.iter().any(|v| v.as_str() == s) {
                return Err(QueryError::unmappable(
                    field.name(),
                    format!("{:?} is not a declared variant", s),
                ));
            }
            Value::Text(s.clone())
        }

        (ty, RawValue::Text(s)) if ty.is_textual() => Value::Text(s.clone()),
        (ty, RawValue::Blob(bytes)) if ty.is_textual() => {
            Value::Text(String::from_utf8(bytes.clone()).map_err(|_| unmappable())?)
        }
        // TEXT affinity stores numbers written into text columns as text,
        // but legacy tables may hold them numerically.
        (ty, RawValue::Integer(i)) if ty.is_textual() => Value::Text(i.to_string()),
        (ty, RawValue::Real(f)) if ty.is_textual() => Value::Text(f.to_string()),

        _ => return Err(unmappable()),
    };
    Ok(value)
}

fn native(raw: &RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Null,
        RawValue::Integer(i) => Value::Int(*i),
        RawValue::Real(f) => Value::Float(*f),
        RawValue::Text(s) => Value::Text(s.clone()),
        RawValue::Blob(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use smol_str::SmolStr;
    use std::sync::Arc;

    fn field(ty: FieldType) -> Field {
        Field::new("f", ty)
    }

    #[test]
    fn test_map_scalars() {
        assert_eq!(
            map_value(&field(FieldType::Int), &RawValue::Integer(7)).unwrap(),
            Value::Int(7)
        );
        assert_eq!(
            map_value(&field(FieldType::Bool), &RawValue::Integer(1)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            map_value(&field(FieldType::Float), &RawValue::Integer(2)).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            map_value(&field(FieldType::String), &RawValue::Blob(b"hi".to_vec())).unwrap(),
            Value::from("hi")
        );
        assert_eq!(
            map_value(&field(FieldType::Int), &RawValue::Null).unwrap(),
            Value::Null
        );
        assert_eq!(
            map_value(&field(FieldType::Int), &RawValue::Real(-9.0e18)).unwrap(),
            Value::Int(-9_000_000_000_000_000_000)
        );
    }

    #[test]
    fn test_map_datetime() {
        let value = map_value(
            &field(FieldType::DateTime),
            &RawValue::Text("2024-03-01 10:30:00".into()),
        )
        .unwrap();
        let Value::DateTime(dt) = value else {
            panic!("Expected datetime");
        };
        assert_eq!(dt.to_rfc3339(), "2024-03-01T10:30:00+00:00");

        assert!(
            map_value(
                &field(FieldType::DateTime),
                &RawValue::Text("2024-03-01T10:30:00Z".into())
            )
            .is_ok()
        );
    }

    #[test]
    fn test_map_json() {
        let value = map_value(
            &field(FieldType::Json),
            &RawValue::Text(r#"{"tags":["a"]}"#.into()),
        )
        .unwrap();
        assert_eq!(value, Value::Json(serde_json::json!({"tags": ["a"]})));
    }

    #[test]
    fn test_unmappable_values() {
        let cases = [
            (FieldType::Int, RawValue::Text("seven".into())),
            (FieldType::Int, RawValue::Real(1e300)),
            (FieldType::Int, RawValue::Real(-1e19)),
            (FieldType::Int, RawValue::Real(f64::INFINITY)),
            (FieldType::Int, RawValue::Real(2.5)),
            (FieldType::Bool, RawValue::Integer(2)),
            (FieldType::DateTime, RawValue::Text("not a date".into())),
            (FieldType::Json, RawValue::Text("{".into())),
            (FieldType::String, RawValue::Blob(vec![0xff, 0xfe])),
            (
                FieldType::Enum(vec!["a".into(), "b".into()]),
                RawValue::Text("c".into()),
            ),
        ];
        for (ty, raw) in cases {
            let err = map_value(&field(ty), &raw).unwrap_err();
            assert_eq!(err.code, ErrorCode::UnmappableValue);
        }
    }

    #[test]
    fn test_unknown_columns_pass_through() {
        let mut registry = quarry_schema::SchemaRegistry::new();
        registry.load("@schema T { id: int, ok: bool }").unwrap();
        let schema = registry.get("T").unwrap();

        let columns: Arc<[SmolStr]> = vec![
            SmolStr::new("id"),
            SmolStr::new("ok"),
            SmolStr::new("extra"),
        ]
        .into();
        let row = RawRow::new(
            columns,
            vec![RawValue::Integer(1), RawValue::Integer(0), RawValue::Integer(5)],
        );
        let record = map_row(schema, &row).unwrap();
        assert_eq!(record.get("ok"), Some(&Value::Bool(false)));
        assert_eq!(record.get("extra"), Some(&Value::Int(5)));
    }
}
