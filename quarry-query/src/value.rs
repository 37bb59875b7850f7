//! Values flowing through queries: literals, caller parameters and results.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use smol_str::SmolStr;

/// Format used for date/time values bound as parameters. Matches SQLite's
/// `datetime()` output so stored and generated timestamps compare as text.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Null value.
    #[default]
    Null,
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Boolean value.
    Bool(bool),
    /// Date and time in UTC.
    DateTime(DateTime<Utc>),
    /// Parsed JSON document.
    Json(serde_json::Value),
    /// List of values. Used as an `in` operand and for has-many results.
    List(Vec<Value>),
    /// A result record, including eager-loaded relations.
    Record(Record),
    /// A caller-supplied parameter. Never rendered into statement text.
    Param(Param),
}

/// A caller parameter referenced by `{name}` in query source.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// The interpolation path as written.
    pub name: SmolStr,
    /// The value supplied for it.
    pub value: Box<Value>,
}

impl Value {
    /// Check if this is a null value (a null parameter counts).
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Param(p) => p.value.is_null(),
            _ => false,
        }
    }

    /// Strip parameter wrappers.
    pub fn resolved(&self) -> &Value {
        match self {
            Self::Param(p) => p.value.resolved(),
            other => other,
        }
    }

    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bool(_) => "bool",
            Self::DateTime(_) => "datetime",
            Self::Json(_) => "json",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Param(p) => p.value.type_name(),
        }
    }

    /// Get the integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self.resolved() {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the float, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self.resolved() {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get the text, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self.resolved() {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self.resolved() {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the record, if this is one.
    pub fn as_record(&self) -> Option<&Record> {
        match self.resolved() {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Get the list, if this is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self.resolved() {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// A hashable key for grouping rows by this value. Integers and integral
    /// floats share a key so that keys read from different columns match.
    pub fn key(&self) -> Option<ValueKey> {
        match self.resolved() {
            Self::Int(i) => Some(ValueKey::Int(*i)),
            Self::Float(f) if f.fract() == 0.0 => Some(ValueKey::Int(*f as i64)),
            Self::Text(s) => Some(ValueKey::Text(s.clone())),
            Self::Bool(b) => Some(ValueKey::Int(i64::from(*b))),
            Self::DateTime(dt) => Some(ValueKey::Text(dt.format(DATETIME_FORMAT).to_string())),
            _ => None,
        }
    }

    /// Build a value from JSON. Objects become records.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Record(
                map.into_iter()
                    .map(|(k, v)| (SmolStr::from(k), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Grouping key derived from a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    /// Integer-like key.
    Int(i64),
    /// Text key.
    Text(String),
}

/// Parse a stored date/time: RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` or a bare
/// date. Offset-less values are taken as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::DateTime(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            Self::Json(json) => json.serialize(serializer),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Record(record) => record.serialize(serializer),
            Self::Param(p) => p.value.serialize(serializer),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Param(p) => write!(f, "{{{}}}", p.name),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// An ordered map from column or relation name to value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: IndexMap<SmolStr, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    /// Get a value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Insert or replace a value, keeping the original position.
    pub fn insert(&mut self, name: impl Into<SmolStr>, value: Value) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }

    /// Remove a value, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    /// Check if a field is present.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate over fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(SmolStr, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (SmolStr, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<K: Into<SmolStr>, const N: usize> From<[(K, Value); N]> for Record {
    fn from(pairs: [(K, Value); N]) -> Self {
        pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k.as_str(), v)?;
        }
        map.end()
    }
}

/// Caller parameters, referenced from query source by `{name}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: IndexMap<SmolStr, Value>,
}

impl Params {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter.
    pub fn set(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Add a parameter in place.
    pub fn insert(&mut self, name: impl Into<SmolStr>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Resolve an interpolation path. `a.b` first looks for a parameter
    /// literally named `a.b`, then walks into record or JSON parameter `a`.
    pub fn resolve(&self, path: &str) -> Option<Value> {
        if let Some(value) = self.values.get(path) {
            return Some(value.clone());
        }

        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?.clone();
        for segment in segments {
            current = match current {
                Value::Record(record) => record.get(segment)?.clone(),
                Value::Json(serde_json::Value::Object(map)) => {
                    Value::from_json(map.get(segment)?.clone())
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build parameters from a JSON object. Other JSON values yield an empty set.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => Self {
                values: map
                    .into_iter()
                    .map(|(k, v)| (SmolStr::from(k), Value::from_json(v)))
                    .collect(),
            },
            _ => Self::default(),
        }
    }
}

impl<K: Into<SmolStr>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Self::Record(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_params_resolve_dotted() {
        let user = Record::from([("id", Value::Int(7)), ("name", Value::from("Ada"))]);
        let params = Params::new()
            .set("user", user)
            .set("filter.name", "literal");

        assert_eq!(params.resolve("user.id"), Some(Value::Int(7)));
        assert_eq!(params.resolve("filter.name"), Some(Value::from("literal")));
        assert_eq!(params.resolve("user.email"), None);
        assert_eq!(params.resolve("missing"), None);
    }

    #[test]
    fn test_params_resolve_json() {
        let params = Params::from_json(serde_json::json!({
            "user": {"id": 3, "tags": ["a", "b"]}
        }));
        assert_eq!(params.resolve("user.id"), Some(Value::Int(3)));
        assert_eq!(
            params.resolve("user.tags"),
            Some(Value::List(vec![Value::from("a"), Value::from("b")]))
        );
    }

    #[test]
    fn test_value_key_unifies_numbers() {
        assert_eq!(Value::Int(3).key(), Value::Float(3.0).key());
        assert_eq!(Value::Null.key(), None);
        assert_eq!(Value::from("x").key(), Some(ValueKey::Text("x".into())));
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_datetime("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(
            parse_datetime("2024-03-01"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_serialize_record() {
        let record = Record::from([
            ("id", Value::Int(1)),
            ("author", Value::Null),
            ("tags", Value::List(vec![Value::from("rust")])),
            (
                "secret",
                Value::Param(Param {
                    name: "token".into(),
                    value: Box::new(Value::from("t")),
                }),
            ),
        ]);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":1,"author":null,"tags":["rust"],"secret":"t"}"#);
    }

    #[test]
    fn test_record_remove_keeps_order() {
        let mut record = Record::from([
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
            ("c", Value::Int(3)),
        ]);
        record.remove("b");
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_null_param_is_null() {
        let value = Value::Param(Param {
            name: "x".into(),
            value: Box::new(Value::Null),
        });
        assert!(value.is_null());
        assert_eq!(value.type_name(), "null");
    }
}
