//! Field definitions.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::{FieldType, Ident};

/// Name of the primary key field.
pub const PRIMARY_KEY: &str = "id";

/// A column default declared on a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Text literal.
    Text(SmolStr),
    /// Boolean literal.
    Bool(bool),
    /// The current timestamp at insert time.
    Now,
}

impl DefaultValue {
    /// Render the default as a SQL literal for a column definition.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Now => "CURRENT_TIMESTAMP".to_string(),
        }
    }
}

/// Constraints declared through type options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraints {
    /// Values must be unique across rows.
    pub unique: bool,
    /// Value is assigned by the store.
    pub auto: bool,
    /// Minimum value (numbers) or length (text).
    pub min: Option<i64>,
    /// Maximum value (numbers) or length (text).
    pub max: Option<i64>,
    /// Column default.
    pub default: Option<DefaultValue>,
}

/// A field in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name, also the column name.
    pub name: Ident,
    /// Declared type.
    pub field_type: FieldType,
    /// Whether null is an accepted value.
    pub nullable: bool,
    /// Declared constraints.
    pub constraints: FieldConstraints,
}

impl Field {
    /// Create a new required field.
    pub fn new(name: impl Into<Ident>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            constraints: FieldConstraints::default(),
        }
    }

    /// Get the field name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Allow null values.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark the field unique.
    pub fn unique(mut self) -> Self {
        self.constraints.unique = true;
        self
    }

    /// Mark the field as store-assigned.
    pub fn auto(mut self) -> Self {
        self.constraints.auto = true;
        self
    }

    /// Set the minimum value or length.
    pub fn min(mut self, min: i64) -> Self {
        self.constraints.min = Some(min);
        self
    }

    /// Set the maximum value or length.
    pub fn max(mut self, max: i64) -> Self {
        self.constraints.max = Some(max);
        self
    }

    /// Set the column default.
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.constraints.default = Some(default);
        self
    }

    /// Whether this is the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.name.as_str() == PRIMARY_KEY
    }

    /// Whether the store assigns the value when none is given.
    pub fn is_generated(&self) -> bool {
        self.constraints.auto || (self.is_primary_key() && self.field_type == FieldType::Int)
    }
}
