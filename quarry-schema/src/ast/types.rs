//! Type definitions for the Quarry schema model.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A span in the source code for error reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Start offset in bytes.
    pub start: usize,
    /// End offset in bytes.
    pub end: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Get the length of the span.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<(usize, usize)> for Span {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

impl From<pest::Span<'_>> for Span {
    fn from(span: pest::Span<'_>) -> Self {
        Self::new(span.start(), span.end())
    }
}

/// An identifier with source location.
///
/// Equality ignores the span so that identifiers built in code compare equal
/// to identifiers produced by a parser.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Ident {
    /// The identifier name.
    pub name: SmolStr,
    /// Source location.
    pub span: Span,
}

impl Ident {
    /// Create a new identifier.
    pub fn new(name: impl Into<SmolStr>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }

    /// Create an identifier without a source location.
    pub fn bare(name: impl Into<SmolStr>) -> Self {
        Self::new(name, Span::default())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl std::hash::Hash for Ident {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&str> for Ident {
    fn from(name: &str) -> Self {
        Self::bare(name)
    }
}

/// Column affinity a field type is stored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    /// `INTEGER`
    Integer,
    /// `REAL`
    Real,
    /// `TEXT`
    Text,
}

impl StorageType {
    /// SQL type name.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }
}

/// Declared type of a schema field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Integer (`int`, `integer`, `bigint`).
    Int,
    /// Short text (`string`).
    String,
    /// Long text (`text`).
    Text,
    /// Boolean stored as 0/1.
    Bool,
    /// Floating point (`float`, `number`).
    Float,
    /// Date and time stored as ISO-8601 text.
    DateTime,
    /// Date stored as ISO-8601 text.
    Date,
    /// Time of day stored as ISO-8601 text.
    Time,
    /// Monetary amount in minor units.
    Money,
    /// UUID text.
    Uuid,
    /// ULID text.
    Ulid,
    /// Serialized JSON document.
    Json,
    /// Email address (validated by the application).
    Email,
    /// URL (validated by the application).
    Url,
    /// Phone number (validated by the application).
    Phone,
    /// URL slug (validated by the application).
    Slug,
    /// One of a fixed list of text values.
    Enum(Vec<SmolStr>),
}

impl FieldType {
    /// Parse a scalar type name. Enums are built with [`FieldType::Enum`].
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "int" | "integer" | "bigint" => Self::Int,
            "string" => Self::String,
            "text" => Self::Text,
            "bool" | "boolean" => Self::Bool,
            "float" | "number" => Self::Float,
            "datetime" => Self::DateTime,
            "date" => Self::Date,
            "time" => Self::Time,
            "money" => Self::Money,
            "uuid" => Self::Uuid,
            "ulid" => Self::Ulid,
            "json" => Self::Json,
            "email" => Self::Email,
            "url" => Self::Url,
            "phone" => Self::Phone,
            "slug" => Self::Slug,
            _ => return None,
        };
        Some(ty)
    }

    /// The canonical type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::String => "string",
            Self::Text => "text",
            Self::Bool => "bool",
            Self::Float => "float",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Time => "time",
            Self::Money => "money",
            Self::Uuid => "uuid",
            Self::Ulid => "ulid",
            Self::Json => "json",
            Self::Email => "email",
            Self::Url => "url",
            Self::Phone => "phone",
            Self::Slug => "slug",
            Self::Enum(_) => "enum",
        }
    }

    /// The storage column type.
    pub fn storage(&self) -> StorageType {
        match self {
            Self::Int | Self::Bool | Self::Money => StorageType::Integer,
            Self::Float => StorageType::Real,
            _ => StorageType::Text,
        }
    }

    /// Whether values are compared as text.
    pub fn is_textual(&self) -> bool {
        self.storage() == StorageType::Text
    }

    /// Whether this is one of the date/time types.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::DateTime | Self::Date | Self::Time)
    }

    /// Whether this is an integer or floating point type.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Money | Self::Float)
    }

    /// Enum variants, if this is an enum.
    pub fn variants(&self) -> Option<&[SmolStr]> {
        match self {
            Self::Enum(values) => Some(values),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enum(values) => {
                let quoted: Vec<String> = values.iter().map(|v| format!("{:?}", v.as_str())).collect();
                write!(f, "enum[{}]", quoted.join(", "))
            }
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let merged = Span::new(4, 8).merge(Span::new(2, 6));
        assert_eq!(merged, Span::new(2, 8));
        assert_eq!(merged.len(), 6);
        assert!(!merged.is_empty());
    }

    #[test]
    fn test_ident_equality_ignores_span() {
        assert_eq!(Ident::new("email", Span::new(3, 8)), Ident::bare("email"));
        assert_ne!(Ident::bare("email"), Ident::bare("name"));
    }

    #[test]
    fn test_field_type_aliases() {
        assert_eq!(FieldType::from_name("integer"), Some(FieldType::Int));
        assert_eq!(FieldType::from_name("BigInt"), Some(FieldType::Int));
        assert_eq!(FieldType::from_name("number"), Some(FieldType::Float));
        assert_eq!(FieldType::from_name("boolean"), Some(FieldType::Bool));
        assert_eq!(FieldType::from_name("blob"), None);
    }

    #[test]
    fn test_storage_mapping() {
        assert_eq!(FieldType::Int.storage(), StorageType::Integer);
        assert_eq!(FieldType::Bool.storage(), StorageType::Integer);
        assert_eq!(FieldType::Money.storage(), StorageType::Integer);
        assert_eq!(FieldType::Float.storage(), StorageType::Real);
        assert_eq!(FieldType::DateTime.storage(), StorageType::Text);
        assert_eq!(FieldType::Json.storage(), StorageType::Text);
        assert_eq!(FieldType::Email.storage(), StorageType::Text);
        assert_eq!(FieldType::Enum(vec!["a".into()]).storage(), StorageType::Text);
    }

    #[test]
    fn test_enum_display() {
        let ty = FieldType::Enum(vec!["admin".into(), "member".into()]);
        assert_eq!(ty.to_string(), r#"enum["admin", "member"]"#);
        assert_eq!(ty.variants().map(|v| v.len()), Some(2));
    }
}
