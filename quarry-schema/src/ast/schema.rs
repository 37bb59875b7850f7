//! Schema definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::{Field, Ident, PRIMARY_KEY, Relation, Span};

/// A named set of typed fields and relations.
///
/// Schemas are immutable once registered and shared through `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name.
    pub name: Ident,
    /// Fields in declaration order.
    pub fields: IndexMap<SmolStr, Field>,
    /// Relations in declaration order.
    pub relations: IndexMap<SmolStr, Relation>,
    /// Source location of the declaration, if parsed.
    pub span: Span,
}

impl Schema {
    /// Get the schema name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Check if a field exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Get a relation by name.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    /// The primary key field, if declared.
    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.get(PRIMARY_KEY)
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }
}
