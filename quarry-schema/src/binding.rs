//! Bindings of schemas to physical tables, and the catalog that owns them.

use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::debug;

use crate::ast::{FieldType, Schema};
use crate::error::{SchemaError, SchemaResult};
use crate::registry::SchemaRegistry;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"));

/// Storage options of a binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingOptions {
    /// Column marking a row as deleted. `None` means hard deletes.
    #[serde(default)]
    pub soft_delete: Option<SmolStr>,
}

impl BindingOptions {
    /// Options with hard deletes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `column` as the soft-delete marker.
    pub fn soft_delete(mut self, column: impl Into<SmolStr>) -> Self {
        self.soft_delete = Some(column.into());
        self
    }
}

/// A schema bound to a table.
#[derive(Debug, Clone)]
pub struct Binding {
    name: SmolStr,
    schema: Arc<Schema>,
    table: SmolStr,
    options: BindingOptions,
}

impl Binding {
    /// Bind `schema` to `table` under `name`, the identifier used in query
    /// sources.
    ///
    /// The table name must be a plain SQL identifier. A soft-delete column
    /// must be a nullable field of a date/time, text or integer type.
    pub fn new(
        name: impl Into<SmolStr>,
        schema: Arc<Schema>,
        table: impl Into<SmolStr>,
        options: BindingOptions,
    ) -> SchemaResult<Self> {
        let name = name.into();
        let table = table.into();

        if table.is_empty() {
            return Err(SchemaError::invalid_binding(name, "table name is empty"));
        }
        if !IDENTIFIER.is_match(&table) {
            return Err(SchemaError::invalid_binding(
                name,
                format!("`{}` is not a valid table name", table),
            ));
        }

        if let Some(column) = &options.soft_delete {
            let field = schema.field(column).ok_or_else(|| {
                SchemaError::invalid_binding(
                    name.as_str(),
                    format!(
                        "soft-delete column `{}` is not a field of `{}`",
                        column,
                        schema.name()
                    ),
                )
            })?;
            let compatible = field.field_type.is_temporal()
                || matches!(field.field_type, FieldType::String | FieldType::Text | FieldType::Int);
            if !compatible {
                return Err(SchemaError::invalid_binding(
                    name,
                    format!(
                        "soft-delete column `{}` has incompatible type `{}`",
                        column, field.field_type
                    ),
                ));
            }
            if !field.nullable {
                return Err(SchemaError::invalid_binding(
                    name,
                    format!("soft-delete column `{}` must be nullable", column),
                ));
            }
        }

        Ok(Self {
            name,
            schema,
            table,
            options,
        })
    }

    /// Name used in query sources.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Physical table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Storage options.
    pub fn options(&self) -> &BindingOptions {
        &self.options
    }

    /// Soft-delete column, if any.
    pub fn soft_delete_column(&self) -> Option<&str> {
        self.options.soft_delete.as_deref()
    }
}

/// Schemas plus every named binding. Built at setup, then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    registry: SchemaRegistry,
    bindings: IndexMap<SmolStr, Arc<Binding>>,
}

impl Catalog {
    /// Create a catalog over a schema registry.
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry,
            bindings: IndexMap::new(),
        }
    }

    /// The schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Mutable access to the registry, for setup.
    pub fn registry_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.registry
    }

    /// Bind the schema named `schema` to `table` under `name`.
    pub fn bind(
        &mut self,
        name: impl Into<SmolStr>,
        schema: &str,
        table: impl Into<SmolStr>,
        options: BindingOptions,
    ) -> SchemaResult<Arc<Binding>> {
        let name = name.into();
        if self.bindings.contains_key(&name) {
            return Err(SchemaError::invalid_binding(name, "binding is already defined"));
        }
        let schema = self.registry.schema(schema)?.clone();
        let binding = Arc::new(Binding::new(name.clone(), schema, table, options)?);

        debug!(
            binding = %name,
            table = %binding.table(),
            schema = %binding.schema().name(),
            soft_delete = ?binding.soft_delete_column(),
            "Schema bound"
        );

        self.bindings.insert(name, binding.clone());
        Ok(binding)
    }

    /// Look up a binding by name.
    pub fn binding(&self, name: &str) -> Option<&Arc<Binding>> {
        self.bindings.get(name)
    }

    /// The first binding of the schema named `schema`.
    pub fn binding_for_schema(&self, schema: &str) -> Option<&Arc<Binding>> {
        self.bindings.values().find(|b| b.schema().name() == schema)
    }

    /// Iterate over bindings in definition order.
    pub fn bindings(&self) -> impl Iterator<Item = &Arc<Binding>> {
        self.bindings.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Field;

    fn catalog() -> Catalog {
        let mut registry = SchemaRegistry::new();
        registry
            .define_schema(
                "Post",
                vec![
                    Field::new("id", FieldType::Int),
                    Field::new("title", FieldType::String),
                    Field::new("score", FieldType::Float),
                    Field::new("archived", FieldType::DateTime),
                    Field::new("deleted_at", FieldType::DateTime).nullable(),
                ],
                vec![],
            )
            .unwrap();
        Catalog::new(registry)
    }

    #[test]
    fn test_bind() {
        let mut catalog = catalog();
        let binding = catalog
            .bind("Posts", "Post", "posts", BindingOptions::new().soft_delete("deleted_at"))
            .unwrap();

        assert_eq!(binding.name(), "Posts");
        assert_eq!(binding.table(), "posts");
        assert_eq!(binding.soft_delete_column(), Some("deleted_at"));
        assert!(catalog.binding("Posts").is_some());
        assert_eq!(
            catalog.binding_for_schema("Post").map(|b| b.name()),
            Some("Posts")
        );
    }

    #[test]
    fn test_empty_table_name() {
        let mut catalog = catalog();
        let err = catalog.bind("Posts", "Post", "", BindingOptions::new()).unwrap_err();
        assert!(err.to_string().contains("table name is empty"));
    }

    #[test]
    fn test_invalid_table_name() {
        let mut catalog = catalog();
        let err = catalog
            .bind("Posts", "Post", "posts; DROP TABLE users", BindingOptions::new())
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidBinding { .. }));
    }

    #[test]
    fn test_unknown_soft_delete_column() {
        let mut catalog = catalog();
        let err = catalog
            .bind("Posts", "Post", "posts", BindingOptions::new().soft_delete("removed_at"))
            .unwrap_err();
        assert!(err.to_string().contains("removed_at"));
    }

    #[test]
    fn test_incompatible_soft_delete_column() {
        let mut catalog = catalog();
        let err = catalog
            .bind("Posts", "Post", "posts", BindingOptions::new().soft_delete("score"))
            .unwrap_err();
        assert!(err.to_string().contains("incompatible type"));
    }

    #[test]
    fn test_soft_delete_column_must_be_nullable() {
        let mut catalog = catalog();
        let err = catalog
            .bind("Posts", "Post", "posts", BindingOptions::new().soft_delete("archived"))
            .unwrap_err();
        assert!(err.to_string().contains("nullable"));
    }

    #[test]
    fn test_unknown_schema() {
        let mut catalog = catalog();
        let err = catalog.bind("Users", "User", "users", BindingOptions::new()).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownSchema { .. }));
    }

    #[test]
    fn test_duplicate_binding() {
        let mut catalog = catalog();
        catalog.bind("Posts", "Post", "posts", BindingOptions::new()).unwrap();
        let err = catalog.bind("Posts", "Post", "posts_v2", BindingOptions::new()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidBinding { .. }));
    }
}
