//! The schema registry.
//!
//! Schemas are defined once at startup and shared read-only afterwards:
//!
//! ```rust
//! use quarry_schema::{Field, FieldType, Relation, SchemaRegistry};
//!
//! let mut registry = SchemaRegistry::new();
//! registry
//!     .define_schema(
//!         "User",
//!         vec![Field::new("id", FieldType::Int), Field::new("email", FieldType::Email)],
//!         vec![Relation::has_many("posts", "Post", "author_id")],
//!     )
//!     .unwrap();
//! registry
//!     .define_schema(
//!         "Post",
//!         vec![Field::new("id", FieldType::Int), Field::new("author_id", FieldType::Int)],
//!         vec![Relation::belongs_to("author", "User", "author_id")],
//!     )
//!     .unwrap();
//!
//! assert!(registry.validate().is_ok());
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::ast::{Field, Ident, Relation, RelationKind, Schema, Span};
use crate::error::{SchemaError, SchemaResult};

/// Holds every defined schema, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<SmolStr, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a schema.
    ///
    /// Fails on duplicate names, on relation names that shadow fields, and on
    /// relations whose foreign key field does not exist. A has-many relation
    /// whose target is not defined yet is checked when the target is defined.
    pub fn define_schema(
        &mut self,
        name: impl Into<Ident>,
        fields: Vec<Field>,
        relations: Vec<Relation>,
    ) -> SchemaResult<Arc<Schema>> {
        self.define_with_span(name.into(), fields, relations, Span::default())
    }

    pub(crate) fn define_with_span(
        &mut self,
        name: Ident,
        fields: Vec<Field>,
        relations: Vec<Relation>,
        span: Span,
    ) -> SchemaResult<Arc<Schema>> {
        if self.schemas.contains_key(&name.name) {
            return Err(SchemaError::DuplicateSchema {
                name: name.name.to_string(),
            });
        }

        let mut errors = Vec::new();

        let mut field_map = IndexMap::with_capacity(fields.len());
        for field in fields {
            if field_map.contains_key(&field.name.name) {
                errors.push(SchemaError::duplicate_field(name.as_str(), field.name()));
                continue;
            }
            field_map.insert(field.name.name.clone(), field);
        }

        let mut relation_map = IndexMap::with_capacity(relations.len());
        for relation in relations {
            let rel_name = relation.name.name.clone();
            if field_map.contains_key(&rel_name) || relation_map.contains_key(&rel_name) {
                errors.push(SchemaError::duplicate_field(name.as_str(), rel_name.as_str()));
                continue;
            }
            relation_map.insert(rel_name, relation);
        }

        let schema = Schema {
            name,
            fields: field_map,
            relations: relation_map,
            span,
        };

        for relation in schema.relations.values() {
            if let Err(e) = self.check_relation(&schema, relation) {
                errors.push(e);
            }
        }

        // Has-many relations declared earlier that point at this schema.
        for other in self.schemas.values() {
            for relation in other.relations.values() {
                if relation.kind == RelationKind::HasMany
                    && relation.target == schema.name.name
                    && !schema.has_field(&relation.foreign_key)
                {
                    errors.push(missing_foreign_key(other, relation, &schema));
                }
            }
        }

        SchemaError::collect(errors)?;

        debug!(
            schema = %schema.name,
            fields = schema.fields.len(),
            relations = schema.relations.len(),
            "Schema defined"
        );

        let schema = Arc::new(schema);
        self.schemas.insert(schema.name.name.clone(), schema.clone());
        Ok(schema)
    }

    fn check_relation(&self, schema: &Schema, relation: &Relation) -> SchemaResult<()> {
        match relation.kind {
            RelationKind::BelongsTo => {
                if !schema.has_field(&relation.foreign_key) {
                    return Err(missing_foreign_key(schema, relation, schema));
                }
            }
            RelationKind::HasMany => {
                let target = if relation.target == schema.name.name {
                    Some(schema)
                } else {
                    self.schemas.get(&relation.target).map(|s| s.as_ref())
                };
                if let Some(target) = target {
                    if !target.has_field(&relation.foreign_key) {
                        return Err(missing_foreign_key(schema, relation, target));
                    }
                }
            }
        }
        Ok(())
    }

    /// Check that every relation target has been defined.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut errors = Vec::new();
        for schema in self.schemas.values() {
            for relation in schema.relations.values() {
                if !self.schemas.contains_key(&relation.target) {
                    errors.push(SchemaError::invalid_relation(
                        schema.name(),
                        relation.name(),
                        format!("target schema `{}` is not defined", relation.target),
                    ));
                }
            }
        }
        SchemaError::collect(errors)
    }

    /// Parse `@schema` declarations and define each one in order.
    pub fn load(&mut self, source: &str) -> SchemaResult<Vec<Arc<Schema>>> {
        let declarations = crate::parser::parse_declarations(source)?;
        declarations
            .into_iter()
            .map(|decl| self.define_with_span(decl.name, decl.fields, decl.relations, decl.span))
            .collect()
    }

    /// Get a schema by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Schema>> {
        self.schemas.get(name)
    }

    /// Get a schema by name, failing if it is not defined.
    pub fn schema(&self, name: &str) -> SchemaResult<&Arc<Schema>> {
        self.get(name).ok_or_else(|| SchemaError::unknown_schema(name))
    }

    /// Iterate over schemas in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values()
    }

    /// Number of defined schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Check if no schema is defined.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

fn missing_foreign_key(owner: &Schema, relation: &Relation, holder: &Schema) -> SchemaError {
    SchemaError::invalid_relation(
        owner.name(),
        relation.name(),
        format!(
            "foreign key `{}` is not a field of `{}`",
            relation.foreign_key,
            holder.name()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FieldType;

    fn user_fields() -> Vec<Field> {
        vec![
            Field::new("id", FieldType::Int),
            Field::new("email", FieldType::Email).unique(),
        ]
    }

    fn post_fields() -> Vec<Field> {
        vec![
            Field::new("id", FieldType::Int),
            Field::new("title", FieldType::String),
            Field::new("author_id", FieldType::Int),
        ]
    }

    #[test]
    fn test_define_schema() {
        let mut registry = SchemaRegistry::new();
        let user = registry.define_schema("User", user_fields(), vec![]).unwrap();

        assert_eq!(user.name(), "User");
        assert_eq!(user.fields.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("User").is_some());
    }

    #[test]
    fn test_duplicate_schema() {
        let mut registry = SchemaRegistry::new();
        registry.define_schema("User", user_fields(), vec![]).unwrap();
        let err = registry.define_schema("User", user_fields(), vec![]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateSchema { .. }));
    }

    #[test]
    fn test_duplicate_field() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .define_schema(
                "User",
                vec![
                    Field::new("email", FieldType::String),
                    Field::new("email", FieldType::Text),
                ],
                vec![],
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_relation_shadowing_field() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .define_schema(
                "Post",
                post_fields(),
                vec![Relation::belongs_to("title", "User", "author_id")],
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn test_belongs_to_requires_local_foreign_key() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .define_schema(
                "Post",
                post_fields(),
                vec![Relation::belongs_to("author", "User", "writer_id")],
            )
            .unwrap_err();
        assert!(err.is_relation_error());
        assert!(err.to_string().contains("writer_id"));
    }

    #[test]
    fn test_has_many_checked_against_known_target() {
        let mut registry = SchemaRegistry::new();
        registry.define_schema("Post", post_fields(), vec![]).unwrap();
        let err = registry
            .define_schema(
                "User",
                user_fields(),
                vec![Relation::has_many("posts", "Post", "owner_id")],
            )
            .unwrap_err();
        assert!(err.is_relation_error());
    }

    #[test]
    fn test_has_many_checked_when_target_defined_later() {
        let mut registry = SchemaRegistry::new();
        registry
            .define_schema(
                "User",
                user_fields(),
                vec![Relation::has_many("posts", "Post", "owner_id")],
            )
            .unwrap();

        let err = registry.define_schema("Post", post_fields(), vec![]).unwrap_err();
        assert!(err.is_relation_error());
        assert!(registry.get("Post").is_none());
    }

    #[test]
    fn test_forward_reference_succeeds() {
        let mut registry = SchemaRegistry::new();
        registry
            .define_schema(
                "User",
                user_fields(),
                vec![Relation::has_many("posts", "Post", "author_id")],
            )
            .unwrap();
        assert!(registry.validate().is_err());

        registry
            .define_schema(
                "Post",
                post_fields(),
                vec![Relation::belongs_to("author", "User", "author_id")],
            )
            .unwrap();
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_self_relation() {
        let mut registry = SchemaRegistry::new();
        let schema = registry
            .define_schema(
                "Employee",
                vec![
                    Field::new("id", FieldType::Int),
                    Field::new("manager_id", FieldType::Int).nullable(),
                ],
                vec![
                    Relation::belongs_to("manager", "Employee", "manager_id"),
                    Relation::has_many("reports", "Employee", "manager_id"),
                ],
            )
            .unwrap();
        assert_eq!(schema.relations.len(), 2);
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .define_schema(
                "Post",
                vec![Field::new("id", FieldType::Int), Field::new("id", FieldType::Int)],
                vec![Relation::belongs_to("author", "User", "author_id")],
            )
            .unwrap_err();
        match err {
            SchemaError::ValidationFailed { count, .. } => assert_eq!(count, 2),
            other => panic!("Expected ValidationFailed, got {other:?}"),
        }
    }
}
