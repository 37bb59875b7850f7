//! `CREATE TABLE` generation for bound schemas.
//!
//! This is a setup helper: it renders the table a binding expects, with no
//! diffing against an existing database.

use crate::ast::{Field, FieldType, RelationKind};
use crate::binding::{Binding, Catalog};

/// SQL keywords that must be quoted when used as identifiers.
const RESERVED: &[&str] = &[
    "user", "order", "group", "select", "from", "where", "table", "index", "key", "primary",
    "foreign", "check", "default", "null", "not", "and", "or", "in", "is", "like", "between",
    "case", "when", "then", "else", "end", "as", "on", "join", "left", "right", "inner", "outer",
    "cross", "natural", "using", "limit", "offset", "union", "intersect", "except", "all",
    "distinct", "having", "create", "alter", "drop", "insert", "update", "delete", "into",
    "values", "set", "returning", "exists", "unique", "references", "transaction",
];

/// Escape a string for use as an identifier.
pub fn escape_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check if an identifier needs quoting.
pub fn needs_quoting(name: &str) -> bool {
    if RESERVED.contains(&name.to_ascii_lowercase().as_str()) {
        return true;
    }
    name.is_empty()
        || name.starts_with(|c: char| c.is_ascii_digit())
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote an identifier if needed.
pub fn quote_identifier(name: &str) -> String {
    if needs_quoting(name) {
        escape_identifier(name)
    } else {
        name.to_string()
    }
}

/// Render `CREATE TABLE IF NOT EXISTS` for a binding.
///
/// With a catalog, belongs-to foreign keys whose target schema is bound get a
/// `REFERENCES` clause.
pub fn create_table_sql(binding: &Binding, catalog: Option<&Catalog>) -> String {
    let schema = binding.schema();
    let mut columns: Vec<String> = schema.fields.values().map(column_definition).collect();

    if let Some(catalog) = catalog {
        for relation in schema.relations.values() {
            if relation.kind != RelationKind::BelongsTo {
                continue;
            }
            if let Some(target) = catalog.binding_for_schema(&relation.target) {
                columns.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {}(id)",
                    quote_identifier(&relation.foreign_key),
                    quote_identifier(target.table())
                ));
            }
        }
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        quote_identifier(binding.table()),
        columns.join(",\n    ")
    )
}

/// Render `CREATE TABLE` statements for every binding in the catalog.
pub fn create_catalog_sql(catalog: &Catalog) -> Vec<String> {
    catalog
        .bindings()
        .map(|binding| create_table_sql(binding, Some(catalog)))
        .collect()
}

fn column_definition(field: &Field) -> String {
    let name = quote_identifier(field.name());

    if field.is_primary_key() {
        // INTEGER PRIMARY KEY aliases the rowid and is assigned on insert.
        return if field.field_type == FieldType::Int {
            format!("{} INTEGER PRIMARY KEY", name)
        } else {
            format!("{} {} PRIMARY KEY NOT NULL", name, field.field_type.storage().as_sql())
        };
    }

    let mut parts = vec![name.clone(), field.field_type.storage().as_sql().to_string()];

    if !field.nullable {
        parts.push("NOT NULL".to_string());
    }
    if field.constraints.unique {
        parts.push("UNIQUE".to_string());
    }
    if let Some(default) = &field.constraints.default {
        parts.push(format!("DEFAULT {}", default.to_sql()));
    }

    let checks = checks(&name, field);
    if !checks.is_empty() {
        parts.push(format!("CHECK ({})", checks.join(" AND ")));
    }

    parts.join(" ")
}

fn checks(column: &str, field: &Field) -> Vec<String> {
    let mut checks = Vec::new();

    match &field.field_type {
        FieldType::Enum(variants) => {
            let values: Vec<String> = variants
                .iter()
                .map(|v| format!("'{}'", v.replace('\'', "''")))
                .collect();
            checks.push(format!("{} IN ({})", column, values.join(", ")));
        }
        FieldType::Bool => checks.push(format!("{} IN (0, 1)", column)),
        _ => {}
    }

    let measured = if field.field_type.is_textual() {
        format!("length({})", column)
    } else {
        column.to_string()
    };
    if let Some(min) = field.constraints.min {
        checks.push(format!("{} >= {}", measured, min));
    }
    if let Some(max) = field.constraints.max {
        checks.push(format!("{} <= {}", measured, max));
    }

    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DefaultValue, Relation};
    use crate::binding::BindingOptions;
    use crate::registry::SchemaRegistry;
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        let mut registry = SchemaRegistry::new();
        registry
            .define_schema(
                "User",
                vec![
                    Field::new("id", FieldType::Int),
                    Field::new("email", FieldType::Email).unique(),
                    Field::new("name", FieldType::String).nullable().max(80),
                    Field::new("role", FieldType::Enum(vec!["admin".into(), "member".into()]))
                        .default_value(DefaultValue::Text("member".into())),
                    Field::new("active", FieldType::Bool).default_value(DefaultValue::Bool(true)),
                ],
                vec![Relation::has_many("posts", "Post", "author_id")],
            )
            .unwrap();
        registry
            .define_schema(
                "Post",
                vec![
                    Field::new("id", FieldType::Int),
                    Field::new("author_id", FieldType::Int),
                    Field::new("score", FieldType::Float).min(0),
                    Field::new("created_at", FieldType::DateTime)
                        .default_value(DefaultValue::Now),
                    Field::new("deleted_at", FieldType::DateTime).nullable(),
                ],
                vec![Relation::belongs_to("author", "User", "author_id")],
            )
            .unwrap();

        let mut catalog = Catalog::new(registry);
        catalog.bind("Users", "User", "users", BindingOptions::new()).unwrap();
        catalog
            .bind("Posts", "Post", "posts", BindingOptions::new().soft_delete("deleted_at"))
            .unwrap();
        catalog
    }

    #[test]
    fn test_create_users_table() {
        let catalog = catalog();
        let sql = create_table_sql(catalog.binding("Users").unwrap(), Some(&catalog));
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS users (\n    \
             id INTEGER PRIMARY KEY,\n    \
             email TEXT NOT NULL UNIQUE,\n    \
             name TEXT CHECK (length(name) <= 80),\n    \
             role TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('admin', 'member')),\n    \
             active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1))\n);"
        );
    }

    #[test]
    fn test_create_posts_table_with_reference() {
        let catalog = catalog();
        let sql = create_table_sql(catalog.binding("Posts").unwrap(), Some(&catalog));
        assert!(sql.contains("score REAL NOT NULL CHECK (score >= 0)"));
        assert!(sql.contains("created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP"));
        assert!(sql.contains("deleted_at TEXT,"));
        assert!(sql.contains("FOREIGN KEY (author_id) REFERENCES users(id)"));
    }

    #[test]
    fn test_no_reference_without_catalog() {
        let catalog = catalog();
        let sql = create_table_sql(catalog.binding("Posts").unwrap(), None);
        assert!(!sql.contains("REFERENCES"));
    }

    #[test]
    fn test_create_catalog_sql() {
        let catalog = catalog();
        let statements = create_catalog_sql(&catalog);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS users"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "users");
        assert_eq!(quote_identifier("order"), "\"order\"");
        assert_eq!(quote_identifier("my table"), "\"my table\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
