//! Error types for schema definition, binding and declaration parsing.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while defining schemas, binding them to tables or loading
/// schema declarations.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// Error reading a file.
    #[error("failed to read file: {path}")]
    #[diagnostic(code(quarry::schema::io_error))]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Syntax error in a `@schema` declaration.
    #[error("syntax error in schema declaration: {message}")]
    #[diagnostic(code(quarry::schema::syntax_error))]
    SyntaxError {
        #[source_code]
        src: String,
        #[label("error here")]
        span: miette::SourceSpan,
        message: String,
    },

    /// A schema with this name is already registered.
    #[error("schema `{name}` is already defined")]
    #[diagnostic(code(quarry::schema::duplicate_schema))]
    DuplicateSchema { name: String },

    /// Two fields (or a field and a relation) share a name.
    #[error("duplicate field `{field}` in schema `{schema}`")]
    #[diagnostic(
        code(quarry::schema::duplicate_field),
        help("field and relation names must be unique within a schema")
    )]
    DuplicateField { schema: String, field: String },

    /// Invalid field definition.
    #[error("invalid field `{schema}.{field}`: {message}")]
    #[diagnostic(code(quarry::schema::invalid_field))]
    InvalidField {
        schema: String,
        field: String,
        message: String,
    },

    /// Invalid relation definition.
    #[error("invalid relation `{schema}.{relation}`: {message}")]
    #[diagnostic(code(quarry::schema::invalid_relation))]
    InvalidRelation {
        schema: String,
        relation: String,
        message: String,
    },

    /// Reference to a schema that was never defined.
    #[error("unknown schema `{name}`")]
    #[diagnostic(code(quarry::schema::unknown_schema))]
    UnknownSchema { name: String },

    /// Invalid binding of a schema to a table.
    #[error("invalid binding `{binding}`: {message}")]
    #[diagnostic(code(quarry::schema::invalid_binding))]
    InvalidBinding { binding: String, message: String },

    /// Reference to a binding that does not exist.
    #[error("unknown binding `{name}`")]
    #[diagnostic(code(quarry::schema::unknown_binding))]
    UnknownBinding { name: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    #[diagnostic(code(quarry::schema::config_error))]
    ConfigError { message: String },

    /// TOML parsing error.
    #[error("failed to parse TOML")]
    #[diagnostic(code(quarry::schema::toml_error))]
    TomlError {
        #[source]
        source: toml::de::Error,
    },

    /// Validation error with multiple issues.
    #[error("schema validation failed with {count} error(s)")]
    #[diagnostic(code(quarry::schema::validation_failed))]
    ValidationFailed {
        count: usize,
        #[related]
        errors: Vec<SchemaError>,
    },
}

impl SchemaError {
    /// Create a syntax error with source location.
    pub fn syntax(
        src: impl Into<String>,
        offset: usize,
        len: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::SyntaxError {
            src: src.into(),
            span: (offset, len).into(),
            message: message.into(),
        }
    }

    /// Create a duplicate field error.
    pub fn duplicate_field(schema: impl Into<String>, field: impl Into<String>) -> Self {
        Self::DuplicateField {
            schema: schema.into(),
            field: field.into(),
        }
    }

    /// Create an invalid field error.
    pub fn invalid_field(
        schema: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            schema: schema.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid relation error.
    pub fn invalid_relation(
        schema: impl Into<String>,
        relation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRelation {
            schema: schema.into(),
            relation: relation.into(),
            message: message.into(),
        }
    }

    /// Create an invalid binding error.
    pub fn invalid_binding(binding: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidBinding {
            binding: binding.into(),
            message: message.into(),
        }
    }

    /// Create an unknown schema error.
    pub fn unknown_schema(name: impl Into<String>) -> Self {
        Self::UnknownSchema { name: name.into() }
    }

    /// Create an unknown binding error.
    pub fn unknown_binding(name: impl Into<String>) -> Self {
        Self::UnknownBinding { name: name.into() }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Collapse a list of errors: a single error is returned as-is, several
    /// are wrapped in [`SchemaError::ValidationFailed`].
    pub fn collect(mut errors: Vec<SchemaError>) -> SchemaResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            count => Err(Self::ValidationFailed { count, errors }),
        }
    }

    /// Whether this error concerns a relation definition.
    pub fn is_relation_error(&self) -> bool {
        matches!(self, Self::InvalidRelation { .. })
    }
}
