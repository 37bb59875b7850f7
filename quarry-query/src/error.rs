//! Error types for parsing, compiling and running queries.
//!
//! Every failure carries a stable [`ErrorCode`] and the [`ErrorKind`] it
//! belongs to, plus optional context about where it happened.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: Q{category}{number}
//! - 1xxx: Query errors raised before the store is touched
//!   (10xx parse, 11xx schema and relations, 12xx types, 13xx compilation)
//! - 2xxx: Constraint violations reported by the store
//! - 3xxx: Connection errors
//! - 4xxx: Transaction errors
//! - 5xxx: Execution errors (timeout, database)
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use quarry_query::{ErrorCode, ErrorKind, QueryError};
//!
//! let err = QueryError::unknown_field("User", "emial");
//! assert_eq!(err.code, ErrorCode::UnknownField);
//! assert_eq!(err.kind(), ErrorKind::Schema);
//! assert_eq!(err.to_string(), "[Q1101] Unknown field `emial` on schema `User`");
//! ```

use std::fmt;

use quarry_schema::SchemaError;
use serde::Serialize;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Parse errors (10xx)
    /// Malformed query source (Q1001).
    ParseError = 1001,

    // Schema and relation errors (11xx)
    /// Schema definition or binding error (Q1100).
    SchemaDefinition = 1100,
    /// Field not declared on the schema (Q1101).
    UnknownField = 1101,
    /// Binding not registered in the catalog (Q1102).
    UnknownBinding = 1102,
    /// Relation not declared on the schema (Q1103).
    UnknownRelation = 1103,
    /// Eager-load path revisits a relation (Q1104).
    RelationCycle = 1104,
    /// Relation target schema has no binding (Q1105).
    UnboundRelationTarget = 1105,

    // Type errors (12xx)
    /// Literal does not match the field type (Q1201).
    TypeMismatch = 1201,
    /// Stored value cannot be mapped to the field type (Q1202).
    UnmappableValue = 1202,

    // Compilation errors (13xx)
    /// Terminal or clause not allowed for the operation (Q1301).
    IllegalTerminal = 1301,
    /// Field assigned more than once (Q1302).
    DuplicateAssignment = 1302,
    /// Eager-load declared twice with different modifiers (Q1303).
    ConflictingEagerLoad = 1303,
    /// Interpolated parameter has no supplied value (Q1304).
    MissingParameter = 1304,

    // Constraint errors (2xxx)
    /// Unique constraint violation (Q2001).
    UniqueConstraint = 2001,
    /// Foreign key constraint violation (Q2002).
    ForeignKeyConstraint = 2002,
    /// Check constraint violation (Q2003).
    CheckConstraint = 2003,
    /// Not null constraint violation (Q2004).
    NotNullConstraint = 2004,

    // Connection errors (3xxx)
    /// Database connection failed (Q3001).
    ConnectionFailed = 3001,
    /// Connection pool closed or exhausted (Q3002).
    PoolExhausted = 3002,

    // Transaction errors (4xxx)
    /// A previous operation failed; the transaction rolls back (Q4001).
    TransactionAborted = 4001,
    /// Transaction already committed or rolled back (Q4002).
    TransactionClosed = 4002,
    /// Transaction started inside a transaction (Q4003).
    NestedTransaction = 4003,

    // Execution errors (5xxx)
    /// Statement timeout (Q5001).
    QueryTimeout = 5001,
    /// General database error (Q5002).
    DatabaseError = 5002,

    // Configuration errors (7xxx)
    /// Invalid configuration (Q7001).
    InvalidConfiguration = 7001,
    /// Invalid connection string (Q7002).
    InvalidConnectionString = 7002,

    // Internal errors (9xxx)
    /// Internal error (Q9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "Q1001").
    pub fn code(&self) -> String {
        format!("Q{}", *self as u16)
    }

    /// The category this code belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ParseError => ErrorKind::Parse,
            Self::SchemaDefinition | Self::UnknownField | Self::UnknownBinding => ErrorKind::Schema,
            Self::UnknownRelation | Self::RelationCycle | Self::UnboundRelationTarget => {
                ErrorKind::Relation
            }
            Self::TypeMismatch | Self::UnmappableValue => ErrorKind::Type,
            Self::IllegalTerminal
            | Self::DuplicateAssignment
            | Self::ConflictingEagerLoad
            | Self::MissingParameter => ErrorKind::Compile,
            Self::UniqueConstraint
            | Self::ForeignKeyConstraint
            | Self::CheckConstraint
            | Self::NotNullConstraint => ErrorKind::Constraint,
            Self::ConnectionFailed
            | Self::PoolExhausted
            | Self::DatabaseError
            | Self::InvalidConfiguration
            | Self::InvalidConnectionString => ErrorKind::Store,
            Self::QueryTimeout => ErrorKind::Timeout,
            Self::TransactionAborted | Self::TransactionClosed | Self::NestedTransaction => {
                ErrorKind::TransactionAborted
            }
            Self::Internal => ErrorKind::Internal,
        }
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ParseError => "Malformed query",
            Self::SchemaDefinition => "Invalid schema definition",
            Self::UnknownField => "Unknown field",
            Self::UnknownBinding => "Unknown binding",
            Self::UnknownRelation => "Unknown relation",
            Self::RelationCycle => "Relation cycle",
            Self::UnboundRelationTarget => "Relation target has no binding",
            Self::TypeMismatch => "Type mismatch",
            Self::UnmappableValue => "Unmappable stored value",
            Self::IllegalTerminal => "Illegal terminal or clause",
            Self::DuplicateAssignment => "Duplicate assignment",
            Self::ConflictingEagerLoad => "Conflicting eager load",
            Self::MissingParameter => "Missing parameter",
            Self::UniqueConstraint => "Unique constraint violation",
            Self::ForeignKeyConstraint => "Foreign key constraint violation",
            Self::CheckConstraint => "Check constraint violation",
            Self::NotNullConstraint => "Not null constraint violation",
            Self::ConnectionFailed => "Database connection failed",
            Self::PoolExhausted => "Connection pool exhausted",
            Self::TransactionAborted => "Transaction aborted",
            Self::TransactionClosed => "Transaction already closed",
            Self::NestedTransaction => "Nested transaction",
            Self::QueryTimeout => "Statement timeout",
            Self::DatabaseError => "Database error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::InvalidConnectionString => "Invalid connection string",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Broad error category, as reported to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed source.
    Parse,
    /// Unknown field or binding.
    Schema,
    /// Invalid eager load.
    Relation,
    /// Value does not fit a field type.
    Type,
    /// Statement cannot be compiled.
    Compile,
    /// Store rejected a write.
    Constraint,
    /// Connection or database failure.
    Store,
    /// Statement exceeded its timeout.
    Timeout,
    /// Transaction cannot continue.
    TransactionAborted,
    /// Bug in Quarry.
    Internal,
}

impl ErrorKind {
    /// The snake_case name used in serialized outcomes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Schema => "schema",
            Self::Relation => "relation",
            Self::Type => "type",
            Self::Compile => "compile",
            Self::Constraint => "constraint",
            Self::Store => "store",
            Self::Timeout => "timeout",
            Self::TransactionAborted => "transaction_aborted",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a parse error in the query source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// Byte offset.
    pub offset: usize,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The binding involved.
    pub binding: Option<String>,
    /// The field involved.
    pub field: Option<String>,
    /// The SQL statement (if available).
    pub sql: Option<String>,
    /// Where in the source a parse error occurred.
    pub location: Option<SourceLocation>,
    /// What the parser expected instead.
    pub expected: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur during query operations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Set the binding.
    pub fn with_binding(mut self, binding: impl Into<String>) -> Self {
        self.context.binding = Some(binding.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the SQL statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create a parse error at a source position.
    pub fn parse(
        message: impl Into<String>,
        location: SourceLocation,
        expected: Option<String>,
    ) -> Self {
        let message = message.into();
        let mut err = Self::new(
            ErrorCode::ParseError,
            format!(
                "{} at line {}, column {}",
                message, location.line, location.column
            ),
        );
        err.context.location = Some(location);
        err.context.expected = expected;
        err
    }

    /// Create an unknown field error.
    pub fn unknown_field(schema: impl Into<String>, field: impl Into<String>) -> Self {
        let schema = schema.into();
        let field = field.into();
        Self::new(
            ErrorCode::UnknownField,
            format!("Unknown field `{}` on schema `{}`", field, schema),
        )
        .with_field(&field)
        .with_suggestion(format!("Check the fields declared on `{}`", schema))
    }

    /// Create an unknown binding error.
    pub fn unknown_binding(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorCode::UnknownBinding, format!("Unknown binding `{}`", name))
            .with_binding(&name)
            .with_suggestion("Bind the schema to a table with Catalog::bind before querying it")
    }

    /// Create an unknown relation error.
    pub fn unknown_relation(schema: impl Into<String>, relation: impl Into<String>) -> Self {
        let schema = schema.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::UnknownRelation,
            format!("Unknown relation `{}` on schema `{}`", relation, schema),
        )
        .with_field(&relation)
    }

    /// Create a relation cycle error.
    pub fn relation_cycle(path: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::RelationCycle,
            format!("Eager load path `{}` revisits a relation", path.into()),
        )
        .with_help("A relation may appear only once along one eager-load path")
    }

    /// Create an error for a relation whose target schema is not bound.
    pub fn unbound_relation_target(relation: impl Into<String>, target: impl Into<String>) -> Self {
        let relation = relation.into();
        Self::new(
            ErrorCode::UnboundRelationTarget,
            format!(
                "Relation `{}` targets schema `{}`, which has no binding",
                relation,
                target.into()
            ),
        )
        .with_field(&relation)
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            ErrorCode::TypeMismatch,
            format!("Type mismatch on `{}`: {}", field, message.into()),
        )
        .with_field(&field)
    }

    /// Create an error for a stored value that does not fit its field type.
    pub fn unmappable(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            ErrorCode::UnmappableValue,
            format!("Cannot map stored value of `{}`: {}", field, message.into()),
        )
        .with_field(&field)
        .with_suggestion("Check that the table matches the schema")
    }

    /// Create an illegal terminal or clause error.
    pub fn illegal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IllegalTerminal, message)
    }

    /// Create a duplicate assignment error.
    pub fn duplicate_assignment(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            ErrorCode::DuplicateAssignment,
            format!("Field `{}` is assigned more than once", field),
        )
        .with_field(&field)
    }

    /// Create a conflicting eager-load error.
    pub fn conflicting_eager_load(relation: impl Into<String>) -> Self {
        let relation = relation.into();
        Self::new(
            ErrorCode::ConflictingEagerLoad,
            format!("Relation `{}` is loaded twice with different modifiers", relation),
        )
        .with_field(&relation)
    }

    /// Create an error for an interpolation with no supplied value.
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::MissingParameter,
            format!("No value supplied for parameter `{{{}}}`", name),
        )
        .with_suggestion(format!("Pass `{}` in the parameters", name))
    }

    /// Create a constraint violation error.
    pub fn constraint(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::ConnectionFailed, format!("Connection error: {}", message))
            .with_suggestion("Verify the database path and its permissions")
    }

    /// Create a pool exhausted error.
    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PoolExhausted, message)
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::new(
            ErrorCode::QueryTimeout,
            format!("Statement timed out after {}ms", duration_ms),
        )
        .with_suggestion("Increase query.statement_timeout_ms if the statement is expected to be slow")
    }

    /// Create a general database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create a transaction aborted error.
    pub fn transaction_aborted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransactionAborted, message)
            .with_help("A failed operation rolls the whole transaction back")
    }

    /// Create a transaction closed error.
    pub fn transaction_closed() -> Self {
        Self::new(
            ErrorCode::TransactionClosed,
            "Transaction is already committed or rolled back",
        )
    }

    /// Create a nested transaction error.
    pub fn nested_transaction() -> Self {
        Self::new(
            ErrorCode::NestedTransaction,
            "Transactions cannot be nested",
        )
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
    }

    // ============== Error Checks ==============

    /// Check if this is a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        self.kind() == ErrorKind::Constraint
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::QueryTimeout
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self.code, ErrorCode::ConnectionFailed | ErrorCode::PoolExhausted)
    }

    /// Whether the error was raised before any statement reached the store.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Parse | ErrorKind::Schema | ErrorKind::Relation | ErrorKind::Compile
        ) || self.code == ErrorCode::TypeMismatch
    }

    // ============== Display Functions ==============

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref binding) = self.context.binding {
            output.push_str(&format!("  → Binding: {}\n", binding));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  → Field: {}\n", field));
        }
        if let Some(ref expected) = self.context.expected {
            output.push_str(&format!("  → Expected: {}\n", expected));
        }

        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.len() > 200 {
                let mut end = 200;
                while !sql.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &sql[..end])
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

impl From<SchemaError> for QueryError {
    fn from(err: SchemaError) -> Self {
        let code = match &err {
            SchemaError::UnknownBinding { .. } => ErrorCode::UnknownBinding,
            SchemaError::ConfigError { .. } | SchemaError::TomlError { .. } => {
                ErrorCode::InvalidConfiguration
            }
            _ => ErrorCode::SchemaDefinition,
        };
        Self::new(code, err.to_string()).with_source(err)
    }
}
