//! Syntax tree of parsed statements.
//!
//! The tree is schema-agnostic: field and relation names are plain strings
//! until the compiler checks them against a binding.

use std::fmt;

use smol_str::SmolStr;

use crate::value::Value;

/// The kind of statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// `@query`
    Query,
    /// `@insert`
    Insert,
    /// `@update`
    Update,
    /// `@delete`
    Delete,
}

impl OperationKind {
    /// Parse from the `@operation` keyword, with or without the `@`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim_start_matches('@') {
            "query" => Some(Self::Query),
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Lowercase operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether this operation writes.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Query)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed program: one statement or a transaction block.
#[derive(Debug, Clone, PartialEq)]
pub enum Program {
    /// A single statement.
    Statement(Statement),
    /// `@transaction { ... }`
    Transaction(TransactionBlock),
}

/// Statements of a `@transaction` block, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionBlock {
    /// The statements.
    pub items: Vec<TransactionItem>,
}

/// One statement inside a transaction block.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionItem {
    /// The statement.
    pub statement: Statement,
    /// `return` was written before the statement.
    pub returns: bool,
}

/// `@op(Binding | clause* terminal)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Operation kind.
    pub kind: OperationKind,
    /// Binding name the statement runs against.
    pub source: SmolStr,
    /// Clauses in canonical form.
    pub clauses: Clauses,
    /// Terminal and projection.
    pub terminal: Terminal,
}

/// Every clause of a statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clauses {
    /// Filter. Multiple condition clauses are joined with `and`.
    pub condition: Option<Condition>,
    /// Sort keys, primary first.
    pub order: Vec<OrderSpec>,
    /// `limit N`
    pub limit: Option<u64>,
    /// `offset N`
    pub offset: Option<u64>,
    /// Eager loads, in declaration order.
    pub with: Vec<EagerLoad>,
    /// `include deleted`
    pub include_deleted: bool,
    /// `|< field: value` assignments, in order.
    pub assignments: Vec<Assignment>,
    /// `update on a, b` conflict keys.
    pub upsert_keys: Vec<SmolStr>,
    /// `* each {collection} as alias`: one inserted row per element.
    pub batch: Option<InsertBatch>,
}

impl Clauses {
    /// Empty clause set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition, joined with any existing one by `and`.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.add_condition(condition);
        self
    }

    /// Add a sort key.
    pub fn order_by(mut self, field: impl Into<SmolStr>, direction: SortDirection) -> Self {
        self.order.push(OrderSpec {
            field: field.into(),
            direction,
        });
        self
    }

    /// Set the limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the offset.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Eager-load a relation.
    pub fn with(mut self, load: impl Into<EagerLoad>) -> Self {
        self.with.push(load.into());
        self
    }

    /// Include soft-deleted rows.
    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Assign a field.
    pub fn set(mut self, field: impl Into<SmolStr>, value: Operand) -> Self {
        self.assignments.push(Assignment {
            field: field.into(),
            value,
        });
        self
    }

    /// Set upsert conflict keys.
    pub fn upsert_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.upsert_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Insert one row per element of the `collection` parameter.
    pub fn each(mut self, collection: impl Into<SmolStr>, alias: impl Into<SmolStr>) -> Self {
        self.batch = Some(InsertBatch {
            collection: collection.into(),
            alias: alias.into(),
        });
        self
    }

    pub(crate) fn add_condition(&mut self, condition: Condition) {
        self.condition = Some(match self.condition.take() {
            None => condition,
            Some(Condition::And(mut items)) => {
                items.push(condition);
                Condition::And(items)
            }
            Some(existing) => Condition::And(vec![existing, condition]),
        });
    }
}

/// Boolean tree of comparisons.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A single comparison.
    Compare(Comparison),
    /// All must hold.
    And(Vec<Condition>),
    /// Any must hold.
    Or(Vec<Condition>),
    /// Negation of the inner condition.
    Not(Box<Condition>),
    /// Explicit parentheses.
    Group(Box<Condition>),
}

impl Condition {
    /// Build a comparison leaf.
    pub fn compare(field: impl Into<SmolStr>, operator: Operator, operand: Operand) -> Self {
        Self::Compare(Comparison {
            field: field.into(),
            operator,
            operand: Some(operand),
        })
    }

    /// `field == operand`
    pub fn equals(field: impl Into<SmolStr>, operand: Operand) -> Self {
        Self::compare(field, Operator::Eq, operand)
    }

    /// `field is null`
    pub fn is_null(field: impl Into<SmolStr>) -> Self {
        Self::Compare(Comparison {
            field: field.into(),
            operator: Operator::IsNull,
            operand: None,
        })
    }

    /// `field is not null`
    pub fn is_not_null(field: impl Into<SmolStr>) -> Self {
        Self::Compare(Comparison {
            field: field.into(),
            operator: Operator::IsNotNull,
            operand: None,
        })
    }

    /// Join with `and`.
    pub fn and(self, other: Condition) -> Self {
        match self {
            Self::And(mut items) => {
                items.push(other);
                Self::And(items)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Join with `or`.
    pub fn or(self, other: Condition) -> Self {
        match self {
            Self::Or(mut items) => {
                items.push(other);
                Self::Or(items)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Negate.
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Wrap in parentheses.
    pub fn group(self) -> Self {
        Self::Group(Box::new(self))
    }
}

/// `field operator operand`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Field name on the bound schema.
    pub field: SmolStr,
    /// Comparison operator.
    pub operator: Operator,
    /// Right-hand side. `None` for `is null` and `is not null`.
    pub operand: Option<Operand>,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `like`
    Like,
    /// `between X and Y`
    Between,
    /// `is null`
    IsNull,
    /// `is not null`
    IsNotNull,
}

impl Operator {
    /// Parse a binary comparator token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "like" => Some(Self::Like),
            _ => None,
        }
    }

    /// The operator as written in query source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Like => "like",
            Self::Between => "between",
            Self::IsNull => "is null",
            Self::IsNotNull => "is not null",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a comparison or assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Literal written in the source.
    Literal(Value),
    /// `{...}` value supplied by the caller. Always bound as a parameter.
    Interpolation(Interpolation),
    /// Another field of the same row.
    Column(SmolStr),
    /// `[a, b, ...]`
    List(Vec<Operand>),
    /// `X and Y` of `between`.
    Range(Box<Operand>, Box<Operand>),
}

impl Operand {
    /// Reference a caller parameter by name.
    pub fn param(name: impl Into<SmolStr>) -> Self {
        Self::Interpolation(Interpolation::Path(name.into()))
    }

    /// A literal value.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }
}

/// Contents of `{...}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpolation {
    /// `{name}` or `{user.id}`: looked up in the caller's parameters.
    Path(SmolStr),
    /// `{"a@b.com"}` or `{7}`: a host value written inline.
    Inline(Value),
}

/// A sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    /// Field name.
    pub field: SmolStr,
    /// Direction.
    pub direction: SortDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortDirection {
    /// Ascending (default).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// `with relation(...)`: a relation to load with its own modifiers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EagerLoad {
    /// Relation name on the parent schema.
    pub relation: SmolStr,
    /// Filter on the related rows.
    pub condition: Option<Condition>,
    /// Sort keys of each parent's related rows.
    pub order: Vec<OrderSpec>,
    /// Maximum related rows per parent.
    pub limit: Option<u64>,
    /// Related rows skipped per parent.
    pub offset: Option<u64>,
    /// Nested eager loads.
    pub children: Vec<EagerLoad>,
}

impl EagerLoad {
    /// Load `relation` with no modifiers.
    pub fn new(relation: impl Into<SmolStr>) -> Self {
        Self {
            relation: relation.into(),
            ..Default::default()
        }
    }

    /// Build from a dotted path: `a.b.c` loads `a`, then `b` under it, then `c`.
    pub fn path(path: &str) -> Self {
        let mut segments: Vec<&str> = path.split('.').collect();
        let mut load = Self::new(segments.pop().unwrap_or_default());
        while let Some(parent) = segments.pop() {
            load = Self::new(parent).with(load);
        }
        load
    }

    /// Filter the related rows.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            None => condition,
            Some(existing) => existing.and(condition),
        });
        self
    }

    /// Add a sort key.
    pub fn order_by(mut self, field: impl Into<SmolStr>, direction: SortDirection) -> Self {
        self.order.push(OrderSpec {
            field: field.into(),
            direction,
        });
        self
    }

    /// Limit related rows per parent.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip related rows per parent.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Add a nested eager load.
    pub fn with(mut self, child: impl Into<EagerLoad>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Whether any modifier besides nested loads is set.
    pub fn has_modifiers(&self) -> bool {
        self.condition.is_some() || !self.order.is_empty() || self.limit.is_some() || self.offset.is_some()
    }
}

impl From<&str> for EagerLoad {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

/// `* each {collection} as alias` on `@insert`.
///
/// Assignments are evaluated once per element of the `collection`
/// parameter, with the element bound to `alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertBatch {
    /// Parameter path holding the list of elements.
    pub collection: SmolStr,
    /// Name each element is bound to.
    pub alias: SmolStr,
}

/// `|< field: value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Field name.
    pub field: SmolStr,
    /// Assigned value.
    pub value: Operand,
}

/// Terminal of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// `?-> proj`: at most one row.
    One(Projection),
    /// `??-> proj`: every row.
    Many(Projection),
    /// `?-> count`
    Count,
    /// `?-> exists`
    Exists,
    /// `.`
    Execute,
    /// `.-> count`
    ExecuteCount,
}

impl Terminal {
    /// The projection of a row terminal.
    pub fn projection(&self) -> Option<&Projection> {
        match self {
            Self::One(p) | Self::Many(p) => Some(p),
            _ => None,
        }
    }

    /// Whether rows are returned.
    pub fn returns_rows(&self) -> bool {
        matches!(self, Self::One(_) | Self::Many(_))
    }

    /// Whether this is `?-> count` or `?-> exists`.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Count | Self::Exists)
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(p) => write!(f, "?-> {}", p),
            Self::Many(p) => write!(f, "??-> {}", p),
            Self::Count => f.write_str("?-> count"),
            Self::Exists => f.write_str("?-> exists"),
            Self::Execute => f.write_str("."),
            Self::ExecuteCount => f.write_str(".-> count"),
        }
    }
}

/// Projection of a row terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// `*`
    #[default]
    All,
    /// `a, b, c`
    Fields(Vec<SmolStr>),
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Fields(fields) => {
                let names: Vec<&str> = fields.iter().map(|s| s.as_str()).collect();
                f.write_str(&names.join(", "))
            }
        }
    }
}
