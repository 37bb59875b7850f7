//! Statement compilation: a parsed [`Statement`] plus caller parameters in,
//! SQL text plus an ordered parameter list out.
//!
//! Compilation never touches the store, and it is referentially transparent:
//! the same statement and parameters always produce the same text and
//! parameter order.

pub mod condition;

use std::collections::HashSet;
use std::sync::Arc;

use quarry_schema::{Binding, Catalog, FieldType, Schema};
use smol_str::SmolStr;
use tracing::{debug, instrument};

use crate::dsl::{
    Assignment, Clauses, InsertBatch, OperationKind, Operand, OrderSpec, Projection, Statement,
    Terminal,
};
use crate::error::{QueryError, QueryResult};
use crate::relations::{RelationPlan, RelationPlanner};
use crate::sql::{SqlBuilder, SqlFragment, limit_offset, quote_identifier};
use crate::value::{Params, Value};

pub use condition::ConditionCompiler;

/// What executing a compiled statement yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Every row.
    Rows,
    /// The first row, if any.
    Row,
    /// `COUNT(*)` of a query.
    Count,
    /// Whether any row matched.
    Exists,
    /// Nothing.
    Done,
    /// Number of affected rows.
    Affected,
}

/// A statement ready to run.
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    /// Statement text with `?` placeholders.
    pub sql: String,
    /// Values in placeholder order.
    pub params: Vec<Value>,
    /// Result shape.
    pub shape: ResultShape,
    /// Operation kind.
    pub operation: OperationKind,
    /// The binding the statement runs against.
    pub binding: Arc<Binding>,
    /// Eager loads to run on the result rows.
    pub relations: Vec<RelationPlan>,
    /// Columns fetched only to stitch relations, removed from the results.
    pub hidden_columns: Vec<SmolStr>,
}

impl CompiledStatement {
    /// Whether there is nothing to run, as for a batch insert over an
    /// empty collection.
    pub fn is_noop(&self) -> bool {
        self.sql.is_empty()
    }

    /// Parameter values with caller-parameter wrappers removed.
    pub fn bound_values(&self) -> Vec<&Value> {
        self.params.iter().map(Value::resolved).collect()
    }
}

/// Compiles statements against a catalog.
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'a> {
    catalog: &'a Catalog,
}

impl<'a> Compiler<'a> {
    /// Create a compiler over `catalog`.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Compile a statement, resolving its binding by name.
    pub fn compile(&self, statement: &Statement, params: &Params) -> QueryResult<CompiledStatement> {
        let binding = self
            .catalog
            .binding(&statement.source)
            .ok_or_else(|| QueryError::unknown_binding(statement.source.as_str()))?;
        self.compile_bound(binding, statement, params)
    }

    /// Compile a statement against an explicit binding.
    #[instrument(skip_all, fields(binding = %binding.name(), operation = %statement.kind))]
    pub fn compile_bound(
        &self,
        binding: &Arc<Binding>,
        statement: &Statement,
        params: &Params,
    ) -> QueryResult<CompiledStatement> {
        let compiled = check_legality(statement)
            .and_then(|()| match statement.kind {
                OperationKind::Query => self.select(binding, statement, params),
                OperationKind::Insert => self.insert(binding, statement, params),
                OperationKind::Update => self.update(binding, statement, params),
                OperationKind::Delete => self.delete(binding, statement, params),
            })
            .map_err(|e| e.with_binding(binding.name()).with_context(statement.kind.as_str()))?;

        debug!(sql = %compiled.sql, params = compiled.params.len(), "Compiled statement");
        Ok(compiled)
    }

    fn select(
        &self,
        binding: &Arc<Binding>,
        statement: &Statement,
        params: &Params,
    ) -> QueryResult<CompiledStatement> {
        let schema = binding.schema();
        let clauses = &statement.clauses;
        let relations = self.plan_relations(binding, clauses, params)?;

        let mut sql = SqlBuilder::new();
        let mut hidden_columns = Vec::new();
        let shape = match &statement.terminal {
            Terminal::Count => {
                sql.push("SELECT COUNT(*)");
                ResultShape::Count
            }
            Terminal::Exists => {
                sql.push("SELECT 1");
                ResultShape::Exists
            }
            Terminal::One(projection) | Terminal::Many(projection) => {
                sql.push("SELECT ");
                hidden_columns = render_projection(schema, projection, &relations, &mut sql)?;
                if matches!(statement.terminal, Terminal::One(_)) {
                    ResultShape::Row
                } else {
                    ResultShape::Rows
                }
            }
            Terminal::Execute | Terminal::ExecuteCount => {
                return Err(QueryError::internal("execute terminal on a query"));
            }
        };

        sql.push(" FROM ").push_identifier(binding.table());
        self.render_where(binding, clauses, params, &mut sql)?;

        match shape {
            ResultShape::Exists => {
                sql.push(" LIMIT 1");
            }
            ResultShape::Rows | ResultShape::Row => {
                let conditions = ConditionCompiler::new(schema, params);
                if !clauses.order.is_empty() {
                    sql.push(" ORDER BY ")
                        .push(render_order(&conditions, &clauses.order)?);
                }
                let limit = match (clauses.limit, shape) {
                    (None, ResultShape::Row) => Some(1),
                    (limit, _) => limit,
                };
                sql.push(limit_offset(limit, clauses.offset));
            }
            _ => {}
        }

        Ok(finish(sql, shape, statement.kind, binding, relations, hidden_columns))
    }

    fn insert(
        &self,
        binding: &Arc<Binding>,
        statement: &Statement,
        params: &Params,
    ) -> QueryResult<CompiledStatement> {
        let schema = binding.schema();
        let clauses = &statement.clauses;
        let relations = self.plan_relations(binding, clauses, params)?;
        let rows = match &clauses.batch {
            None => vec![self.assignments(schema, &clauses.assignments, params, false)?],
            Some(batch) => {
                let elements = batch_elements(params, batch)?;
                let mut rows = Vec::with_capacity(elements.len());
                for element in elements {
                    let scoped = params.clone().set(batch.alias.clone(), element);
                    rows.push(self.assignments(schema, &clauses.assignments, &scoped, false)?);
                }
                rows
            }
        };

        let mut sql = SqlBuilder::new();
        let Some(first) = rows.first() else {
            // An empty batch compiles to no statement.
            let (shape, hidden_columns) =
                render_returning(schema, &statement.terminal, &relations, &mut SqlBuilder::new())?;
            return Ok(finish(sql, shape, statement.kind, binding, relations, hidden_columns));
        };

        sql.push("INSERT INTO ").push_identifier(binding.table());
        if first.is_empty() {
            sql.push(" DEFAULT VALUES");
        } else {
            sql.push(" (")
                .push_identifiers(first.iter().map(|(field, _)| field.as_str()))
                .push(") VALUES ");
            for (row_index, row) in rows.iter().enumerate() {
                if row_index > 0 {
                    sql.push(", ");
                }
                sql.push("(");
                for (i, (_, value)) in row.iter().enumerate() {
                    if i > 0 {
                        sql.push(", ");
                    }
                    sql.push_fragment(value);
                }
                sql.push(")");
            }
        }

        if !clauses.upsert_keys.is_empty() {
            if clauses.assignments.is_empty() {
                return Err(QueryError::illegal("`update on` needs at least one assignment"));
            }
            let conditions = ConditionCompiler::new(schema, params);
            for key in &clauses.upsert_keys {
                conditions.field(key)?;
            }
            let keys: HashSet<&str> = clauses.upsert_keys.iter().map(|k| k.as_str()).collect();
            let updates: Vec<&str> = clauses
                .assignments
                .iter()
                .map(|a| a.field.as_str())
                .filter(|field| !keys.contains(field))
                .collect();

            sql.push(" ON CONFLICT (")
                .push_identifiers(clauses.upsert_keys.iter().map(|k| k.as_str()))
                .push(")");
            if updates.is_empty() {
                sql.push(" DO NOTHING");
            } else {
                sql.push(" DO UPDATE SET ");
                for (i, field) in updates.iter().enumerate() {
                    if i > 0 {
                        sql.push(", ");
                    }
                    let column = quote_identifier(field);
                    sql.push(format!("{} = excluded.{}", column, column));
                }
            }
        }

        let (shape, hidden_columns) =
            render_returning(schema, &statement.terminal, &relations, &mut sql)?;
        Ok(finish(sql, shape, statement.kind, binding, relations, hidden_columns))
    }

    fn update(
        &self,
        binding: &Arc<Binding>,
        statement: &Statement,
        params: &Params,
    ) -> QueryResult<CompiledStatement> {
        let schema = binding.schema();
        let clauses = &statement.clauses;
        let relations = self.plan_relations(binding, clauses, params)?;
        let values = self.assignments(schema, &clauses.assignments, params, true)?;

        let mut sql = SqlBuilder::new();
        sql.push("UPDATE ").push_identifier(binding.table()).push(" SET ");
        for (i, (field, value)) in values.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push_identifier(field).push(" = ").push_fragment(value);
        }
        self.render_where(binding, clauses, params, &mut sql)?;

        let (shape, hidden_columns) =
            render_returning(schema, &statement.terminal, &relations, &mut sql)?;
        Ok(finish(sql, shape, statement.kind, binding, relations, hidden_columns))
    }

    fn delete(
        &self,
        binding: &Arc<Binding>,
        statement: &Statement,
        params: &Params,
    ) -> QueryResult<CompiledStatement> {
        let schema = binding.schema();
        let clauses = &statement.clauses;
        let relations = self.plan_relations(binding, clauses, params)?;

        let mut sql = SqlBuilder::new();
        match binding.soft_delete_column() {
            Some(column) => {
                let stamp = match schema.field(column).map(|f| &f.field_type) {
                    Some(FieldType::Int) => "unixepoch()",
                    _ => "datetime('now')",
                };
                sql.push("UPDATE ")
                    .push_identifier(binding.table())
                    .push(" SET ")
                    .push_identifier(column)
                    .push(" = ")
                    .push(stamp);
            }
            None => {
                sql.push("DELETE FROM ").push_identifier(binding.table());
            }
        }
        self.render_where(binding, clauses, params, &mut sql)?;

        let (shape, hidden_columns) =
            render_returning(schema, &statement.terminal, &relations, &mut sql)?;
        Ok(finish(sql, shape, statement.kind, binding, relations, hidden_columns))
    }

    fn plan_relations(
        &self,
        binding: &Arc<Binding>,
        clauses: &Clauses,
        params: &Params,
    ) -> QueryResult<Vec<RelationPlan>> {
        if clauses.with.is_empty() {
            return Ok(Vec::new());
        }
        RelationPlanner::new(self.catalog, params)
            .include_deleted(clauses.include_deleted)
            .plan(binding, &clauses.with)
    }

    /// Render ` WHERE ...` from the soft-delete guard and the statement
    /// condition. Nothing is pushed when both are absent.
    fn render_where(
        &self,
        binding: &Binding,
        clauses: &Clauses,
        params: &Params,
        out: &mut SqlBuilder,
    ) -> QueryResult<()> {
        let soft_delete = binding
            .soft_delete_column()
            .filter(|_| !clauses.include_deleted);

        if soft_delete.is_none() && clauses.condition.is_none() {
            return Ok(());
        }

        out.push(" WHERE ");
        if let Some(column) = soft_delete {
            out.push_identifier(column).push(" IS NULL");
        }
        if let Some(condition) = &clauses.condition {
            let conditions = ConditionCompiler::new(binding.schema(), params);
            if soft_delete.is_some() {
                out.push(" AND ");
                conditions.compile_conjunct(condition, out)?;
            } else {
                conditions.compile(condition, out)?;
            }
        }
        Ok(())
    }

    /// Validate assignments and render each value as a fragment.
    fn assignments(
        &self,
        schema: &Schema,
        assignments: &[Assignment],
        params: &Params,
        allow_columns: bool,
    ) -> QueryResult<Vec<(SmolStr, SqlFragment)>> {
        let conditions = ConditionCompiler::new(schema, params);
        let mut seen = HashSet::new();
        let mut values = Vec::with_capacity(assignments.len());

        for assignment in assignments {
            let field = conditions.field(&assignment.field)?;
            if !seen.insert(assignment.field.as_str()) {
                return Err(QueryError::duplicate_assignment(assignment.field.as_str()));
            }

            let mut fragment = SqlBuilder::new();
            match &assignment.value {
                Operand::Literal(value) => {
                    condition::check_literal(field, value)?;
                    if value.is_null() && !field.nullable && !field.is_generated() {
                        return Err(QueryError::type_mismatch(
                            field.name(),
                            "null assigned to a non-nullable field",
                        ));
                    }
                    fragment.push_param(value.clone());
                }
                Operand::Interpolation(interpolation) => {
                    fragment.push_param(condition::interpolate(params, interpolation)?);
                }
                Operand::Column(column) if allow_columns => {
                    conditions.field(column)?;
                    fragment.push_identifier(column);
                }
                Operand::Column(column) => {
                    return Err(QueryError::illegal(format!(
                        "column reference `{}` cannot be inserted",
                        column
                    )));
                }
                Operand::List(_) | Operand::Range(..) => {
                    return Err(QueryError::type_mismatch(
                        field.name(),
                        "lists and ranges cannot be assigned",
                    ));
                }
            }
            values.push((assignment.field.clone(), fragment.build()));
        }
        Ok(values)
    }
}

/// Elements of a batch insert's collection parameter.
fn batch_elements(params: &Params, batch: &InsertBatch) -> QueryResult<Vec<Value>> {
    let collection = params
        .resolve(&batch.collection)
        .ok_or_else(|| QueryError::missing_parameter(batch.collection.as_str()))?;
    match collection {
        Value::List(items) => Ok(items),
        other => Err(QueryError::type_mismatch(
            batch.collection.as_str(),
            format!("batch insert needs a list, got {}", other.type_name()),
        )),
    }
}

fn finish(
    sql: SqlBuilder,
    shape: ResultShape,
    operation: OperationKind,
    binding: &Arc<Binding>,
    relations: Vec<RelationPlan>,
    hidden_columns: Vec<SmolStr>,
) -> CompiledStatement {
    let fragment = sql.build();
    CompiledStatement {
        sql: fragment.sql,
        params: fragment.params,
        shape,
        operation,
        binding: binding.clone(),
        relations,
        hidden_columns,
    }
}

/// Check that the terminal and clauses fit the operation.
fn check_legality(statement: &Statement) -> QueryResult<()> {
    let kind = statement.kind;
    let clauses = &statement.clauses;
    let terminal = &statement.terminal;

    let terminal_ok = match kind {
        OperationKind::Query => !matches!(terminal, Terminal::Execute | Terminal::ExecuteCount),
        _ => !terminal.is_aggregate(),
    };
    if !terminal_ok {
        return Err(QueryError::illegal(format!(
            "terminal `{}` is not allowed on @{}",
            terminal, kind
        )));
    }

    if !clauses.with.is_empty() && !terminal.returns_rows() {
        return Err(QueryError::illegal(format!(
            "`with` cannot be combined with terminal `{}`",
            terminal
        )));
    }

    let clause_error = |clause: &str| {
        Err(QueryError::illegal(format!(
            "`{}` is not allowed on @{}",
            clause, kind
        )))
    };

    match kind {
        OperationKind::Query => {
            if !clauses.assignments.is_empty() {
                return clause_error("|<");
            }
        }
        OperationKind::Insert => {
            if clauses.condition.is_some() {
                return clause_error("a condition");
            }
            if clauses.batch.is_some() && clauses.assignments.is_empty() {
                return Err(QueryError::illegal("a batch @insert needs at least one `|<` assignment"));
            }
            if clauses.include_deleted {
                return clause_error("include deleted");
            }
        }
        OperationKind::Update => {
            if clauses.assignments.is_empty() {
                return Err(QueryError::illegal("@update needs at least one `|<` assignment"));
            }
        }
        OperationKind::Delete => {
            if !clauses.assignments.is_empty() {
                return clause_error("|<");
            }
        }
    }

    if kind.is_mutation() {
        if !clauses.order.is_empty() {
            return clause_error("order");
        }
        if clauses.limit.is_some() {
            return clause_error("limit");
        }
        if clauses.offset.is_some() {
            return clause_error("offset");
        }
    }
    if kind != OperationKind::Insert && !clauses.upsert_keys.is_empty() {
        return clause_error("update on");
    }
    if kind != OperationKind::Insert && clauses.batch.is_some() {
        return clause_error("* each");
    }
    Ok(())
}

/// Render a projection, adding relation key columns it leaves out.
/// Returns the added columns.
fn render_projection(
    schema: &Schema,
    projection: &Projection,
    relations: &[RelationPlan],
    out: &mut SqlBuilder,
) -> QueryResult<Vec<SmolStr>> {
    let fields = match projection {
        Projection::All => {
            out.push("*");
            return Ok(Vec::new());
        }
        Projection::Fields(fields) => fields,
    };

    for field in fields {
        if !schema.has_field(field) {
            return Err(QueryError::unknown_field(schema.name(), field.as_str()));
        }
    }

    let mut hidden: Vec<SmolStr> = Vec::new();
    for plan in relations {
        if !fields.contains(&plan.parent_key) && !hidden.contains(&plan.parent_key) {
            hidden.push(plan.parent_key.clone());
        }
    }

    out.push_identifiers(fields.iter().chain(hidden.iter()).map(|f| f.as_str()));
    Ok(hidden)
}

/// Render `RETURNING` for row terminals of mutations.
fn render_returning(
    schema: &Schema,
    terminal: &Terminal,
    relations: &[RelationPlan],
    out: &mut SqlBuilder,
) -> QueryResult<(ResultShape, Vec<SmolStr>)> {
    let (shape, projection) = match terminal {
        Terminal::One(projection) => (ResultShape::Row, projection),
        Terminal::Many(projection) => (ResultShape::Rows, projection),
        Terminal::Execute => return Ok((ResultShape::Done, Vec::new())),
        Terminal::ExecuteCount => return Ok((ResultShape::Affected, Vec::new())),
        Terminal::Count | Terminal::Exists => {
            return Err(QueryError::internal("aggregate terminal on a mutation"));
        }
    };
    out.push(" RETURNING ");
    let hidden = render_projection(schema, projection, relations, out)?;
    Ok((shape, hidden))
}

/// Render an `ORDER BY` list, without the keyword.
pub(crate) fn render_order(
    conditions: &ConditionCompiler<'_>,
    order: &[OrderSpec],
) -> QueryResult<String> {
    let mut parts = Vec::with_capacity(order.len());
    for spec in order {
        conditions.field(&spec.field)?;
        parts.push(format!(
            "{} {}",
            quote_identifier(&spec.field),
            spec.direction.as_sql()
        ));
    }
    Ok(parts.join(", "))
}
