//! Conditions to parameterized `WHERE` fragments.
//!
//! Every comparison field and column reference is checked against the bound
//! schema, and literals are checked against the field type. Values are always
//! emitted as placeholders; parameters are appended depth-first, left to
//! right, in the same order as their placeholders.

use quarry_schema::{Field, FieldType, Schema};
use smol_str::SmolStr;

use crate::dsl::{Comparison, Condition, Interpolation, Operand, Operator};
use crate::error::{QueryError, QueryResult};
use crate::sql::{SqlBuilder, quote_identifier};
use crate::value::{Param, Params, Value, parse_datetime};

/// A resolved right-hand side.
enum Resolved {
    Value(Value),
    List(Vec<Value>),
    Column(SmolStr),
}

/// Compiles conditions against one schema.
pub struct ConditionCompiler<'a> {
    schema: &'a Schema,
    params: &'a Params,
}

impl<'a> ConditionCompiler<'a> {
    /// Create a compiler for conditions on `schema`.
    pub fn new(schema: &'a Schema, params: &'a Params) -> Self {
        Self { schema, params }
    }

    /// Render `condition` into `out`.
    pub fn compile(&self, condition: &Condition, out: &mut SqlBuilder) -> QueryResult<()> {
        match condition {
            Condition::Compare(comparison) => self.comparison(comparison, out),
            Condition::And(items) if items.is_empty() => {
                out.push("1 = 1");
                Ok(())
            }
            Condition::Or(items) if items.is_empty() => {
                out.push("1 = 0");
                Ok(())
            }
            Condition::And(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(" AND ");
                    }
                    self.compile_conjunct(item, out)?;
                }
                Ok(())
            }
            Condition::Or(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(" OR ");
                    }
                    self.compile(item, out)?;
                }
                Ok(())
            }
            Condition::Not(inner) => {
                let inner = match inner.as_ref() {
                    Condition::Group(grouped) => grouped.as_ref(),
                    other => other,
                };
                out.push("NOT (");
                self.compile(inner, out)?;
                out.push(")");
                Ok(())
            }
            Condition::Group(inner) => {
                out.push("(");
                self.compile(inner, out)?;
                out.push(")");
                Ok(())
            }
        }
    }

    /// Render `condition` as an operand of `AND`: a bare `OR` is parenthesized.
    pub fn compile_conjunct(&self, condition: &Condition, out: &mut SqlBuilder) -> QueryResult<()> {
        if matches!(condition, Condition::Or(items) if items.len() > 1) {
            out.push("(");
            self.compile(condition, out)?;
            out.push(")");
            Ok(())
        } else {
            self.compile(condition, out)
        }
    }

    /// Look up a field, failing with an unknown-field error.
    pub fn field(&self, name: &str) -> QueryResult<&'a Field> {
        self.schema
            .field(name)
            .ok_or_else(|| QueryError::unknown_field(self.schema.name(), name))
    }

    fn comparison(&self, comparison: &Comparison, out: &mut SqlBuilder) -> QueryResult<()> {
        let field = self.field(&comparison.field)?;
        let column = quote_identifier(&comparison.field);
        let operator = comparison.operator;

        let operand = match (operator, &comparison.operand) {
            (Operator::IsNull, _) => {
                out.push(format!("{} IS NULL", column));
                return Ok(());
            }
            (Operator::IsNotNull, _) => {
                out.push(format!("{} IS NOT NULL", column));
                return Ok(());
            }
            (_, Some(operand)) => operand,
            (_, None) => {
                return Err(QueryError::internal(format!(
                    "`{}` comparison without operand",
                    operator
                )));
            }
        };

        match operator {
            Operator::In | Operator::NotIn => {
                let negated = operator == Operator::NotIn;
                match self.resolve(field, operand, false)? {
                    Resolved::List(values) if values.is_empty() => {
                        out.push(if negated { "1 = 1" } else { "1 = 0" });
                    }
                    Resolved::List(values) => {
                        out.push(format!("{} {} (", column, sql_operator(operator)));
                        out.push_params(values);
                        out.push(")");
                    }
                    Resolved::Value(value) => {
                        out.push(format!("{} {} (", column, sql_operator(operator)));
                        out.push_param(value);
                        out.push(")");
                    }
                    Resolved::Column(other) => {
                        out.push(format!(
                            "{} {} ({})",
                            column,
                            sql_operator(operator),
                            quote_identifier(&other)
                        ));
                    }
                }
            }
            Operator::Between => {
                let Operand::Range(low, high) = operand else {
                    return Err(QueryError::illegal(format!(
                        "`between` on `{}` needs a range `X and Y`",
                        comparison.field
                    )));
                };
                out.push(format!("{} BETWEEN ", column));
                self.push_scalar(field, low, out)?;
                out.push(" AND ");
                self.push_scalar(field, high, out)?;
            }
            Operator::Like => {
                out.push(format!("{} LIKE ", column));
                if let Operand::Literal(value) = operand {
                    if !matches!(value, Value::Text(_)) {
                        return Err(QueryError::type_mismatch(
                            field.name(),
                            format!("`like` needs a text pattern, found {}", value.type_name()),
                        ));
                    }
                    out.push_param(value.clone());
                } else {
                    self.push_scalar(field, operand, out)?;
                }
            }
            _ => {
                let resolved = self.resolve(field, operand, true)?;
                let is_null = matches!(&resolved, Resolved::Value(v) if v.is_null());
                match operator {
                    Operator::Eq if is_null => {
                        out.push(format!("{} IS NULL", column));
                    }
                    Operator::Ne if is_null => {
                        out.push(format!("{} IS NOT NULL", column));
                    }
                    _ => {
                        out.push(format!("{} {} ", column, sql_operator(operator)));
                        self.push_resolved(field, resolved, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn push_scalar(&self, field: &Field, operand: &Operand, out: &mut SqlBuilder) -> QueryResult<()> {
        let resolved = self.resolve(field, operand, true)?;
        self.push_resolved(field, resolved, out)
    }

    fn push_resolved(&self, field: &Field, resolved: Resolved, out: &mut SqlBuilder) -> QueryResult<()> {
        match resolved {
            Resolved::Value(value) => {
                out.push_param(value);
            }
            Resolved::Column(name) => {
                out.push_identifier(&name);
            }
            Resolved::List(_) => {
                return Err(QueryError::type_mismatch(
                    field.name(),
                    "a list is only valid with `in` and `not in`",
                ));
            }
        }
        Ok(())
    }

    /// Resolve an operand to bindable values. Literals are type-checked;
    /// interpolated parameters pass through unchecked.
    fn resolve(&self, field: &Field, operand: &Operand, scalar: bool) -> QueryResult<Resolved> {
        match operand {
            Operand::Literal(value) => {
                check_literal(field, value)?;
                Ok(Resolved::Value(value.clone()))
            }
            Operand::Interpolation(interpolation) => {
                let value = interpolate(self.params, interpolation)?;
                if !scalar {
                    if let Some(items) = value.as_list() {
                        let items = items.iter().map(|item| wrap_param(&value, item.clone()));
                        return Ok(Resolved::List(items.collect()));
                    }
                }
                Ok(Resolved::Value(value))
            }
            Operand::Column(name) => {
                self.field(name)?;
                Ok(Resolved::Column(name.clone()))
            }
            Operand::List(items) if !scalar => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match self.resolve(field, item, true)? {
                        Resolved::Value(value) => values.push(value),
                        _ => {
                            return Err(QueryError::type_mismatch(
                                field.name(),
                                "list elements must be values",
                            ));
                        }
                    }
                }
                Ok(Resolved::List(values))
            }
            Operand::List(_) => Err(QueryError::type_mismatch(
                field.name(),
                "a list is only valid with `in` and `not in`",
            )),
            Operand::Range(..) => Err(QueryError::illegal(format!(
                "a range is only valid with `between` (field `{}`)",
                field.name()
            ))),
        }
    }
}

fn sql_operator(operator: Operator) -> &'static str {
    match operator {
        Operator::Eq => "=",
        Operator::Ne => "<>",
        Operator::Gt => ">",
        Operator::Lt => "<",
        Operator::Ge => ">=",
        Operator::Le => "<=",
        Operator::Like => "LIKE",
        Operator::In => "IN",
        Operator::NotIn => "NOT IN",
        Operator::Between => "BETWEEN",
        Operator::IsNull => "IS NULL",
        Operator::IsNotNull => "IS NOT NULL",
    }
}

/// Resolve an interpolation to a parameter value.
pub(crate) fn interpolate(params: &Params, interpolation: &Interpolation) -> QueryResult<Value> {
    match interpolation {
        Interpolation::Path(path) => {
            let value = params
                .resolve(path)
                .ok_or_else(|| QueryError::missing_parameter(path.as_str()))?;
            Ok(Value::Param(Param {
                name: path.clone(),
                value: Box::new(value),
            }))
        }
        Interpolation::Inline(value) => Ok(value.clone()),
    }
}

fn wrap_param(parent: &Value, item: Value) -> Value {
    match parent {
        Value::Param(param) => Value::Param(Param {
            name: param.name.clone(),
            value: Box::new(item),
        }),
        _ => item,
    }
}

/// Check a literal against the declared field type.
pub(crate) fn check_literal(field: &Field, value: &Value) -> QueryResult<()> {
    let ty = &field.field_type;
    let fits = match (ty, value) {
        (_, Value::Null) => true,
        (FieldType::Enum(variants), Value::Text(text)) => {
            if variants.iter().any(|v| v.as_str() == text) {
                true
            } else {
                let allowed: Vec<String> = variants.iter().map(|v| format!("{:?}", v.as_str())).collect();
                return Err(QueryError::type_mismatch(
                    field.name(),
                    format!("{:?} is not one of [{}]", text, allowed.join(", ")),
                ));
            }
        }
        (FieldType::Int | FieldType::Money, Value::Int(_)) => true,
        (FieldType::Float, Value::Int(_) | Value::Float(_)) => true,
        (FieldType::Bool, Value::Bool(_)) => true,
        (FieldType::Bool, Value::Int(0 | 1)) => true,
        (FieldType::Json, _) => true,
        (FieldType::DateTime, Value::Text(text)) => parse_datetime(text).is_some(),
        (ty, Value::DateTime(_)) => ty.is_temporal(),
        (ty, Value::Text(_)) => ty.is_textual(),
        _ => false,
    };

    if fits {
        Ok(())
    } else {
        Err(QueryError::type_mismatch(
            field.name(),
            format!("expected {}, found {} literal `{}`", ty, value.type_name(), value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse_condition;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;
    use quarry_schema::SchemaRegistry;

    fn schema() -> std::sync::Arc<Schema> {
        let mut registry = SchemaRegistry::new();
        registry
            .load(
                r#"@schema User {
                    id: int,
                    email: string(unique: true),
                    name: string?,
                    age: int?,
                    score: float?,
                    active: bool,
                    role: enum["admin", "member"],
                    created_at: datetime,
                    updated_at: datetime?
                }"#,
            )
            .unwrap();
        registry.get("User").unwrap().clone()
    }

    fn compile(src: &str, params: &Params) -> QueryResult<(String, Vec<Value>)> {
        let schema = schema();
        let condition = parse_condition(src)?;
        let mut out = SqlBuilder::new();
        ConditionCompiler::new(&schema, params).compile(&condition, &mut out)?;
        let fragment = out.build();
        let params = fragment.params.iter().map(|v| v.resolved().clone()).collect();
        Ok((fragment.sql, params))
    }

    fn sql(src: &str) -> String {
        compile(src, &Params::new()).unwrap().0
    }

    #[test]
    fn test_operator_mapping() {
        assert_eq!(sql("age == 1"), "age = ?");
        assert_eq!(sql("age != 1"), "age <> ?");
        assert_eq!(sql("age >= 1 and age < 9"), "age >= ? AND age < ?");
        assert_eq!(sql("name like \"A%\""), "name LIKE ?");
        assert_eq!(sql("age between 1 and 5"), "age BETWEEN ? AND ?");
        assert_eq!(sql("name is null"), "name IS NULL");
        assert_eq!(sql("name is not null"), "name IS NOT NULL");
    }

    #[test]
    fn test_null_equality() {
        assert_eq!(sql("name == null"), "name IS NULL");
        assert_eq!(sql("name != null"), "name IS NOT NULL");
    }

    #[test]
    fn test_precedence_and_groups() {
        assert_eq!(
            sql("age > 1 or age < 0 and active == true"),
            "age > ? OR age < ? AND active = ?"
        );
        assert_eq!(
            sql("(age > 1 or age < 0) and active == true"),
            "(age > ? OR age < ?) AND active = ?"
        );
        assert_eq!(sql("not active == true"), "NOT (active = ?)");
        assert_eq!(sql("not (age > 1 or name is null)"), "NOT (age > ? OR name IS NULL)");
    }

    #[test]
    fn test_programmatic_or_inside_and_is_parenthesized() {
        let schema = schema();
        let params = Params::new();
        let condition = Condition::And(vec![
            Condition::equals("age", Operand::literal(1)).or(Condition::is_null("age")),
            Condition::equals("active", Operand::literal(true)),
        ]);
        let mut out = SqlBuilder::new();
        ConditionCompiler::new(&schema, &params)
            .compile(&condition, &mut out)
            .unwrap();
        assert_eq!(out.sql(), "(age = ? OR age IS NULL) AND active = ?");
    }

    #[test]
    fn test_params_follow_placeholder_order() {
        let params = Params::new().set("min", 18).set("names", vec!["a", "b"]);
        let (sql, values) = compile(
            "(age between {min} and 65 or name in {names}) and email == \"x@y.z\"",
            &params,
        )
        .unwrap();
        assert_eq!(
            sql,
            "(age BETWEEN ? AND ? OR name IN (?, ?)) AND email = ?"
        );
        assert_eq!(
            values,
            vec![
                Value::Int(18),
                Value::Int(65),
                Value::from("a"),
                Value::from("b"),
                Value::from("x@y.z"),
            ]
        );
    }

    #[test]
    fn test_in_lists() {
        assert_eq!(sql("role in [\"admin\", \"member\"]"), "role IN (?, ?)");
        assert_eq!(sql("age in []"), "1 = 0");
        assert_eq!(sql("age not in []"), "1 = 1");

        let params = Params::new().set("ids", Vec::<i64>::new()).set("one", 3);
        assert_eq!(compile("id in {ids}", &params).unwrap().0, "1 = 0");
        assert_eq!(compile("id in {one}", &params).unwrap().0, "id IN (?)");
    }

    #[test]
    fn test_not_in_lists() {
        let (sql, values) = compile("age not in [1, 2]", &Params::new()).unwrap();
        assert_eq!(sql, "age NOT IN (?, ?)");
        assert_eq!(values, vec![Value::Int(1), Value::Int(2)]);

        let params = Params::new().set("ids", vec![7_i64, 3, 5]);
        let (sql, values) = compile("id not in {ids} and age > 1", &params).unwrap();
        assert_eq!(sql, "id NOT IN (?, ?, ?) AND age > ?");
        assert_eq!(
            values,
            vec![Value::Int(7), Value::Int(3), Value::Int(5), Value::Int(1)]
        );
    }

    #[test]
    fn test_column_reference() {
        assert_eq!(sql("updated_at > created_at"), "updated_at > created_at");
        let err = compile("updated_at > deleted_at", &Params::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownField);
    }

    #[test]
    fn test_unknown_field() {
        let err = compile("nickname == \"x\"", &Params::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownField);
        assert_eq!(err.context.field.as_deref(), Some("nickname"));
    }

    #[test]
    fn test_type_mismatch() {
        for src in [
            "age == \"ten\"",
            "active == 3",
            "role == \"owner\"",
            "email == 42",
            "created_at > \"yesterday\"",
            "name like 5",
        ] {
            let err = compile(src, &Params::new()).unwrap_err();
            assert_eq!(err.code, ErrorCode::TypeMismatch, "{src}");
        }
        assert_eq!(sql("score > 1"), "score > ?");
        assert_eq!(sql("created_at > \"2024-01-01\""), "created_at > ?");
    }

    #[test]
    fn test_params_are_not_type_checked() {
        let params = Params::new().set("age", "ten");
        assert!(compile("age == {age}", &params).is_ok());
    }

    #[test]
    fn test_missing_parameter() {
        let err = compile("age == {age}", &Params::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingParameter);
    }

    #[test]
    fn test_injection_values_stay_out_of_text() {
        let params = Params::new().set("email", "x'; DROP TABLE users; --");
        let (sql, values) = compile("email == {email}", &params).unwrap();
        assert_eq!(sql, "email = ?");
        assert_eq!(values, vec![Value::from("x'; DROP TABLE users; --")]);
    }

    #[test]
    fn test_dotted_parameter_path() {
        let params = Params::new().set(
            "user",
            crate::value::Record::from([("id", Value::Int(7))]),
        );
        let (sql, values) = compile("id == {user.id}", &params).unwrap();
        assert_eq!(sql, "id = ?");
        assert_eq!(values, vec![Value::Int(7)]);
    }
}
