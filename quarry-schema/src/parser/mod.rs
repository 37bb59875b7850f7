//! Parser for `@schema` declarations.

mod grammar;

use std::path::Path;

use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pair;
use smol_str::SmolStr;

use crate::ast::*;
use crate::error::{SchemaError, SchemaResult};

pub use grammar::{Rule, SchemaParser};

/// A parsed, not yet registered schema declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDeclaration {
    /// Schema name.
    pub name: Ident,
    /// Declared fields.
    pub fields: Vec<Field>,
    /// Declared relations.
    pub relations: Vec<Relation>,
    /// Source location.
    pub span: Span,
}

/// Parse every `@schema` declaration in `input`.
pub fn parse_declarations(input: &str) -> SchemaResult<Vec<SchemaDeclaration>> {
    let mut pairs = SchemaParser::parse(Rule::declarations, input).map_err(|e| {
        let (offset, len) = match e.location {
            InputLocation::Pos(pos) => (pos, 0),
            InputLocation::Span((start, end)) => (start, end - start),
        };
        SchemaError::syntax(input, offset, len, e.variant.message().to_string())
    })?;

    let Some(root) = pairs.next() else {
        return Ok(Vec::new());
    };

    root.into_inner()
        .filter(|pair| pair.as_rule() == Rule::schema_decl)
        .map(parse_schema_decl)
        .collect()
}

/// Parse declarations from a file.
pub fn parse_declarations_file(path: impl AsRef<Path>) -> SchemaResult<Vec<SchemaDeclaration>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| SchemaError::IoError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_declarations(&content)
}

fn ident(pair: &Pair<'_, Rule>) -> Ident {
    Ident::new(pair.as_str(), pair.as_span().into())
}

fn expect<'i>(
    pair: Option<Pair<'i, Rule>>,
    schema: &str,
    what: &str,
) -> SchemaResult<Pair<'i, Rule>> {
    pair.ok_or_else(|| SchemaError::invalid_field(schema, what, "incomplete declaration"))
}

fn parse_schema_decl(pair: Pair<'_, Rule>) -> SchemaResult<SchemaDeclaration> {
    let span = pair.as_span().into();
    let mut inner = pair.into_inner();
    let name = ident(&expect(inner.next(), "?", "name")?);

    let mut fields = Vec::new();
    let mut relations = Vec::new();

    for member in inner {
        let mut parts = member.into_inner();
        let member_name = ident(&expect(parts.next(), name.as_str(), "member")?);
        let body = expect(parts.next(), name.as_str(), member_name.as_str())?;

        match body.as_rule() {
            Rule::relation_type => relations.push(parse_relation(member_name, body, &name)?),
            Rule::field_type => fields.push(parse_field(member_name, body, &name)?),
            _ => {}
        }
    }

    Ok(SchemaDeclaration {
        name,
        fields,
        relations,
        span,
    })
}

fn parse_relation(name: Ident, pair: Pair<'_, Rule>, schema: &Ident) -> SchemaResult<Relation> {
    let mut inner = pair.into_inner();
    let target = expect(inner.next(), schema.as_str(), name.as_str())?;
    let foreign_key = expect(inner.next(), schema.as_str(), name.as_str())?;

    let mut relation = match target.as_rule() {
        Rule::many_target => {
            let target_name = target
                .into_inner()
                .next()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
            Relation::has_many(name, target_name, foreign_key.as_str())
        }
        _ => Relation::belongs_to(name, target.as_str(), foreign_key.as_str()),
    };

    if let Some(filter) = inner.next() {
        let text = filter
            .into_inner()
            .next()
            .map(|s| unescape(string_contents(&s)))
            .unwrap_or_default();
        relation = relation.with_default_filter(text);
    }

    Ok(relation)
}

fn parse_field(name: Ident, pair: Pair<'_, Rule>, schema: &Ident) -> SchemaResult<Field> {
    let mut field_type = None;
    let mut nullable = false;
    let mut options = Vec::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::enum_type => {
                let values = part
                    .into_inner()
                    .map(|s| SmolStr::new(unescape(string_contents(&s))))
                    .collect();
                field_type = Some(FieldType::Enum(values));
            }
            Rule::identifier => {
                let ty = FieldType::from_name(part.as_str()).ok_or_else(|| {
                    SchemaError::invalid_field(
                        schema.as_str(),
                        name.as_str(),
                        format!("unknown type `{}`", part.as_str()),
                    )
                })?;
                field_type = Some(ty);
            }
            Rule::optional => nullable = true,
            Rule::type_options => options.extend(part.into_inner()),
            _ => {}
        }
    }

    let field_type = field_type
        .ok_or_else(|| SchemaError::invalid_field(schema.as_str(), name.as_str(), "missing type"))?;
    let mut field = Field::new(name, field_type);
    field.nullable = nullable;

    for option in options {
        apply_option(&mut field, option, schema)?;
    }

    Ok(field)
}

fn apply_option(field: &mut Field, pair: Pair<'_, Rule>, schema: &Ident) -> SchemaResult<()> {
    let mut inner = pair.into_inner();
    let field_name = field.name().to_string();
    let key = expect(inner.next(), schema.as_str(), &field_name)?;
    let value = expect(inner.next(), schema.as_str(), &field_name)?
        .into_inner()
        .next();
    let value = expect(value, schema.as_str(), &field_name)?;

    let invalid = |message: String| SchemaError::invalid_field(schema.as_str(), &field_name, message);

    match (key.as_str(), value.as_rule()) {
        ("unique", Rule::boolean) => field.constraints.unique = value.as_str() == "true",
        ("auto", Rule::boolean) => field.constraints.auto = value.as_str() == "true",
        ("required", Rule::boolean) => field.nullable = value.as_str() != "true",
        ("min", Rule::integer) => {
            field.constraints.min = Some(parse_int(&value).map_err(invalid)?);
        }
        ("max", Rule::integer) => {
            field.constraints.max = Some(parse_int(&value).map_err(invalid)?);
        }
        ("default", _) => {
            let default = match value.as_rule() {
                Rule::now => DefaultValue::Now,
                Rule::boolean => DefaultValue::Bool(value.as_str() == "true"),
                Rule::integer => DefaultValue::Int(parse_int(&value).map_err(invalid)?),
                Rule::float => DefaultValue::Float(
                    value
                        .as_str()
                        .parse()
                        .map_err(|_| invalid(format!("invalid number `{}`", value.as_str())))?,
                ),
                _ => {
                    let text = value
                        .into_inner()
                        .next()
                        .map(|s| unescape(s.as_str()))
                        .unwrap_or_default();
                    DefaultValue::Text(text.into())
                }
            };
            field.constraints.default = Some(default);
        }
        (other, _) => {
            return Err(invalid(format!(
                "unsupported option `{}: {}`",
                other,
                value.as_str()
            )));
        }
    }
    Ok(())
}

fn parse_int(pair: &Pair<'_, Rule>) -> Result<i64, String> {
    pair.as_str()
        .parse()
        .map_err(|_| format!("invalid integer `{}`", pair.as_str()))
}

fn string_contents<'i>(pair: &Pair<'i, Rule>) -> &'i str {
    let s = pair.as_str();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}
