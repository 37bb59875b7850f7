//! Parser from query source to [`Program`].

use pest::Parser;
use pest::error::{ErrorVariant, InputLocation, LineColLocation};
use pest::iterators::Pair;
use pest_derive::Parser;
use smol_str::SmolStr;
use tracing::trace;

use super::ast::*;
use crate::error::{QueryError, QueryResult, SourceLocation};
use crate::sql::MAX_ROW_COUNT;
use crate::value::Value;

#[derive(Parser)]
#[grammar = "dsl/query.pest"]
struct QueryParser;

/// Parse a statement or `@transaction` block.
pub fn parse_program(input: &str) -> QueryResult<Program> {
    let pair = QueryParser::parse(Rule::program, input)
        .map_err(|e| syntax_error(input, e))?
        .next()
        .ok_or_else(|| QueryError::internal("empty parse tree"))?;

    let program = significant(pair)
        .next()
        .ok_or_else(|| QueryError::internal("program without statement"))?;

    let program = match program.as_rule() {
        Rule::transaction => Program::Transaction(build_transaction(program)?),
        _ => Program::Statement(build_statement(program)?),
    };
    trace!(?program, "Parsed program");
    Ok(program)
}

/// Parse a single statement. A `@transaction` block is rejected.
pub fn parse_statement(input: &str) -> QueryResult<Statement> {
    match parse_program(input)? {
        Program::Statement(statement) => Ok(statement),
        Program::Transaction(_) => Err(QueryError::illegal(
            "expected a single statement, found a @transaction block",
        )),
    }
}

/// Parse a bare condition such as `age > 18 and not banned == true`.
pub fn parse_condition(input: &str) -> QueryResult<Condition> {
    let pair = QueryParser::parse(Rule::condition_only, input)
        .map_err(|e| syntax_error(input, e))?
        .next()
        .ok_or_else(|| QueryError::internal("empty parse tree"))?;

    let condition = significant(pair)
        .next()
        .ok_or_else(|| QueryError::internal("missing condition"))?;
    build_condition(condition)
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_and
            | Rule::kw_or
            | Rule::kw_not
            | Rule::kw_in
            | Rule::kw_is
            | Rule::kw_null
            | Rule::kw_between
            | Rule::kw_order
            | Rule::kw_limit
            | Rule::kw_offset
            | Rule::kw_with
            | Rule::kw_include
            | Rule::kw_deleted
            | Rule::kw_update
            | Rule::kw_on
            | Rule::kw_count
            | Rule::kw_return
            | Rule::kw_each
            | Rule::kw_as
            | Rule::EOI
    )
}

/// Children of `pair` without keyword tokens.
fn significant(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn first(pair: Pair<'_, Rule>) -> QueryResult<Pair<'_, Rule>> {
    let rule = pair.as_rule();
    significant(pair)
        .next()
        .ok_or_else(|| QueryError::internal(format!("empty {:?} node", rule)))
}

fn location(pair: &Pair<'_, Rule>) -> SourceLocation {
    let start = pair.as_span().start_pos();
    let (line, column) = start.line_col();
    SourceLocation {
        offset: start.pos(),
        line,
        column,
    }
}

fn build_transaction(pair: Pair<'_, Rule>) -> QueryResult<TransactionBlock> {
    let mut block = TransactionBlock::default();

    for item in pair.into_inner().filter(|p| p.as_rule() == Rule::tx_item) {
        let mut returns = false;
        let mut statement = None;
        for part in item.into_inner() {
            match part.as_rule() {
                Rule::kw_return => returns = true,
                Rule::transaction => return Err(QueryError::nested_transaction()),
                Rule::statement => statement = Some(build_statement(part)?),
                _ => {}
            }
        }
        let statement =
            statement.ok_or_else(|| QueryError::internal("transaction item without statement"))?;
        block.items.push(TransactionItem { statement, returns });
    }

    Ok(block)
}

fn build_statement(pair: Pair<'_, Rule>) -> QueryResult<Statement> {
    let mut kind = None;
    let mut source = None;
    let mut clauses = Clauses::default();
    let mut terminal = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::operation => kind = OperationKind::from_keyword(part.as_str()),
            Rule::identifier => source = Some(SmolStr::new(part.as_str())),
            Rule::assignment => {
                let mut inner = significant(part);
                let field = inner
                    .next()
                    .ok_or_else(|| QueryError::internal("assignment without field"))?;
                let value = inner
                    .next()
                    .ok_or_else(|| QueryError::internal("assignment without value"))?;
                clauses.assignments.push(Assignment {
                    field: field.as_str().into(),
                    value: build_operand(value)?,
                });
            }
            Rule::order_clause => clauses.order.extend(build_order(part)?),
            Rule::limit_clause => clauses.limit = Some(build_count(part)?),
            Rule::offset_clause => clauses.offset = Some(build_count(part)?),
            Rule::with_clause => clauses.with.extend(build_with(part)?),
            Rule::include_deleted => clauses.include_deleted = true,
            Rule::upsert_clause => {
                clauses
                    .upsert_keys
                    .extend(significant(part).map(|p| SmolStr::new(p.as_str())));
            }
            Rule::condition => clauses.add_condition(build_condition(part)?),
            Rule::batch => clauses.batch = Some(build_batch(part)?),
            Rule::terminal => terminal = Some(build_terminal(part)?),
            _ => {}
        }
    }

    Ok(Statement {
        kind: kind.ok_or_else(|| QueryError::internal("statement without operation"))?,
        source: source.ok_or_else(|| QueryError::internal("statement without binding"))?,
        clauses,
        terminal: terminal.ok_or_else(|| QueryError::internal("statement without terminal"))?,
    })
}

fn build_batch(pair: Pair<'_, Rule>) -> QueryResult<InsertBatch> {
    let mut inner = significant(pair);
    let collection = inner
        .next()
        .ok_or_else(|| QueryError::internal("batch without collection"))?;
    let alias = inner
        .next()
        .ok_or_else(|| QueryError::internal("batch without alias"))?;
    Ok(InsertBatch {
        collection: collection.as_str().into(),
        alias: alias.as_str().into(),
    })
}

fn build_order(pair: Pair<'_, Rule>) -> QueryResult<Vec<OrderSpec>> {
    significant(pair)
        .map(|spec| {
            let mut inner = spec.into_inner();
            let field = inner
                .next()
                .ok_or_else(|| QueryError::internal("order spec without field"))?;
            let direction = match inner.next().map(|d| d.as_str()) {
                Some("desc") => SortDirection::Desc,
                _ => SortDirection::Asc,
            };
            Ok(OrderSpec {
                field: field.as_str().into(),
                direction,
            })
        })
        .collect()
}

fn build_count(pair: Pair<'_, Rule>) -> QueryResult<u64> {
    let number = first(pair)?;
    number
        .as_str()
        .parse::<u64>()
        .ok()
        .filter(|n| *n <= MAX_ROW_COUNT)
        .ok_or_else(|| {
            QueryError::parse(
                format!("`{}` is not a valid row count", number.as_str()),
                location(&number),
                Some(format!("an integer between 0 and {}", MAX_ROW_COUNT)),
            )
        })
}

fn build_with(pair: Pair<'_, Rule>) -> QueryResult<Vec<EagerLoad>> {
    significant(pair).map(build_eager_load).collect()
}

fn build_eager_load(pair: Pair<'_, Rule>) -> QueryResult<EagerLoad> {
    let mut path: Vec<SmolStr> = Vec::new();
    let mut leaf = EagerLoad::default();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::relation_path => {
                path = part.into_inner().map(|p| SmolStr::new(p.as_str())).collect();
            }
            Rule::nested_clauses => {
                for clause in part.into_inner() {
                    match clause.as_rule() {
                        Rule::order_clause => leaf.order.extend(build_order(clause)?),
                        Rule::limit_clause => leaf.limit = Some(build_count(clause)?),
                        Rule::offset_clause => leaf.offset = Some(build_count(clause)?),
                        Rule::with_clause => leaf.children.extend(build_with(clause)?),
                        Rule::condition => leaf = leaf.filter(build_condition(clause)?),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    // Modifiers apply to the last segment of `a.b.c`.
    leaf.relation = path
        .pop()
        .ok_or_else(|| QueryError::internal("eager load without relation"))?;
    let mut load = leaf;
    while let Some(parent) = path.pop() {
        load = EagerLoad::new(parent).with(load);
    }
    Ok(load)
}

fn build_condition(pair: Pair<'_, Rule>) -> QueryResult<Condition> {
    match pair.as_rule() {
        Rule::condition => build_condition(first(pair)?),
        Rule::or_expr => {
            let mut items = significant(pair)
                .map(build_condition)
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(if items.len() == 1 {
                items.remove(0)
            } else {
                Condition::Or(items)
            })
        }
        Rule::and_expr => {
            let mut items = significant(pair)
                .map(build_condition)
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(if items.len() == 1 {
                items.remove(0)
            } else {
                Condition::And(items)
            })
        }
        Rule::not_expr => Ok(Condition::Not(Box::new(build_condition(first(pair)?)?))),
        Rule::group => Ok(Condition::Group(Box::new(build_condition(first(pair)?)?))),
        Rule::comparison => build_comparison(pair).map(Condition::Compare),
        other => Err(QueryError::internal(format!(
            "unexpected {:?} in condition",
            other
        ))),
    }
}

fn build_comparison(pair: Pair<'_, Rule>) -> QueryResult<Comparison> {
    let mut inner = significant(pair);
    let field = inner
        .next()
        .ok_or_else(|| QueryError::internal("comparison without field"))?;
    let op = inner
        .next()
        .ok_or_else(|| QueryError::internal("comparison without operator"))?;
    let field = SmolStr::new(field.as_str());

    let rule = op.as_rule();
    let parts: Vec<Pair<'_, Rule>> = significant(op).collect();
    let negated = parts.iter().any(|p| p.as_rule() == Rule::negated);
    let mut operands = parts
        .into_iter()
        .filter(|p| p.as_rule() == Rule::operand || p.as_rule() == Rule::comparator);

    let (operator, operand) = match rule {
        Rule::null_check => {
            let operator = if negated {
                Operator::IsNotNull
            } else {
                Operator::IsNull
            };
            (operator, None)
        }
        Rule::between_op => {
            let low = operands
                .next()
                .ok_or_else(|| QueryError::internal("between without lower bound"))?;
            let high = operands
                .next()
                .ok_or_else(|| QueryError::internal("between without upper bound"))?;
            let range = Operand::Range(
                Box::new(build_operand(low)?),
                Box::new(build_operand(high)?),
            );
            (Operator::Between, Some(range))
        }
        Rule::in_op => {
            let operand = operands
                .next()
                .ok_or_else(|| QueryError::internal("in without operand"))?;
            let operator = if negated { Operator::NotIn } else { Operator::In };
            (operator, Some(build_operand(operand)?))
        }
        _ => {
            let comparator = operands
                .next()
                .ok_or_else(|| QueryError::internal("missing comparator"))?;
            let operator = Operator::from_token(comparator.as_str()).ok_or_else(|| {
                QueryError::internal(format!("unknown comparator `{}`", comparator.as_str()))
            })?;
            let operand = operands
                .next()
                .ok_or_else(|| QueryError::internal("comparison without operand"))?;
            (operator, Some(build_operand(operand)?))
        }
    };

    Ok(Comparison {
        field,
        operator,
        operand,
    })
}

fn build_operand(pair: Pair<'_, Rule>) -> QueryResult<Operand> {
    let pair = if pair.as_rule() == Rule::operand {
        first(pair)?
    } else {
        pair
    };

    match pair.as_rule() {
        Rule::interpolation => {
            let inner = first(pair)?;
            Ok(Operand::Interpolation(match inner.as_rule() {
                Rule::param_path => Interpolation::Path(inner.as_str().into()),
                _ => Interpolation::Inline(build_literal(inner)?),
            }))
        }
        Rule::list => Ok(Operand::List(
            pair.into_inner()
                .map(build_operand)
                .collect::<QueryResult<Vec<_>>>()?,
        )),
        Rule::column_ref => Ok(Operand::Column(first(pair)?.as_str().into())),
        _ => build_literal(pair).map(Operand::Literal),
    }
}

fn build_literal(pair: Pair<'_, Rule>) -> QueryResult<Value> {
    match pair.as_rule() {
        Rule::null => Ok(Value::Null),
        Rule::boolean => Ok(Value::Bool(pair.as_str() == "true")),
        Rule::integer => pair.as_str().parse().map(Value::Int).map_err(|_| {
            QueryError::parse(
                format!("integer `{}` is out of range", pair.as_str()),
                location(&pair),
                None,
            )
        }),
        Rule::float => pair.as_str().parse().map(Value::Float).map_err(|_| {
            QueryError::parse(
                format!("invalid number `{}`", pair.as_str()),
                location(&pair),
                None,
            )
        }),
        Rule::string => {
            let text = pair
                .into_inner()
                .next()
                .map(|inner| unescape(inner.as_str()))
                .unwrap_or_default();
            Ok(Value::Text(text))
        }
        other => Err(QueryError::internal(format!(
            "unexpected {:?} as literal",
            other
        ))),
    }
}

fn build_terminal(pair: Pair<'_, Rule>) -> QueryResult<Terminal> {
    let kind = first(pair)?;
    match kind.as_rule() {
        Rule::many_terminal => Ok(Terminal::Many(build_projection(first(kind)?))),
        Rule::one_terminal => {
            let target = first(kind)?;
            Ok(match (target.as_rule(), target.as_str()) {
                (Rule::aggregate, "count") => Terminal::Count,
                (Rule::aggregate, _) => Terminal::Exists,
                _ => Terminal::One(build_projection(target)),
            })
        }
        Rule::count_terminal => Ok(Terminal::ExecuteCount),
        _ => Ok(Terminal::Execute),
    }
}

fn build_projection(pair: Pair<'_, Rule>) -> Projection {
    let fields: Vec<SmolStr> = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::identifier)
        .map(|p| SmolStr::new(p.as_str()))
        .collect();
    if fields.is_empty() {
        Projection::All
    } else {
        Projection::Fields(fields)
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn syntax_error(input: &str, err: pest::error::Error<Rule>) -> QueryError {
    let offset = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let (line, column) = match err.line_col {
        LineColLocation::Pos(lc) => lc,
        LineColLocation::Span(lc, _) => lc,
    };

    let expected = match &err.variant {
        ErrorVariant::ParsingError { positives, .. } => {
            let mut names: Vec<&str> = positives.iter().filter_map(|r| describe(*r)).collect();
            names.dedup();
            (!names.is_empty()).then(|| names.join(", "))
        }
        ErrorVariant::CustomError { message } => Some(message.clone()),
    };

    let found: String = input
        .get(offset..)
        .unwrap_or_default()
        .chars()
        .take_while(|c| !c.is_whitespace())
        .take(16)
        .collect();
    let mut message = if found.is_empty() {
        "unexpected end of input".to_string()
    } else {
        format!("unexpected `{}`", found)
    };
    if let Some(expected) = &expected {
        message.push_str(&format!(", expected {}", expected));
    }

    QueryError::parse(
        message,
        SourceLocation {
            offset,
            line,
            column,
        },
        expected,
    )
}

fn describe(rule: Rule) -> Option<&'static str> {
    let name = match rule {
        Rule::statement | Rule::operation => "an operation (`@query`, `@insert`, `@update`, `@delete`)",
        Rule::transaction => "`@transaction`",
        Rule::identifier | Rule::column_ref => "an identifier",
        Rule::assignment => "an assignment (`|< field: value`)",
        Rule::terminal
        | Rule::many_terminal
        | Rule::one_terminal
        | Rule::count_terminal
        | Rule::execute_terminal => "a terminal (`?->`, `??->`, `.`, `.->`)",
        Rule::condition | Rule::or_expr | Rule::and_expr | Rule::not_expr | Rule::comparison => {
            "a condition"
        }
        Rule::group => "`(`",
        Rule::comparator | Rule::null_check | Rule::in_op | Rule::between_op | Rule::binary_op => {
            "a comparison operator"
        }
        Rule::operand
        | Rule::interpolation
        | Rule::list
        | Rule::null
        | Rule::boolean
        | Rule::float
        | Rule::integer
        | Rule::string => "a value",
        Rule::projection | Rule::star => "a projection (`*` or field list)",
        Rule::aggregate => "`count` or `exists`",
        Rule::order_clause | Rule::kw_order => "`order`",
        Rule::limit_clause | Rule::kw_limit => "`limit`",
        Rule::offset_clause | Rule::kw_offset => "`offset`",
        Rule::with_clause | Rule::kw_with => "`with`",
        Rule::include_deleted | Rule::kw_include => "`include deleted`",
        Rule::kw_deleted => "`deleted`",
        Rule::upsert_clause | Rule::kw_update => "`update on`",
        Rule::kw_on => "`on`",
        Rule::eager_load | Rule::relation_path => "a relation name",
        Rule::direction => "`asc` or `desc`",
        Rule::kw_and => "`and`",
        Rule::kw_or => "`or`",
        Rule::kw_not | Rule::negated => "`not`",
        Rule::kw_in => "`in`",
        Rule::kw_is => "`is`",
        Rule::kw_null => "`null`",
        Rule::kw_count => "`count`",
        Rule::kw_return => "`return`",
        Rule::batch => "`* each {collection} as alias`",
        Rule::kw_each => "`each`",
        Rule::kw_as => "`as`",
        Rule::EOI => "end of input",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;

    fn statement(src: &str) -> Statement {
        parse_statement(src).unwrap()
    }

    #[test]
    fn test_parse_simple_query() {
        let stmt = statement(r#"@query(Users | email == {"a@b.com"} ?-> *)"#);
        assert_eq!(stmt.kind, OperationKind::Query);
        assert_eq!(stmt.source, "Users");
        assert_eq!(stmt.terminal, Terminal::One(Projection::All));
        assert_eq!(
            stmt.clauses.condition,
            Some(Condition::equals(
                "email",
                Operand::Interpolation(Interpolation::Inline(Value::from("a@b.com")))
            ))
        );
    }

    #[test]
    fn test_parse_modifiers() {
        let stmt = statement(
            "@query(Users | age >= 18 | order name desc, id | limit 10 | offset 20 ??-> id, name)",
        );
        let clauses = &stmt.clauses;
        assert_eq!(clauses.order.len(), 2);
        assert_eq!(clauses.order[0].direction, SortDirection::Desc);
        assert_eq!(clauses.order[1].direction, SortDirection::Asc);
        assert_eq!(clauses.limit, Some(10));
        assert_eq!(clauses.offset, Some(20));
        assert_eq!(
            stmt.terminal,
            Terminal::Many(Projection::Fields(vec!["id".into(), "name".into()]))
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let cond = parse_condition("a == 1 or b == 2 and c == 3").unwrap();
        match cond {
            Condition::Or(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0], Condition::Compare(_)));
                assert!(matches!(&items[1], Condition::And(inner) if inner.len() == 2));
            }
            other => panic!("Expected Or, got {other:?}"),
        }
    }

    #[test]
    fn test_groups_and_not() {
        let cond = parse_condition("not (a == 1 or b == 2) and c is not null").unwrap();
        match cond {
            Condition::And(items) => {
                assert!(matches!(&items[0], Condition::Not(inner) if matches!(**inner, Condition::Group(_))));
                assert!(matches!(
                    &items[1],
                    Condition::Compare(Comparison { operator: Operator::IsNotNull, operand: None, .. })
                ));
            }
            other => panic!("Expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_operators() {
        let cond = parse_condition(
            r#"status in ["a", "b"] and role not in {roles} and name like "A%" and age between 1 and 5 and note is null"#,
        )
        .unwrap();
        let Condition::And(items) = cond else {
            panic!("Expected And");
        };
        let operators: Vec<Operator> = items
            .iter()
            .map(|c| match c {
                Condition::Compare(cmp) => cmp.operator,
                other => panic!("Expected comparison, got {other:?}"),
            })
            .collect();
        assert_eq!(
            operators,
            vec![
                Operator::In,
                Operator::NotIn,
                Operator::Like,
                Operator::Between,
                Operator::IsNull
            ]
        );
    }

    #[test]
    fn test_keyword_prefixed_fields() {
        let cond = parse_condition("android == 1 and order_count > 2 and notes != \"\"").unwrap();
        let Condition::And(items) = cond else {
            panic!("Expected And");
        };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_column_reference() {
        let cond = parse_condition("updated_at > created_at").unwrap();
        assert_eq!(
            cond,
            Condition::compare("updated_at", Operator::Gt, Operand::Column("created_at".into()))
        );
    }

    #[test]
    fn test_literals() {
        let cond = parse_condition(r#"a == -3 and b == 2.5 and c == true and d == null and e == "x \"y\"""#)
            .unwrap();
        let Condition::And(items) = cond else {
            panic!("Expected And");
        };
        let values: Vec<Value> = items
            .into_iter()
            .map(|c| match c {
                Condition::Compare(Comparison {
                    operand: Some(Operand::Literal(v)),
                    ..
                }) => v,
                other => panic!("Expected literal, got {other:?}"),
            })
            .collect();
        assert_eq!(
            values,
            vec![
                Value::Int(-3),
                Value::Float(2.5),
                Value::Bool(true),
                Value::Null,
                Value::from("x \"y\""),
            ]
        );
    }

    #[test]
    fn test_multiple_condition_clauses_are_anded() {
        let stmt = statement("@query(Users | a == 1 | b == 2 ??-> *)");
        assert!(matches!(stmt.clauses.condition, Some(Condition::And(ref items)) if items.len() == 2));
    }

    #[test]
    fn test_parse_mutations() {
        let insert = statement("@insert(Users |< email: {email} |< name: \"Ada\" | update on email ?-> id)");
        assert_eq!(insert.kind, OperationKind::Insert);
        assert_eq!(insert.clauses.assignments.len(), 2);
        assert_eq!(insert.clauses.assignments[0].value, Operand::param("email"));
        assert_eq!(insert.clauses.upsert_keys, vec![SmolStr::new("email")]);

        let update = statement("@update(Users | id == {id} |< name: {name} .-> count)");
        assert_eq!(update.terminal, Terminal::ExecuteCount);

        let delete = statement("@delete(Posts | id == {7} .)");
        assert_eq!(delete.kind, OperationKind::Delete);
        assert_eq!(delete.terminal, Terminal::Execute);
    }

    #[test]
    fn test_parse_batch_insert() {
        let insert = statement(
            "@insert(Users * each {people} as person |< email: {person.email} |< name: \"x\" .-> count)",
        );
        assert_eq!(
            insert.clauses.batch,
            Some(InsertBatch {
                collection: "people".into(),
                alias: "person".into(),
            })
        );
        assert_eq!(insert.clauses.assignments[0].value, Operand::param("person.email"));
        assert_eq!(insert.terminal, Terminal::ExecuteCount);

        let err = parse_statement("@insert(Users * each people as p |< a: 1 .)").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
    }

    #[test]
    fn test_aggregate_terminals() {
        assert_eq!(statement("@query(Users ?-> count)").terminal, Terminal::Count);
        assert_eq!(statement("@query(Users | a == 1 ?-> exists)").terminal, Terminal::Exists);
        assert_eq!(
            statement("@query(Users ?-> counter)").terminal,
            Terminal::One(Projection::Fields(vec!["counter".into()]))
        );
    }

    #[test]
    fn test_parse_eager_loads() {
        let stmt = statement(
            "@query(Users | with posts(published == true | order created_at desc | limit 3 | with comments), profile, posts.tags ??-> *)",
        );
        let with = &stmt.clauses.with;
        assert_eq!(with.len(), 3);
        assert_eq!(with[0].relation, "posts");
        assert!(with[0].condition.is_some());
        assert_eq!(with[0].limit, Some(3));
        assert_eq!(with[0].children[0].relation, "comments");
        assert_eq!(with[1].relation, "profile");
        assert_eq!(with[2].relation, "posts");
        assert_eq!(with[2].children[0].relation, "tags");
    }

    #[test]
    fn test_dotted_path_modifiers_apply_to_leaf() {
        let stmt = statement("@query(Posts | with author.company(name != \"\") ??-> *)");
        let load = &stmt.clauses.with[0];
        assert!(load.condition.is_none());
        assert!(load.children[0].condition.is_some());
    }

    #[test]
    fn test_include_deleted() {
        let stmt = statement("@query(Posts | include deleted ??-> *)");
        assert!(stmt.clauses.include_deleted);
    }

    #[test]
    fn test_parse_transaction() {
        let program = parse_program(
            "@transaction { @insert(Users |< email: {a} .); return @query(Users ?-> count); @delete(Users .) }",
        )
        .unwrap();
        let Program::Transaction(block) = program else {
            panic!("Expected transaction");
        };
        assert_eq!(block.items.len(), 3);
        assert!(!block.items[0].returns);
        assert!(block.items[1].returns);
    }

    #[test]
    fn test_nested_transaction_rejected() {
        let err = parse_program("@transaction { @transaction { @query(Users ?-> count) } }").unwrap_err();
        assert_eq!(err.code, ErrorCode::NestedTransaction);
    }

    #[test]
    fn test_unknown_terminal() {
        let err = parse_statement("@query(Users | a == 1 !-> *)").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
        let location = err.context.location.unwrap();
        assert_eq!(location.line, 1);
        assert!(location.offset >= 21);
        assert!(err.context.expected.is_some());
    }

    #[test]
    fn test_unmatched_parenthesis() {
        let err = parse_statement("@query(Users | (a == 1 ??-> *)").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
    }

    #[test]
    fn test_parse_error_line_column() {
        let err = parse_statement("@query(Users\n  | a ==\n  ??-> *)").unwrap_err();
        let location = err.context.location.unwrap();
        assert_eq!(location.line, 3);
    }

    #[test]
    fn test_negative_limit_rejected() {
        let err = parse_statement("@query(Users | limit -1 ??-> *)").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
    }

    #[test]
    fn test_row_count_bounds() {
        let max = format!("@query(Users | limit {} ??-> *)", i64::MAX);
        assert_eq!(parse_statement(&max).unwrap().clauses.limit, Some(i64::MAX as u64));

        let err = parse_statement("@query(Users | with posts(limit 18446744073709551615 | offset 1) ??-> *)")
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);

        let err = parse_statement("@query(Users | offset 9223372036854775808 ??-> *)").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
    }
}
