//! Compile-time eager-load plans.

use std::sync::Arc;

use indexmap::IndexMap;
use quarry_schema::{Binding, Catalog, PRIMARY_KEY, RelationKind};
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::compiler::{ConditionCompiler, render_order};
use crate::dsl::{Condition, EagerLoad, parse_condition};
use crate::error::{QueryError, QueryResult};
use crate::sql::{SqlBuilder, SqlFragment};
use crate::value::Params;

/// `(schema, relation)` steps from the root of an eager-load tree.
type LoadPath = SmallVec<[(SmolStr, SmolStr); 4]>;

/// One relation to load, validated against the catalog, with its filter
/// and ordering already rendered against the target schema.
#[derive(Debug, Clone)]
pub struct RelationPlan {
    /// Relation name, also the key the results attach under.
    pub name: SmolStr,
    /// Relation kind.
    pub kind: RelationKind,
    /// Binding of the related schema.
    pub target: Arc<Binding>,
    /// Column of the parent rows holding the join key.
    pub parent_key: SmolStr,
    /// Column of the related rows matched against parent keys.
    pub child_key: SmolStr,
    /// Nested condition ANDed with the relation's default filter.
    pub filter: Option<SqlFragment>,
    /// Rendered `ORDER BY` list.
    pub order: Option<String>,
    /// Related rows per parent.
    pub limit: Option<u64>,
    /// Related rows skipped per parent.
    pub offset: Option<u64>,
    /// Skip the soft-delete guard on the target.
    pub include_deleted: bool,
    /// Nested loads, run on the related rows.
    pub children: Vec<RelationPlan>,
}

impl RelationPlan {
    /// Whether limit or offset apply per parent.
    pub fn is_windowed(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }
}

/// Resolves eager-load specs into [`RelationPlan`] trees.
pub struct RelationPlanner<'a> {
    catalog: &'a Catalog,
    params: &'a Params,
    include_deleted: bool,
}

impl<'a> RelationPlanner<'a> {
    /// Create a planner.
    pub fn new(catalog: &'a Catalog, params: &'a Params) -> Self {
        Self {
            catalog,
            params,
            include_deleted: false,
        }
    }

    /// Carry the statement's `include deleted` into every load.
    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    /// Plan `loads` on rows of `binding`.
    pub fn plan(&self, binding: &Binding, loads: &[EagerLoad]) -> QueryResult<Vec<RelationPlan>> {
        let mut path = LoadPath::new();
        self.plan_level(binding, loads, &mut path)
    }

    fn plan_level(
        &self,
        binding: &Binding,
        loads: &[EagerLoad],
        path: &mut LoadPath,
    ) -> QueryResult<Vec<RelationPlan>> {
        merge_loads(loads)?
            .iter()
            .map(|load| self.plan_one(binding, load, path))
            .collect()
    }

    fn plan_one(
        &self,
        binding: &Binding,
        load: &EagerLoad,
        path: &mut LoadPath,
    ) -> QueryResult<RelationPlan> {
        let schema = binding.schema();
        let relation = schema
            .relation(&load.relation)
            .ok_or_else(|| QueryError::unknown_relation(schema.name(), load.relation.as_str()))?;

        let step = (schema.name.name.clone(), relation.name.name.clone());
        if path.contains(&step) {
            let mut names: Vec<&str> = path.iter().map(|(_, r)| r.as_str()).collect();
            names.push(relation.name());
            return Err(QueryError::relation_cycle(names.join(".")));
        }

        let target = self
            .catalog
            .binding_for_schema(&relation.target)
            .ok_or_else(|| {
                QueryError::unbound_relation_target(relation.name(), relation.target.as_str())
            })?
            .clone();

        let (parent_key, child_key) = match relation.kind {
            RelationKind::BelongsTo => (relation.foreign_key.clone(), SmolStr::new(PRIMARY_KEY)),
            RelationKind::HasMany => (SmolStr::new(PRIMARY_KEY), relation.foreign_key.clone()),
        };

        let default_filter = relation
            .default_filter
            .as_deref()
            .map(parse_condition)
            .transpose()
            .map_err(|e| {
                e.with_context(format!("default filter of relation `{}`", relation.name()))
            })?;
        let condition = match (default_filter, load.condition.clone()) {
            (None, None) => None,
            (Some(c), None) | (None, Some(c)) => Some(c),
            (Some(default), Some(nested)) => Some(Condition::And(vec![default, nested])),
        };

        let conditions = ConditionCompiler::new(target.schema(), self.params);
        let filter = match &condition {
            Some(condition) => {
                let mut out = SqlBuilder::new();
                conditions.compile(condition, &mut out)?;
                Some(out.build())
            }
            None => None,
        };
        let order = if load.order.is_empty() {
            None
        } else {
            Some(render_order(&conditions, &load.order)?)
        };

        path.push(step);
        let children = self.plan_level(&target, &load.children, path);
        path.pop();

        Ok(RelationPlan {
            name: relation.name.name.clone(),
            kind: relation.kind,
            target,
            parent_key,
            child_key,
            filter,
            order,
            limit: load.limit,
            offset: load.offset,
            include_deleted: self.include_deleted,
            children: children?,
        })
    }
}

/// Merge loads of the same relation. Modifiers may be given once; two
/// differing sets are a conflict.
fn merge_loads(loads: &[EagerLoad]) -> QueryResult<Vec<EagerLoad>> {
    let mut merged: IndexMap<SmolStr, EagerLoad> = IndexMap::new();

    for load in loads {
        let Some(existing) = merged.get_mut(&load.relation) else {
            merged.insert(load.relation.clone(), load.clone());
            continue;
        };

        if load.has_modifiers() {
            if existing.has_modifiers() && !same_modifiers(existing, load) {
                return Err(QueryError::conflicting_eager_load(load.relation.as_str()));
            }
            existing.condition = load.condition.clone();
            existing.order = load.order.clone();
            existing.limit = load.limit;
            existing.offset = load.offset;
        }
        existing.children.extend(load.children.iter().cloned());
    }

    Ok(merged.into_values().collect())
}

fn same_modifiers(a: &EagerLoad, b: &EagerLoad) -> bool {
    a.condition == b.condition && a.order == b.order && a.limit == b.limit && a.offset == b.offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse_statement;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;
    use quarry_schema::{BindingOptions, SchemaRegistry};

    fn catalog() -> Catalog {
        let mut registry = SchemaRegistry::new();
        registry
            .load(
                r#"
                @schema User {
                    id: int,
                    name: string,
                    active: bool,
                    manager_id: int?,
                    manager: User via manager_id,
                    posts: [Post] via author_id,
                    live_posts: [Post] via author_id where "published == true",
                    tags: [Tag] via owner_id
                }
                @schema Post {
                    id: int,
                    title: string,
                    published: bool,
                    author_id: int,
                    deleted_at: datetime?,
                    author: User via author_id,
                    comments: [Comment] via post_id
                }
                @schema Comment { id: int, body: string, post_id: int }
                @schema Tag { id: int, owner_id: int }
                "#,
            )
            .unwrap();
        let mut catalog = Catalog::new(registry);
        catalog.bind("Users", "User", "users", BindingOptions::new()).unwrap();
        catalog
            .bind("Posts", "Post", "posts", BindingOptions::new().soft_delete("deleted_at"))
            .unwrap();
        catalog.bind("Comments", "Comment", "comments", BindingOptions::new()).unwrap();
        catalog
    }

    fn plan(src: &str) -> QueryResult<Vec<RelationPlan>> {
        let catalog = catalog();
        let statement = parse_statement(src)?;
        let binding = catalog.binding(&statement.source).unwrap().clone();
        RelationPlanner::new(&catalog, &Params::new())
            .include_deleted(statement.clauses.include_deleted)
            .plan(&binding, &statement.clauses.with)
    }

    #[test]
    fn test_plan_keys() {
        let plans = plan("@query(Posts | with author, comments ??-> *)").unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].kind, RelationKind::BelongsTo);
        assert_eq!(plans[0].parent_key, "author_id");
        assert_eq!(plans[0].child_key, "id");
        assert_eq!(plans[0].target.table(), "users");
        assert_eq!(plans[1].kind, RelationKind::HasMany);
        assert_eq!(plans[1].parent_key, "id");
        assert_eq!(plans[1].child_key, "post_id");
    }

    #[test]
    fn test_nested_modifiers_render_against_target() {
        let plans = plan(
            "@query(Users | with posts(published == true | order title desc | limit 2 | with comments) ??-> *)",
        )
        .unwrap();
        let posts = &plans[0];
        let filter = posts.filter.as_ref().unwrap();
        assert_eq!(filter.sql, "published = ?");
        assert_eq!(posts.order.as_deref(), Some("title DESC"));
        assert_eq!(posts.limit, Some(2));
        assert!(posts.is_windowed());
        assert_eq!(posts.children[0].name, "comments");
    }

    #[test]
    fn test_default_filter_is_anded() {
        let plans = plan("@query(Users | with live_posts(title like \"A%\") ??-> *)").unwrap();
        let filter = plans[0].filter.as_ref().unwrap();
        assert_eq!(filter.sql, "published = ? AND title LIKE ?");
        assert_eq!(filter.params.len(), 2);
    }

    #[test]
    fn test_duplicate_loads_merge() {
        let plans = plan("@query(Posts | with comments, author, comments ??-> *)").unwrap();
        assert_eq!(plans.len(), 2);

        let plans = plan("@query(Users | with posts(published == true), posts.comments ??-> *)").unwrap();
        assert_eq!(plans.len(), 1);
        assert!(plans[0].filter.is_some());
        assert_eq!(plans[0].children.len(), 1);
    }

    #[test]
    fn test_conflicting_loads() {
        let err = plan("@query(Users | with posts(published == true), posts(published == false) ??-> *)")
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConflictingEagerLoad);
    }

    #[test]
    fn test_relation_errors() {
        assert_eq!(
            plan("@query(Users | with friends ??-> *)").unwrap_err().code,
            ErrorCode::UnknownRelation
        );
        assert_eq!(
            plan("@query(Users | with posts(rating > 3) ??-> *)").unwrap_err().code,
            ErrorCode::UnknownField
        );
        assert_eq!(
            plan("@query(Users | with tags ??-> *)").unwrap_err().code,
            ErrorCode::UnboundRelationTarget
        );
    }

    #[test]
    fn test_cycles_are_rejected() {
        let err = plan("@query(Users | with manager.manager ??-> *)").unwrap_err();
        assert_eq!(err.code, ErrorCode::RelationCycle);
        assert!(err.message.contains("manager.manager"));

        // Revisiting a schema through different relations is fine.
        assert!(plan("@query(Users | with posts.author ??-> *)").is_ok());
    }

    #[test]
    fn test_include_deleted_propagates() {
        let plans = plan("@query(Users | include deleted | with posts.comments ??-> *)").unwrap();
        assert!(plans[0].include_deleted);
        assert!(plans[0].children[0].include_deleted);
    }
}
