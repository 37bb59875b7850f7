//! Batched relation loading.
//!
//! Each relation costs exactly one statement per nesting level, whatever the
//! number of parent rows: keys are collected from every parent, fetched with
//! one `IN (...)`, and the related rows are grouped back onto their parents.

use std::collections::HashMap;

use indexmap::IndexMap;
use quarry_schema::RelationKind;
use tracing::debug;

use super::plan::RelationPlan;
use crate::error::QueryResult;
use crate::mapping::map_rows;
use crate::sql::{MAX_ROW_COUNT, SqlBuilder, SqlFragment, quote_identifier};
use crate::traits::{BoxFuture, Executor};
use crate::value::{Record, Value, ValueKey};

/// Column holding the per-parent row number of windowed loads.
pub const ROW_NUMBER_COLUMN: &str = "__rn";

/// Loads planned relations onto parent records.
pub struct RelationLoader<'e, E: Executor + ?Sized> {
    executor: &'e E,
}

impl<'e, E: Executor + ?Sized> RelationLoader<'e, E> {
    /// Create a loader running statements on `executor`.
    pub fn new(executor: &'e E) -> Self {
        Self { executor }
    }

    /// Load every plan onto `parents`, recursing into nested plans.
    pub fn load<'a>(
        &'a self,
        plans: &'a [RelationPlan],
        parents: &'a mut [Record],
    ) -> BoxFuture<'a, QueryResult<()>> {
        Box::pin(async move {
            for plan in plans {
                self.load_one(plan, parents).await?;
            }
            Ok(())
        })
    }

    async fn load_one(&self, plan: &RelationPlan, parents: &mut [Record]) -> QueryResult<()> {
        let keys = collect_keys(parents, &plan.parent_key);
        if keys.is_empty() {
            debug!(relation = %plan.name, "No keys, skipping relation load");
            attach(plan, parents, &HashMap::new());
            return Ok(());
        }

        let query = build_query(plan, keys.into_values().collect());
        debug!(relation = %plan.name, sql = %query.sql, keys = query.params.len(), "Loading relation");

        let rows = self
            .executor
            .fetch(&query.sql, query.params)
            .await
            .map_err(|e| {
                e.with_binding(plan.target.name())
                    .with_context(format!("load relation `{}`", plan.name))
            })?;

        let mut children = map_rows(plan.target.schema(), &rows)?;
        if plan.is_windowed() {
            for child in &mut children {
                child.remove(ROW_NUMBER_COLUMN);
            }
        }
        if !plan.children.is_empty() {
            self.load(&plan.children, &mut children).await?;
        }

        let mut groups: HashMap<ValueKey, Vec<Record>> = HashMap::new();
        for child in children {
            if let Some(key) = child.get(&plan.child_key).and_then(Value::key) {
                groups.entry(key).or_default().push(child);
            }
        }
        attach(plan, parents, &groups);
        Ok(())
    }
}

/// Distinct non-null keys in first-seen order.
fn collect_keys(parents: &[Record], column: &str) -> IndexMap<ValueKey, Value> {
    let mut keys = IndexMap::new();
    for parent in parents {
        if let Some(value) = parent.get(column) {
            if let Some(key) = value.key() {
                keys.entry(key).or_insert_with(|| value.resolved().clone());
            }
        }
    }
    keys
}

fn attach(plan: &RelationPlan, parents: &mut [Record], groups: &HashMap<ValueKey, Vec<Record>>) {
    for parent in parents.iter_mut() {
        let related = parent
            .get(&plan.parent_key)
            .and_then(Value::key)
            .and_then(|key| groups.get(&key));
        let value = match plan.kind {
            RelationKind::HasMany => Value::List(
                related
                    .map(|rows| rows.iter().cloned().map(Value::Record).collect())
                    .unwrap_or_default(),
            ),
            RelationKind::BelongsTo => related
                .and_then(|rows| rows.first())
                .cloned()
                .map(Value::Record)
                .unwrap_or(Value::Null),
        };
        parent.insert(plan.name.clone(), value);
    }
}

/// Build the single statement loading `plan` for `keys`.
pub fn build_query(plan: &RelationPlan, keys: Vec<Value>) -> SqlFragment {
    let table = quote_identifier(plan.target.table());
    let child_key = quote_identifier(&plan.child_key);

    let mut filter = SqlBuilder::new();
    filter.push(format!("{} IN (", child_key)).push_params(keys).push(")");
    if let Some(column) = plan.target.soft_delete_column().filter(|_| !plan.include_deleted) {
        filter.push(" AND ").push_identifier(column).push(" IS NULL");
    }
    if let Some(extra) = &plan.filter {
        filter.push(" AND (").push_fragment(extra).push(")");
    }
    let filter = filter.build();

    let mut sql = SqlBuilder::new();
    if plan.is_windowed() {
        let over = match &plan.order {
            Some(order) => format!("PARTITION BY {} ORDER BY {}", child_key, order),
            None => format!("PARTITION BY {}", child_key),
        };
        sql.push(format!(
            "SELECT * FROM (SELECT *, ROW_NUMBER() OVER ({}) AS {} FROM {} WHERE ",
            over, ROW_NUMBER_COLUMN, table
        ))
        .push_fragment(&filter)
        .push(") WHERE ");

        let offset = plan.offset.unwrap_or(0).min(MAX_ROW_COUNT);
        sql.push(format!("{} > {}", ROW_NUMBER_COLUMN, offset));
        if let Some(limit) = plan.limit {
            let last = offset.saturating_add(limit).min(MAX_ROW_COUNT);
            sql.push(format!(" AND {} <= {}", ROW_NUMBER_COLUMN, last));
        }
        sql.push(format!(" ORDER BY {}", ROW_NUMBER_COLUMN));
    } else {
        sql.push(format!("SELECT * FROM {} WHERE ", table))
            .push_fragment(&filter);
        if let Some(order) = &plan.order {
            sql.push(" ORDER BY ").push(order);
        }
    }
    sql.build()
}
