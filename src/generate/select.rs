//! SELECT synthesis for oracle base queries.

use crate::ast::{
    ColumnRef, Expr, ExprKind, ForClause, FromItem, Join, JoinKind, PlannerHint, Select, SelectItem,
    TableRef,
};
use crate::context::Context;
use crate::error::GenError;
use crate::generate::expr::ExprGenerator;
use crate::policy::Policy;
use crate::schema::Table;

/// Build a random SELECT over `tables` without WHERE, GROUP BY or HAVING.
///
/// The tables are split into a FROM list and a suffix of joins. Each ON
/// predicate only sees the tables to its left and the joined table. The
/// fetch list draws column references from the generator's pool. Nothing is
/// executed here.
pub fn synthesize_select(
    ctx: &mut Context,
    policy: &Policy,
    tables: &[&Table],
    generator: &ExprGenerator,
) -> Result<Select, GenError> {
    if tables.is_empty() {
        return Err(GenError::schema_empty("tables for a SELECT"));
    }

    let from_count = if tables.len() > 1 && ctx.gen_bool_with_prob(policy.join_probability) {
        ctx.gen_range_inclusive(1, tables.len() - 1)
    } else {
        tables.len()
    };

    let from = tables[..from_count]
        .iter()
        .map(|t| FromItem::Table(TableRef::new(&t.name)))
        .collect();

    let mut joins = Vec::with_capacity(tables.len() - from_count);
    for idx in from_count..tables.len() {
        joins.push(generate_join(ctx, policy, &tables[..=idx])?);
    }

    let fetch = generate_fetch_list(ctx, policy, generator.pool())?;
    let mut select = Select::new(fetch, from);
    select.joins = joins;
    select.hint = generate_hint(ctx, policy, tables);
    select.distinct = ctx.gen_bool_with_prob(policy.distinct_probability);
    if ctx.gen_bool_with_prob(policy.for_clause_probability) {
        select.for_clause = Some(if ctx.gen_bool() {
            ForClause::Update
        } else {
            ForClause::Share
        });
    }

    Ok(select)
}

/// Join the last table of `visible` onto the ones before it.
fn generate_join(
    ctx: &mut Context,
    policy: &Policy,
    visible: &[&Table],
) -> Result<Join, GenError> {
    let Some(joined) = visible.last() else {
        return Err(GenError::invariant("join", "no table to join"));
    };
    let kinds = [JoinKind::Inner, JoinKind::Left, JoinKind::Cross];
    let kind = *ctx.choose(&kinds).unwrap_or(&JoinKind::Inner);

    let on = match kind {
        JoinKind::Inner | JoinKind::Left => {
            let scoped = ExprGenerator::for_tables(policy, visible);
            let predicate = scoped
                .generate_predicate(ctx, policy.max_expr_depth)
                .map_err(|e| e.with_context(format!("ON predicate for {}", joined.name)))?;
            Some(predicate)
        }
        JoinKind::Cross => None,
    };

    Ok(Join {
        kind,
        table: TableRef::new(&joined.name),
        on,
    })
}

fn generate_fetch_list(
    ctx: &mut Context,
    policy: &Policy,
    pool: &[ColumnRef],
) -> Result<Vec<SelectItem>, GenError> {
    if pool.is_empty() {
        return Err(GenError::invariant("fetch list", "empty column pool"));
    }
    let count = ctx.gen_range_inclusive(1, policy.max_fetch_columns.max(1));
    let fetch = (0..count)
        .map(|_| {
            let idx = ctx.gen_range(pool.len());
            ctx.record(ExprKind::Column);
            SelectItem::new(Expr::column(pool[idx].clone()))
        })
        .collect();
    Ok(fetch)
}

/// Index-merge hint naming one indexed table and a subset of its indexes.
fn generate_hint(ctx: &mut Context, policy: &Policy, tables: &[&Table]) -> Option<PlannerHint> {
    if !ctx.gen_bool_with_prob(policy.hint_probability) {
        return None;
    }
    let indexed: Vec<&Table> = tables.iter().copied().filter(|t| t.has_indexes()).collect();
    let table = *ctx.choose(&indexed)?;
    let indexes = ctx
        .non_empty_subset(table.indexes())
        .into_iter()
        .map(|i| i.name.clone())
        .collect();
    Some(PlannerHint::IndexMerge {
        table: table.name.clone(),
        indexes,
    })
}
