//! Schema and data statements issued by the action scheduler.
//!
//! Object names follow `t{n}`, `c{n}`, `i{n}` and `v{n}`, always picking the
//! smallest index not taken yet.

use std::collections::HashSet;

use crate::ast::{
    AlterTableStmt, ColumnDefStmt, ColumnRef, CreateIndexStmt, CreateTableStmt, CreateViewStmt,
    DeleteStmt, DropTableStmt, Expr, FromItem, InsertStmt, Select, SelectItem, TableRef,
};
use crate::context::Context;
use crate::error::GenError;
use crate::generate::expr::ExprGenerator;
use crate::generate::literal::generate_literal;
use crate::policy::Policy;
use crate::schema::{CompositeType, Schema, Table};

/// Smallest `{prefix}{n}` not in `taken`.
pub fn fresh_name(prefix: &str, taken: &HashSet<&str>) -> String {
    (0..)
        .map(|n| format!("{prefix}{n}"))
        .find(|name| !taken.contains(name.as_str()))
        .unwrap_or_else(|| prefix.to_string())
}

fn column_def(ctx: &mut Context, policy: &Policy, name: String) -> ColumnDefStmt {
    ColumnDefStmt {
        name,
        ty: CompositeType::random(ctx),
        not_null: ctx.gen_bool_with_prob(policy.not_null_probability),
    }
}

/// `CREATE TABLE` with 1..=max_columns random columns.
pub fn generate_create_table(ctx: &mut Context, policy: &Policy, schema: &Schema) -> CreateTableStmt {
    let name = fresh_name("t", &schema.object_names());
    let count = ctx.gen_range_inclusive(1, policy.max_columns.max(1));
    let columns = (0..count)
        .map(|i| column_def(ctx, policy, format!("c{i}")))
        .collect();
    CreateTableStmt { name, columns }
}

/// `INSERT` of 1..=max_insert_rows rows into a non-empty subset of columns.
pub fn generate_insert(ctx: &mut Context, policy: &Policy, table: &Table) -> InsertStmt {
    let columns = ctx.non_empty_subset(table.columns());
    let row_count = ctx.gen_range_inclusive(1, policy.max_insert_rows.max(1));
    let rows = (0..row_count)
        .map(|_| {
            columns
                .iter()
                .map(|c| generate_literal(ctx, c.ty, &policy.literal_config))
                .collect::<Vec<_>>()
        })
        .collect();
    InsertStmt {
        table: table.name.clone(),
        columns: columns.iter().map(|c| c.name.clone()).collect(),
        rows,
    }
}

/// `CREATE [UNIQUE] INDEX` over a non-empty subset of the table's columns.
pub fn generate_create_index(
    ctx: &mut Context,
    policy: &Policy,
    schema: &Schema,
    table: &Table,
) -> CreateIndexStmt {
    let mut columns: Vec<String> = ctx
        .non_empty_subset(table.columns())
        .into_iter()
        .map(|c| c.name.clone())
        .collect();
    ctx.shuffle(&mut columns);
    CreateIndexStmt {
        name: fresh_name("i", &schema.object_names()),
        table: table.name.clone(),
        columns,
        unique: ctx.gen_bool_with_prob(policy.unique_index_probability),
    }
}

/// `ALTER TABLE ... ADD COLUMN` with a fresh column name.
pub fn generate_alter_table(ctx: &mut Context, policy: &Policy, table: &Table) -> AlterTableStmt {
    let taken: HashSet<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
    let mut column = column_def(ctx, policy, fresh_name("c", &taken));
    // SQLite rejects adding a NOT NULL column without a default.
    column.not_null = false;
    AlterTableStmt {
        table: table.name.clone(),
        column,
    }
}

/// `CREATE VIEW vN AS SELECT cols FROM t WHERE p` over a single table.
pub fn generate_create_view(
    ctx: &mut Context,
    policy: &Policy,
    schema: &Schema,
    table: &Table,
) -> Result<CreateViewStmt, GenError> {
    let generator = ExprGenerator::for_tables(policy, &[table]);
    let fetch = ctx
        .non_empty_subset(table.columns())
        .into_iter()
        .map(|c| SelectItem::aliased(Expr::column(ColumnRef::from(c)), &c.name))
        .collect();
    let mut select = Select::new(fetch, vec![FromItem::Table(TableRef::new(&table.name))]);
    select.where_clause = Some(
        generator
            .generate_predicate(ctx, policy.max_expr_depth)
            .map_err(|e| e.with_context(format!("view over {}", table.name)))?,
    );
    Ok(CreateViewStmt {
        name: fresh_name("v", &schema.object_names()),
        select: Box::new(select),
    })
}

/// `DELETE FROM t [WHERE p]`.
pub fn generate_delete(
    ctx: &mut Context,
    policy: &Policy,
    table: &Table,
) -> Result<DeleteStmt, GenError> {
    let where_clause = if ctx.gen_bool_with_prob(policy.delete_where_probability) {
        let generator = ExprGenerator::for_tables(policy, &[table]);
        Some(generator.generate_predicate(ctx, policy.max_expr_depth)?)
    } else {
        None
    };
    Ok(DeleteStmt {
        table: table.name.clone(),
        where_clause,
    })
}

/// `DROP TABLE` or `DROP VIEW` of a random schema object.
pub fn generate_drop_table(ctx: &mut Context, schema: &Schema) -> Result<DropTableStmt, GenError> {
    let table = ctx
        .choose(schema.tables())
        .ok_or_else(|| GenError::schema_empty("a table to drop"))?;
    Ok(DropTableStmt {
        name: table.name.clone(),
        is_view: table.is_view,
    })
}
