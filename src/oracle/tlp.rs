//! Ternary logic partitioning.
//!
//! For any predicate `P`, every row satisfies exactly one of `P`, `NOT P` and
//! `P IS NULL`. Running a query three times, once per partition, and taking
//! the multiset union must give back the unpartitioned result.

use itertools::Itertools;

use super::{pick_tables, Derivation, Law, Oracle};
use crate::ast::{Expr, GroupBy, TriState};
use crate::context::Context;
use crate::error::GenError;
use crate::generate::{synthesize_select, ExprGenerator};
use crate::policy::Policy;
use crate::schema::Schema;

/// The three partition predicates of `predicate`.
fn partitions(predicate: &Expr) -> Result<Vec<Expr>, GenError> {
    TriState::ALL
        .iter()
        .map(|truth| predicate.partition(*truth))
        .collect()
}

/// TLP over the WHERE clause.
#[derive(Debug, Clone)]
pub struct TlpWhere {
    policy: Policy,
}

impl TlpWhere {
    pub fn new(policy: &Policy) -> Self {
        Self {
            policy: policy.clone(),
        }
    }
}

impl Oracle for TlpWhere {
    fn name(&self) -> &'static str {
        "tlp-where"
    }

    fn derive(&self, ctx: &mut Context, schema: &Schema) -> Result<Derivation, GenError> {
        let tables = pick_tables(ctx, schema, &self.policy)?;
        let generator = ExprGenerator::for_tables(&self.policy, &tables);
        let base = synthesize_select(ctx, &self.policy, &tables, &generator)?;
        let predicate = generator.generate_predicate(ctx, self.policy.max_expr_depth)?;

        let variants = partitions(&predicate)?
            .into_iter()
            .map(|p| base.with_where(Some(p)))
            .collect();
        Ok(Derivation {
            law: Law::PartitionUnion {
                distinct: base.distinct,
            },
            base,
            variants,
        })
    }
}

/// TLP over the HAVING clause of a query grouped by its fetch columns.
///
/// Every group lands in exactly one partition, so the same law applies to
/// grouped rows. Bare columns in the HAVING predicate are limited to the
/// grouping columns; aggregates may reference any column in scope.
#[derive(Debug, Clone)]
pub struct TlpHaving {
    policy: Policy,
}

impl TlpHaving {
    pub fn new(policy: &Policy) -> Self {
        Self {
            policy: policy.clone(),
        }
    }
}

impl Oracle for TlpHaving {
    fn name(&self) -> &'static str {
        "tlp-having"
    }

    fn derive(&self, ctx: &mut Context, schema: &Schema) -> Result<Derivation, GenError> {
        let tables = pick_tables(ctx, schema, &self.policy)?;
        let generator = ExprGenerator::for_tables(&self.policy, &tables);
        let mut base = synthesize_select(ctx, &self.policy, &tables, &generator)?;

        let grouped: Vec<Expr> = base.fetch.iter().map(|item| item.expr.clone()).collect();
        let grouped_columns = grouped
            .iter()
            .filter_map(|expr| match expr {
                Expr::Column(column) => Some(column.clone()),
                _ => None,
            })
            .unique()
            .collect();
        base.group_by = Some(GroupBy {
            exprs: grouped,
            having: None,
        });

        let having = ExprGenerator::new(&self.policy, grouped_columns)
            .with_aggregates(generator.pool().to_vec());
        let predicate = having.generate_predicate(ctx, self.policy.max_expr_depth)?;

        let variants = partitions(&predicate)?
            .into_iter()
            .map(|p| base.with_having(Some(p)))
            .collect();
        Ok(Derivation {
            law: Law::PartitionUnion {
                distinct: base.distinct,
            },
            base,
            variants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, SqliteBackend};
    use crate::oracle::{OracleEngine, Verdict};
    use crate::schema::{build_schema, CompositeType, Column, SchemaBuilder, Table};

    fn schema() -> Schema {
        SchemaBuilder::new()
            .table(Table::new(
                "t0",
                vec![
                    Column::new("c0", CompositeType::int(4)),
                    Column::new("c1", CompositeType::string()),
                ],
            ))
            .table(Table::new("t1", vec![Column::new("c0", CompositeType::float(8))]))
            .build()
    }

    #[test]
    fn test_where_variants_partition_predicate() {
        let mut ctx = Context::new_with_seed(7);
        let oracle = TlpWhere::new(&Policy::default());
        for _ in 0..30 {
            let derivation = oracle.derive(&mut ctx, &schema()).unwrap();
            assert!(derivation.base.where_clause.is_none());
            assert_eq!(derivation.variants.len(), 3);

            let predicates: Vec<String> = derivation
                .variants
                .iter()
                .map(|v| v.where_clause.as_ref().unwrap().to_string())
                .collect();
            assert_eq!(predicates[1], format!("(NOT {})", predicates[0]));
            assert_eq!(predicates[2], format!("({} IS NULL)", predicates[0]));

            // Variants only differ from the base in their WHERE clause.
            for variant in &derivation.variants {
                assert_eq!(&variant.with_where(None), &derivation.base);
            }
        }
    }

    #[test]
    fn test_having_groups_by_fetch_columns() {
        let mut ctx = Context::new_with_seed(8);
        let oracle = TlpHaving::new(&Policy::default());
        for _ in 0..30 {
            let derivation = oracle.derive(&mut ctx, &schema()).unwrap();
            let group_by = derivation.base.group_by.as_ref().unwrap();
            assert!(group_by.having.is_none());
            assert_eq!(group_by.exprs.len(), derivation.base.fetch.len());
            for variant in &derivation.variants {
                assert!(variant.group_by.as_ref().unwrap().having.is_some());
                assert!(variant.where_clause.is_none());
            }
        }
    }

    #[test]
    fn test_tlp_holds_on_sqlite() {
        let mut db = SqliteBackend::new().unwrap();
        for sql in [
            "CREATE TABLE t0 (c0 INT, c1 VARCHAR)",
            "CREATE TABLE t1 (c0 DOUBLE)",
            "INSERT INTO t0 (c0, c1) VALUES (1, 'a'), (NULL, 'b'), (2, NULL), (2, 'a')",
            "INSERT INTO t1 (c0) VALUES (0.5), (NULL), (-3.0)",
        ] {
            db.execute(sql).unwrap();
        }
        let schema = build_schema(&db.introspect().unwrap()).unwrap();

        let mut ctx = Context::new_with_seed(9);
        let mut engine = OracleEngine::new();
        let policy = Policy::default();
        let oracles: [Box<dyn Oracle>; 2] =
            [Box::new(TlpWhere::new(&policy)), Box::new(TlpHaving::new(&policy))];
        for oracle in &oracles {
            for _ in 0..40 {
                let verdict = engine
                    .check(oracle.as_ref(), &mut ctx, &schema, &mut db)
                    .unwrap();
                assert!(!verdict.is_bug(), "{verdict:?}");
            }
        }
        assert_eq!(engine.stats()["tlp-where"].checks, 40);
        assert_eq!(engine.stats()["tlp-having"].checks, 40);
    }
}
