//! Typed expression generation.
//!
//! Every request names a [`Target`] class. Depth 0 yields a leaf: a column
//! reference from the pool or a literal. Deeper requests pick an operator
//! category by policy weight among the categories able to produce the target
//! and generate operands with one less level of depth.

use strum::IntoEnumIterator;

use crate::ast::{BinOp, ColumnRef, Expr, ExprType, Function, PostfixOp, UnaryOp};
use crate::context::Context;
use crate::error::GenError;
use crate::generate::literal::generate_literal;
use crate::policy::{OpCategory, Policy};
use crate::schema::{CompositeType, DataKind, Table};

/// Class of values an expression request must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::Display)]
pub enum Target {
    Any,
    Boolean,
    Numeric,
    String,
}

impl Target {
    /// Whether a value of this type satisfies the target. NULL fits every target.
    pub fn accepts(&self, ty: ExprType) -> bool {
        if ty.is_null() {
            return true;
        }
        match self {
            Target::Any => true,
            Target::Boolean => ty.kind() == DataKind::Boolean,
            Target::Numeric => ty.ty.is_numeric(),
            Target::String => ty.kind() == DataKind::String,
        }
    }

    /// Narrowest target a value of this type belongs to.
    pub fn of(ty: ExprType) -> Target {
        match ty.kind() {
            DataKind::Null => Target::Any,
            DataKind::Boolean => Target::Boolean,
            DataKind::String => Target::String,
            _ => Target::Numeric,
        }
    }

    /// Operator categories that can produce a value of this target.
    pub fn categories(&self) -> Vec<OpCategory> {
        match self {
            Target::Boolean => vec![
                OpCategory::Comparison,
                OpCategory::Logical,
                OpCategory::Not,
                OpCategory::Postfix,
                OpCategory::Between,
                OpCategory::InList,
                OpCategory::Like,
            ],
            Target::Numeric => vec![
                OpCategory::Arithmetic,
                OpCategory::Negate,
                OpCategory::NumericFunction,
                OpCategory::Aggregate,
            ],
            Target::String => vec![OpCategory::Concat, OpCategory::StringFunction],
            Target::Any => OpCategory::iter().collect(),
        }
    }

    fn literal_type(&self, ctx: &mut Context) -> CompositeType {
        match self {
            Target::Any => CompositeType::random(ctx),
            Target::Boolean => CompositeType::boolean(),
            Target::String => CompositeType::string(),
            Target::Numeric => match ctx.gen_range(3) {
                0 => {
                    let size = CompositeType::INT_SIZES[ctx.gen_range(CompositeType::INT_SIZES.len())];
                    CompositeType::int(size)
                }
                1 => {
                    let size =
                        CompositeType::FLOAT_SIZES[ctx.gen_range(CompositeType::FLOAT_SIZES.len())];
                    CompositeType::float(size)
                }
                _ => CompositeType::timestamp(),
            },
        }
    }
}

/// Generates typed expressions over a fixed column pool.
///
/// With an aggregate pool, numeric requests may also produce aggregate
/// calls whose arguments range over that pool. Aggregate arguments are
/// generated without an aggregate pool, so aggregates never nest.
#[derive(Debug, Clone)]
pub struct ExprGenerator<'a> {
    policy: &'a Policy,
    pool: Vec<ColumnRef>,
    aggregate_pool: Option<Vec<ColumnRef>>,
}

impl<'a> ExprGenerator<'a> {
    pub fn new(policy: &'a Policy, pool: Vec<ColumnRef>) -> Self {
        Self {
            policy,
            pool,
            aggregate_pool: None,
        }
    }

    /// Generator whose pool holds every column of the given tables.
    pub fn for_tables(policy: &'a Policy, tables: &[&Table]) -> Self {
        let pool = tables
            .iter()
            .flat_map(|t| t.columns().iter().map(ColumnRef::from))
            .collect();
        Self::new(policy, pool)
    }

    pub fn with_aggregates(mut self, pool: Vec<ColumnRef>) -> Self {
        self.aggregate_pool = Some(pool);
        self
    }

    pub fn policy(&self) -> &'a Policy {
        self.policy
    }

    pub fn pool(&self) -> &[ColumnRef] {
        &self.pool
    }

    /// Generate an expression of any type.
    pub fn generate(&self, ctx: &mut Context, max_depth: usize) -> Result<Expr, GenError> {
        self.generate_for(ctx, Target::Any, max_depth)
    }

    /// Generate a predicate in the tri-state boolean domain.
    pub fn generate_predicate(
        &self,
        ctx: &mut Context,
        max_depth: usize,
    ) -> Result<Expr, GenError> {
        let predicate = self.generate_for(ctx, Target::Boolean, max_depth)?;
        if !predicate.ty().is_predicate() {
            return Err(GenError::invariant(
                "predicate",
                format!("generated predicate has type {}", predicate.ty()),
            )
            .with_context(predicate.to_string()));
        }
        Ok(predicate)
    }

    /// Generate an expression satisfying `target` with depth at most `max_depth`.
    pub fn generate_for(
        &self,
        ctx: &mut Context,
        target: Target,
        max_depth: usize,
    ) -> Result<Expr, GenError> {
        if self.pool.is_empty() {
            return Err(GenError::invariant("expression", "empty column pool"));
        }

        let expr = if max_depth == 0 {
            self.leaf(ctx, target)
        } else {
            let candidates = self.candidates(target);
            if candidates.is_empty() {
                self.leaf(ctx, target)
            } else {
                let category = self
                    .policy
                    .select_weighted(ctx, &candidates)
                    .map_err(|e| e.with_context(format!("generating {target} expression")))?;
                self.inner(ctx, category, target, max_depth - 1)?
            }
        };

        if !target.accepts(expr.ty()) {
            return Err(GenError::invariant(
                "expression",
                format!("{target} request produced type {}", expr.ty()),
            )
            .with_context(expr.to_string()));
        }
        ctx.record(expr.kind());
        Ok(expr)
    }

    fn candidates(&self, target: Target) -> Vec<(OpCategory, u32)> {
        target
            .categories()
            .into_iter()
            .filter(|c| *c != OpCategory::Aggregate || self.aggregate_pool.is_some())
            .map(|c| (c, self.policy.expr_weights.weight_for(c)))
            .filter(|(_, w)| *w > 0)
            .collect()
    }

    fn leaf(&self, ctx: &mut Context, target: Target) -> Expr {
        let columns: Vec<&ColumnRef> = self
            .pool
            .iter()
            .filter(|c| target.accepts(c.ty))
            .collect();

        if !columns.is_empty() && ctx.gen_bool_with_prob(self.policy.column_probability) {
            let idx = ctx.gen_range(columns.len());
            return Expr::column(columns[idx].clone());
        }

        let ty = target.literal_type(ctx);
        Expr::literal(generate_literal(ctx, ty, &self.policy.literal_config))
    }

    fn inner(
        &self,
        ctx: &mut Context,
        category: OpCategory,
        target: Target,
        depth: usize,
    ) -> Result<Expr, GenError> {
        match category {
            OpCategory::Comparison => {
                let op = *ctx.choose(BinOp::comparison()).unwrap_or(&BinOp::Eq);
                let left = self.generate_for(ctx, Target::Any, depth)?;
                let right = self.generate_for(ctx, Target::of(left.ty()), depth)?;
                Expr::binary(left, op, right)
            }
            OpCategory::Logical => {
                let op = *ctx.choose(BinOp::logical()).unwrap_or(&BinOp::And);
                let left = self.generate_for(ctx, Target::Boolean, depth)?;
                let right = self.generate_for(ctx, Target::Boolean, depth)?;
                Expr::binary(left, op, right)
            }
            OpCategory::Not => self.generate_for(ctx, Target::Boolean, depth)?.negated(),
            OpCategory::Postfix => {
                let ops = [
                    PostfixOp::IsNull,
                    PostfixOp::IsNotNull,
                    PostfixOp::IsTrue,
                    PostfixOp::IsFalse,
                ];
                let op = *ctx.choose(&ops).unwrap_or(&PostfixOp::IsNull);
                let operand_target = match op {
                    PostfixOp::IsNull | PostfixOp::IsNotNull => Target::Any,
                    PostfixOp::IsTrue | PostfixOp::IsFalse => Target::Boolean,
                };
                let operand = self.generate_for(ctx, operand_target, depth)?;
                Ok(Expr::postfix(operand, op))
            }
            OpCategory::Between => {
                let expr = self.generate_for(ctx, Target::Any, depth)?;
                let bound = Target::of(expr.ty());
                let low = self.generate_for(ctx, bound, depth)?;
                let high = self.generate_for(ctx, bound, depth)?;
                Ok(Expr::between(expr, low, high, ctx.gen_bool()))
            }
            OpCategory::InList => {
                let expr = self.generate_for(ctx, Target::Any, depth)?;
                let item = Target::of(expr.ty());
                let len = ctx.gen_range_inclusive(1, self.policy.max_in_list_size.max(1));
                let list = (0..len)
                    .map(|_| self.generate_for(ctx, item, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                Expr::in_list(expr, list, ctx.gen_bool())
            }
            OpCategory::Like => {
                let left = self.generate_for(ctx, Target::String, depth)?;
                let right = self.generate_for(ctx, Target::String, depth)?;
                Expr::binary(left, BinOp::Like, right)
            }
            OpCategory::Arithmetic => {
                let op = *ctx.choose(BinOp::arithmetic()).unwrap_or(&BinOp::Add);
                let left = self.generate_for(ctx, Target::Numeric, depth)?;
                let right = self.generate_for(ctx, Target::Numeric, depth)?;
                Expr::binary(left, op, right)
            }
            OpCategory::Negate => {
                let op = if ctx.gen_bool_with_prob(0.8) {
                    UnaryOp::Negate
                } else {
                    UnaryOp::Plus
                };
                let operand = self.generate_for(ctx, Target::Numeric, depth)?;
                Expr::unary(op, operand)
            }
            OpCategory::NumericFunction => {
                if ctx.gen_bool() {
                    let arg = self.generate_for(ctx, Target::Numeric, depth)?;
                    Expr::function(Function::Abs, vec![arg])
                } else {
                    let arg = self.generate_for(ctx, Target::Any, depth)?;
                    Expr::function(Function::Length, vec![arg])
                }
            }
            OpCategory::Aggregate => self.aggregate(ctx, depth),
            OpCategory::Concat => {
                let left = self.generate_for(ctx, Target::Any, depth)?;
                let right = self.generate_for(ctx, Target::Any, depth)?;
                Expr::binary(left, BinOp::Concat, right)
            }
            OpCategory::StringFunction => {
                let func = if ctx.gen_bool() {
                    Function::Upper
                } else {
                    Function::Lower
                };
                let arg = self.generate_for(ctx, Target::Any, depth)?;
                Expr::function(func, vec![arg])
            }
            OpCategory::Conditional => {
                let first = self.generate_for(ctx, target, depth)?;
                let second_target = if first.ty().is_null() {
                    target
                } else {
                    Target::of(first.ty())
                };
                let second = self.generate_for(ctx, second_target, depth)?;
                if ctx.gen_bool() {
                    let condition = self.generate_for(ctx, Target::Boolean, depth)?;
                    Expr::case(condition, first, second)
                } else {
                    Expr::function(Function::Coalesce, vec![first, second])
                }
            }
        }
    }

    fn aggregate(&self, ctx: &mut Context, depth: usize) -> Result<Expr, GenError> {
        let Some(pool) = &self.aggregate_pool else {
            return Err(GenError::invariant(
                "aggregate",
                "aggregate requested without an aggregate pool",
            ));
        };
        let funcs = [
            Function::CountAll,
            Function::Count,
            Function::Sum,
            Function::Min,
            Function::Max,
        ];
        let func = *ctx.choose(&funcs).unwrap_or(&Function::CountAll);
        if func == Function::CountAll {
            return Expr::function(func, vec![]);
        }

        let inner = ExprGenerator::new(self.policy, pool.clone());
        let arg_target = if func == Function::Count {
            Target::Any
        } else {
            Target::Numeric
        };
        let arg = inner.generate_for(ctx, arg_target, depth)?;
        Expr::function(func, vec![arg])
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::ast::ExprKind;
    use crate::policy::ExprWeights;
    use crate::schema::Column;

    fn test_table() -> Table {
        Table::new(
            "t0",
            vec![
                Column::new("c0", CompositeType::int(4)),
                Column::new("c1", CompositeType::string()).not_null(),
                Column::new("c2", CompositeType::boolean()),
                Column::new("c3", CompositeType::float(8)),
            ],
        )
    }

    fn column_pool(table: &Table) -> Vec<ColumnRef> {
        table.columns().iter().map(ColumnRef::from).collect()
    }

    #[test]
    fn test_empty_pool_is_invariant_violation() {
        let policy = Policy::default();
        let generator = ExprGenerator::new(&policy, vec![]);
        let mut ctx = Context::new_with_seed(1);
        let err = generator.generate(&mut ctx, 2).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_predicates_are_tri_state() {
        let policy = Policy::default();
        let table = test_table();
        let generator = ExprGenerator::for_tables(&policy, &[&table]);
        let mut ctx = Context::new_with_seed(42);
        for depth in 0..4 {
            for _ in 0..100 {
                let p = generator.generate_predicate(&mut ctx, depth).unwrap();
                assert!(p.ty().is_predicate(), "{p} has type {}", p.ty());
                assert!(p.depth() <= depth);
            }
        }
    }

    #[test]
    fn test_same_seed_same_tree() {
        let policy = Policy::default();
        let table = test_table();
        let generator = ExprGenerator::for_tables(&policy, &[&table]);
        let mut a = Context::new_with_seed(1234);
        let mut b = Context::new_with_seed(1234);
        for _ in 0..50 {
            let x = generator.generate(&mut a, 3).unwrap();
            let y = generator.generate(&mut b, 3).unwrap();
            assert_eq!(x, y);
            assert_eq!(x.to_string(), y.to_string());
        }
    }

    #[test]
    fn test_leaf_columns_match_target() {
        let policy = Policy {
            column_probability: 1.0,
            ..Policy::default()
        };
        let table = test_table();
        let generator = ExprGenerator::for_tables(&policy, &[&table]);
        let mut ctx = Context::new_with_seed(8);
        for _ in 0..50 {
            match generator.generate_for(&mut ctx, Target::String, 0).unwrap() {
                Expr::Column(c) => assert_eq!(c.column, "c1"),
                other => panic!("expected a column, got {other}"),
            }
        }
    }

    #[test]
    fn test_aggregates_only_with_pool_and_never_nested() {
        let policy = Policy::default();
        let table = test_table();
        let plain = ExprGenerator::for_tables(&policy, &[&table]);
        let mut ctx = Context::new_with_seed(77);
        for _ in 0..200 {
            assert!(!plain.generate(&mut ctx, 3).unwrap().contains_aggregate());
        }

        let grouped = ExprGenerator::new(&policy, column_pool(&table)[..1].to_vec())
            .with_aggregates(column_pool(&table));
        let mut saw_aggregate = false;
        for _ in 0..300 {
            let p = grouped.generate_predicate(&mut ctx, 3).unwrap();
            saw_aggregate |= p.contains_aggregate();
            assert!(!has_nested_aggregate(&p, false), "{p}");
        }
        assert!(saw_aggregate);
    }

    fn has_nested_aggregate(expr: &Expr, inside: bool) -> bool {
        if let Expr::FunctionCall(fc) = expr {
            if fc.func.is_aggregate() {
                if inside {
                    return true;
                }
                return fc.args.iter().any(|a| has_nested_aggregate(a, true));
            }
        }
        match expr {
            Expr::Column(_) | Expr::Literal(_) => false,
            Expr::UnaryOp(u) => has_nested_aggregate(&u.operand, inside),
            Expr::BinaryOp(b) => {
                has_nested_aggregate(&b.left, inside) || has_nested_aggregate(&b.right, inside)
            }
            Expr::Postfix(p) => has_nested_aggregate(&p.operand, inside),
            Expr::FunctionCall(fc) => fc.args.iter().any(|a| has_nested_aggregate(a, inside)),
            Expr::Between(b) => [&b.expr, &b.low, &b.high]
                .iter()
                .any(|e| has_nested_aggregate(e, inside)),
            Expr::InList(i) => std::iter::once(&i.expr)
                .chain(i.list.iter())
                .any(|e| has_nested_aggregate(e, inside)),
            Expr::Case(c) => [&c.condition, &c.then, &c.otherwise]
                .iter()
                .any(|e| has_nested_aggregate(e, inside)),
        }
    }

    #[test]
    fn test_coverage_is_recorded() {
        let policy = Policy::default().with_expr_weights(ExprWeights::simple());
        let table = test_table();
        let generator = ExprGenerator::for_tables(&policy, &[&table]);
        let mut ctx = Context::new_with_seed(3);
        generator.generate_predicate(&mut ctx, 2).unwrap();
        let coverage = ctx.coverage();
        assert!(coverage.total_exprs() >= 3);
        assert!(coverage.count(ExprKind::Column) + coverage.count(ExprKind::Literal) >= 2);
    }

    proptest! {
        #[test]
        fn test_depth_bound_and_target(seed in any::<u64>(), depth in 0usize..5, target_idx in 0usize..4) {
            let policy = Policy::default();
            let table = test_table();
            let generator = ExprGenerator::for_tables(&policy, &[&table])
                .with_aggregates(column_pool(&table));
            let target = Target::iter().nth(target_idx).unwrap();
            let mut ctx = Context::new_with_seed(seed);
            let expr = generator.generate_for(&mut ctx, target, depth).unwrap();
            prop_assert!(expr.depth() <= depth);
            prop_assert!(target.accepts(expr.ty()));
        }
    }
}
