//! Non-optimizing reference engine construction.
//!
//! `SELECT COUNT(*) ... WHERE P` lets the planner use `P` for index lookups
//! and join reordering. Moving `P` into the fetch list as a `CASE` flag and
//! summing the flags in an outer query forces it to be evaluated on every
//! row. Both counts must agree.

use super::{pick_tables, Derivation, Law, Oracle};
use crate::ast::{ColumnRef, Expr, ExprType, FromItem, Function, Literal, Select, SelectItem};
use crate::context::Context;
use crate::error::GenError;
use crate::generate::{synthesize_select, ExprGenerator};
use crate::policy::Policy;
use crate::schema::{CompositeType, Schema};

const SUBQUERY_ALIAS: &str = "norec_sub";
const FLAG_COLUMN: &str = "flag";

#[derive(Debug, Clone)]
pub struct NoRec {
    policy: Policy,
}

impl NoRec {
    pub fn new(policy: &Policy) -> Self {
        Self {
            policy: policy.clone(),
        }
    }
}

impl Oracle for NoRec {
    fn name(&self) -> &'static str {
        "norec"
    }

    fn derive(&self, ctx: &mut Context, schema: &Schema) -> Result<Derivation, GenError> {
        let tables = pick_tables(ctx, schema, &self.policy)?;
        let generator = ExprGenerator::for_tables(&self.policy, &tables);
        let synthesized = synthesize_select(ctx, &self.policy, &tables, &generator)?;
        let predicate = generator.generate_predicate(ctx, self.policy.max_expr_depth)?;

        // Only the row source survives: a plain fetch list, no DISTINCT.
        let mut source = Select::new(Vec::new(), synthesized.from);
        source.joins = synthesized.joins;
        source.hint = synthesized.hint;

        let mut base = source.with_where(Some(predicate.clone()));
        base.fetch = vec![SelectItem::new(Expr::function(Function::CountAll, vec![])?)];

        let flag = Expr::case(
            predicate,
            Expr::literal(Literal::integer(1, 8)),
            Expr::literal(Literal::integer(0, 8)),
        )?;
        let mut inner = source;
        inner.fetch = vec![SelectItem::aliased(flag, FLAG_COLUMN)];

        let flag_ref = ColumnRef::new(
            SUBQUERY_ALIAS,
            FLAG_COLUMN,
            ExprType::new(CompositeType::int(8), false),
        );
        let sum = Expr::function(Function::Sum, vec![Expr::column(flag_ref)])?;
        let variant = Select::new(
            vec![SelectItem::new(sum)],
            vec![FromItem::Subquery {
                select: Box::new(inner),
                alias: SUBQUERY_ALIAS.to_string(),
            }],
        );

        Ok(Derivation {
            base,
            variants: vec![variant],
            law: Law::ScalarEquality,
        })
    }
}
