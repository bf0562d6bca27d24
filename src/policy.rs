//! Runtime policy for controlling generation weights.
//!
//! Weights are soft constraints: they steer the probability of each
//! construct and a weight of zero disables it. Hard limits such as the
//! maximum expression depth live here as well.

use crate::context::Context;
use crate::error::GenError;

/// Runtime policy controlling generation weights and limits.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Weights for operator categories of inner expression nodes.
    pub expr_weights: ExprWeights,

    /// Distribution of leaf literals.
    pub literal_config: LiteralConfig,

    /// Maximum depth of a generated expression tree.
    pub max_expr_depth: usize,

    /// Maximum number of columns in the fetch list.
    pub max_fetch_columns: usize,

    /// Maximum number of tables one oracle query reads.
    pub max_select_tables: usize,

    /// Maximum number of values in an IN list.
    pub max_in_list_size: usize,

    /// Probability that a leaf is a column reference when one fits the target.
    pub column_probability: f64,

    /// Probability that each table after the first becomes a join.
    pub join_probability: f64,

    /// Probability of attaching an index-merge hint.
    pub hint_probability: f64,

    /// Probability of SELECT DISTINCT.
    pub distinct_probability: f64,

    /// Probability of a FOR UPDATE / FOR SHARE clause. Zero disables it.
    pub for_clause_probability: f64,

    /// Maximum number of columns in CREATE TABLE.
    pub max_columns: usize,

    /// Maximum number of rows in one INSERT.
    pub max_insert_rows: usize,

    /// Probability that a created column is NOT NULL.
    pub not_null_probability: f64,

    /// Probability that a created index is UNIQUE.
    pub unique_index_probability: f64,

    /// Probability that a DELETE carries a WHERE predicate.
    pub delete_where_probability: f64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            expr_weights: ExprWeights::default(),
            literal_config: LiteralConfig::default(),
            max_expr_depth: 3,
            max_fetch_columns: 4,
            max_select_tables: 2,
            max_in_list_size: 4,
            column_probability: 0.7,
            join_probability: 0.3,
            hint_probability: 0.2,
            distinct_probability: 0.2,
            for_clause_probability: 0.0,
            max_columns: 5,
            max_insert_rows: 5,
            not_null_probability: 0.1,
            unique_index_probability: 0.1,
            delete_where_probability: 0.9,
        }
    }
}

impl Policy {
    pub fn with_max_expr_depth(mut self, depth: usize) -> Self {
        self.max_expr_depth = depth;
        self
    }

    pub fn with_expr_weights(mut self, weights: ExprWeights) -> Self {
        self.expr_weights = weights;
        self
    }

    pub fn with_null_probability(mut self, prob: f64) -> Self {
        self.literal_config.null_probability = prob.clamp(0.0, 1.0);
        self
    }

    pub fn with_for_clause_probability(mut self, prob: f64) -> Self {
        self.for_clause_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Select from weighted items.
    pub fn select_weighted<T: Clone>(
        &self,
        ctx: &mut Context,
        items: &[(T, u32)],
    ) -> Result<T, GenError> {
        let weights: Vec<u32> = items.iter().map(|(_, w)| *w).collect();

        let idx = ctx
            .weighted_index(&weights)
            .ok_or_else(|| GenError::exhausted("policy", "all candidates have zero weight"))?;
        Ok(items[idx].0.clone())
    }
}

/// Operator categories an inner expression node is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::Display)]
pub enum OpCategory {
    Comparison,
    Logical,
    Not,
    Postfix,
    Between,
    InList,
    Like,
    Arithmetic,
    Negate,
    NumericFunction,
    Aggregate,
    Concat,
    StringFunction,
    Conditional,
}

/// Weights for operator categories.
#[derive(Debug, Clone)]
pub struct ExprWeights {
    pub comparison: u32,
    pub logical: u32,
    pub not: u32,
    pub postfix: u32,
    pub between: u32,
    pub in_list: u32,
    pub like: u32,
    pub arithmetic: u32,
    pub negate: u32,
    pub numeric_function: u32,
    pub aggregate: u32,
    pub concat: u32,
    pub string_function: u32,
    pub conditional: u32,
}

impl Default for ExprWeights {
    fn default() -> Self {
        Self {
            comparison: 30,
            logical: 20,
            not: 8,
            postfix: 8,
            between: 5,
            in_list: 5,
            like: 3,
            arithmetic: 15,
            negate: 4,
            numeric_function: 5,
            aggregate: 10,
            concat: 4,
            string_function: 4,
            conditional: 3,
        }
    }
}

impl ExprWeights {
    /// Only comparisons and logical connectives.
    pub fn simple() -> Self {
        Self {
            comparison: 50,
            logical: 30,
            not: 10,
            postfix: 10,
            between: 0,
            in_list: 0,
            like: 0,
            arithmetic: 0,
            negate: 0,
            numeric_function: 0,
            aggregate: 10,
            concat: 0,
            string_function: 0,
            conditional: 0,
        }
    }

    pub fn weight_for(&self, category: OpCategory) -> u32 {
        match category {
            OpCategory::Comparison => self.comparison,
            OpCategory::Logical => self.logical,
            OpCategory::Not => self.not,
            OpCategory::Postfix => self.postfix,
            OpCategory::Between => self.between,
            OpCategory::InList => self.in_list,
            OpCategory::Like => self.like,
            OpCategory::Arithmetic => self.arithmetic,
            OpCategory::Negate => self.negate,
            OpCategory::NumericFunction => self.numeric_function,
            OpCategory::Aggregate => self.aggregate,
            OpCategory::Concat => self.concat,
            OpCategory::StringFunction => self.string_function,
            OpCategory::Conditional => self.conditional,
        }
    }
}

/// Distribution of generated literals.
#[derive(Debug, Clone)]
pub struct LiteralConfig {
    /// Probability of a NULL literal.
    pub null_probability: f64,
    /// Probability of an edge value (0, -1, width bounds, empty string, ...).
    pub edge_probability: f64,
    pub int_min: i64,
    pub int_max: i64,
    pub real_min: f64,
    pub real_max: f64,
    pub string_max_len: usize,
    pub timestamp_max: i64,
}

impl Default for LiteralConfig {
    fn default() -> Self {
        Self {
            null_probability: 0.1,
            edge_probability: 0.2,
            int_min: -100,
            int_max: 100,
            real_min: -100.0,
            real_max: 100.0,
            string_max_len: 8,
            timestamp_max: 2_000_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = Policy::default();
        assert_eq!(policy.max_expr_depth, 3);
        assert_eq!(policy.for_clause_probability, 0.0);
        assert!(OpCategory::iter().all(|c| policy.expr_weights.weight_for(c) > 0));
    }

    #[test]
    fn test_policy_builder() {
        let policy = Policy::default()
            .with_max_expr_depth(1)
            .with_null_probability(2.0)
            .with_expr_weights(ExprWeights::simple());
        assert_eq!(policy.max_expr_depth, 1);
        assert_eq!(policy.literal_config.null_probability, 1.0);
        assert_eq!(policy.expr_weights.weight_for(OpCategory::Arithmetic), 0);
    }

    #[test]
    fn test_select_weighted() {
        let policy = Policy::default();
        let mut ctx = Context::new_with_seed(5);
        let items = [("never", 0), ("always", 3)];
        for _ in 0..20 {
            assert_eq!(policy.select_weighted(&mut ctx, &items).unwrap(), "always");
        }
        let none: [(&str, u32); 1] = [("x", 0)];
        assert!(policy.select_weighted(&mut ctx, &none).is_err());
    }
}
