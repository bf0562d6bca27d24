//! Generation context with RNG and coverage.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::ast::ExprKind;

/// Context for query generation.
///
/// Holds the round-scoped random stream and the expression coverage
/// counters. Every random decision of the generator, synthesizer and
/// scheduler goes through here, so one seed replays one round exactly.
pub struct Context {
    rng: ChaCha8Rng,
    seed: u64,
    coverage: Coverage,
}

impl Context {
    /// Create a new context with a random seed.
    pub fn new() -> Self {
        Self::new_with_seed(rand::rng().random())
    }

    /// Create a new context with a specific seed.
    pub fn new_with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            coverage: Coverage::default(),
        }
    }

    /// The seed this context was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Record a generated expression node.
    pub fn record(&mut self, kind: ExprKind) {
        self.coverage.record(kind);
    }

    pub fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    /// Take the coverage data, leaving an empty Coverage in place.
    pub fn take_coverage(&mut self) -> Coverage {
        std::mem::take(&mut self.coverage)
    }

    // RNG methods

    /// Generate a random boolean.
    pub fn gen_bool(&mut self) -> bool {
        self.rng.random()
    }

    /// Generate a random boolean with the given probability of being true.
    pub fn gen_bool_with_prob(&mut self, prob: f64) -> bool {
        self.rng.random_bool(prob.clamp(0.0, 1.0))
    }

    /// Generate a random usize in the range [0, max).
    pub fn gen_range(&mut self, max: usize) -> usize {
        if max == 0 {
            0
        } else {
            self.rng.random_range(0..max)
        }
    }

    /// Generate a random usize in the range [min, max].
    pub fn gen_range_inclusive(&mut self, min: usize, max: usize) -> usize {
        if min >= max {
            min
        } else {
            self.rng.random_range(min..=max)
        }
    }

    /// Generate a random i64 in the given range.
    pub fn gen_i64_range(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            min
        } else {
            self.rng.random_range(min..=max)
        }
    }

    /// Generate a random f64 in the given range.
    pub fn gen_f64_range(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            min
        } else {
            self.rng.random_range(min..=max)
        }
    }

    /// Draw a fresh u64, used to seed nested contexts.
    pub fn gen_u64(&mut self) -> u64 {
        self.rng.random()
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            let idx = self.gen_range(items.len());
            Some(&items[idx])
        }
    }

    /// Select a non-empty subset, uniformly over all non-empty subsets.
    ///
    /// Every element is kept with probability one half and the draw is
    /// repeated while it comes out empty. Returns an empty vector only for
    /// empty input. Input order is preserved.
    pub fn non_empty_subset<'a, T>(&mut self, items: &'a [T]) -> Vec<&'a T> {
        if items.is_empty() {
            return Vec::new();
        }
        loop {
            let picked: Vec<&T> = items.iter().filter(|_| self.rng.random::<bool>()).collect();
            if !picked.is_empty() {
                return picked;
            }
        }
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Select a random index based on weights.
    ///
    /// Returns `None` if all weights are zero (no valid options).
    pub fn weighted_index(&mut self, weights: &[u32]) -> Option<usize> {
        let total: u32 = weights.iter().sum();
        if total == 0 {
            return None;
        }

        let mut threshold = self.rng.random_range(0..total);
        for (i, &weight) in weights.iter().enumerate() {
            if threshold < weight {
                return Some(i);
            }
            threshold -= weight;
        }

        Some(weights.len().saturating_sub(1))
    }

    /// Generate a random string of the given length.
    pub fn gen_string(&mut self, len: usize) -> String {
        const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789%_ ";
        (0..len)
            .map(|_| {
                let idx = self.gen_range(CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-kind counters of generated expression nodes.
#[derive(Debug, Clone, Default)]
pub struct Coverage {
    exprs: BTreeMap<ExprKind, usize>,
}

impl Coverage {
    pub fn record(&mut self, kind: ExprKind) {
        *self.exprs.entry(kind).or_default() += 1;
    }

    pub fn count(&self, kind: ExprKind) -> usize {
        self.exprs.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_exprs(&self) -> usize {
        self.exprs.values().sum()
    }

    /// Fold another coverage into this one.
    pub fn merge(&mut self, other: &Coverage) {
        for (kind, count) in &other.exprs {
            *self.exprs.entry(*kind).or_default() += count;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExprKind, usize)> + '_ {
        self.exprs.iter().map(|(k, v)| (*k, *v))
    }
}
