//! Order-independent comparison of result sets.
//!
//! Rows are compared as multisets of canonical rows. Canonicalization maps
//! integral reals within ±2^53 to integers (so `-0.0` equals `0`), rounds
//! other reals to 12 significant digits and compares text and blobs
//! bytewise.

use std::collections::{BTreeMap, HashSet};

use crate::value::{Row, RowSet, SqlValue};

/// Largest magnitude up to which every integer is exactly representable as f64.
const EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// Outcome of comparing an expected and an actual result set.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Equal,
    NotEqual {
        /// Rows of the expected set absent from the actual set.
        missing: Vec<Row>,
        /// Rows of the actual set absent from the expected set.
        unexpected: Vec<Row>,
    },
}

impl Comparison {
    pub fn is_equal(&self) -> bool {
        matches!(self, Comparison::Equal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Canonical {
    Null,
    Integer(i64),
    Real(String),
    Text(Vec<u8>),
    Blob(Vec<u8>),
}

fn canonical_value(value: &SqlValue) -> Canonical {
    match value {
        SqlValue::Null => Canonical::Null,
        SqlValue::Integer(i) => Canonical::Integer(*i),
        SqlValue::Real(r) => canonical_real(*r),
        SqlValue::Text(s) => Canonical::Text(s.as_bytes().to_vec()),
        SqlValue::Blob(b) => Canonical::Blob(b.clone()),
    }
}

fn canonical_real(r: f64) -> Canonical {
    if r.is_nan() {
        return Canonical::Real("NaN".to_string());
    }
    if r.fract() == 0.0 && r.abs() <= EXACT_F64_INT {
        return Canonical::Integer(r as i64);
    }
    Canonical::Real(format!("{r:.11e}"))
}

fn canonical_row(row: &Row, order: Option<&[usize]>) -> Vec<Canonical> {
    match order {
        Some(order) => order
            .iter()
            .map(|&i| row.values().get(i).map_or(Canonical::Null, canonical_value))
            .collect(),
        None => row.values().iter().map(canonical_value).collect(),
    }
}

/// Column permutation that lines `actual` up with `expected`, when both carry
/// the same unique names in a different order.
fn column_order(expected: &RowSet, actual: &RowSet) -> Option<Vec<usize>> {
    if expected.columns == actual.columns || expected.columns.len() != actual.columns.len() {
        return None;
    }
    let unique: HashSet<&String> = expected.columns.iter().collect();
    if unique.len() != expected.columns.len() {
        return None;
    }
    expected
        .columns
        .iter()
        .map(|name| actual.columns.iter().position(|c| c == name))
        .collect()
}

type Multiset<'a> = BTreeMap<Vec<Canonical>, (usize, &'a Row)>;

fn multiset<'a>(set: &'a RowSet, order: Option<&[usize]>) -> Multiset<'a> {
    let mut rows = Multiset::new();
    for row in &set.rows {
        rows.entry(canonical_row(row, order))
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, row));
    }
    rows
}

/// Rows of `left` that `right` lacks, with multiplicity.
fn difference(left: &Multiset, right: &Multiset) -> Vec<Row> {
    let mut rows = Vec::new();
    for (key, (count, row)) in left {
        let other = right.get(key).map_or(0, |(c, _)| *c);
        for _ in other..*count {
            rows.push((*row).clone());
        }
    }
    rows
}

/// Compare two result sets as multisets of canonical rows.
pub fn compare(expected: &RowSet, actual: &RowSet) -> Comparison {
    let order = column_order(expected, actual);
    let left = multiset(expected, None);
    let right = multiset(actual, order.as_deref());

    let missing = difference(&left, &right);
    let unexpected = difference(&right, &left);
    if missing.is_empty() && unexpected.is_empty() {
        Comparison::Equal
    } else {
        Comparison::NotEqual {
            missing,
            unexpected,
        }
    }
}

/// Multiset union: all rows of all sets, keeping the columns of the first.
pub fn multiset_union(sets: &[RowSet]) -> RowSet {
    let columns = sets.first().map(|s| s.columns.clone()).unwrap_or_default();
    let rows = sets.iter().flat_map(|s| s.rows.iter().cloned()).collect();
    RowSet::new(columns, rows)
}

/// Keep the first occurrence of every canonical row.
pub fn distinct_rows(set: &RowSet) -> RowSet {
    let mut seen = HashSet::new();
    let rows = set
        .rows
        .iter()
        .filter(|row| seen.insert(canonical_row(row, None)))
        .cloned()
        .collect();
    RowSet::new(set.columns.clone(), rows)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn rows(values: &[&[SqlValue]]) -> RowSet {
        RowSet::new(
            vec!["c0".into(), "c1".into()],
            values.iter().map(|v| Row(v.to_vec())).collect(),
        )
    }

    #[test]
    fn test_order_independent() {
        let a = rows(&[
            &[SqlValue::Integer(1), SqlValue::Null],
            &[SqlValue::Integer(2), SqlValue::Text("x".into())],
        ]);
        let b = rows(&[
            &[SqlValue::Integer(2), SqlValue::Text("x".into())],
            &[SqlValue::Integer(1), SqlValue::Null],
        ]);
        assert_eq!(compare(&a, &b), Comparison::Equal);
    }

    #[test]
    fn test_multiplicity_matters() {
        let a = rows(&[
            &[SqlValue::Integer(1), SqlValue::Null],
            &[SqlValue::Integer(1), SqlValue::Null],
        ]);
        let b = rows(&[&[SqlValue::Integer(1), SqlValue::Null]]);
        match compare(&a, &b) {
            Comparison::NotEqual {
                missing,
                unexpected,
            } => {
                assert_eq!(missing.len(), 1);
                assert!(unexpected.is_empty());
            }
            Comparison::Equal => panic!("duplicate row lost"),
        }
    }

    #[test]
    fn test_numeric_canonicalization() {
        let a = RowSet::single_column(
            "c0",
            vec![
                SqlValue::Integer(3),
                SqlValue::Real(-0.0),
                SqlValue::Real(0.1 + 0.2),
            ],
        );
        let b = RowSet::single_column(
            "c0",
            vec![
                SqlValue::Real(3.0),
                SqlValue::Integer(0),
                SqlValue::Real(0.3),
            ],
        );
        assert!(compare(&a, &b).is_equal());

        let c = RowSet::single_column("c0", vec![SqlValue::Real(0.31)]);
        let d = RowSet::single_column("c0", vec![SqlValue::Real(0.3)]);
        assert!(!compare(&c, &d).is_equal());

        // Text is not coerced to a number.
        let e = RowSet::single_column("c0", vec![SqlValue::Text("1".into())]);
        let f = RowSet::single_column("c0", vec![SqlValue::Integer(1)]);
        assert!(!compare(&e, &f).is_equal());
    }

    #[test]
    fn test_columns_reordered_by_name() {
        let a = RowSet::new(
            vec!["c0".into(), "c1".into()],
            vec![Row(vec![SqlValue::Integer(1), SqlValue::Integer(2)])],
        );
        let b = RowSet::new(
            vec!["c1".into(), "c0".into()],
            vec![Row(vec![SqlValue::Integer(2), SqlValue::Integer(1)])],
        );
        assert!(compare(&a, &b).is_equal());
    }

    #[test]
    fn test_union_and_distinct() {
        let a = rows(&[&[SqlValue::Integer(1), SqlValue::Null]]);
        let b = rows(&[
            &[SqlValue::Integer(1), SqlValue::Null],
            &[SqlValue::Real(2.0), SqlValue::Null],
        ]);
        let union = multiset_union(&[a, b, RowSet::default()]);
        assert_eq!(union.len(), 3);
        assert_eq!(union.columns, vec!["c0", "c1"]);

        let distinct = distinct_rows(&union);
        assert_eq!(distinct.len(), 2);
        assert!(multiset_union(&[]).is_empty());
    }

    fn value_strategy() -> impl Strategy<Value = SqlValue> {
        prop_oneof![
            Just(SqlValue::Null),
            (-5i64..5).prop_map(SqlValue::Integer),
            (-5i64..5).prop_map(|i| SqlValue::Real(i as f64 / 2.0)),
            "[ab]{0,2}".prop_map(SqlValue::Text),
        ]
    }

    proptest! {
        #[test]
        fn test_permutation_invariance(
            values in prop::collection::vec((value_strategy(), value_strategy()), 0..12),
            seed in any::<u64>(),
        ) {
            let original: Vec<Row> = values.into_iter().map(|(a, b)| Row(vec![a, b])).collect();
            let mut shuffled = original.clone();
            let mut ctx = crate::context::Context::new_with_seed(seed);
            ctx.shuffle(&mut shuffled);

            let columns = vec!["c0".to_string(), "c1".to_string()];
            let a = RowSet::new(columns.clone(), original);
            let b = RowSet::new(columns, shuffled);
            prop_assert!(compare(&a, &b).is_equal());
            prop_assert!(compare(&distinct_rows(&a), &distinct_rows(&b)).is_equal());
        }
    }
}
