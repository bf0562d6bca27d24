use logic_fuzzer::ast::{
    BinOp, ColumnRef, Expr, ExprType, FromItem, Literal, Select, SelectItem, TableRef, TriState,
};
use logic_fuzzer::backend::{Backend, BackendError, SqliteBackend};
use logic_fuzzer::expected::ExpectedErrors;
use logic_fuzzer::oracle::{InconclusiveReason, NoRec, TlpWhere};
use logic_fuzzer::schema::{build_schema, CompositeType, SchemaSnapshot};
use logic_fuzzer::{Context, Derivation, Law, Oracle, OracleEngine, Policy, RowSet, SqlValue, Verdict};
use proptest::prelude::*;

type Fault = Box<dyn Fn(&str, RowSet) -> Result<RowSet, BackendError>>;

/// SQLite with a programmable defect applied to every result.
struct FaultyBackend {
    inner: SqliteBackend,
    expected: ExpectedErrors,
    fault: Fault,
}

impl FaultyBackend {
    fn new(fault: Fault) -> Self {
        let inner = SqliteBackend::new().unwrap();
        let expected = inner.expected_errors().clone().with("unsupported operator");
        Self {
            inner,
            expected,
            fault,
        }
    }

    fn healthy() -> Self {
        Self::new(Box::new(|_, rows| Ok(rows)))
    }
}

impl Backend for FaultyBackend {
    fn name(&self) -> &str {
        "faulty-sqlite"
    }

    fn reset(&mut self) -> Result<(), BackendError> {
        self.inner.reset()
    }

    fn introspect(&mut self) -> Result<SchemaSnapshot, BackendError> {
        self.inner.introspect()
    }

    fn execute(&mut self, sql: &str) -> Result<RowSet, BackendError> {
        let rows = self.inner.execute(sql)?;
        (self.fault)(sql, rows)
    }

    fn expected_errors(&self) -> &ExpectedErrors {
        &self.expected
    }
}

fn setup(db: &mut dyn Backend, rows: &[&str]) {
    db.execute("CREATE TABLE t (a INT)").unwrap();
    for value in rows {
        db.execute(&format!("INSERT INTO t (a) VALUES ({value})"))
            .unwrap();
    }
}

/// TLP over `SELECT t.a FROM t` with `P = t.a > 1`.
fn tlp_a_gt_1() -> Derivation {
    let a = Expr::column(ColumnRef::new(
        "t",
        "a",
        ExprType::new(CompositeType::int(4), true),
    ));
    let predicate = Expr::binary(a.clone(), BinOp::Gt, Expr::literal(Literal::integer(1, 4))).unwrap();
    let base = Select::new(
        vec![SelectItem::new(a)],
        vec![FromItem::Table(TableRef::new("t"))],
    );
    let variants = TriState::ALL
        .iter()
        .map(|truth| base.with_where(Some(predicate.partition(*truth).unwrap())))
        .collect();
    Derivation {
        base,
        variants,
        law: Law::PartitionUnion { distinct: false },
    }
}

#[test]
fn test_partition_with_null_row_is_no_bug() {
    let mut db = FaultyBackend::healthy();
    setup(&mut db, &["1", "NULL", "2"]);
    let derivation = tlp_a_gt_1();
    assert_eq!(
        derivation.variants[2].to_string(),
        "SELECT t.a FROM t WHERE ((t.a > 1) IS NULL)"
    );

    let verdict = OracleEngine::new()
        .evaluate(&mut db, "tlp-where", &derivation)
        .unwrap();
    assert!(matches!(verdict, Verdict::NoBug), "{verdict:?}");
}

#[test]
fn test_defect_losing_null_partition_is_bug() {
    // The backend drops rows whose predicate is unknown.
    let mut db = FaultyBackend::new(Box::new(|sql, rows| {
        if sql.ends_with("IS NULL)") {
            Ok(RowSet::new(rows.columns, vec![]))
        } else {
            Ok(rows)
        }
    }));
    setup(&mut db, &["1", "NULL", "2"]);

    let mut engine = OracleEngine::new();
    let verdict = engine.evaluate(&mut db, "tlp-where", &tlp_a_gt_1()).unwrap();
    let report = match verdict {
        Verdict::BugFound(report) => report,
        other => panic!("defect not detected: {other:?}"),
    };
    assert_eq!(report.oracle, "tlp-where");
    assert_eq!(report.expected.len(), 3);
    assert_eq!(report.actual.len(), 2);
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].values(), &[SqlValue::Null]);
    assert!(report.unexpected.is_empty());
    assert_eq!(report.variant_sqls.len(), 3);
    assert_eq!(engine.stats()["tlp-where"].bugs, 1);
}

#[test]
fn test_empty_table_is_no_bug() {
    let mut db = FaultyBackend::healthy();
    setup(&mut db, &[]);
    let verdict = OracleEngine::new()
        .evaluate(&mut db, "tlp-where", &tlp_a_gt_1())
        .unwrap();
    assert!(matches!(verdict, Verdict::NoBug), "{verdict:?}");
}

#[test]
fn test_expected_error_on_base_is_inconclusive() {
    // Only the unfiltered base query trips the error; setup statements pass.
    let mut db = FaultyBackend::new(Box::new(|sql, rows| {
        if sql.starts_with("SELECT") && !sql.contains("WHERE") {
            Err(BackendError::Query("unsupported operator: >".into()))
        } else {
            Ok(rows)
        }
    }));
    setup(&mut db, &["1", "NULL", "2"]);

    let mut engine = OracleEngine::new();
    let verdict = engine.evaluate(&mut db, "tlp-where", &tlp_a_gt_1()).unwrap();
    assert!(
        matches!(
            verdict,
            Verdict::Inconclusive(InconclusiveReason::ExpectedError { .. })
        ),
        "{verdict:?}"
    );
    let stats = &engine.stats()["tlp-where"];
    assert_eq!((stats.bugs, stats.inconclusive, stats.expected_errors), (0, 1, 1));
}

#[test]
fn test_predicate_swallowing_null_row_is_bug() {
    // P comes back as {1, 2} while NOT P and P IS NULL come back empty.
    let derivation = tlp_a_gt_1();
    let positive = derivation.variants[0].to_string();
    let mut db = FaultyBackend::new(Box::new(move |sql, rows| {
        if sql == positive {
            let column = rows.columns[0].clone();
            Ok(RowSet::single_column(
                column,
                vec![SqlValue::Integer(1), SqlValue::Integer(2)],
            ))
        } else if sql.starts_with("SELECT") && sql.contains("WHERE") {
            Ok(RowSet::new(rows.columns, vec![]))
        } else {
            Ok(rows)
        }
    }));
    setup(&mut db, &["1", "NULL", "2"]);

    let verdict = OracleEngine::new()
        .evaluate(&mut db, "tlp-where", &derivation)
        .unwrap();
    let report = match verdict {
        Verdict::BugFound(report) => report,
        other => panic!("defect not detected: {other:?}"),
    };
    assert_eq!(report.expected.len(), 3);
    assert_eq!(report.actual.len(), 2);
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].values(), &[SqlValue::Null]);
    assert!(report.unexpected.is_empty());
}

#[test]
fn test_connection_error_is_fatal() {
    let mut db = FaultyBackend::new(Box::new(|_, _| {
        Err(BackendError::Connection("socket closed".into()))
    }));
    db.inner.execute("CREATE TABLE t (a INT)").unwrap();
    let result = OracleEngine::new().evaluate(&mut db, "tlp-where", &tlp_a_gt_1());
    assert!(matches!(
        result,
        Err(logic_fuzzer::FuzzError::Connection(_))
    ));
}

#[test]
fn test_norec_detects_miscounted_where() {
    // COUNT(*) with a WHERE clause comes back one too high.
    let mut db = FaultyBackend::new(Box::new(|sql, rows| {
        if sql.starts_with("SELECT COUNT(*)") {
            let n = match rows.scalar() {
                Some(SqlValue::Integer(n)) => *n,
                _ => 0,
            };
            Ok(RowSet::single_column("c", vec![SqlValue::Integer(n + 1)]))
        } else {
            Ok(rows)
        }
    }));
    setup(&mut db, &["1", "NULL", "2", "5"]);
    let schema = build_schema(&db.introspect().unwrap()).unwrap();

    let oracle = NoRec::new(&Policy::default());
    let mut engine = OracleEngine::new();
    let mut ctx = Context::new_with_seed(3);
    let mut bugs = 0;
    for _ in 0..20 {
        if engine.check(&oracle, &mut ctx, &schema, &mut db).unwrap().is_bug() {
            bugs += 1;
        }
    }
    assert!(bugs > 0);
}

#[test]
fn test_same_seed_same_queries() {
    let mut db = SqliteBackend::new().unwrap();
    setup(&mut db, &["1"]);
    db.execute("CREATE TABLE u (b VARCHAR, c DOUBLE)").unwrap();
    let schema = build_schema(&db.introspect().unwrap()).unwrap();
    let oracle = TlpWhere::new(&Policy::default());

    let sqls = |seed| {
        let mut ctx = Context::new_with_seed(seed);
        (0..10)
            .map(|_| {
                let d = oracle.derive(&mut ctx, &schema).unwrap();
                std::iter::once(d.base.to_string())
                    .chain(d.variants.iter().map(|v| v.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(sqls(99), sqls(99));
    assert_ne!(sqls(99), sqls(100));
}

fn value_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("NULL".to_string()),
        (-20i64..20).prop_map(|n| n.to_string()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_partitions_cover_every_row(
        values in prop::collection::vec((value_strategy(), value_strategy()), 0..12),
        seed in any::<u64>(),
    ) {
        let mut db = SqliteBackend::new().unwrap();
        db.execute("CREATE TABLE t (a INT, b BIGINT)").unwrap();
        for (a, b) in &values {
            db.execute(&format!("INSERT INTO t (a, b) VALUES ({a}, {b})")).unwrap();
        }
        let schema = build_schema(&db.introspect().unwrap()).unwrap();

        let policy = Policy::default();
        let oracles: [Box<dyn Oracle>; 2] =
            [Box::new(TlpWhere::new(&policy)), Box::new(NoRec::new(&policy))];
        let mut ctx = Context::new_with_seed(seed);
        let mut engine = OracleEngine::new();
        for oracle in &oracles {
            let verdict = engine.check(oracle.as_ref(), &mut ctx, &schema, &mut db).unwrap();
            prop_assert!(!verdict.is_bug(), "{:?}", verdict);
        }
    }
}
