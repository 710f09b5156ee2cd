use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ibm_db_engine::cli::codes::{SQL_DECIMAL, SQL_INTEGER, SQL_VARCHAR};
use ibm_db_engine::cli::mock::{column, MockCell, MockDriver, MockQuery, MockResultSet};
use ibm_db_engine::{encode_values, EngineConfig, IbmDb, Options, Value};

const SQL: &str = "SELECT ID, NAME, AMOUNT FROM STAFF";

fn staff(rows: i64) -> MockDriver {
    let mut rs = MockResultSet::new(vec![
        column("ID", SQL_INTEGER, 10),
        column("NAME", SQL_VARCHAR, 20),
        column("AMOUNT", SQL_DECIMAL, 9),
    ]);
    for i in 0..rows {
        rs = rs.row(vec![
            MockCell::Int(i),
            MockCell::Text(format!("user_{}", i)),
            MockCell::Text(format!("{}.50", i)),
        ]);
    }
    MockDriver::new().with_query(SQL, MockQuery::new().result(rs))
}

fn benchmark_fetch_assoc(c: &mut Criterion) {
    let db = IbmDb::new(Arc::new(staff(100)), EngineConfig::default());
    let conn = db.connect("SAMPLE", "u", "p", &Options::new()).unwrap();
    c.bench_function("fetch_assoc_100_rows", |b| {
        b.iter(|| {
            let mut stmt = conn.exec(SQL, &Options::new()).unwrap();
            let mut n = 0;
            while let Some(row) = stmt.fetch_assoc(None).unwrap() {
                n += black_box(row).len();
            }
            n
        });
    });
}

fn benchmark_fetch_both_to_json(c: &mut Criterion) {
    let db = IbmDb::new(Arc::new(staff(100)), EngineConfig::default());
    let conn = db.connect("SAMPLE", "u", "p", &Options::new()).unwrap();
    c.bench_function("fetch_both_json_100_rows", |b| {
        b.iter(|| {
            let mut stmt = conn.exec(SQL, &Options::new()).unwrap();
            let mut bytes = 0;
            while let Some(row) = stmt.fetch_both(None).unwrap() {
                bytes += serde_json::to_vec(&row).unwrap().len();
            }
            bytes
        });
    });
}

fn benchmark_encode_params(c: &mut Criterion) {
    let values: Vec<Value> = (0..100)
        .map(|i| match i % 3 {
            0 => Value::Int(i),
            1 => Value::Str(format!("user_{}", i)),
            _ => Value::Null,
        })
        .collect();
    c.bench_function("encode_values_100", |b| {
        b.iter(|| black_box(encode_values(black_box(&values))));
    });
}

criterion_group!(
    benches,
    benchmark_fetch_assoc,
    benchmark_fetch_both_to_json,
    benchmark_encode_params
);
criterion_main!(benches);
