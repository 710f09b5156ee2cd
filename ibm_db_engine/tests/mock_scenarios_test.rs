//! End-to-end behavior of the public API over the scriptable driver.

use std::sync::Arc;

use ibm_db_engine::cli::codes::*;
use ibm_db_engine::cli::mock::{column, MockCell, MockDriver, MockQuery, MockResultSet};
use ibm_db_engine::cli::ParamBuffer;
use ibm_db_engine::engine::{ATTR_CASE, CASE_LOWER, CASE_NATURAL, CASE_UPPER};
use ibm_db_engine::{
    BinMode, BindOptions, EngineConfig, IbmDb, IbmDbError, Options, ParamDirection, RowKey, Value,
};

const SELECT_BY_ID: &str = "SELECT * FROM T WHERE ID = ?";
const SELECT_TYPES: &str = "SELECT * FROM TYPES";

fn types_result() -> MockResultSet {
    MockResultSet::new(vec![
        column("Small", SQL_SMALLINT, 5),
        column("Id", SQL_INTEGER, 10),
        column("Big", SQL_BIGINT, 19),
        column("Ratio", SQL_DOUBLE, 15),
        column("Name", SQL_VARCHAR, 20),
        column("Amount", SQL_DECIMAL, 10),
        column("Photo", SQL_BLOB, 1024),
    ])
    .row(vec![
        MockCell::Int(3),
        MockCell::Int(42),
        MockCell::Int(9_000_000_000),
        MockCell::Float(0.5),
        MockCell::text("Sanders"),
        MockCell::text("12.50"),
        MockCell::Bytes(vec![0xDE, 0xAD]),
    ])
    .row(vec![MockCell::Null; 7])
}

fn driver() -> MockDriver {
    MockDriver::new()
        .with_query(
            SELECT_BY_ID,
            MockQuery::new().param(SQL_INTEGER, 10).result(
                MockResultSet::new(vec![column("ID", SQL_INTEGER, 10)]).row(vec![MockCell::Int(42)]),
            ),
        )
        .with_query(SELECT_TYPES, MockQuery::new().result(types_result()))
}

fn context(driver: &MockDriver) -> IbmDb {
    let _ = env_logger::builder().is_test(true).try_init();
    IbmDb::new(Arc::new(driver.clone()), EngineConfig::default())
}

#[test]
fn test_columns_surface_as_their_host_types() {
    let driver = driver();
    let db = context(&driver);
    let conn = db.connect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();
    let mut stmt = conn.exec(SELECT_TYPES, &Options::new()).unwrap();

    let row = stmt.fetch_array(None).unwrap().unwrap();
    let values: Vec<Value> = row.values().cloned().collect();
    assert_eq!(
        values,
        vec![
            Value::Int(3),
            Value::Int(42),
            Value::Int(9_000_000_000),
            Value::Float(0.5),
            Value::from("Sanders"),
            Value::from("12.50"),
            Value::Bytes(vec![0xDE, 0xAD]),
        ]
    );
}

#[test]
fn test_null_cells_are_null_in_every_shape() {
    let driver = driver();
    let db = context(&driver);
    let conn = db.connect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();

    for shape in 0..3 {
        let mut stmt = conn.exec(SELECT_TYPES, &Options::new()).unwrap();
        assert!(stmt.fetch_row(None).unwrap());
        let row = match shape {
            0 => stmt.fetch_assoc(None),
            1 => stmt.fetch_array(None),
            _ => stmt.fetch_both(None),
        }
        .unwrap()
        .unwrap();
        assert!(!row.is_empty());
        assert!(row.values().all(Value::is_null), "shape {}: {:?}", shape, row);
    }
}

#[test]
fn test_case_mode_applies_to_keys_and_field_names() {
    let driver = driver();
    let db = context(&driver);
    let conn = db.connect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();

    let cases = [
        (CASE_LOWER, ["small", "id", "big", "ratio", "name", "amount", "photo"]),
        (CASE_UPPER, ["SMALL", "ID", "BIG", "RATIO", "NAME", "AMOUNT", "PHOTO"]),
        (CASE_NATURAL, ["Small", "Id", "Big", "Ratio", "Name", "Amount", "Photo"]),
    ];
    for (mode, expected) in cases {
        let options = Options::new().with(ATTR_CASE, mode);
        let mut stmt = conn.exec(SELECT_TYPES, &options).unwrap();
        let row = stmt.fetch_assoc(None).unwrap().unwrap();
        let keys: Vec<String> = row
            .keys()
            .map(RowKey::to_string)
            .collect();
        assert_eq!(keys, expected);
        for (index, name) in expected.iter().enumerate() {
            assert_eq!(stmt.field_name(index).unwrap().as_deref(), Some(*name));
        }
    }
}

#[test]
fn test_prebound_parameter_is_used_and_replaced() {
    let driver = driver();
    let db = context(&driver);
    let conn = db.connect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();
    let mut stmt = conn.prepare(SELECT_BY_ID, &Options::new()).unwrap();

    stmt.bind_param(1, 42i64, BindOptions::default()).unwrap();
    assert!(stmt.execute(None).unwrap());
    stmt.bind_param(1, 7i64, BindOptions::default()).unwrap();
    assert!(stmt.execute(None).unwrap());

    let state = driver.state();
    assert_eq!(state.executions.len(), 2);
    assert_eq!(state.executions[0].bindings[&1].buffer, ParamBuffer::Long(42));
    assert_eq!(state.executions[1].bindings[&1].buffer, ParamBuffer::Long(7));
}

#[test]
fn test_tuple_length_mismatch_never_reaches_driver() {
    let driver = driver();
    let db = context(&driver);
    let conn = db.connect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();
    let mut stmt = conn.prepare(SELECT_BY_ID, &Options::new()).unwrap();

    for tuple in [vec![], vec![Value::Int(1), Value::Int(2)]] {
        let err = stmt.execute(Some(tuple.as_slice())).unwrap_err();
        assert!(matches!(err, IbmDbError::Data(_)), "{:?}", err);
    }
    assert!(driver.state().executions.is_empty());
}

#[test]
fn test_exhausted_result_set_stays_at_end() {
    let driver = driver();
    let db = context(&driver);
    let conn = db.connect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();
    let mut stmt = conn.prepare(SELECT_BY_ID, &Options::new()).unwrap();
    stmt.execute(Some(&[Value::Int(42)][..])).unwrap();

    assert!(stmt.fetch_row(None).unwrap());
    assert!(!stmt.fetch_row(None).unwrap());
    assert!(!stmt.fetch_row(None).unwrap());
    assert_eq!(stmt.fetch_assoc(None).unwrap(), None);
}

#[test]
fn test_invalid_sql_reports_sqlcode_through_cached_errormsg() {
    let driver = driver();
    let db = context(&driver);
    let conn = db.connect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();

    assert!(conn.exec("SELEC * FRM T", &Options::new()).is_err());
    let message = db.stmt_errormsg();
    assert!(!message.is_empty());
    assert!(message.contains("SQLCODE=-104"), "{}", message);
    assert_eq!(db.stmt_error(), "42601");
}

#[test]
fn test_persistent_connection_survives_close_of_either_handle() {
    let driver = driver();
    let db = context(&driver);
    let a = db.pconnect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();
    let b = db.pconnect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();
    assert!(a.same_connection(&b));

    a.close().unwrap();
    let mut stmt = b.exec(SELECT_TYPES, &Options::new()).unwrap();
    assert!(stmt.fetch_row(None).unwrap());
    assert_eq!(driver.state().connects.len(), 1);
}

#[test]
fn test_convert_mode_reads_binary_as_hex_text() {
    let driver = driver();
    let db = IbmDb::new(
        Arc::new(driver.clone()),
        EngineConfig {
            bin_mode: BinMode::Convert,
            ..EngineConfig::default()
        },
    );
    let conn = db.connect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();
    let mut stmt = conn.exec(SELECT_TYPES, &Options::new()).unwrap();
    let row = stmt.fetch_assoc(None).unwrap().unwrap();
    assert_eq!(row.by_name("Photo"), Some(&Value::from("DEAD")));
}

#[test]
fn test_closed_connection_rejects_work() {
    let driver = driver();
    let db = context(&driver);
    let conn = db.connect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();
    conn.close().unwrap();
    let err = conn.prepare(SELECT_TYPES, &Options::new()).unwrap_err();
    assert_eq!(err, IbmDbError::ConnectionNotActive);
    assert_eq!(err.to_string(), "Connection is not active");
}

#[test]
fn test_file_parameter_streams_file_content() {
    const INSERT: &str = "INSERT INTO PHOTOS VALUES (?)";
    let driver = MockDriver::new().with_query(INSERT, MockQuery::new().param(SQL_BLOB, 1 << 20));
    let db = context(&driver);
    let conn = db.connect("SAMPLE", "db2inst1", "pw", &Options::new()).unwrap();

    let path = std::env::temp_dir().join(format!("ibm_db_engine_photo_{}.bin", std::process::id()));
    std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();
    let file_bind = || BindOptions::default().direction(ParamDirection::File);

    let mut stmt = conn.prepare(INSERT, &Options::new()).unwrap();
    stmt.bind_param(1, path.to_string_lossy().into_owned(), file_bind()).unwrap();
    assert!(stmt.execute(None).unwrap());
    std::fs::remove_file(&path).unwrap();
    assert_eq!(
        driver.state().executions[0].deferred.get(&1),
        Some(&vec![0x89, b'P', b'N', b'G'])
    );
    assert_eq!(
        driver.state().executions[0].bindings[&1].buffer,
        ParamBuffer::File(path.clone())
    );

    // The file is gone now: the deferred-data loop reports it.
    stmt.bind_param(1, path.to_string_lossy().into_owned(), file_bind()).unwrap();
    let err = stmt.execute(None).unwrap_err();
    assert!(matches!(err, IbmDbError::Data(_)));
    assert!(err.to_string().starts_with("Sending data failed: Cannot read "));
    assert_eq!(driver.state().executions.len(), 1);
}
