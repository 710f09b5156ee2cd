//! C ABI over the process-wide handle registry, driven by the mock driver.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_uint};
use std::ptr;
use std::sync::Arc;

use ibm_db_engine::cli::codes::*;
use ibm_db_engine::cli::mock::{column, MockCell, MockDriver, MockQuery, MockResultSet};
use ibm_db_engine::ffi::*;
use ibm_db_engine::{EngineConfig, IbmDb, StructuredError, Value};
use serial_test::serial;

const SELECT_STAFF: &str = "SELECT ID, NAME FROM STAFF WHERE ID > ?";

fn install() -> MockDriver {
    let driver = MockDriver::new().with_query(
        SELECT_STAFF,
        MockQuery::new().param(SQL_INTEGER, 10).result(
            MockResultSet::new(vec![column("ID", SQL_INTEGER, 10), column("NAME", SQL_VARCHAR, 9)])
                .row(vec![MockCell::Int(10), MockCell::text("Sanders")])
                .row(vec![MockCell::Int(20), MockCell::Null]),
        ),
    );
    let db = IbmDb::new(Arc::new(driver.clone()), EngineConfig::default());
    assert_eq!(install_context(db), 0);
    driver
}

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

fn connect() -> c_uint {
    let (target, user, password) = (c("SAMPLE"), c("db2inst1"), c("pw"));
    let id = ibm_db_connect(target.as_ptr(), user.as_ptr(), password.as_ptr(), ptr::null());
    assert!(id > 0);
    id
}

fn read_string(f: impl FnOnce(*mut c_char, c_uint) -> i32) -> String {
    let mut buffer = vec![0 as c_char; 512];
    let n = f(buffer.as_mut_ptr(), buffer.len() as c_uint);
    assert!(n >= 0, "string call failed: {}", n);
    // Safety: the callee NUL-terminates within the buffer
    unsafe { CStr::from_ptr(buffer.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn fetch_json(stmt: c_uint) -> Option<serde_json::Value> {
    let mut buffer = vec![0u8; 256];
    let mut written: c_uint = 0;
    let rc = ibm_db_fetch_assoc(stmt, 0, buffer.as_mut_ptr(), buffer.len() as c_uint, &mut written);
    match rc {
        0 => Some(serde_json::from_slice(&buffer[..written as usize]).unwrap()),
        1 => None,
        other => panic!("fetch failed: {}", other),
    }
}

#[test]
#[serial]
fn test_prepare_bind_execute_fetch() {
    install();
    let conn = connect();
    let sql = c(SELECT_STAFF);
    let stmt = ibm_db_prepare(conn, sql.as_ptr(), ptr::null());
    assert!(stmt > 0);

    let value = Value::Int(5).encode();
    assert_eq!(
        ibm_db_bind_param(stmt, 1, value.as_ptr(), value.len() as c_uint, -1, -1, -1, -1, -1),
        0
    );
    assert_eq!(ibm_db_execute(stmt, ptr::null(), 0), 0);
    assert_eq!(ibm_db_num_fields(stmt), 2);

    assert_eq!(
        fetch_json(stmt),
        Some(serde_json::json!({"ID": 10, "NAME": "Sanders"}))
    );
    assert_eq!(fetch_json(stmt), Some(serde_json::json!({"ID": 20, "NAME": null})));
    assert_eq!(fetch_json(stmt), None);
    assert_eq!(fetch_json(stmt), None);

    assert_eq!(ibm_db_free_stmt(stmt), 0);
    assert_eq!(ibm_db_num_fields(stmt), -1);
    assert_eq!(ibm_db_close(conn), 0);
    assert_eq!(ibm_db_active(conn), 0);
    assert_eq!(ibm_db_shutdown(), 0);
}

#[test]
#[serial]
fn test_small_buffer_keeps_row_for_retry() {
    install();
    let conn = connect();
    let sql = c(SELECT_STAFF);
    let stmt = ibm_db_prepare(conn, sql.as_ptr(), ptr::null());
    let params = ibm_db_engine::encode_values(&[Value::Int(0)]);
    assert_eq!(ibm_db_execute(stmt, params.as_ptr(), params.len() as c_uint), 0);

    let mut small = [0u8; 4];
    let mut written: c_uint = 0;
    assert_eq!(ibm_db_fetch_array(stmt, 0, small.as_mut_ptr(), 4, &mut written), -2);
    let needed = written as usize;
    assert!(needed > 4);

    let mut buffer = vec![0u8; needed];
    assert_eq!(
        ibm_db_fetch_array(stmt, 0, buffer.as_mut_ptr(), needed as c_uint, &mut written),
        0
    );
    let row: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
    assert_eq!(row, serde_json::json!([10, "Sanders"]));
    ibm_db_shutdown();
}

#[test]
#[serial]
fn test_kept_row_is_reshaped_for_another_fetch_kind() {
    install();
    let conn = connect();
    let sql = c(SELECT_STAFF);
    let stmt = ibm_db_prepare(conn, sql.as_ptr(), ptr::null());
    let params = ibm_db_engine::encode_values(&[Value::Int(0)]);
    assert_eq!(ibm_db_execute(stmt, params.as_ptr(), params.len() as c_uint), 0);

    let mut small = [0u8; 4];
    let mut written: c_uint = 0;
    assert_eq!(ibm_db_fetch_array(stmt, 0, small.as_mut_ptr(), 4, &mut written), -2);

    assert_eq!(
        fetch_json(stmt),
        Some(serde_json::json!({"ID": 10, "NAME": "Sanders"}))
    );
    assert_eq!(fetch_json(stmt), Some(serde_json::json!({"ID": 20, "NAME": null})));
    assert_eq!(fetch_json(stmt), None);
    ibm_db_shutdown();
}

#[test]
#[serial]
fn test_result_and_field_introspection() {
    install();
    let conn = connect();
    let sql = c(SELECT_STAFF);
    let stmt = ibm_db_prepare(conn, sql.as_ptr(), ptr::null());
    let params = ibm_db_engine::encode_values(&[Value::Int(0)]);
    ibm_db_execute(stmt, params.as_ptr(), params.len() as c_uint);
    assert_eq!(ibm_db_fetch_row(stmt, 0), 1);

    let name = c("NAME");
    let mut buffer = [0u8; 64];
    let mut written: c_uint = 0;
    assert_eq!(
        ibm_db_result(stmt, name.as_ptr(), -1, buffer.as_mut_ptr(), 64, &mut written),
        0
    );
    let (value, _) = Value::decode(&buffer[..written as usize]).unwrap();
    assert_eq!(value, Value::from("Sanders"));

    assert_eq!(read_string(|b, n| ibm_db_field_name(stmt, ptr::null(), 0, b, n)), "ID");
    assert_eq!(read_string(|b, n| ibm_db_field_type(stmt, name.as_ptr(), -1, b, n)), "string");
    assert_eq!(ibm_db_field_num(stmt, name.as_ptr(), -1), 1);
    assert_eq!(ibm_db_field_nullable(stmt, name.as_ptr(), -1), 1);
    assert_eq!(ibm_db_field_precision(stmt, ptr::null(), 9), -1);

    let mut out = vec![0 as c_char; 16];
    assert_eq!(ibm_db_field_name(stmt, ptr::null(), 9, out.as_mut_ptr(), 16), -2);
    ibm_db_shutdown();
}

#[test]
#[serial]
fn test_errors_are_reported_through_every_channel() {
    install();
    let conn = connect();
    let bad = c("SELEC nonsense");
    assert_eq!(ibm_db_exec(conn, bad.as_ptr(), ptr::null()), 0);

    assert_eq!(read_string(|b, n| ibm_db_stmt_error(0, b, n)), "42601");
    assert!(read_string(|b, n| ibm_db_stmt_errormsg(0, b, n)).contains("SQLCODE=-104"));

    let mut buffer = [0u8; 512];
    let mut written: c_uint = 0;
    assert_eq!(ibm_db_get_structured_error(buffer.as_mut_ptr(), 512, &mut written), 0);
    let error = StructuredError::deserialize(&buffer[..written as usize]).unwrap();
    assert_eq!(&error.sqlstate, b"42601");
    assert_eq!(error.native_code, -104);
    assert!(read_string(|b, n| ibm_db_get_error(b, n)).starts_with("Statement Execute Failed"));

    assert_eq!(ibm_db_commit(9999), -1);
    assert_eq!(read_string(|b, n| ibm_db_get_error(b, n)), "Invalid connection handle: 9999");
    ibm_db_shutdown();
}

#[test]
#[serial]
fn test_connect_failure_is_cached_for_conn_error() {
    let driver = install();
    driver.state().connect_error = Some(vec![ibm_db_engine::cli::DiagRecord::new(
        "08001",
        -30081,
        "A communication error has been detected.",
    )]);
    let (target, user, password) = (c("SAMPLE"), c("db2inst1"), c("pw"));
    assert_eq!(
        ibm_db_connect(target.as_ptr(), user.as_ptr(), password.as_ptr(), ptr::null()),
        0
    );
    assert_eq!(read_string(|b, n| ibm_db_conn_error(0, b, n)), "08001");
    assert!(read_string(|b, n| ibm_db_conn_errormsg(0, b, n)).contains("SQLCODE=-30081"));
    ibm_db_shutdown();
}

#[test]
#[serial]
fn test_options_are_checked_against_handle_kind() {
    install();
    let conn = connect();
    let json = c(&format!("{{\"{}\": 2}}", ibm_db_engine::engine::ATTR_CASE));
    assert_eq!(ibm_db_set_option(conn, json.as_ptr(), 1), 0);
    assert_eq!(
        read_string(|b, n| ibm_db_get_option(conn, ibm_db_engine::engine::ATTR_CASE, 1, b, n)),
        "2"
    );

    assert_eq!(ibm_db_set_option(conn, json.as_ptr(), 0), -1);
    assert_eq!(
        read_string(|b, n| ibm_db_get_error(b, n)),
        "Connection or statement handle must be passed in."
    );
    ibm_db_shutdown();
}

#[test]
#[serial]
fn test_autocommit_and_pconnect() {
    let driver = install();
    let (target, user, password) = (c("SAMPLE"), c("db2inst1"), c("pw"));
    let a = ibm_db_pconnect(target.as_ptr(), user.as_ptr(), password.as_ptr(), ptr::null());
    let b = ibm_db_pconnect(target.as_ptr(), user.as_ptr(), password.as_ptr(), ptr::null());
    assert!(a > 0 && b > 0 && a != b);
    assert_eq!(driver.state().connects.len(), 1);

    assert_eq!(ibm_db_autocommit(a, -1), 1);
    assert_eq!(ibm_db_autocommit(a, 0), 0);
    assert_eq!(ibm_db_autocommit(b, -1), 0);
    assert_eq!(ibm_db_rollback(a), 0);

    assert_eq!(ibm_db_close(a), 0);
    assert_eq!(ibm_db_active(b), 1);
    assert_eq!(ibm_db_free_connection(a), 0);
    assert_eq!(ibm_db_free_connection(a), -1);
    ibm_db_shutdown();
}

#[test]
#[serial]
fn test_catalog_and_info_calls() {
    let driver = install();
    let conn = connect();
    let schema = c("DB2INST1");
    let stmt = ibm_db_tables(conn, ptr::null(), schema.as_ptr(), ptr::null(), ptr::null());
    assert!(stmt > 0);
    assert_eq!(driver.state().catalog_calls.len(), 1);

    let mut buffer = vec![0u8; 4096];
    let mut written: c_uint = 0;
    assert_eq!(
        ibm_db_server_info(conn, buffer.as_mut_ptr(), buffer.len() as c_uint, &mut written),
        0
    );
    let info: serde_json::Value = serde_json::from_slice(&buffer[..written as usize]).unwrap();
    assert_eq!(info["dbms_name"], "DB2/LINUXX8664");

    assert_eq!(ibm_db_client_info(conn, buffer.as_mut_ptr(), 2, &mut written), -2);
    assert!(written > 2);
    ibm_db_shutdown();
}
