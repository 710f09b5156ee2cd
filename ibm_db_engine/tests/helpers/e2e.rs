//! Gate for tests that need a live Db2 server.

use ibm_db_engine::test_helpers::load_dotenv;
use ibm_db_engine::{Connection, EngineConfig, IbmDb, Options};

use super::env::{get_test_dsn, get_test_password, get_test_user};

/// Checks whether live tests should run: `IBM_DB_TEST_DSN` is set and the
/// driver manager can be loaded.
#[allow(dead_code)]
pub fn should_run_e2e_tests() -> bool {
    load_dotenv();
    if get_test_dsn().is_none() {
        eprintln!("[SKIP] IBM_DB_TEST_DSN not set");
        return false;
    }
    true
}

/// Open a context over the system driver manager and connect to the test
/// database. Returns None (with a notice) when either step fails.
#[allow(dead_code)]
pub fn connect_live() -> Option<(IbmDb, Connection)> {
    if !should_run_e2e_tests() {
        return None;
    }
    let dsn = get_test_dsn()?;
    let db = match IbmDb::with_odbc(EngineConfig::from_env()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("[ERROR] Driver manager unavailable: {}", e);
            return None;
        }
    };
    match db.connect(&dsn, &get_test_user(), &get_test_password(), &Options::new()) {
        Ok(conn) => Some((db, conn)),
        Err(e) => {
            eprintln!("[ERROR] Connection failed: {}", e);
            None
        }
    }
}
