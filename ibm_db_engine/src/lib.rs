//! CLI/ODBC binding layer for IBM data servers (Db2 LUW, z/OS, IBM i, Informix).
//!
//! Rust callers use [`IbmDb`], [`Connection`] and [`Statement`] directly; host
//! language extensions go through the integer-handle C ABI in [`ffi`].

pub mod cli;
pub mod config;
pub mod engine;
mod error;
pub mod ffi;
mod handles;
pub mod observability;
pub mod pool;
pub mod protocol;
#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use config::{BinMode, EngineConfig};
pub use engine::{
    BindOptions, CaseMode, ClientInfo, ColumnRef, Connection, IbmDb, OptionValue, Options,
    ParamDirection, ServerInfo, ServerKind, Statement,
};
pub use error::{IbmDbError, Result, StructuredError};
pub use protocol::{decode_values, encode_values, FetchShape, Row, RowKey, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cli::codes::SQL_INTEGER;
    use crate::cli::mock::{column, MockCell, MockDriver, MockQuery, MockResultSet};
    use crate::cli::DiagRecord;

    #[test]
    fn test_public_surface_fetches_through_mock() {
        let driver = MockDriver::new().with_query(
            "SELECT ID FROM T",
            MockQuery::new()
                .result(MockResultSet::new(vec![column("ID", SQL_INTEGER, 10)]).row(vec![MockCell::Int(7)])),
        );
        let db = IbmDb::new(Arc::new(driver), EngineConfig::default());
        let conn = db.connect("SAMPLE", "u", "p", &Options::new()).unwrap();
        let mut stmt = conn.exec("SELECT ID FROM T", &Options::new()).unwrap();
        let row = stmt.fetch_assoc(None).unwrap().unwrap();
        assert_eq!(row.by_name("ID"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_connect_failure_is_cached() {
        let driver = MockDriver::new();
        driver.state().connect_error = Some(vec![DiagRecord::new("08001", -30081, "No route")]);
        let db = IbmDb::new(Arc::new(driver), EngineConfig::default());
        assert!(db.connect("SAMPLE", "u", "p", &Options::new()).is_err());
        assert_eq!(db.conn_error(), "08001");
    }
}
