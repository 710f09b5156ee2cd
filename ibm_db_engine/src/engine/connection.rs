use std::fmt;
use std::sync::{Arc, Mutex};

use crate::cli::codes::{
    SQL_ATTR_AUTOCOMMIT, SQL_ATTR_CURSOR_TYPE, SQL_ATTR_REPLACE_QUOTED_LITERALS,
    SQL_AUTOCOMMIT_OFF, SQL_AUTOCOMMIT_ON, SQL_CURSOR_FORWARD_ONLY, SQL_DBMS_NAME,
};
use crate::cli::{AttrValue, CliConnection, CliDriver, Completion};
use crate::config::BinMode;
use crate::error::{IbmDbError, Result};

use super::context::Shared;
use super::diagnostics::{HandleKind, RecnoTracker};
use super::lock;
use super::options::{CaseMode, OptionValue, Options, ATTR_CASE};
use super::statement::{Statement, StatementModes};

/// Server family, from the DBMS name reported after connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerKind {
    #[default]
    Db2,
    /// IBM i ("AS").
    As400,
    /// Informix ("IDS...").
    Informix,
}

impl ServerKind {
    pub fn from_dbms_name(name: &str) -> Self {
        let name = name.trim();
        if name == "AS" {
            ServerKind::As400
        } else if name.starts_with("IDS") {
            ServerKind::Informix
        } else {
            ServerKind::Db2
        }
    }
}

pub(crate) struct ConnectionState {
    pub(crate) cli: Box<dyn CliConnection>,
    pub(crate) active: bool,
    persistent: bool,
    autocommit: bool,
    pub(crate) modes: StatementModes,
    recno: RecnoTracker,
    server: ServerKind,
}

impl ConnectionState {
    fn apply_option(&mut self, shared: &Shared, key: i32, value: &OptionValue) -> Result<()> {
        match key {
            ATTR_CASE => {
                self.modes.case_mode = CaseMode::parse(value)?;
                Ok(())
            }
            // Kept as the default for statements created on this connection.
            SQL_ATTR_CURSOR_TYPE => {
                self.modes.cursor_attr = value.as_int().ok_or_else(|| {
                    IbmDbError::Argument("SQL_ATTR_CURSOR_TYPE needs an integer value".to_string())
                })?;
                Ok(())
            }
            _ => {
                self.cli
                    .set_attr(key, &AttrValue::from(value))
                    .map_err(|e| shared.fail(HandleKind::Connection, "", e))?;
                if key == SQL_ATTR_AUTOCOMMIT {
                    self.autocommit = value.as_int() == Some(SQL_AUTOCOMMIT_ON);
                }
                Ok(())
            }
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(IbmDbError::ConnectionNotActive)
        }
    }
}

/// Shared handle to one database connection. Clones refer to the same
/// session; persistent connections are also held by the context's table.
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Arc<Mutex<ConnectionState>>,
    pub(crate) shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Connection");
        if let Ok(state) = self.inner.lock() {
            s.field("active", &state.active)
                .field("persistent", &state.persistent)
                .field("autocommit", &state.autocommit)
                .field("server", &state.server);
        }
        s.finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn open(
        driver: &dyn CliDriver,
        shared: Arc<Shared>,
        target: &str,
        user: &str,
        password: &str,
        options: &Options,
        persistent: bool,
    ) -> Result<Self> {
        let cli = driver
            .allocate_connection()
            .map_err(|e| shared.fail(HandleKind::Connection, "", e))?;
        let mut state = ConnectionState {
            cli,
            active: false,
            persistent,
            autocommit: true,
            modes: StatementModes {
                bin_mode: shared.config.bin_mode,
                case_mode: CaseMode::Natural,
                cursor_attr: SQL_CURSOR_FORWARD_ONLY,
            },
            recno: RecnoTracker::default(),
            server: ServerKind::Db2,
        };
        for (key, value) in options.iter() {
            state.apply_option(&shared, *key, value)?;
        }

        let connected = if target.contains('=') {
            state.cli.driver_connect(target)
        } else {
            state.cli.connect(target, user, password)
        };
        if let Err(e) = connected {
            shared
                .logger
                .log_connection(log::Level::Warn, target, "connect failed");
            // Dropping `state` frees the half-built connection handle.
            return Err(shared.fail(HandleKind::Connection, "", e));
        }
        state.active = true;

        state.server = match state.cli.get_info_str(SQL_DBMS_NAME) {
            Ok(name) => ServerKind::from_dbms_name(&name),
            Err(e) => {
                log::warn!("Could not read DBMS name, assuming DB2: {}", e);
                ServerKind::Db2
            }
        };
        if state.server != ServerKind::Informix {
            if let Err(e) = state
                .cli
                .set_attr(SQL_ATTR_REPLACE_QUOTED_LITERALS, &AttrValue::Int(1))
            {
                log::debug!("Replace-quoted-literals not accepted: {}", e);
            }
        }

        log::debug!(
            "Connected ({}persistent, {:?})",
            if persistent { "" } else { "non-" },
            state.server
        );
        shared
            .logger
            .log_connection(log::Level::Info, target, "open");
        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
            shared,
        })
    }

    /// Close the session. Persistent connections stay open in the table.
    pub fn close(&self) -> Result<()> {
        let mut state = lock(&self.inner)?;
        state.ensure_active()?;
        if state.persistent {
            return Ok(());
        }
        if !state.autocommit {
            state
                .cli
                .end_transaction(Completion::Rollback)
                .map_err(|e| self.shared.fail(HandleKind::Connection, "", e))?;
        }
        state
            .cli
            .disconnect()
            .map_err(|e| self.shared.fail(HandleKind::Connection, "", e))?;
        state.active = false;
        log::debug!("Connection closed");
        Ok(())
    }

    /// Disconnect regardless of persistence; used when a pooled entry is dropped.
    pub(crate) fn discard(&self) {
        if let Ok(mut state) = self.inner.lock() {
            if state.active {
                if let Err(e) = state.cli.disconnect() {
                    log::warn!("Disconnect of discarded connection failed: {}", e);
                }
                state.active = false;
            }
        }
    }

    /// Open and answering the driver's liveness check.
    pub fn active(&self) -> Result<bool> {
        let state = lock(&self.inner)?;
        Ok(state.active && state.cli.is_alive())
    }

    pub fn is_persistent(&self) -> Result<bool> {
        Ok(lock(&self.inner)?.persistent)
    }

    pub fn server_kind(&self) -> Result<ServerKind> {
        Ok(lock(&self.inner)?.server)
    }

    pub fn same_connection(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn autocommit(&self) -> Result<bool> {
        let state = lock(&self.inner)?;
        state.ensure_active()?;
        Ok(state.autocommit)
    }

    pub fn set_autocommit(&self, on: bool) -> Result<()> {
        let mut state = lock(&self.inner)?;
        state.ensure_active()?;
        let value = if on { SQL_AUTOCOMMIT_ON } else { SQL_AUTOCOMMIT_OFF };
        state.apply_option(&self.shared, SQL_ATTR_AUTOCOMMIT, &OptionValue::Int(value))
    }

    pub fn commit(&self) -> Result<()> {
        self.end_transaction(Completion::Commit)
    }

    pub fn rollback(&self) -> Result<()> {
        self.end_transaction(Completion::Rollback)
    }

    fn end_transaction(&self, completion: Completion) -> Result<()> {
        let mut state = lock(&self.inner)?;
        state.ensure_active()?;
        state
            .cli
            .end_transaction(completion)
            .map_err(|e| self.shared.fail(HandleKind::Connection, "", e))
    }

    pub fn bin_mode(&self) -> Result<BinMode> {
        Ok(lock(&self.inner)?.modes.bin_mode)
    }

    /// Binary-column representation for statements created from now on.
    pub fn set_bin_mode(&self, mode: BinMode) -> Result<()> {
        lock(&self.inner)?.modes.bin_mode = mode;
        Ok(())
    }

    pub fn case_mode(&self) -> Result<CaseMode> {
        Ok(lock(&self.inner)?.modes.case_mode)
    }

    pub fn set_option(&self, options: &Options) -> Result<()> {
        let mut state = lock(&self.inner)?;
        state.ensure_active()?;
        for (key, value) in options.iter() {
            state.apply_option(&self.shared, *key, value)?;
        }
        Ok(())
    }

    /// Read a connection attribute as text.
    pub fn get_option(&self, key: i32) -> Result<OptionValue> {
        let state = lock(&self.inner)?;
        state.ensure_active()?;
        match key {
            ATTR_CASE => Ok(OptionValue::Int(state.modes.case_mode.code())),
            _ => state
                .cli
                .get_attr_str(key)
                .map(OptionValue::Str)
                .map_err(|e| self.shared.fail(HandleKind::Connection, "", e)),
        }
    }

    /// SQLSTATE of the next diagnostic record of this connection.
    pub fn error(&self) -> Result<String> {
        let mut guard = lock(&self.inner)?;
        let state = &mut *guard;
        let cli = &state.cli;
        Ok(state.recno.next_state(|n| cli.diagnostic(n)))
    }

    /// Message of the next diagnostic record of this connection.
    pub fn errormsg(&self) -> Result<String> {
        let mut guard = lock(&self.inner)?;
        let state = &mut *guard;
        let cli = &state.cli;
        Ok(state.recno.next_message(|n| cli.diagnostic(n)))
    }

    /// Allocate a driver statement with this connection's statement defaults.
    pub(crate) fn new_statement(&self, sql: Option<&str>) -> Result<Statement> {
        let (cli, modes) = {
            let mut state = lock(&self.inner)?;
            state.ensure_active()?;
            let cli = state
                .cli
                .allocate_statement()
                .map_err(|e| self.shared.fail(HandleKind::Connection, "", e))?;
            (cli, state.modes)
        };
        Statement::new(self.inner.clone(), self.shared.clone(), cli, modes, sql)
    }

    /// Prepare `sql` for one or more executions.
    pub fn prepare(&self, sql: &str, options: &Options) -> Result<Statement> {
        self.shared.clear(HandleKind::Statement);
        let mut stmt = self.new_statement(Some(sql))?;
        stmt.set_option(options)?;
        stmt.prepare_sql()?;
        Ok(stmt)
    }

    /// Prepare and execute `sql`, which must not contain parameter markers.
    pub fn exec(&self, sql: &str, options: &Options) -> Result<Statement> {
        self.shared.clear(HandleKind::Statement);
        let mut stmt = self.new_statement(Some(sql))?;
        stmt.set_option(options)?;
        stmt.exec_sql()?;
        Ok(stmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::codes::{SQL_ATTR_CURRENT_SCHEMA, SQL_CURSOR_STATIC};
    use crate::cli::mock::MockDriver;
    use crate::config::EngineConfig;
    use crate::engine::context::IbmDb;
    use crate::engine::options::{CASE_LOWER, CASE_ERROR};

    fn open(driver: &MockDriver, options: &Options) -> (IbmDb, Connection) {
        let db = IbmDb::new(Arc::new(driver.clone()), EngineConfig::default());
        let conn = db.connect("SAMPLE", "u", "p", options).unwrap();
        (db, conn)
    }

    #[test]
    fn test_server_kind_from_dbms_name() {
        assert_eq!(ServerKind::from_dbms_name("AS"), ServerKind::As400);
        assert_eq!(ServerKind::from_dbms_name("IDS/UNIX64"), ServerKind::Informix);
        assert_eq!(ServerKind::from_dbms_name("DB2/LINUXX8664"), ServerKind::Db2);
    }

    #[test]
    fn test_connect_sets_replace_quoted_literals_except_informix() {
        let driver = MockDriver::new();
        let (_db, _conn) = open(&driver, &Options::new());
        assert!(driver
            .state()
            .conn_attrs
            .contains(&(SQL_ATTR_REPLACE_QUOTED_LITERALS, AttrValue::Int(1))));

        let driver = MockDriver::new();
        driver
            .state()
            .info_str
            .insert(SQL_DBMS_NAME, "IDS/UNIX64".to_string());
        let (_db, conn) = open(&driver, &Options::new());
        assert_eq!(conn.server_kind().unwrap(), ServerKind::Informix);
        assert!(driver.state().conn_attrs.is_empty());
    }

    #[test]
    fn test_rejected_replace_quoted_literals_is_ignored() {
        let driver = MockDriver::new();
        driver
            .state()
            .rejected_attrs
            .insert(SQL_ATTR_REPLACE_QUOTED_LITERALS);
        let (_db, conn) = open(&driver, &Options::new());
        assert!(conn.active().unwrap());
    }

    #[test]
    fn test_rejected_connect_option_fails_connect() {
        let driver = MockDriver::new();
        driver.state().rejected_attrs.insert(SQL_ATTR_CURRENT_SCHEMA);
        let db = IbmDb::new(Arc::new(driver.clone()), EngineConfig::default());
        let options = Options::new().with(SQL_ATTR_CURRENT_SCHEMA, "APP");
        assert!(db.connect("SAMPLE", "u", "p", &options).is_err());
        assert_eq!(db.conn_error(), "HY092");
        assert!(driver.state().connects.is_empty());
    }

    #[test]
    fn test_invalid_case_option() {
        let driver = MockDriver::new();
        let db = IbmDb::new(Arc::new(driver.clone()), EngineConfig::default());
        let err = db
            .connect("SAMPLE", "u", "p", &Options::new().with(ATTR_CASE, 7i64))
            .unwrap_err();
        assert_eq!(err, IbmDbError::Argument(CASE_ERROR.to_string()));
    }

    #[test]
    fn test_close_rolls_back_without_autocommit() {
        let driver = MockDriver::new();
        let (_db, conn) = open(&driver, &Options::new());
        conn.set_autocommit(false).unwrap();
        assert!(!conn.autocommit().unwrap());
        conn.close().unwrap();
        assert_eq!(driver.state().end_transactions, vec![Completion::Rollback]);
        assert_eq!(driver.state().disconnects, 1);
        assert!(!conn.active().unwrap());
    }

    #[test]
    fn test_close_twice_fails() {
        let driver = MockDriver::new();
        let (_db, conn) = open(&driver, &Options::new());
        conn.close().unwrap();
        assert_eq!(conn.close(), Err(IbmDbError::ConnectionNotActive));
        assert_eq!(conn.commit(), Err(IbmDbError::ConnectionNotActive));
        assert!(matches!(
            conn.prepare("VALUES 1", &Options::new()),
            Err(IbmDbError::ConnectionNotActive)
        ));
    }

    #[test]
    fn test_commit_and_rollback() {
        let driver = MockDriver::new();
        let (_db, conn) = open(&driver, &Options::new());
        conn.commit().unwrap();
        conn.rollback().unwrap();
        assert_eq!(
            driver.state().end_transactions,
            vec![Completion::Commit, Completion::Rollback]
        );
    }

    #[test]
    fn test_connection_options() {
        let driver = MockDriver::new();
        let (_db, conn) = open(&driver, &Options::new());
        conn.set_option(
            &Options::new()
                .with(ATTR_CASE, CASE_LOWER)
                .with(SQL_ATTR_CURSOR_TYPE, SQL_CURSOR_STATIC)
                .with(SQL_ATTR_CURRENT_SCHEMA, "APP"),
        )
        .unwrap();
        assert_eq!(conn.case_mode().unwrap(), CaseMode::Lower);
        assert_eq!(
            conn.get_option(SQL_ATTR_CURRENT_SCHEMA).unwrap(),
            OptionValue::Str("APP".to_string())
        );
        assert_eq!(conn.get_option(ATTR_CASE).unwrap(), OptionValue::Int(CASE_LOWER));
        // The cursor type is a statement default and never reaches the driver connection.
        assert!(!driver
            .state()
            .conn_attrs
            .iter()
            .any(|(k, _)| *k == SQL_ATTR_CURSOR_TYPE));
    }

    #[test]
    fn test_connection_diagnostics_walk() {
        let driver = MockDriver::new();
        let (_db, conn) = open(&driver, &Options::new());
        driver.state().rejected_attrs.insert(SQL_ATTR_CURRENT_SCHEMA);
        assert!(conn
            .set_option(&Options::new().with(SQL_ATTR_CURRENT_SCHEMA, "X"))
            .is_err());
        assert_eq!(conn.error().unwrap(), "HY092");
        assert_eq!(conn.errormsg().unwrap(), "Option type out of range. SQLCODE=-99999");
        assert_eq!(conn.errormsg().unwrap(), "");
    }

    #[test]
    fn test_same_connection() {
        let driver = MockDriver::new();
        let (db, a) = open(&driver, &Options::new());
        let b = db.connect("SAMPLE", "u", "p", &Options::new()).unwrap();
        assert!(a.same_connection(&a.clone()));
        assert!(!a.same_connection(&b));
    }

    #[test]
    fn test_only_pconnect_handles_are_persistent() {
        let driver = MockDriver::new();
        let (db, plain) = open(&driver, &Options::new());
        assert!(!plain.is_persistent().unwrap());
        let kept = db.pconnect("SAMPLE", "u", "p", &Options::new()).unwrap();
        assert!(kept.is_persistent().unwrap());
        kept.close().unwrap();
        let again = db.pconnect("SAMPLE", "u", "p", &Options::new()).unwrap();
        assert!(again.is_persistent().unwrap());
        assert!(again.same_connection(&kept));
    }
}
