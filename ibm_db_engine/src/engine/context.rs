use std::sync::{Arc, Mutex, MutexGuard};

use crate::cli::odbc::OdbcDriver;
use crate::cli::{CliDriver, CliError};
use crate::config::EngineConfig;
use crate::error::{driver, IbmDbError, Result};
use crate::observability::StructuredLogger;
use crate::pool::{PersistentPool, PoolKey};

use super::connection::Connection;
use super::diagnostics::{ErrorCache, HandleKind};
use super::lock;
use super::options::Options;

/// State every connection and statement of one context reaches back into.
pub(crate) struct Shared {
    errors: Mutex<ErrorCache>,
    pub(crate) logger: StructuredLogger,
    pub(crate) config: EngineConfig,
}

impl Shared {
    fn new(config: EngineConfig) -> Self {
        Self {
            errors: Mutex::new(ErrorCache::new()),
            logger: StructuredLogger::new(config.log_statements),
            config,
        }
    }

    fn errors(&self) -> MutexGuard<'_, ErrorCache> {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot a driver failure into the cache of its handle kind and wrap it.
    pub(crate) fn fail(&self, kind: HandleKind, context: &str, err: CliError) -> IbmDbError {
        self.errors().record(kind, &err);
        let state = err.record().map(|r| r.state_str()).unwrap_or_default();
        log::debug!("{:?} error [{}]: {}", kind, state, err);
        self.logger.log_error(
            &err.formatted(),
            &[("handle", format!("{:?}", kind)), ("sqlstate", state)],
        );
        driver(context, err)
    }

    pub(crate) fn clear(&self, kind: HandleKind) {
        self.errors().clear(kind);
    }

    fn state(&self, kind: HandleKind) -> String {
        self.errors().state(kind).to_string()
    }

    fn message(&self, kind: HandleKind) -> String {
        self.errors().message(kind).to_string()
    }
}

/// One binding context: the driver environment, the "last error" caches and
/// the persistent-connection table.
pub struct IbmDb {
    driver: Arc<dyn CliDriver>,
    shared: Arc<Shared>,
    pool: Mutex<PersistentPool>,
}

impl IbmDb {
    pub fn new(driver: Arc<dyn CliDriver>, config: EngineConfig) -> Self {
        let pool = PersistentPool::new(config.persistent_capacity);
        Self {
            driver,
            shared: Arc::new(Shared::new(config)),
            pool: Mutex::new(pool),
        }
    }

    /// Context over the system ODBC driver manager.
    pub fn with_odbc(config: EngineConfig) -> Result<Self> {
        let driver = OdbcDriver::new().map_err(|e| driver("Environment allocation failed: ", e))?;
        Ok(Self::new(Arc::new(driver), config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Open a fresh connection. A `target` containing `=` is used as a
    /// connection string, anything else as a cataloged database alias.
    pub fn connect(
        &self,
        target: &str,
        user: &str,
        password: &str,
        options: &Options,
    ) -> Result<Connection> {
        self.shared.clear(HandleKind::Connection);
        Connection::open(
            self.driver.as_ref(),
            self.shared.clone(),
            target,
            user,
            password,
            options,
            false,
        )
    }

    /// Reuse the live persistent connection registered for these credentials,
    /// or open and register a new one.
    pub fn pconnect(
        &self,
        target: &str,
        user: &str,
        password: &str,
        options: &Options,
    ) -> Result<Connection> {
        self.shared.clear(HandleKind::Connection);
        let key = PoolKey::new(user, target, password);
        let mut pool = lock(&self.pool)?;

        if let Some(existing) = pool.get(&key) {
            if existing.active()? {
                self.shared
                    .logger
                    .log_connection(log::Level::Debug, target, "reuse");
                return Ok(existing);
            }
            log::warn!("Discarding dead persistent connection");
            if let Some(stale) = pool.remove(&key) {
                stale.discard();
            }
        }

        let persistent = pool.has_room();
        if !persistent {
            log::warn!(
                "Persistent connection table is full ({} entries); opening a regular connection",
                pool.len()
            );
        }
        let conn = Connection::open(
            self.driver.as_ref(),
            self.shared.clone(),
            target,
            user,
            password,
            options,
            persistent,
        )?;
        if persistent {
            pool.insert(key, conn.clone());
        }
        Ok(conn)
    }

    /// Number of registered persistent connections.
    pub fn persistent_count(&self) -> Result<usize> {
        Ok(lock(&self.pool)?.len())
    }

    pub fn conn_error(&self) -> String {
        self.shared.state(HandleKind::Connection)
    }

    pub fn conn_errormsg(&self) -> String {
        self.shared.message(HandleKind::Connection)
    }

    pub fn stmt_error(&self) -> String {
        self.shared.state(HandleKind::Statement)
    }

    pub fn stmt_errormsg(&self) -> String {
        self.shared.message(HandleKind::Statement)
    }
}

impl Drop for IbmDb {
    fn drop(&mut self) {
        if let Ok(mut pool) = self.pool.lock() {
            for conn in pool.drain() {
                conn.discard();
            }
        }
    }
}
