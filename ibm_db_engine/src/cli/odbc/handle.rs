use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use log::debug;
use odbc_api::handles::{
    slice_to_cow_utf8, AnyHandle, Connection, Environment, Record, SqlResult, StatementImpl,
};
use odbc_api::sys::{AttrOdbcVersion, SqlReturn};

use crate::cli::{CliError, CliResult, DiagRecord};

const MESSAGE_CAPACITY: usize = 512;

/// The process-wide CLI environment. `Environment` is `Send` but not `Sync`;
/// connections are allocated while holding `lock`.
pub(crate) struct SharedEnvironment {
    handle: Environment,
    lock: Mutex<()>,
}

// Safety: `handle` is only used while `lock` is held.
unsafe impl Sync for SharedEnvironment {}

static ENVIRONMENT: OnceLock<SharedEnvironment> = OnceLock::new();

impl SharedEnvironment {
    pub fn get() -> CliResult<&'static SharedEnvironment> {
        if let Some(env) = ENVIRONMENT.get() {
            return Ok(env);
        }
        let handle = match Environment::new() {
            SqlResult::Success(env) | SqlResult::SuccessWithInfo(env) => env,
            _ => return Err(CliError::NoDiagnostic("SQLAllocHandle(SQL_HANDLE_ENV)")),
        };
        let declared = handle.declare_version(AttrOdbcVersion::Odbc3);
        check(&handle, declared)?;
        debug!("CLI environment allocated");
        Ok(ENVIRONMENT.get_or_init(|| SharedEnvironment {
            handle,
            lock: Mutex::new(()),
        }))
    }

    pub fn allocate_connection(&'static self) -> CliResult<Connection<'static>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let allocated = self.handle.allocate_connection();
        check(&self.handle, allocated)
    }
}

/// Statement handle shared with the owning connection, which empties the
/// slot before it disconnects.
pub(crate) type StatementSlot = Mutex<Option<StatementImpl<'static>>>;

pub(crate) fn lock_slot(slot: &StatementSlot) -> MutexGuard<'_, Option<StatementImpl<'static>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of a call whose SQL_NO_DATA or SQL_NEED_DATA return is meaningful.
pub(crate) enum Completed<T> {
    Value(T),
    NoData,
    NeedData,
}

pub(crate) fn succeeded<T>(result: &SqlResult<T>) -> bool {
    matches!(result, SqlResult::Success(_) | SqlResult::SuccessWithInfo(_))
}

/// `SqlResult` of an entry point called outside the handles API.
pub(crate) fn sql_result(ret: SqlReturn, function: &'static str) -> SqlResult<()> {
    match ret {
        SqlReturn::SUCCESS => SqlResult::Success(()),
        SqlReturn::SUCCESS_WITH_INFO => SqlResult::SuccessWithInfo(()),
        SqlReturn::NO_DATA => SqlResult::NoData,
        SqlReturn::NEED_DATA => SqlResult::NeedData,
        SqlReturn::STILL_EXECUTING => SqlResult::StillExecuting,
        _ => SqlResult::Error { function },
    }
}

pub(crate) fn check_completed<T>(
    handle: &(impl AnyHandle + ?Sized),
    result: SqlResult<T>,
) -> CliResult<Completed<T>> {
    match result {
        SqlResult::Success(value) | SqlResult::SuccessWithInfo(value) => Ok(Completed::Value(value)),
        SqlResult::NoData => Ok(Completed::NoData),
        SqlResult::NeedData => Ok(Completed::NeedData),
        SqlResult::StillExecuting => Err(CliError::Local(
            "Asynchronous execution is not enabled on this handle".to_string(),
        )),
        SqlResult::Error { function } => Err(match diagnostic(handle, 1) {
            Some(record) => CliError::Diagnostic(record),
            None => CliError::NoDiagnostic(function),
        }),
    }
}

/// Map a result to a `CliResult`, pulling the first diagnostic on failure.
pub(crate) fn check<T>(handle: &(impl AnyHandle + ?Sized), result: SqlResult<T>) -> CliResult<T> {
    match check_completed(handle, result)? {
        Completed::Value(value) => Ok(value),
        Completed::NoData => Err(CliError::Local("No data available".to_string())),
        Completed::NeedData => Err(CliError::Local(
            "The driver is waiting for deferred parameter data".to_string(),
        )),
    }
}

pub(crate) fn diagnostic(handle: &(impl AnyHandle + ?Sized), recno: i16) -> Option<DiagRecord> {
    if recno < 1 {
        return None;
    }
    let mut record = Record::with_capacity(MESSAGE_CAPACITY);
    if !record.fill_from(handle, recno) {
        return None;
    }
    Some(DiagRecord::new(
        record.state.as_str(),
        record.native_error,
        slice_to_cow_utf8(&record.message).into_owned(),
    ))
}
