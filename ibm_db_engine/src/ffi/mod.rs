// Allow FFI functions to dereference raw pointers without being marked unsafe
// This is expected for extern "C" FFI boundaries
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint};
use std::sync::{Mutex, MutexGuard, OnceLock};

use serde::Serialize;

use crate::config::EngineConfig;
use crate::engine::options::HANDLE_KIND_ERROR;
use crate::engine::{
    BindOptions, ColumnRef, IbmDb, OptionValue, Options, ParamDirection, Statement,
    RESOURCE_CONNECTION,
};
use crate::error::{IbmDbError, Result, StructuredError};
use crate::handles::{HandleRef, HandleRegistry};
use crate::protocol::{decode_values, FetchShape, Value};

struct FfiState {
    db: Option<IbmDb>,
    registry: HandleRegistry,
    /// Rows that did not fit the caller's buffer, by statement id.
    pending_rows: HashMap<u32, PendingRow>,
    last_error: Option<StructuredError>,
}

impl FfiState {
    fn new() -> Self {
        Self {
            db: None,
            registry: HandleRegistry::new(),
            pending_rows: HashMap::new(),
            last_error: None,
        }
    }

    /// Release every handle, statements first, then the context.
    fn reset(&mut self) {
        self.pending_rows.clear();
        self.registry.clear();
        self.db = None;
    }
}

static STATE: OnceLock<Mutex<FfiState>> = OnceLock::new();

/// Returns None if the mutex is poisoned, avoiding a panic across the ABI.
fn try_lock_state() -> Option<MutexGuard<'static, FfiState>> {
    STATE.get_or_init(|| Mutex::new(FfiState::new())).lock().ok()
}

fn context(db: &Option<IbmDb>) -> Result<&IbmDb> {
    db.as_ref()
        .ok_or_else(|| IbmDbError::Internal("ibm_db_init has not been called".to_string()))
}

/// Run `f` on the locked state. A failure is stored as the last error and
/// `on_error` is returned instead.
fn call<T>(on_error: T, f: impl FnOnce(&mut FfiState) -> Result<T>) -> T {
    let Some(mut state) = try_lock_state() else {
        return on_error;
    };
    match f(&mut state) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("FFI call failed: {}", e);
            state.last_error = Some(e.to_structured());
            on_error
        }
    }
}

fn text<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(IbmDbError::Argument(format!("{} must not be null", what)));
    }
    // Safety: `ptr` must be a valid null-terminated C string that outlives this call
    let c_str = unsafe { CStr::from_ptr(ptr) };
    c_str
        .to_str()
        .map_err(|_| IbmDbError::Argument(format!("{} is not valid UTF-8", what)))
}

fn optional_text<'a>(ptr: *const c_char) -> Result<Option<&'a str>> {
    if ptr.is_null() {
        Ok(None)
    } else {
        text(ptr, "filter").map(Some)
    }
}

fn options(ptr: *const c_char) -> Result<Options> {
    match optional_text(ptr)? {
        Some(json) => Options::from_json(json),
        None => Ok(Options::new()),
    }
}

fn bytes<'a>(ptr: *const u8, len: c_uint) -> Option<&'a [u8]> {
    if ptr.is_null() {
        return None;
    }
    // Safety: `ptr` must be valid for reads of `len` bytes
    Some(unsafe { std::slice::from_raw_parts(ptr, len as usize) })
}

/// Copy `data` into the caller's buffer: `Ok(0)` on success, `Ok(-2)` when
/// it does not fit. `out_written` receives the full length either way.
fn write_bytes(data: &[u8], buffer: *mut u8, buffer_len: c_uint, out_written: *mut c_uint) -> Result<c_int> {
    if buffer.is_null() || out_written.is_null() {
        return Err(IbmDbError::Argument("Output buffer must not be null".to_string()));
    }
    // Safety: `out_written` must be valid for a c_uint write and `buffer` for
    // `buffer_len` bytes; both were null-checked above
    unsafe {
        *out_written = data.len() as c_uint;
        if data.len() > buffer_len as usize {
            return Ok(-2);
        }
        std::ptr::copy_nonoverlapping(data.as_ptr(), buffer, data.len());
    }
    Ok(0)
}

/// Copy a string NUL-terminated, truncating to the buffer. Returns the bytes
/// written without the terminator, -1 on a null or empty buffer.
fn write_c_string(value: &str, buffer: *mut c_char, buffer_len: c_uint) -> c_int {
    if buffer.is_null() || buffer_len == 0 {
        return -1;
    }
    let bytes = value.as_bytes();
    let copy_len = bytes.len().min(buffer_len as usize - 1);
    // Safety: `buffer` must be valid for writes of `buffer_len` bytes
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer as *mut u8, copy_len);
        *buffer.add(copy_len) = 0;
    }
    copy_len as c_int
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| IbmDbError::Internal(format!("JSON encoding failed: {}", e)))
}

/// `0` means "next row"; anything else is an explicit row number.
fn row_number(n: i64) -> Option<i64> {
    (n != 0).then_some(n)
}

fn column_ref(name: *const c_char, index: c_int) -> Result<ColumnRef> {
    match optional_text(name)? {
        Some(name) => Ok(ColumnRef::from(name)),
        None if index >= 0 => Ok(ColumnRef::Index(index as usize)),
        None => Err(IbmDbError::Argument("Column name or index required".to_string())),
    }
}

/// Install an already built context, replacing any previous one.
pub fn install_context(db: IbmDb) -> c_int {
    let Some(mut state) = try_lock_state() else {
        return -1;
    };
    state.reset();
    state.db = Some(db);
    0
}

/// Create the context over the system ODBC driver manager, configured from
/// the environment. Idempotent.
/// Returns: 0 on success, 1 on failure, -1 if the state is unusable
#[no_mangle]
pub extern "C" fn ibm_db_init() -> c_int {
    let Some(mut state) = try_lock_state() else {
        return -1;
    };
    if state.db.is_some() {
        return 0;
    }
    match IbmDb::with_odbc(EngineConfig::from_env()) {
        Ok(db) => {
            state.db = Some(db);
            0
        }
        Err(e) => {
            log::error!("ibm_db_init failed: {}", e);
            state.last_error = Some(e.to_structured());
            1
        }
    }
}

/// Drop every handle and the context; persistent connections are disconnected.
#[no_mangle]
pub extern "C" fn ibm_db_shutdown() -> c_int {
    let Some(mut state) = try_lock_state() else {
        return -1;
    };
    state.reset();
    0
}

fn open_connection(
    target: *const c_char,
    user: *const c_char,
    password: *const c_char,
    options_json: *const c_char,
    persistent: bool,
) -> c_uint {
    call(0, |state| {
        let target = text(target, "database")?;
        let user = optional_text(user)?.unwrap_or("");
        let password = optional_text(password)?.unwrap_or("");
        let options = options(options_json)?;
        let db = context(&state.db)?;
        let conn = if persistent {
            db.pconnect(target, user, password, &options)?
        } else {
            db.connect(target, user, password, &options)?
        };
        Ok(state.registry.insert_connection(conn))
    })
}

/// Open a connection. `target` is a cataloged alias or a `KEY=value;` string.
/// Returns: connection id (>0), 0 on failure
#[no_mangle]
pub extern "C" fn ibm_db_connect(
    target: *const c_char,
    user: *const c_char,
    password: *const c_char,
    options_json: *const c_char,
) -> c_uint {
    open_connection(target, user, password, options_json, false)
}

/// Reuse or open a persistent connection for the same credentials.
/// Returns: connection id (>0), 0 on failure
#[no_mangle]
pub extern "C" fn ibm_db_pconnect(
    target: *const c_char,
    user: *const c_char,
    password: *const c_char,
    options_json: *const c_char,
) -> c_uint {
    open_connection(target, user, password, options_json, true)
}

#[no_mangle]
pub extern "C" fn ibm_db_close(conn_id: c_uint) -> c_int {
    call(-1, |state| {
        state.registry.connection(conn_id)?.close()?;
        Ok(0)
    })
}

/// Forget a connection id. The session itself ends once no statement uses it.
#[no_mangle]
pub extern "C" fn ibm_db_free_connection(conn_id: c_uint) -> c_int {
    call(-1, |state| {
        state.registry.remove_connection(conn_id)?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_commit(conn_id: c_uint) -> c_int {
    call(-1, |state| {
        state.registry.connection(conn_id)?.commit()?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_rollback(conn_id: c_uint) -> c_int {
    call(-1, |state| {
        state.registry.connection(conn_id)?.rollback()?;
        Ok(0)
    })
}

/// `value` 0 or 1 sets autocommit, a negative value only reads it.
/// Returns: autocommit state after the call (0/1), -1 on error
#[no_mangle]
pub extern "C" fn ibm_db_autocommit(conn_id: c_uint, value: c_int) -> c_int {
    call(-1, |state| {
        let conn = state.registry.connection(conn_id)?;
        if value >= 0 {
            conn.set_autocommit(value != 0)?;
        }
        Ok(c_int::from(conn.autocommit()?))
    })
}

/// Returns: 1 active, 0 closed or dead, -1 on error
#[no_mangle]
pub extern "C" fn ibm_db_active(conn_id: c_uint) -> c_int {
    call(-1, |state| {
        Ok(c_int::from(state.registry.connection(conn_id)?.active()?))
    })
}

fn new_statement(conn_id: c_uint, sql: *const c_char, options_json: *const c_char, run: bool) -> c_uint {
    call(0, |state| {
        let sql = text(sql, "sql")?;
        let options = options(options_json)?;
        let conn = state.registry.connection(conn_id)?;
        let stmt = if run {
            conn.exec(sql, &options)?
        } else {
            conn.prepare(sql, &options)?
        };
        Ok(state.registry.insert_statement(stmt))
    })
}

/// Returns: statement id (>0), 0 on failure
#[no_mangle]
pub extern "C" fn ibm_db_prepare(conn_id: c_uint, sql: *const c_char, options_json: *const c_char) -> c_uint {
    new_statement(conn_id, sql, options_json, false)
}

/// Prepare and execute in one step. Returns: statement id (>0), 0 on failure
#[no_mangle]
pub extern "C" fn ibm_db_exec(conn_id: c_uint, sql: *const c_char, options_json: *const c_char) -> c_uint {
    new_statement(conn_id, sql, options_json, true)
}

#[no_mangle]
pub extern "C" fn ibm_db_free_result(stmt_id: c_uint) -> c_int {
    call(-1, |state| {
        state.pending_rows.remove(&stmt_id);
        state.registry.statement_mut(stmt_id)?.free_result()?;
        Ok(0)
    })
}

/// Release the statement id and its driver statement.
#[no_mangle]
pub extern "C" fn ibm_db_free_stmt(stmt_id: c_uint) -> c_int {
    call(-1, |state| {
        state.pending_rows.remove(&stmt_id);
        state.registry.remove_statement(stmt_id)?;
        Ok(0)
    })
}

/// Returns: id of a statement positioned on the next result set, 0 when
/// there is none or on failure (see `ibm_db_get_error`)
#[no_mangle]
pub extern "C" fn ibm_db_next_result(stmt_id: c_uint) -> c_uint {
    call(0, |state| {
        let next = state.registry.statement_mut(stmt_id)?.next_result()?;
        Ok(next.map_or(0, |stmt| state.registry.insert_statement(stmt)))
    })
}

/// Bind one codec-encoded value (NULL buffer binds SQL NULL) to marker
/// `position`. Negative `direction`, `sql_type`, `precision`, `scale` or
/// `size` means "not supplied".
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn ibm_db_bind_param(
    stmt_id: c_uint,
    position: c_uint,
    value_buffer: *const u8,
    value_len: c_uint,
    direction: c_int,
    sql_type: c_int,
    precision: c_int,
    scale: c_int,
    size: c_int,
) -> c_int {
    call(-1, |state| {
        let value = match bytes(value_buffer, value_len) {
            Some(data) => Value::decode(data)?.0,
            None => Value::Null,
        };
        let mut bind = BindOptions::default();
        if direction >= 0 {
            bind = bind.direction(ParamDirection::from_code(direction as i16)?);
        }
        if sql_type >= 0 {
            bind = bind.sql_type(sql_type as i16);
        }
        if precision >= 0 {
            bind = bind.precision(precision as usize);
        }
        if scale >= 0 {
            bind = bind.scale(scale as i16);
        }
        if size >= 0 {
            bind = bind.size(size as usize);
        }
        let position = u16::try_from(position)
            .map_err(|_| IbmDbError::Argument(format!("Invalid parameter position: {}", position)))?;
        state
            .registry
            .statement_mut(stmt_id)?
            .bind_param(position, value, bind)?;
        Ok(0)
    })
}

/// Execute with the codec-encoded values in `params_buffer`, or with the
/// values registered by `ibm_db_bind_param` when it is NULL.
#[no_mangle]
pub extern "C" fn ibm_db_execute(stmt_id: c_uint, params_buffer: *const u8, params_len: c_uint) -> c_int {
    call(-1, |state| {
        let params = bytes(params_buffer, params_len).map(decode_values).transpose()?;
        state.pending_rows.remove(&stmt_id);
        state
            .registry
            .statement_mut(stmt_id)?
            .execute(params.as_deref())?;
        Ok(0)
    })
}

/// Encoded value of an output parameter after execute.
/// Returns: 0 written, 1 no output value, -1 error, -2 buffer too small
#[no_mangle]
pub extern "C" fn ibm_db_param_value(
    stmt_id: c_uint,
    position: c_uint,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    call(-1, |state| {
        let position = u16::try_from(position)
            .map_err(|_| IbmDbError::Argument(format!("Invalid parameter position: {}", position)))?;
        match state.registry.statement_mut(stmt_id)?.param_value(position) {
            Some(value) => write_bytes(&value.encode(), buffer, buffer_len, out_written),
            None => Ok(1),
        }
    })
}

/// Returns: 1 on a row, 0 at end of data, -1 on error
#[no_mangle]
pub extern "C" fn ibm_db_fetch_row(stmt_id: c_uint, row_number_value: i64) -> c_int {
    call(-1, |state| {
        state.pending_rows.remove(&stmt_id);
        let found = state
            .registry
            .statement_mut(stmt_id)?
            .fetch_row(row_number(row_number_value))?;
        Ok(c_int::from(found))
    })
}

/// An encoded row kept for the next fetch call on its statement.
struct PendingRow {
    shape: FetchShape,
    row_number: i64,
    encoded: Vec<u8>,
}

fn fetch_into(
    stmt_id: c_uint,
    row_number_value: i64,
    shape: FetchShape,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    call(-1, |state| {
        let encoded = match state.pending_rows.remove(&stmt_id) {
            Some(pending) if pending.row_number == row_number_value && pending.shape == shape => {
                pending.encoded
            }
            // Same row in another shape; the cursor is still on it.
            Some(pending) if pending.row_number == row_number_value => {
                let row = state.registry.statement_mut(stmt_id)?.current_row(shape)?;
                to_json(&row)?
            }
            _ => {
                let stmt = state.registry.statement_mut(stmt_id)?;
                let row = match shape {
                    FetchShape::Assoc => stmt.fetch_assoc(row_number(row_number_value))?,
                    FetchShape::Index => stmt.fetch_array(row_number(row_number_value))?,
                    FetchShape::Both => stmt.fetch_both(row_number(row_number_value))?,
                };
                match row {
                    Some(row) => to_json(&row)?,
                    None => return Ok(1),
                }
            }
        };
        let code = write_bytes(&encoded, buffer, buffer_len, out_written)?;
        if code == -2 {
            state.pending_rows.insert(
                stmt_id,
                PendingRow {
                    shape,
                    row_number: row_number_value,
                    encoded,
                },
            );
        }
        Ok(code)
    })
}

/// Fetch the next (or `row_number`-th) row as a JSON object keyed by column name.
/// A row that does not fit is kept and returned by the next fetch call.
/// Returns: 0 row written, 1 end of data, -1 error, -2 buffer too small
#[no_mangle]
pub extern "C" fn ibm_db_fetch_assoc(
    stmt_id: c_uint,
    row_number: i64,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    fetch_into(stmt_id, row_number, FetchShape::Assoc, buffer, buffer_len, out_written)
}

/// Like `ibm_db_fetch_assoc`, as a JSON array.
#[no_mangle]
pub extern "C" fn ibm_db_fetch_array(
    stmt_id: c_uint,
    row_number: i64,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    fetch_into(stmt_id, row_number, FetchShape::Index, buffer, buffer_len, out_written)
}

/// Like `ibm_db_fetch_assoc`, keyed by name and by position.
#[no_mangle]
pub extern "C" fn ibm_db_fetch_both(
    stmt_id: c_uint,
    row_number: i64,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    fetch_into(stmt_id, row_number, FetchShape::Both, buffer, buffer_len, out_written)
}

/// One column of the current row, codec-encoded. The column is named by
/// `column_name`, or by the 0-based `column_index` when the name is NULL.
/// Returns: 0 written, -1 error, -2 buffer too small
#[no_mangle]
pub extern "C" fn ibm_db_result(
    stmt_id: c_uint,
    column_name: *const c_char,
    column_index: c_int,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    call(-1, |state| {
        let column = column_ref(column_name, column_index)?;
        let value = state.registry.statement_mut(stmt_id)?.result(column)?;
        write_bytes(&value.encode(), buffer, buffer_len, out_written)
    })
}

/// Returns: number of result columns, -1 on error
#[no_mangle]
pub extern "C" fn ibm_db_num_fields(stmt_id: c_uint) -> c_int {
    call(-1, |state| {
        Ok(state.registry.statement_mut(stmt_id)?.num_fields()? as c_int)
    })
}

/// Returns: rows affected by the last statement, -1 on error or when unknown
#[no_mangle]
pub extern "C" fn ibm_db_num_rows(stmt_id: c_uint) -> i64 {
    call(-1, |state| state.registry.statement_mut(stmt_id)?.num_rows())
}

fn field_text(
    stmt_id: c_uint,
    column_name: *const c_char,
    column_index: c_int,
    buffer: *mut c_char,
    buffer_len: c_uint,
    read: impl FnOnce(&mut Statement, ColumnRef) -> Result<Option<String>>,
) -> c_int {
    call(-1, |state| {
        let column = column_ref(column_name, column_index)?;
        match read(state.registry.statement_mut(stmt_id)?, column)? {
            Some(value) => Ok(write_c_string(&value, buffer, buffer_len)),
            None => Ok(-2),
        }
    })
}

/// Returns: bytes written, -1 on error, -2 when the column does not exist
#[no_mangle]
pub extern "C" fn ibm_db_field_name(
    stmt_id: c_uint,
    column_name: *const c_char,
    column_index: c_int,
    buffer: *mut c_char,
    buffer_len: c_uint,
) -> c_int {
    field_text(stmt_id, column_name, column_index, buffer, buffer_len, |stmt, column| {
        stmt.field_name(column)
    })
}

/// Returns: bytes written, -1 on error, -2 when the column does not exist
#[no_mangle]
pub extern "C" fn ibm_db_field_type(
    stmt_id: c_uint,
    column_name: *const c_char,
    column_index: c_int,
    buffer: *mut c_char,
    buffer_len: c_uint,
) -> c_int {
    field_text(stmt_id, column_name, column_index, buffer, buffer_len, |stmt, column| {
        Ok(stmt.field_type(column)?.map(str::to_string))
    })
}

fn field_number(
    stmt_id: c_uint,
    column_name: *const c_char,
    column_index: c_int,
    read: impl FnOnce(&mut Statement, ColumnRef) -> Result<Option<i64>>,
) -> i64 {
    call(-1, |state| {
        let column = column_ref(column_name, column_index)?;
        Ok(read(state.registry.statement_mut(stmt_id)?, column)?.unwrap_or(-1))
    })
}

/// Numeric field introspection returns -1 on error or for a missing column.
#[no_mangle]
pub extern "C" fn ibm_db_field_num(stmt_id: c_uint, column_name: *const c_char, column_index: c_int) -> i64 {
    field_number(stmt_id, column_name, column_index, |stmt, column| {
        Ok(stmt.field_num(column)?.map(|n| n as i64))
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_field_display_size(
    stmt_id: c_uint,
    column_name: *const c_char,
    column_index: c_int,
) -> i64 {
    field_number(stmt_id, column_name, column_index, |stmt, column| {
        stmt.field_display_size(column)
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_field_precision(
    stmt_id: c_uint,
    column_name: *const c_char,
    column_index: c_int,
) -> i64 {
    field_number(stmt_id, column_name, column_index, |stmt, column| {
        stmt.field_precision(column)
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_field_scale(stmt_id: c_uint, column_name: *const c_char, column_index: c_int) -> i64 {
    field_number(stmt_id, column_name, column_index, |stmt, column| {
        stmt.field_scale(column)
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_field_width(stmt_id: c_uint, column_name: *const c_char, column_index: c_int) -> i64 {
    field_number(stmt_id, column_name, column_index, |stmt, column| {
        stmt.field_width(column)
    })
}

/// Returns: 1 nullable, 0 not nullable, -1 on error or missing column
#[no_mangle]
pub extern "C" fn ibm_db_field_nullable(
    stmt_id: c_uint,
    column_name: *const c_char,
    column_index: c_int,
) -> i64 {
    field_number(stmt_id, column_name, column_index, |stmt, column| {
        Ok(stmt.field_nullable(column)?.map(i64::from))
    })
}

/// Returns: 0 forward-only, 1 scrollable, -1 on error
#[no_mangle]
pub extern "C" fn ibm_db_cursor_type(stmt_id: c_uint) -> c_int {
    call(-1, |state| {
        Ok(state.registry.statement_mut(stmt_id)?.cursor_type() as c_int)
    })
}

/// Returns: 0 with `out_value` set, 1 when no value was generated, -1 on error
#[no_mangle]
pub extern "C" fn ibm_db_get_last_serial_value(stmt_id: c_uint, out_value: *mut i64) -> c_int {
    call(-1, |state| {
        if out_value.is_null() {
            return Err(IbmDbError::Argument("Output pointer must not be null".to_string()));
        }
        match state.registry.statement_mut(stmt_id)?.get_last_serial_value()? {
            Some(value) => {
                // Safety: `out_value` was null-checked and must be valid for an i64 write
                unsafe { *out_value = value };
                Ok(0)
            }
            None => Ok(1),
        }
    })
}

#[derive(Clone, Copy)]
enum ErrorQuery {
    State,
    Message,
}

fn conn_error_query(conn_id: c_uint, query: ErrorQuery, buffer: *mut c_char, buffer_len: c_uint) -> c_int {
    call(-1, |state| {
        let value = if conn_id == 0 {
            let db = context(&state.db)?;
            match query {
                ErrorQuery::State => db.conn_error(),
                ErrorQuery::Message => db.conn_errormsg(),
            }
        } else {
            let conn = state.registry.connection(conn_id)?;
            match query {
                ErrorQuery::State => conn.error()?,
                ErrorQuery::Message => conn.errormsg()?,
            }
        };
        Ok(write_c_string(&value, buffer, buffer_len))
    })
}

fn stmt_error_query(stmt_id: c_uint, query: ErrorQuery, buffer: *mut c_char, buffer_len: c_uint) -> c_int {
    call(-1, |state| {
        let value = if stmt_id == 0 {
            let db = context(&state.db)?;
            match query {
                ErrorQuery::State => db.stmt_error(),
                ErrorQuery::Message => db.stmt_errormsg(),
            }
        } else {
            let stmt = state.registry.statement_mut(stmt_id)?;
            match query {
                ErrorQuery::State => stmt.error(),
                ErrorQuery::Message => stmt.errormsg(),
            }
        };
        Ok(write_c_string(&value, buffer, buffer_len))
    })
}

/// SQLSTATE of the last failed connection attempt (`conn_id` 0) or of the
/// next diagnostic record of a connection.
/// Returns: bytes written (excluding NUL), -1 on error
#[no_mangle]
pub extern "C" fn ibm_db_conn_error(conn_id: c_uint, buffer: *mut c_char, buffer_len: c_uint) -> c_int {
    conn_error_query(conn_id, ErrorQuery::State, buffer, buffer_len)
}

#[no_mangle]
pub extern "C" fn ibm_db_conn_errormsg(conn_id: c_uint, buffer: *mut c_char, buffer_len: c_uint) -> c_int {
    conn_error_query(conn_id, ErrorQuery::Message, buffer, buffer_len)
}

#[no_mangle]
pub extern "C" fn ibm_db_stmt_error(stmt_id: c_uint, buffer: *mut c_char, buffer_len: c_uint) -> c_int {
    stmt_error_query(stmt_id, ErrorQuery::State, buffer, buffer_len)
}

#[no_mangle]
pub extern "C" fn ibm_db_stmt_errormsg(stmt_id: c_uint, buffer: *mut c_char, buffer_len: c_uint) -> c_int {
    stmt_error_query(stmt_id, ErrorQuery::Message, buffer, buffer_len)
}

/// Message of the last failed ABI call.
/// Returns: bytes written (excluding NUL), -1 on error
#[no_mangle]
pub extern "C" fn ibm_db_get_error(buffer: *mut c_char, buffer_len: c_uint) -> c_int {
    let Some(state) = try_lock_state() else {
        return -1;
    };
    let message = state
        .last_error
        .as_ref()
        .map(|e| e.message.as_str())
        .unwrap_or("No error");
    write_c_string(message, buffer, buffer_len)
}

/// Last ABI error as `[sqlstate:5][native:i32 LE][len:u32 LE][message]`.
/// Returns: 0 on success, -1 on error, -2 if buffer too small
#[no_mangle]
pub extern "C" fn ibm_db_get_structured_error(
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    let Some(state) = try_lock_state() else {
        return -1;
    };
    let data = state
        .last_error
        .clone()
        .unwrap_or_else(|| StructuredError {
            sqlstate: [0u8; 5],
            native_code: 0,
            message: "No error".to_string(),
        })
        .serialize();
    write_bytes(&data, buffer, buffer_len, out_written).unwrap_or(-1)
}

fn catalog(
    conn_id: c_uint,
    run: impl FnOnce(&crate::engine::Connection) -> Result<Statement>,
) -> c_uint {
    call(0, |state| {
        let conn = state.registry.connection(conn_id)?;
        let stmt = run(&conn)?;
        Ok(state.registry.insert_statement(stmt))
    })
}

/// Catalog calls return a statement id (>0), 0 on failure. NULL or empty
/// filters match everything.
#[no_mangle]
pub extern "C" fn ibm_db_tables(
    conn_id: c_uint,
    qualifier: *const c_char,
    schema: *const c_char,
    table: *const c_char,
    table_type: *const c_char,
) -> c_uint {
    catalog(conn_id, |conn| {
        conn.tables(
            optional_text(qualifier)?,
            optional_text(schema)?,
            optional_text(table)?,
            optional_text(table_type)?,
        )
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_columns(
    conn_id: c_uint,
    qualifier: *const c_char,
    schema: *const c_char,
    table: *const c_char,
    column: *const c_char,
) -> c_uint {
    catalog(conn_id, |conn| {
        conn.columns(
            optional_text(qualifier)?,
            optional_text(schema)?,
            optional_text(table)?,
            optional_text(column)?,
        )
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_primary_keys(
    conn_id: c_uint,
    qualifier: *const c_char,
    schema: *const c_char,
    table: *const c_char,
) -> c_uint {
    catalog(conn_id, |conn| {
        conn.primary_keys(optional_text(qualifier)?, optional_text(schema)?, optional_text(table)?)
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_foreign_keys(
    conn_id: c_uint,
    pk_qualifier: *const c_char,
    pk_schema: *const c_char,
    pk_table: *const c_char,
    fk_qualifier: *const c_char,
    fk_schema: *const c_char,
    fk_table: *const c_char,
) -> c_uint {
    catalog(conn_id, |conn| {
        conn.foreign_keys(
            optional_text(pk_qualifier)?,
            optional_text(pk_schema)?,
            optional_text(pk_table)?,
            optional_text(fk_qualifier)?,
            optional_text(fk_schema)?,
            optional_text(fk_table)?,
        )
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_procedures(
    conn_id: c_uint,
    qualifier: *const c_char,
    schema: *const c_char,
    procedure: *const c_char,
) -> c_uint {
    catalog(conn_id, |conn| {
        conn.procedures(optional_text(qualifier)?, optional_text(schema)?, optional_text(procedure)?)
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_procedure_columns(
    conn_id: c_uint,
    qualifier: *const c_char,
    schema: *const c_char,
    procedure: *const c_char,
    column: *const c_char,
) -> c_uint {
    catalog(conn_id, |conn| {
        conn.procedure_columns(
            optional_text(qualifier)?,
            optional_text(schema)?,
            optional_text(procedure)?,
            optional_text(column)?,
        )
    })
}

/// `unique` non-zero restricts the result to unique indexes.
#[no_mangle]
pub extern "C" fn ibm_db_statistics(
    conn_id: c_uint,
    qualifier: *const c_char,
    schema: *const c_char,
    table: *const c_char,
    unique: c_int,
) -> c_uint {
    catalog(conn_id, |conn| {
        conn.statistics(
            optional_text(qualifier)?,
            optional_text(schema)?,
            optional_text(table)?,
            unique != 0,
        )
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_table_privileges(
    conn_id: c_uint,
    qualifier: *const c_char,
    schema: *const c_char,
    table: *const c_char,
) -> c_uint {
    catalog(conn_id, |conn| {
        conn.table_privileges(optional_text(qualifier)?, optional_text(schema)?, optional_text(table)?)
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_column_privileges(
    conn_id: c_uint,
    qualifier: *const c_char,
    schema: *const c_char,
    table: *const c_char,
    column: *const c_char,
) -> c_uint {
    catalog(conn_id, |conn| {
        conn.column_privileges(
            optional_text(qualifier)?,
            optional_text(schema)?,
            optional_text(table)?,
            optional_text(column)?,
        )
    })
}

#[no_mangle]
pub extern "C" fn ibm_db_special_columns(
    conn_id: c_uint,
    qualifier: *const c_char,
    schema: *const c_char,
    table: *const c_char,
    scope: c_int,
) -> c_uint {
    catalog(conn_id, |conn| {
        conn.special_columns(
            optional_text(qualifier)?,
            optional_text(schema)?,
            optional_text(table)?,
            scope as i16,
        )
    })
}

/// Server attributes as a JSON object.
/// Returns: 0 on success, -1 on error, -2 if buffer too small
#[no_mangle]
pub extern "C" fn ibm_db_server_info(
    conn_id: c_uint,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    call(-1, |state| {
        let info = state.registry.connection(conn_id)?.server_info()?;
        write_bytes(&to_json(&info)?, buffer, buffer_len, out_written)
    })
}

/// Client and driver attributes as a JSON object.
/// Returns: 0 on success, -1 on error, -2 if buffer too small
#[no_mangle]
pub extern "C" fn ibm_db_client_info(
    conn_id: c_uint,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    call(-1, |state| {
        let info = state.registry.connection(conn_id)?.client_info()?;
        write_bytes(&to_json(&info)?, buffer, buffer_len, out_written)
    })
}

fn check_resource(state: &FfiState, handle: c_uint, resource_type: c_int) -> Result<HandleRef> {
    let wanted = if resource_type == RESOURCE_CONNECTION {
        HandleRef::Connection
    } else {
        HandleRef::Statement
    };
    match state.registry.kind(handle) {
        Some(kind) if kind == wanted => Ok(kind),
        _ => Err(IbmDbError::Argument(HANDLE_KIND_ERROR.to_string())),
    }
}

/// `resource_type` 1 sets connection attributes, anything else statement
/// attributes. Returns: 0 on success, -1 on error
#[no_mangle]
pub extern "C" fn ibm_db_set_option(handle: c_uint, options_json: *const c_char, resource_type: c_int) -> c_int {
    call(-1, |state| {
        let options = options(options_json)?;
        match check_resource(state, handle, resource_type)? {
            HandleRef::Connection => state.registry.connection(handle)?.set_option(&options)?,
            HandleRef::Statement => state.registry.statement_mut(handle)?.set_option(&options)?,
        }
        Ok(0)
    })
}

/// Read one attribute as text.
/// Returns: bytes written (excluding NUL), -1 on error
#[no_mangle]
pub extern "C" fn ibm_db_get_option(
    handle: c_uint,
    key: c_int,
    resource_type: c_int,
    buffer: *mut c_char,
    buffer_len: c_uint,
) -> c_int {
    call(-1, |state| {
        let value = match check_resource(state, handle, resource_type)? {
            HandleRef::Connection => state.registry.connection(handle)?.get_option(key)?,
            HandleRef::Statement => state.registry.statement_mut(handle)?.get_option(key)?,
        };
        let value = match value {
            OptionValue::Int(v) => v.to_string(),
            OptionValue::Str(s) => s,
        };
        Ok(write_c_string(&value, buffer, buffer_len))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_bytes_reports_required_length() {
        let mut buffer = [0u8; 4];
        let mut written: c_uint = 0;
        assert_eq!(
            write_bytes(b"abcdef", buffer.as_mut_ptr(), 4, &mut written).unwrap(),
            -2
        );
        assert_eq!(written, 6);
        assert_eq!(write_bytes(b"ab", buffer.as_mut_ptr(), 4, &mut written).unwrap(), 0);
        assert_eq!(&buffer[..2], b"ab");
        assert!(write_bytes(b"ab", std::ptr::null_mut(), 4, &mut written).is_err());
    }

    #[test]
    fn test_write_c_string_truncates() {
        let mut buffer = [1 as c_char; 4];
        assert_eq!(write_c_string("hello", buffer.as_mut_ptr(), 4), 3);
        assert_eq!(buffer[3], 0);
        assert_eq!(write_c_string("x", std::ptr::null_mut(), 4), -1);
    }

    #[test]
    fn test_row_number_zero_means_next() {
        assert_eq!(row_number(0), None);
        assert_eq!(row_number(3), Some(3));
        assert_eq!(row_number(-1), Some(-1));
    }

    #[test]
    fn test_column_ref_prefers_name() {
        let name = std::ffi::CString::new("ID").unwrap();
        assert_eq!(column_ref(name.as_ptr(), 5).unwrap(), ColumnRef::from("ID"));
        assert_eq!(column_ref(std::ptr::null(), 2).unwrap(), ColumnRef::Index(2));
        assert!(column_ref(std::ptr::null(), -1).is_err());
    }
}
