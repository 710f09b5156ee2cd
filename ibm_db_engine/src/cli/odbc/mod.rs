//! Production driver on odbc-api's handle layer. Catalog functions, info
//! types and statement attributes odbc-api does not cover go through `ext`.

mod ext;
mod handle;

use std::collections::BTreeMap;
use std::ffi::{c_void, CString};
use std::fs::File;
use std::io::Read;
use std::mem::ManuallyDrop;
use std::num::NonZeroUsize;
use std::ptr;
use std::sync::{Arc, Mutex, Weak};

use log::{debug, error, warn};
use odbc_api::handles::{
    slice_to_cow_utf8, CData, CDataMut, ColumnDescription as OdbcColumnDescription, Connection,
    DataType, DelayedInput, HasDataType, Nullability, SqlResult, SqlText, Statement,
    StatementImpl,
};
use odbc_api::sys::{
    self, CDataType, ConnectionAttribute, Desc, FreeStmtOption, ParamType, SqlDataType, SqlReturn,
};

use self::handle::{
    check, check_completed, lock_slot, sql_result, succeeded, Completed, SharedEnvironment,
    StatementSlot,
};
use super::codes::{
    SQL_BEST_ROWID, SQL_DATA_AT_EXEC, SQL_DESC_DISPLAY_SIZE, SQL_DESC_LENGTH, SQL_INDEX_ALL,
    SQL_INDEX_UNIQUE, SQL_NO_NULLS, SQL_NO_TOTAL, SQL_NULLABLE, SQL_NULLABLE_UNKNOWN, SQL_NULL_DATA,
    SQL_QUICK,
};
use super::{
    AttrValue, BoundData, CType, CatalogCall, CliConnection, CliDriver, CliError, CliResult,
    CliStatement, ColumnDescription, Completion, DiagRecord, ExecStatus, FetchOrientation,
    ParamBinding, ParamBuffer, ParamDescription, ParamIo,
};

const ATTR_STRING_CAPACITY: usize = 256;
const INFO_STRING_CAPACITY: usize = 4096;
const COLUMN_NAME_CAPACITY: usize = 128;
const PUT_CHUNK: usize = 64 * 1024;
const MIN_READ_CHUNK: usize = 256;
const MAX_READ_CHUNK: usize = 1 << 20;

fn c_type(c_type: CType) -> CDataType {
    match c_type {
        CType::Char => CDataType::Char,
        CType::Binary => CDataType::Binary,
        CType::SShort => CDataType::SShort,
        CType::SLong => CDataType::SLong,
        CType::SBigInt => CDataType::SBigInt,
        CType::Double => CDataType::Double,
    }
}

fn param_type(io: ParamIo) -> ParamType {
    match io {
        ParamIo::Input => ParamType::Input,
        ParamIo::InputOutput => ParamType::InputOutput,
        ParamIo::Output => ParamType::Output,
    }
}

fn nullable_code(nullability: Nullability) -> i16 {
    match nullability {
        Nullability::NoNulls => SQL_NO_NULLS,
        Nullability::Nullable => SQL_NULLABLE,
        Nullability::Unknown => SQL_NULLABLE_UNKNOWN,
    }
}

/// Column size as `SQLDescribeCol` reported it. `DataType` drops the size of
/// fixed types, so those get their ODBC-defined precision back.
fn described_size(data_type: &DataType) -> usize {
    let fraction = |precision: i16| if precision > 0 { precision as usize + 1 } else { 0 };
    match data_type {
        DataType::Bit => 1,
        DataType::TinyInt => 3,
        DataType::SmallInt => 5,
        DataType::Integer => 10,
        DataType::BigInt => 19,
        DataType::Real => 7,
        DataType::Double => 15,
        DataType::Date => 10,
        DataType::Time { precision } => 8 + fraction(*precision),
        DataType::Timestamp { precision } => 19 + fraction(*precision),
        other => other.column_size().map_or(0, NonZeroUsize::get),
    }
}

fn check_len<T: TryFrom<usize>>(text: &str) -> CliResult<()> {
    T::try_from(text.len())
        .map(drop)
        .map_err(|_| CliError::Local(format!("String too long: {} bytes", text.len())))
}

fn c_string(text: &str) -> CliResult<CString> {
    CString::new(text).map_err(|_| CliError::Local("String contains an interior NUL byte".to_string()))
}

/// Catalog filter as pointer/length; `None` becomes a NULL argument.
fn filter(value: &Option<CString>) -> (*const u8, i16) {
    match value {
        Some(s) => (s.as_ptr() as *const u8, sys::NTS as i16),
        None => (ptr::null(), 0),
    }
}

fn opt_c_string(value: &Option<String>) -> CliResult<Option<CString>> {
    value.as_deref().map(c_string).transpose()
}

/// Value argument of `SQLSet*Attr`.
enum AttrArg {
    Int(isize),
    Text(CString),
}

impl AttrArg {
    fn new(value: &AttrValue) -> CliResult<Self> {
        Ok(match value {
            AttrValue::Int(v) => AttrArg::Int(*v as isize),
            AttrValue::Str(s) => AttrArg::Text(c_string(s)?),
        })
    }

    fn ptr(&self) -> *mut c_void {
        match self {
            AttrArg::Int(v) => *v as *mut c_void,
            AttrArg::Text(s) => s.as_ptr() as *mut c_void,
        }
    }

    fn len(&self) -> i32 {
        match self {
            AttrArg::Int(_) => sys::IS_INTEGER,
            AttrArg::Text(_) => sys::NTSL as i32,
        }
    }
}

fn attr_string(mut buffer: Vec<u8>, len: i32) -> String {
    buffer.truncate((len.max(0) as usize).min(buffer.len().saturating_sub(1)));
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Connections share the process-wide CLI environment.
pub struct OdbcDriver {
    env: &'static SharedEnvironment,
}

impl OdbcDriver {
    pub fn new() -> CliResult<Self> {
        Ok(Self {
            env: SharedEnvironment::get()?,
        })
    }
}

impl CliDriver for OdbcDriver {
    fn allocate_connection(&self) -> CliResult<Box<dyn CliConnection>> {
        let handle = self.env.allocate_connection()?;
        Ok(Box::new(OdbcConnection {
            handle: ManuallyDrop::new(handle),
            connected: false,
            statements: Vec::new(),
        }))
    }
}

pub struct OdbcConnection {
    handle: ManuallyDrop<Connection<'static>>,
    connected: bool,
    statements: Vec<Weak<StatementSlot>>,
}

impl OdbcConnection {
    fn check<T>(&self, result: SqlResult<T>) -> CliResult<T> {
        check(&*self.handle, result)
    }

    fn require_connected(&self) -> CliResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(CliError::InvalidHandle)
        }
    }

    /// Free every statement still allocated on this connection. Their
    /// `OdbcStatement` owners report `InvalidHandle` from then on.
    fn release_statements(&mut self) {
        for slot in self.statements.drain(..).filter_map(|slot| slot.upgrade()) {
            lock_slot(&slot).take();
        }
    }

    fn info_raw(&self, info: u16, buffer: &mut [u8]) -> CliResult<i16> {
        let mut len: i16 = 0;
        let ret = unsafe {
            ext::SQLGetInfo(
                self.handle.as_sys(),
                info,
                buffer.as_mut_ptr() as *mut c_void,
                buffer.len().min(i16::MAX as usize) as i16,
                &mut len,
            )
        };
        self.check(sql_result(ret, "SQLGetInfo"))?;
        Ok(len)
    }

    fn get_attr_raw(&self, attr: i32, value: *mut c_void, buffer_length: i32, len: *mut i32) -> CliResult<()> {
        let ret = unsafe {
            sys::SQLGetConnectAttr(self.handle.as_sys(), ConnectionAttribute(attr), value, buffer_length, len)
        };
        self.check(sql_result(ret, "SQLGetConnectAttr"))
    }
}

impl CliConnection for OdbcConnection {
    fn set_attr(&mut self, attr: i32, value: &AttrValue) -> CliResult<()> {
        let arg = AttrArg::new(value)?;
        let ret = unsafe {
            sys::SQLSetConnectAttr(self.handle.as_sys(), ConnectionAttribute(attr), arg.ptr(), arg.len())
        };
        self.check(sql_result(ret, "SQLSetConnectAttr"))
    }

    fn get_attr_int(&self, attr: i32) -> CliResult<i64> {
        // Integer attributes are SQLUINTEGER or SQLULEN; a zeroed SQLLEN holds either.
        let mut value: isize = 0;
        self.get_attr_raw(attr, &mut value as *mut isize as *mut c_void, 0, ptr::null_mut())?;
        Ok(value as i64)
    }

    fn get_attr_str(&self, attr: i32) -> CliResult<String> {
        let mut buffer = vec![0u8; ATTR_STRING_CAPACITY];
        let mut len: i32 = 0;
        self.get_attr_raw(attr, buffer.as_mut_ptr() as *mut c_void, buffer.len() as i32, &mut len)?;
        Ok(attr_string(buffer, len))
    }

    fn connect(&mut self, dsn: &str, user: &str, password: &str) -> CliResult<()> {
        for part in [dsn, user, password] {
            check_len::<i16>(part)?;
        }
        let result = self
            .handle
            .connect(&SqlText::new(dsn), &SqlText::new(user), &SqlText::new(password));
        self.check(result)?;
        self.connected = true;
        Ok(())
    }

    fn driver_connect(&mut self, connection_string: &str) -> CliResult<()> {
        check_len::<i16>(connection_string)?;
        let result = self
            .handle
            .connect_with_connection_string(&SqlText::new(connection_string));
        self.check(result)?;
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> CliResult<()> {
        if !self.connected {
            return Ok(());
        }
        self.release_statements();
        let result = self.handle.disconnect();
        self.check(result)?;
        self.connected = false;
        Ok(())
    }

    fn end_transaction(&mut self, completion: Completion) -> CliResult<()> {
        self.require_connected()?;
        let result = match completion {
            Completion::Commit => self.handle.commit(),
            Completion::Rollback => self.handle.rollback(),
        };
        self.check(result)
    }

    fn is_alive(&self) -> bool {
        self.connected
            && matches!(
                self.handle.is_dead(),
                SqlResult::Success(false) | SqlResult::SuccessWithInfo(false)
            )
    }

    fn get_info_str(&self, info: u16) -> CliResult<String> {
        let mut buffer = vec![0u8; INFO_STRING_CAPACITY];
        let len = self.info_raw(info, &mut buffer)?;
        buffer.truncate((len.max(0) as usize).min(INFO_STRING_CAPACITY - 1));
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn get_info_u16(&self, info: u16) -> CliResult<u16> {
        let mut buffer = [0u8; 2];
        self.info_raw(info, &mut buffer)?;
        Ok(u16::from_ne_bytes(buffer))
    }

    fn get_info_u32(&self, info: u16) -> CliResult<u32> {
        let mut buffer = [0u8; 4];
        self.info_raw(info, &mut buffer)?;
        Ok(u32::from_ne_bytes(buffer))
    }

    fn allocate_statement(&mut self) -> CliResult<Box<dyn CliStatement>> {
        self.require_connected()?;
        let allocated = self.handle.allocate_statement();
        let statement = self.check(allocated)?;
        // Safety: the connection empties every slot it handed out before it
        // disconnects, so the handle never outlives its parent.
        let statement = unsafe { StatementImpl::new(statement.into_sys()) };
        let slot = Arc::new(Mutex::new(Some(statement)));
        self.statements.retain(|s| s.strong_count() > 0);
        self.statements.push(Arc::downgrade(&slot));
        Ok(Box::new(OdbcStatement {
            slot,
            params: BTreeMap::new(),
            columns: BTreeMap::new(),
        }))
    }

    fn diagnostic(&self, recno: i16) -> Option<DiagRecord> {
        handle::diagnostic(&*self.handle, recno)
    }
}

impl Drop for OdbcConnection {
    fn drop(&mut self) {
        if self.connected {
            self.release_statements();
            if !succeeded(&self.handle.disconnect()) {
                // An open unit of work blocks SQLDisconnect.
                warn!("Rolling back open transaction before disconnect");
                let _ = self.handle.rollback();
                if !succeeded(&self.handle.disconnect()) {
                    error!("Disconnect failed; connection handle is leaked");
                    return;
                }
            }
        }
        // Safety: `handle` is not touched after this point.
        unsafe { ManuallyDrop::drop(&mut self.handle) }
    }
}

/// Parameter storage the driver reads from (and writes back into for output
/// parameters). Boxed so its address stays put while bound.
struct BoundParam {
    position: u16,
    binding: ParamBinding,
    storage: Vec<u8>,
    indicator: isize,
}

impl BoundParam {
    fn new(position: u16, binding: ParamBinding) -> Self {
        let (storage, indicator) = match &binding.buffer {
            ParamBuffer::Null => (vec![0u8; 8], SQL_NULL_DATA),
            ParamBuffer::Long(v) => (v.to_ne_bytes().to_vec(), 4),
            ParamBuffer::BigInt(v) => (v.to_ne_bytes().to_vec(), 8),
            ParamBuffer::Double(v) => (v.to_ne_bytes().to_vec(), 8),
            ParamBuffer::Text { data, capacity } => {
                let mut storage = data.clone();
                storage.resize((*capacity).max(data.len()) + 1, 0);
                (storage, data.len() as isize)
            }
            ParamBuffer::Bytes { data, capacity } => {
                let mut storage = data.clone();
                storage.resize((*capacity).max(data.len()).max(1), 0);
                (storage, data.len() as isize)
            }
            ParamBuffer::Deferred(_) | ParamBuffer::File(_) => (Vec::new(), SQL_DATA_AT_EXEC),
        };
        Self {
            position,
            binding,
            storage,
            indicator,
        }
    }

    fn column_size(&self) -> usize {
        match &self.binding.buffer {
            ParamBuffer::Deferred(data)
            | ParamBuffer::Text { data, .. }
            | ParamBuffer::Bytes { data, .. } => self.binding.column_size.max(data.len()),
            _ => self.binding.column_size,
        }
    }

    fn output(&self) -> ParamBuffer {
        if self.indicator == SQL_NULL_DATA {
            return ParamBuffer::Null;
        }
        let fixed = |n: usize| {
            let mut bytes = [0u8; 8];
            bytes[..n].copy_from_slice(&self.storage[..n]);
            bytes
        };
        match &self.binding.buffer {
            ParamBuffer::Long(_) => {
                let b = fixed(4);
                ParamBuffer::Long(i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            }
            ParamBuffer::BigInt(_) => ParamBuffer::BigInt(i64::from_ne_bytes(fixed(8))),
            ParamBuffer::Double(_) => ParamBuffer::Double(f64::from_ne_bytes(fixed(8))),
            ParamBuffer::Text { capacity, .. } => {
                let len = self.written_len(self.storage.len() - 1);
                ParamBuffer::Text {
                    data: self.storage[..len].to_vec(),
                    capacity: *capacity,
                }
            }
            ParamBuffer::Bytes { capacity, .. } => {
                let len = self.written_len(self.storage.len());
                ParamBuffer::Bytes {
                    data: self.storage[..len].to_vec(),
                    capacity: *capacity,
                }
            }
            ParamBuffer::Null => ParamBuffer::Null,
            other => other.clone(),
        }
    }

    fn written_len(&self, available: usize) -> usize {
        if self.indicator == SQL_NO_TOTAL || self.indicator < 0 {
            available
        } else {
            (self.indicator as usize).min(available)
        }
    }
}

unsafe impl CData for BoundParam {
    fn cdata_type(&self) -> CDataType {
        c_type(self.binding.c_type)
    }

    fn indicator_ptr(&self) -> *const isize {
        &self.indicator
    }

    fn value_ptr(&self) -> *const c_void {
        self.storage.as_ptr() as *const c_void
    }

    fn buffer_length(&self) -> isize {
        self.storage.len() as isize
    }
}

unsafe impl CDataMut for BoundParam {
    fn mut_indicator_ptr(&mut self) -> *mut isize {
        &mut self.indicator
    }

    fn mut_value_ptr(&mut self) -> *mut c_void {
        self.storage.as_mut_ptr() as *mut c_void
    }
}

// The driver hands `stream_ptr` back from SQLParamData to name the parameter
// it wants data for.
unsafe impl DelayedInput for BoundParam {
    fn cdata_type(&self) -> CDataType {
        c_type(self.binding.c_type)
    }

    fn indicator_ptr(&self) -> *const isize {
        &self.indicator
    }

    fn stream_ptr(&mut self) -> *mut c_void {
        self.position as usize as *mut c_void
    }
}

impl HasDataType for BoundParam {
    fn data_type(&self) -> DataType {
        // `Other` passes vendor types (BLOB, XML, GRAPHIC) and sizes through as given.
        DataType::Other {
            data_type: SqlDataType(self.binding.sql_type),
            column_size: NonZeroUsize::new(self.column_size()),
            decimal_digits: self.binding.decimal_digits,
        }
    }
}

/// Target buffer of a bound column or of one `SQLGetData` call.
struct BoundColumn {
    c_type: CType,
    buffer: Vec<u8>,
    indicator: isize,
}

impl BoundColumn {
    /// Room for `capacity` bytes of data plus the terminator of character data.
    fn new(c_type: CType, capacity: usize) -> Self {
        let len = match c_type {
            CType::Char => capacity + 1,
            CType::Binary => capacity.max(1),
            fixed => fixed.fixed_width().unwrap_or(8),
        };
        Self {
            c_type,
            buffer: vec![0u8; len],
            indicator: 0,
        }
    }

    /// Zero-length target: `SQLGetData` only reports the remaining length.
    fn length_only(c_type: CType) -> Self {
        Self {
            c_type,
            buffer: vec![0u8; c_type.fixed_width().unwrap_or(0)],
            indicator: 0,
        }
    }

    fn available(&self) -> usize {
        match self.c_type {
            CType::Char => self.buffer.len().saturating_sub(1),
            _ => self.buffer.len(),
        }
    }

    fn value(&self) -> BoundData {
        if self.indicator == SQL_NULL_DATA {
            return BoundData::Null;
        }
        if let Some(width) = self.c_type.fixed_width() {
            return BoundData::Value(self.buffer[..width].to_vec());
        }
        let available = self.available();
        match self.indicator {
            n if n < 0 || n as usize > available => BoundData::Truncated,
            n => BoundData::Value(self.buffer[..n as usize].to_vec()),
        }
    }
}

unsafe impl CData for BoundColumn {
    fn cdata_type(&self) -> CDataType {
        c_type(self.c_type)
    }

    fn indicator_ptr(&self) -> *const isize {
        &self.indicator
    }

    fn value_ptr(&self) -> *const c_void {
        self.buffer.as_ptr() as *const c_void
    }

    fn buffer_length(&self) -> isize {
        self.buffer.len() as isize
    }
}

unsafe impl CDataMut for BoundColumn {
    fn mut_indicator_ptr(&mut self) -> *mut isize {
        &mut self.indicator
    }

    fn mut_value_ptr(&mut self) -> *mut c_void {
        self.buffer.as_mut_ptr() as *mut c_void
    }
}

/// Run `f` on the live statement handle.
fn call<T>(
    slot: &StatementSlot,
    f: impl FnOnce(&mut StatementImpl<'static>) -> SqlResult<T>,
) -> CliResult<Completed<T>> {
    let mut guard = lock_slot(slot);
    let statement = guard.as_mut().ok_or(CliError::InvalidHandle)?;
    let result = f(&mut *statement);
    check_completed(&*statement, result)
}

fn run<T>(
    slot: &StatementSlot,
    f: impl FnOnce(&mut StatementImpl<'static>) -> SqlResult<T>,
) -> CliResult<T> {
    let mut guard = lock_slot(slot);
    let statement = guard.as_mut().ok_or(CliError::InvalidHandle)?;
    let result = f(&mut *statement);
    check(&*statement, result)
}

fn exec_status(completed: Completed<()>) -> ExecStatus {
    match completed {
        Completed::NeedData => ExecStatus::NeedData,
        // A searched UPDATE/DELETE touching no rows reports SQL_NO_DATA.
        Completed::Value(()) | Completed::NoData => ExecStatus::Done,
    }
}

fn already_read(column: u16) -> CliError {
    CliError::Local(format!("Column {} of the current row has already been read", column))
}

pub struct OdbcStatement {
    // Declared first: the handle is freed before the buffers bound to it.
    slot: Arc<StatementSlot>,
    params: BTreeMap<u16, Box<BoundParam>>,
    columns: BTreeMap<u16, Box<BoundColumn>>,
}

impl OdbcStatement {
    fn get_attr_raw(&self, attr: i32, value: *mut c_void, buffer_length: i32, len: *mut i32) -> CliResult<()> {
        run(&self.slot, |statement| {
            let ret = unsafe { ext::SQLGetStmtAttr(statement.as_sys(), attr, value, buffer_length, len) };
            sql_result(ret, "SQLGetStmtAttr")
        })
    }

    /// Send `data` for the parameter the driver asked for. An empty value
    /// still needs one zero-length put.
    fn put(&self, data: &[u8]) -> CliResult<()> {
        run(&self.slot, |statement| {
            if data.is_empty() {
                let empty = [0u8; 1];
                let ret = unsafe { sys::SQLPutData(statement.as_sys(), empty.as_ptr() as *mut c_void, 0) };
                sql_result(ret, "SQLPutData")
            } else {
                statement.put_binary_batch(data)
            }
        })
    }
}

impl CliStatement for OdbcStatement {
    fn set_attr(&mut self, attr: i32, value: &AttrValue) -> CliResult<()> {
        let arg = AttrArg::new(value)?;
        run(&self.slot, |statement| {
            let ret = unsafe { ext::SQLSetStmtAttr(statement.as_sys(), attr, arg.ptr(), arg.len()) };
            sql_result(ret, "SQLSetStmtAttr")
        })
    }

    fn get_attr_int(&self, attr: i32) -> CliResult<i64> {
        let mut value: isize = 0;
        self.get_attr_raw(attr, &mut value as *mut isize as *mut c_void, 0, ptr::null_mut())?;
        Ok(value as i64)
    }

    fn get_attr_str(&self, attr: i32) -> CliResult<String> {
        let mut buffer = vec![0u8; ATTR_STRING_CAPACITY];
        let mut len: i32 = 0;
        self.get_attr_raw(attr, buffer.as_mut_ptr() as *mut c_void, buffer.len() as i32, &mut len)?;
        Ok(attr_string(buffer, len))
    }

    fn prepare(&mut self, sql: &str) -> CliResult<()> {
        check_len::<i32>(sql)?;
        run(&self.slot, |statement| statement.prepare(&SqlText::new(sql)))
    }

    fn exec_direct(&mut self, sql: &str) -> CliResult<ExecStatus> {
        check_len::<i32>(sql)?;
        // Safety: bound parameters live in `self.params` until they are reset.
        let completed = call(&self.slot, |statement| unsafe {
            statement.exec_direct(&SqlText::new(sql))
        })?;
        Ok(exec_status(completed))
    }

    fn execute(&mut self) -> CliResult<ExecStatus> {
        // Safety: bound parameters live in `self.params` until they are reset.
        let completed = call(&self.slot, |statement| unsafe { statement.execute() })?;
        Ok(exec_status(completed))
    }

    fn param_data(&mut self) -> CliResult<Option<u16>> {
        match call(&self.slot, |statement| statement.param_data())? {
            Completed::Value(Some(token)) => Ok(Some(token as usize as u16)),
            _ => Ok(None),
        }
    }

    fn put_param_data(&mut self, position: u16) -> CliResult<()> {
        let param = self
            .params
            .get(&position)
            .ok_or_else(|| CliError::Local(format!("No deferred data bound at position {}", position)))?;
        match &param.binding.buffer {
            ParamBuffer::Deferred(data) => self.put(data),
            ParamBuffer::File(path) => {
                let mut file = File::open(path).map_err(|e| {
                    CliError::Local(format!("Cannot open {}: {}", path.display(), e))
                })?;
                let mut chunk = vec![0u8; PUT_CHUNK];
                let mut sent = 0usize;
                loop {
                    let n = file.read(&mut chunk).map_err(|e| {
                        CliError::Local(format!("Cannot read {}: {}", path.display(), e))
                    })?;
                    if n == 0 {
                        break;
                    }
                    self.put(&chunk[..n])?;
                    sent += n;
                }
                if sent == 0 {
                    self.put(&[])?;
                }
                debug!("Sent {} bytes from {} for parameter {}", sent, path.display(), position);
                Ok(())
            }
            _ => Err(CliError::Local(format!(
                "Parameter {} is not bound for deferred data",
                position
            ))),
        }
    }

    fn num_params(&mut self) -> CliResult<u16> {
        run(&self.slot, |statement| statement.num_params())
    }

    fn describe_param(&mut self, position: u16) -> CliResult<ParamDescription> {
        let description = run(&self.slot, |statement| statement.describe_param(position))?;
        Ok(ParamDescription {
            sql_type: description.data_type.data_type().0,
            size: described_size(&description.data_type),
            scale: description.data_type.decimal_digits(),
            nullable: nullable_code(description.nullability),
        })
    }

    fn bind_param(&mut self, position: u16, binding: ParamBinding) -> CliResult<()> {
        let mut param = Box::new(BoundParam::new(position, binding));
        let io = param.binding.io;
        let deferred = param.binding.needs_data_at_exec();
        // Safety: the box is kept in `self.params` until the parameters are
        // reset or rebound, so the driver's pointers stay valid.
        run(&self.slot, |statement| unsafe {
            if deferred {
                statement.bind_delayed_input_parameter(position, param.as_mut())
            } else if io == ParamIo::Input {
                statement.bind_input_parameter(position, param.as_ref())
            } else {
                statement.bind_parameter(position, param_type(io), param.as_mut())
            }
        })?;
        self.params.insert(position, param);
        Ok(())
    }

    fn param_output(&self, position: u16) -> Option<ParamBuffer> {
        self.params.get(&position).map(|p| p.output())
    }

    fn reset_params(&mut self) -> CliResult<()> {
        run(&self.slot, |statement| statement.reset_parameters())?;
        self.params.clear();
        Ok(())
    }

    fn close_cursor(&mut self) -> CliResult<()> {
        // SQLFreeStmt(SQL_CLOSE) unlike SQLCloseCursor accepts a statement without a cursor.
        run(&self.slot, |statement| {
            let ret = unsafe { sys::SQLFreeStmt(statement.as_sys(), FreeStmtOption::Close) };
            sql_result(ret, "SQLFreeStmt")
        })
    }

    fn num_result_cols(&mut self) -> CliResult<i16> {
        run(&self.slot, |statement| statement.num_result_cols())
    }

    fn describe_col(&mut self, column: u16) -> CliResult<ColumnDescription> {
        let mut description = OdbcColumnDescription {
            name: Vec::with_capacity(COLUMN_NAME_CAPACITY),
            ..OdbcColumnDescription::default()
        };
        run(&self.slot, |statement| statement.describe_col(column, &mut description))?;
        Ok(ColumnDescription {
            name: slice_to_cow_utf8(&description.name).into_owned(),
            sql_type: description.data_type.data_type().0,
            size: described_size(&description.data_type),
            scale: description.data_type.decimal_digits(),
            nullable: nullable_code(description.nullability),
        })
    }

    fn col_attribute(&mut self, column: u16, field: u16) -> CliResult<i64> {
        let value = match field {
            SQL_DESC_DISPLAY_SIZE => run(&self.slot, |statement| statement.col_display_size(column))?,
            // Safety: SQL_DESC_LENGTH is a numeric attribute.
            SQL_DESC_LENGTH => run(&self.slot, |statement| unsafe {
                statement.numeric_col_attribute(Desc::Length, column)
            })?,
            other => {
                return Err(CliError::Local(format!(
                    "Column attribute {} is not supported",
                    other
                )))
            }
        };
        Ok(value as i64)
    }

    fn bind_col(&mut self, column: u16, c_type: CType, capacity: usize) -> CliResult<()> {
        let mut col = Box::new(BoundColumn::new(c_type, capacity));
        // Safety: the box is kept in `self.columns` until the columns are unbound.
        run(&self.slot, |statement| unsafe { statement.bind_col(column, col.as_mut()) })?;
        self.columns.insert(column, col);
        Ok(())
    }

    fn unbind_cols(&mut self) -> CliResult<()> {
        run(&self.slot, |statement| statement.unbind_cols())?;
        self.columns.clear();
        Ok(())
    }

    fn bound_data(&self, column: u16) -> CliResult<BoundData> {
        if lock_slot(&self.slot).is_none() {
            return Err(CliError::InvalidHandle);
        }
        self.columns
            .get(&column)
            .map(|col| col.value())
            .ok_or_else(|| CliError::Local(format!("Column {} is not bound", column)))
    }

    fn fetch(&mut self, orientation: FetchOrientation) -> CliResult<bool> {
        // Safety: bound columns live in `self.columns` until they are unbound.
        let completed = call(&self.slot, |statement| unsafe {
            match orientation {
                FetchOrientation::Next => statement.fetch(),
                FetchOrientation::Absolute(row) => sql_result(
                    sys::SQLFetchScroll(statement.as_sys(), sys::FetchOrientation::Absolute, row as isize),
                    "SQLFetchScroll",
                ),
            }
        })?;
        Ok(matches!(completed, Completed::Value(())))
    }

    fn data_length(&mut self, column: u16, c_type: CType) -> CliResult<Option<usize>> {
        let mut target = BoundColumn::length_only(c_type);
        match call(&self.slot, |statement| statement.get_data(column, &mut target))? {
            Completed::Value(()) => {}
            _ => return Err(already_read(column)),
        }
        Ok(match target.indicator {
            SQL_NULL_DATA => None,
            // Unknown; get_data grows its buffer until the value is drained.
            SQL_NO_TOTAL => Some(0),
            n => Some(n.max(0) as usize),
        })
    }

    fn get_data(
        &mut self,
        column: u16,
        c_type: CType,
        size_hint: usize,
    ) -> CliResult<Option<Vec<u8>>> {
        let capacity = match c_type.fixed_width() {
            Some(width) => width,
            None => size_hint.clamp(MIN_READ_CHUNK, MAX_READ_CHUNK),
        };
        let mut target = BoundColumn::new(c_type, capacity);
        let mut out: Option<Vec<u8>> = None;
        loop {
            match call(&self.slot, |statement| statement.get_data(column, &mut target))? {
                Completed::Value(()) => {}
                _ if out.is_none() => return Err(already_read(column)),
                // Every chunk has been read.
                _ => break,
            }
            let bytes = out.get_or_insert_with(|| Vec::with_capacity(size_hint));
            match target.value() {
                BoundData::Null => return Ok(None),
                BoundData::Value(chunk) => {
                    bytes.extend_from_slice(&chunk);
                    break;
                }
                BoundData::Truncated => {
                    let available = target.available();
                    bytes.extend_from_slice(&target.buffer[..available]);
                }
            }
        }
        Ok(out)
    }

    fn row_count(&mut self) -> CliResult<i64> {
        run(&self.slot, |statement| statement.row_count()).map(|n| n as i64)
    }

    fn more_results(&mut self) -> CliResult<bool> {
        // Safety: the engine unbinds the previous result's columns before it
        // reads the next one.
        let completed = call(&self.slot, |statement| unsafe { statement.more_results() })?;
        Ok(matches!(completed, Completed::Value(())))
    }

    fn catalog(&mut self, request: &CatalogCall) -> CliResult<()> {
        match request {
            // odbc-api takes every argument of these as text, so an unset
            // filter becomes the match-all pattern.
            CatalogCall::Tables {
                catalog,
                schema,
                table,
                table_type,
            } => run(&self.slot, |statement| {
                statement.tables(
                    &SqlText::new(catalog.as_deref().unwrap_or("")),
                    &SqlText::new(schema.as_deref().unwrap_or("%")),
                    &SqlText::new(table.as_deref().unwrap_or("%")),
                    &SqlText::new(table_type.as_deref().unwrap_or("")),
                )
            }),
            CatalogCall::Columns {
                catalog,
                schema,
                table,
                column,
            } => run(&self.slot, |statement| {
                statement.columns(
                    &SqlText::new(catalog.as_deref().unwrap_or("")),
                    &SqlText::new(schema.as_deref().unwrap_or("%")),
                    &SqlText::new(table.as_deref().unwrap_or("%")),
                    &SqlText::new(column.as_deref().unwrap_or("%")),
                )
            }),
            other => self.raw_catalog(other),
        }
    }

    fn diagnostic(&self, recno: i16) -> Option<DiagRecord> {
        lock_slot(&self.slot)
            .as_ref()
            .and_then(|statement| handle::diagnostic(statement, recno))
    }
}

impl OdbcStatement {
    /// Catalog functions that need NULL arguments, which the handles API cannot pass.
    fn raw_catalog(&mut self, request: &CatalogCall) -> CliResult<()> {
        let function = request.name();
        let args: Vec<Option<CString>> = match request {
            CatalogCall::Tables { .. } | CatalogCall::Columns { .. } => {
                return Err(CliError::Local(format!("{} has no raw entry point", function)))
            }
            CatalogCall::PrimaryKeys {
                catalog,
                schema,
                table,
            }
            | CatalogCall::TablePrivileges {
                catalog,
                schema,
                table,
            }
            | CatalogCall::Statistics {
                catalog,
                schema,
                table,
                ..
            }
            | CatalogCall::SpecialColumns {
                catalog,
                schema,
                table,
                ..
            } => vec![opt_c_string(catalog)?, opt_c_string(schema)?, opt_c_string(table)?],
            CatalogCall::Procedures {
                catalog,
                schema,
                procedure,
            } => vec![opt_c_string(catalog)?, opt_c_string(schema)?, opt_c_string(procedure)?],
            CatalogCall::ProcedureColumns {
                catalog,
                schema,
                procedure: table,
                column,
            }
            | CatalogCall::ColumnPrivileges {
                catalog,
                schema,
                table,
                column,
            } => vec![
                opt_c_string(catalog)?,
                opt_c_string(schema)?,
                opt_c_string(table)?,
                opt_c_string(column)?,
            ],
            CatalogCall::ForeignKeys {
                pk_catalog,
                pk_schema,
                pk_table,
                fk_catalog,
                fk_schema,
                fk_table,
            } => vec![
                opt_c_string(pk_catalog)?,
                opt_c_string(pk_schema)?,
                opt_c_string(pk_table)?,
                opt_c_string(fk_catalog)?,
                opt_c_string(fk_schema)?,
                opt_c_string(fk_table)?,
            ],
        };
        let a: Vec<(*const u8, i16)> = args.iter().map(filter).collect();
        run(&self.slot, |statement| {
            let stmt = statement.as_sys();
            let ret = unsafe {
                match request {
                    CatalogCall::PrimaryKeys { .. } => {
                        ext::SQLPrimaryKeys(stmt, a[0].0, a[0].1, a[1].0, a[1].1, a[2].0, a[2].1)
                    }
                    CatalogCall::TablePrivileges { .. } => {
                        ext::SQLTablePrivileges(stmt, a[0].0, a[0].1, a[1].0, a[1].1, a[2].0, a[2].1)
                    }
                    CatalogCall::Statistics { unique_only, .. } => {
                        let unique = if *unique_only { SQL_INDEX_UNIQUE } else { SQL_INDEX_ALL };
                        ext::SQLStatistics(
                            stmt, a[0].0, a[0].1, a[1].0, a[1].1, a[2].0, a[2].1, unique, SQL_QUICK,
                        )
                    }
                    CatalogCall::SpecialColumns { scope, .. } => ext::SQLSpecialColumns(
                        stmt,
                        SQL_BEST_ROWID as u16,
                        a[0].0,
                        a[0].1,
                        a[1].0,
                        a[1].1,
                        a[2].0,
                        a[2].1,
                        *scope as u16,
                        SQL_NULLABLE as u16,
                    ),
                    CatalogCall::Procedures { .. } => {
                        ext::SQLProcedures(stmt, a[0].0, a[0].1, a[1].0, a[1].1, a[2].0, a[2].1)
                    }
                    CatalogCall::ProcedureColumns { .. } => ext::SQLProcedureColumns(
                        stmt, a[0].0, a[0].1, a[1].0, a[1].1, a[2].0, a[2].1, a[3].0, a[3].1,
                    ),
                    CatalogCall::ColumnPrivileges { .. } => ext::SQLColumnPrivileges(
                        stmt, a[0].0, a[0].1, a[1].0, a[1].1, a[2].0, a[2].1, a[3].0, a[3].1,
                    ),
                    CatalogCall::ForeignKeys { .. } => sys::SQLForeignKeys(
                        stmt, a[0].0, a[0].1, a[1].0, a[1].1, a[2].0, a[2].1, a[3].0, a[3].1,
                        a[4].0, a[4].1, a[5].0, a[5].1,
                    ),
                    CatalogCall::Tables { .. } | CatalogCall::Columns { .. } => SqlReturn::ERROR,
                }
            };
            sql_result(ret, function)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(buffer: ParamBuffer) -> ParamBinding {
        ParamBinding {
            io: ParamIo::InputOutput,
            c_type: CType::Char,
            sql_type: crate::cli::codes::SQL_VARCHAR,
            column_size: 10,
            decimal_digits: 0,
            buffer,
        }
    }

    #[test]
    fn test_bound_param_text_storage_is_terminated() {
        let p = BoundParam::new(1, binding(ParamBuffer::Text {
            data: b"abc".to_vec(),
            capacity: 10,
        }));
        assert_eq!(p.storage.len(), 11);
        assert_eq!(p.indicator, 3);
        assert_eq!(p.storage[3], 0);
    }

    #[test]
    fn test_bound_param_output_respects_indicator() {
        let mut p = BoundParam::new(1, binding(ParamBuffer::Text {
            data: Vec::new(),
            capacity: 10,
        }));
        p.storage[..5].copy_from_slice(b"hello");
        p.indicator = 5;
        match p.output() {
            ParamBuffer::Text { data, .. } => assert_eq!(data, b"hello"),
            other => panic!("unexpected {:?}", other),
        }
        p.indicator = SQL_NULL_DATA;
        assert_eq!(p.output(), ParamBuffer::Null);
    }

    #[test]
    fn test_bound_param_integer_roundtrip() {
        let p = BoundParam::new(1, binding(ParamBuffer::Long(-42)));
        assert_eq!(p.output(), ParamBuffer::Long(-42));
    }

    #[test]
    fn test_deferred_param_marks_data_at_exec() {
        let mut p = BoundParam::new(3, binding(ParamBuffer::Deferred(vec![1, 2, 3])));
        assert_eq!(p.indicator, SQL_DATA_AT_EXEC);
        assert!(p.storage.is_empty());
        assert_eq!(p.stream_ptr() as usize, 3);
    }

    #[test]
    fn test_param_data_type_keeps_vendor_type_and_size() {
        let mut b = binding(ParamBuffer::Deferred(vec![0u8; 40]));
        b.sql_type = crate::cli::codes::SQL_BLOB;
        let p = BoundParam::new(1, b);
        match p.data_type() {
            DataType::Other {
                data_type,
                column_size,
                ..
            } => {
                assert_eq!(data_type.0, crate::cli::codes::SQL_BLOB);
                assert_eq!(column_size.map(NonZeroUsize::get), Some(40));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_filter_null_for_none() {
        let (p, len) = filter(&None);
        assert!(p.is_null());
        assert_eq!(len, 0);
    }

    #[test]
    fn test_described_size_restores_fixed_precision() {
        assert_eq!(described_size(&DataType::Integer), 10);
        assert_eq!(described_size(&DataType::Timestamp { precision: 6 }), 26);
        assert_eq!(described_size(&DataType::Timestamp { precision: 0 }), 19);
        assert_eq!(described_size(&DataType::Varchar { length: NonZeroUsize::new(20) }), 20);
    }

    #[test]
    fn test_bound_column_reports_truncation() {
        let mut col = BoundColumn::new(CType::Char, 4);
        col.buffer[..4].copy_from_slice(b"abcd");
        col.indicator = 4;
        assert_eq!(col.value(), BoundData::Value(b"abcd".to_vec()));
        col.indicator = 9;
        assert_eq!(col.value(), BoundData::Truncated);
        col.indicator = SQL_NO_TOTAL;
        assert_eq!(col.value(), BoundData::Truncated);
        col.indicator = SQL_NULL_DATA;
        assert_eq!(col.value(), BoundData::Null);
    }

    #[test]
    fn test_length_only_target_is_empty_for_variable_types() {
        assert!(BoundColumn::length_only(CType::Binary).buffer.is_empty());
        assert_eq!(BoundColumn::length_only(CType::SLong).buffer.len(), 4);
    }
}
