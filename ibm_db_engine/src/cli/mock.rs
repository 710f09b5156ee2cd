//! Scriptable in-memory driver. Statements are answered by SQL text; every
//! call that matters to the binding layer is recorded for inspection.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::codes::*;
use super::{
    AttrValue, BoundData, CType, CatalogCall, CliConnection, CliDriver, CliError, CliResult, CliStatement,
    ColumnDescription, Completion, DiagRecord, ExecStatus, FetchOrientation, ParamBinding,
    ParamBuffer, ParamDescription,
};

#[derive(Debug, Clone, PartialEq)]
pub enum MockCell {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
}

impl MockCell {
    pub fn text(s: &str) -> Self {
        MockCell::Text(s.to_string())
    }

    fn to_display(&self) -> Option<String> {
        match self {
            MockCell::Null => None,
            MockCell::Text(s) => Some(s.clone()),
            MockCell::Int(v) => Some(v.to_string()),
            MockCell::Float(v) => Some(v.to_string()),
            MockCell::Bytes(b) => Some(b.iter().map(|x| format!("{:02X}", x)).collect()),
        }
    }

    fn to_f64(&self) -> CliResult<f64> {
        match self {
            MockCell::Int(v) => Ok(*v as f64),
            MockCell::Float(v) => Ok(*v),
            MockCell::Text(s) => s.trim().parse().map_err(|_| cast_error()),
            _ => Err(cast_error()),
        }
    }

    fn to_i64(&self) -> CliResult<i64> {
        match self {
            MockCell::Int(v) => Ok(*v),
            MockCell::Float(v) => Ok(*v as i64),
            MockCell::Text(s) => s.trim().parse().map_err(|_| cast_error()),
            _ => Err(cast_error()),
        }
    }

    /// Bytes the driver would write for this cell in a `c_type` buffer.
    pub fn convert(&self, c_type: CType) -> CliResult<Option<Vec<u8>>> {
        if *self == MockCell::Null {
            return Ok(None);
        }
        let bytes = match c_type {
            CType::Char => self.to_display().unwrap_or_default().into_bytes(),
            CType::Binary => match self {
                MockCell::Bytes(b) => b.clone(),
                other => other.to_display().unwrap_or_default().into_bytes(),
            },
            CType::SShort => (self.to_i64()? as i16).to_ne_bytes().to_vec(),
            CType::SLong => (self.to_i64()? as i32).to_ne_bytes().to_vec(),
            CType::SBigInt => self.to_i64()?.to_ne_bytes().to_vec(),
            CType::Double => self.to_f64()?.to_ne_bytes().to_vec(),
        };
        Ok(Some(bytes))
    }
}

fn cast_error() -> CliError {
    CliError::Diagnostic(DiagRecord::new(
        "22018",
        -420,
        "Invalid character value for cast specification.",
    ))
}

fn diag(state: &str, native: i32, message: &str) -> Vec<DiagRecord> {
    vec![DiagRecord::new(state, native, message)]
}

pub fn column(name: &str, sql_type: i16, size: usize) -> ColumnDescription {
    ColumnDescription {
        name: name.to_string(),
        sql_type,
        size,
        scale: 0,
        nullable: SQL_NULLABLE,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockResultSet {
    pub columns: Vec<ColumnDescription>,
    pub rows: Vec<Vec<MockCell>>,
}

impl MockResultSet {
    pub fn new(columns: Vec<ColumnDescription>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, cells: Vec<MockCell>) -> Self {
        self.rows.push(cells);
        self
    }
}

/// Scripted answer for one SQL text.
#[derive(Debug, Clone, Default)]
pub struct MockQuery {
    pub params: Vec<ParamDescription>,
    pub results: Vec<MockResultSet>,
    pub row_count: i64,
    pub prepare_error: Option<Vec<DiagRecord>>,
    pub execute_error: Option<Vec<DiagRecord>>,
    /// Values written into output parameters by a successful execution.
    pub outputs: BTreeMap<u16, ParamBuffer>,
}

impl MockQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, sql_type: i16, size: usize) -> Self {
        self.params.push(ParamDescription {
            sql_type,
            size,
            scale: 0,
            nullable: SQL_NULLABLE,
        });
        self
    }

    pub fn result(mut self, rs: MockResultSet) -> Self {
        self.results.push(rs);
        self
    }

    pub fn row_count(mut self, n: i64) -> Self {
        self.row_count = n;
        self
    }

    pub fn fail_prepare(mut self, records: Vec<DiagRecord>) -> Self {
        self.prepare_error = Some(records);
        self
    }

    pub fn fail_execute(mut self, records: Vec<DiagRecord>) -> Self {
        self.execute_error = Some(records);
        self
    }

    pub fn output(mut self, position: u16, value: ParamBuffer) -> Self {
        self.outputs.insert(position, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectCall {
    Discrete {
        dsn: String,
        user: String,
        password: String,
    },
    DriverString(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub sql: String,
    pub bindings: BTreeMap<u16, ParamBinding>,
    pub deferred: BTreeMap<u16, Vec<u8>>,
}

pub struct MockState {
    pub queries: HashMap<String, MockQuery>,
    pub catalogs: HashMap<&'static str, MockResultSet>,
    pub connect_error: Option<Vec<DiagRecord>>,
    pub alive: bool,
    pub info_str: HashMap<u16, String>,
    pub info_int: HashMap<u16, u32>,
    pub serial_value: String,
    /// Attributes the driver rejects with HY092.
    pub rejected_attrs: HashSet<i32>,

    pub connects: Vec<ConnectCall>,
    pub connections_allocated: usize,
    pub disconnects: usize,
    pub statements_allocated: usize,
    pub statements_freed: usize,
    pub end_transactions: Vec<Completion>,
    pub conn_attrs: Vec<(i32, AttrValue)>,
    pub stmt_attrs: Vec<(i32, AttrValue)>,
    pub executions: Vec<Execution>,
    pub catalog_calls: Vec<CatalogCall>,
}

impl Default for MockState {
    fn default() -> Self {
        let info_str = [
            (SQL_DBMS_NAME, "DB2/LINUXX8664"),
            (SQL_DBMS_VER, "11.05.0900"),
            (SQL_DATABASE_NAME, "SAMPLE"),
            (SQL_SERVER_NAME, "DB2"),
            (SQL_SPECIAL_CHARACTERS, "@#"),
            (SQL_KEYWORDS, "AFTER,ALIAS,ALLOW"),
            (SQL_PROCEDURES, "Y"),
            (SQL_IDENTIFIER_QUOTE_CHAR, "\""),
            (SQL_LIKE_ESCAPE_CLAUSE, "Y"),
            (SQL_DRIVER_NAME, "libdb2.a"),
            (SQL_DRIVER_VER, "11.05.0900"),
            (SQL_DATA_SOURCE_NAME, "SAMPLE"),
            (SQL_DRIVER_ODBC_VER, "03.51"),
            (SQL_ODBC_VER, "03.01.0000"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect();
        let info_int = [
            (SQL_DATABASE_CODEPAGE, 1208),
            (SQL_MAX_IDENTIFIER_LEN, 128),
            (SQL_MAX_COLUMN_NAME_LEN, 128),
            (SQL_MAX_SCHEMA_NAME_LEN, 128),
            (SQL_MAX_PROCEDURE_NAME_LEN, 128),
            (SQL_MAX_TABLE_NAME_LEN, 128),
            (SQL_MAX_INDEX_SIZE, 1024),
            (SQL_MAX_ROW_SIZE, 32677),
            (SQL_MAX_STATEMENT_LEN, 2_097_152),
            (
                SQL_DEFAULT_TXN_ISOLATION,
                SQL_TXN_READ_COMMITTED,
            ),
            (
                SQL_TXN_ISOLATION_OPTION,
                SQL_TXN_READ_UNCOMMITTED
                    | SQL_TXN_READ_COMMITTED
                    | SQL_TXN_REPEATABLE_READ
                    | SQL_TXN_SERIALIZABLE,
            ),
            (SQL_NON_NULLABLE_COLUMNS, SQL_NNC_NON_NULL as u32),
            (SQL_SQL_CONFORMANCE, SQL_SC_SQL92_ENTRY),
            (SQL_ODBC_SQL_CONFORMANCE, SQL_OSC_CORE as u32),
            (SQL_APPLICATION_CODEPAGE, 1208),
            (SQL_CONNECT_CODEPAGE, 1208),
        ]
        .into_iter()
        .collect();
        Self {
            queries: HashMap::new(),
            catalogs: HashMap::new(),
            connect_error: None,
            alive: true,
            info_str,
            info_int,
            serial_value: String::new(),
            rejected_attrs: HashSet::new(),
            connects: Vec::new(),
            connections_allocated: 0,
            disconnects: 0,
            statements_allocated: 0,
            statements_freed: 0,
            end_transactions: Vec::new(),
            conn_attrs: Vec::new(),
            stmt_attrs: Vec::new(),
            executions: Vec::new(),
            catalog_calls: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    pub fn with_query(self, sql: &str, query: MockQuery) -> Self {
        self.state().queries.insert(sql.to_string(), query);
        self
    }

    pub fn with_catalog(self, name: &'static str, rs: MockResultSet) -> Self {
        self.state().catalogs.insert(name, rs);
        self
    }
}

fn lock(state: &Arc<Mutex<MockState>>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CliDriver for MockDriver {
    fn allocate_connection(&self) -> CliResult<Box<dyn CliConnection>> {
        self.state().connections_allocated += 1;
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            connected: Arc::new(AtomicBool::new(false)),
            attrs: HashMap::new(),
            diag: Vec::new(),
        }))
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
    connected: Arc<AtomicBool>,
    attrs: HashMap<i32, AttrValue>,
    diag: Vec<DiagRecord>,
}

impl MockConnection {
    fn fail<T>(&mut self, records: Vec<DiagRecord>) -> CliResult<T> {
        let first = records
            .first()
            .cloned()
            .unwrap_or_else(|| DiagRecord::new("HY000", -99999, "General error"));
        self.diag = records;
        Err(CliError::Diagnostic(first))
    }

    fn require_connected(&self) -> CliResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CliError::InvalidHandle)
        }
    }

    fn connect_with(&mut self, call: ConnectCall) -> CliResult<()> {
        self.diag.clear();
        let error = {
            let mut state = lock(&self.state);
            state.connects.push(call);
            state.connect_error.clone()
        };
        if let Some(records) = error {
            return self.fail(records);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl CliConnection for MockConnection {
    fn set_attr(&mut self, attr: i32, value: &AttrValue) -> CliResult<()> {
        self.diag.clear();
        let rejected = {
            let mut state = lock(&self.state);
            state.conn_attrs.push((attr, value.clone()));
            state.rejected_attrs.contains(&attr)
        };
        if rejected {
            return self.fail(diag("HY092", -99999, "Option type out of range."));
        }
        self.attrs.insert(attr, value.clone());
        Ok(())
    }

    fn get_attr_int(&self, attr: i32) -> CliResult<i64> {
        match self.attrs.get(&attr) {
            Some(AttrValue::Int(v)) => Ok(*v),
            Some(AttrValue::Str(s)) => s.parse().map_err(|_| cast_error()),
            None if attr == SQL_ATTR_AUTOCOMMIT => Ok(SQL_AUTOCOMMIT_ON),
            None if attr == SQL_ATTR_CONNECTION_DEAD => {
                self.require_connected()?;
                Ok(if lock(&self.state).alive { SQL_CD_FALSE } else { 1 })
            }
            None => Ok(0),
        }
    }

    fn get_attr_str(&self, attr: i32) -> CliResult<String> {
        Ok(match self.attrs.get(&attr) {
            Some(AttrValue::Str(s)) => s.clone(),
            Some(AttrValue::Int(v)) => v.to_string(),
            None => String::new(),
        })
    }

    fn connect(&mut self, dsn: &str, user: &str, password: &str) -> CliResult<()> {
        self.connect_with(ConnectCall::Discrete {
            dsn: dsn.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    fn driver_connect(&mut self, connection_string: &str) -> CliResult<()> {
        self.connect_with(ConnectCall::DriverString(connection_string.to_string()))
    }

    fn disconnect(&mut self) -> CliResult<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            lock(&self.state).disconnects += 1;
        }
        Ok(())
    }

    fn end_transaction(&mut self, completion: Completion) -> CliResult<()> {
        self.require_connected()?;
        lock(&self.state).end_transactions.push(completion);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && lock(&self.state).alive
    }

    fn get_info_str(&self, info: u16) -> CliResult<String> {
        self.require_connected()?;
        lock(&self.state)
            .info_str
            .get(&info)
            .cloned()
            .ok_or_else(info_error)
    }

    fn get_info_u16(&self, info: u16) -> CliResult<u16> {
        self.get_info_u32(info).map(|v| v as u16)
    }

    fn get_info_u32(&self, info: u16) -> CliResult<u32> {
        self.require_connected()?;
        lock(&self.state)
            .info_int
            .get(&info)
            .copied()
            .ok_or_else(info_error)
    }

    fn allocate_statement(&mut self) -> CliResult<Box<dyn CliStatement>> {
        self.require_connected()?;
        lock(&self.state).statements_allocated += 1;
        Ok(Box::new(MockStatement::new(
            self.state.clone(),
            self.connected.clone(),
        )))
    }

    fn diagnostic(&self, recno: i16) -> Option<DiagRecord> {
        record_at(&self.diag, recno)
    }
}

fn info_error() -> CliError {
    CliError::Diagnostic(DiagRecord::new(
        "HY096",
        -99999,
        "Information type out of range.",
    ))
}

fn record_at(records: &[DiagRecord], recno: i16) -> Option<DiagRecord> {
    if recno < 1 {
        return None;
    }
    records.get(recno as usize - 1).cloned()
}

struct MockStatement {
    state: Arc<Mutex<MockState>>,
    connected: Arc<AtomicBool>,
    sql: Option<String>,
    query: Option<MockQuery>,
    bindings: BTreeMap<u16, ParamBinding>,
    deferred: BTreeMap<u16, Vec<u8>>,
    pending: VecDeque<u16>,
    executed: bool,
    results: VecDeque<MockResultSet>,
    current: Option<MockResultSet>,
    cursor: Option<usize>,
    bound: BTreeMap<u16, (CType, usize)>,
    /// Columns of the current row already read in full by `get_data`.
    consumed: HashSet<u16>,
    attrs: HashMap<i32, AttrValue>,
    diag: Vec<DiagRecord>,
}

impl MockStatement {
    fn new(state: Arc<Mutex<MockState>>, connected: Arc<AtomicBool>) -> Self {
        Self {
            state,
            connected,
            sql: None,
            query: None,
            bindings: BTreeMap::new(),
            deferred: BTreeMap::new(),
            pending: VecDeque::new(),
            executed: false,
            results: VecDeque::new(),
            current: None,
            cursor: None,
            bound: BTreeMap::new(),
            consumed: HashSet::new(),
            attrs: HashMap::new(),
            diag: Vec::new(),
        }
    }

    fn live(&mut self) -> CliResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CliError::InvalidHandle);
        }
        self.diag.clear();
        Ok(())
    }

    fn fail<T>(&mut self, records: Vec<DiagRecord>) -> CliResult<T> {
        let first = records
            .first()
            .cloned()
            .unwrap_or_else(|| DiagRecord::new("HY000", -99999, "General error"));
        self.diag = records;
        Err(CliError::Diagnostic(first))
    }

    fn prepared(&mut self) -> CliResult<MockQuery> {
        match &self.query {
            Some(q) => Ok(q.clone()),
            None => self.fail(diag("HY010", -99999, "Function sequence error.")),
        }
    }

    fn current_row(&mut self) -> CliResult<Vec<MockCell>> {
        let row = match (&self.current, self.cursor) {
            (Some(rs), Some(i)) => rs.rows.get(i).cloned(),
            _ => None,
        };
        match row {
            Some(r) => Ok(r),
            None => self.fail(diag("24000", -99999, "Invalid cursor state.")),
        }
    }

    fn cell(&mut self, column: u16) -> CliResult<MockCell> {
        if self.consumed.contains(&column) {
            // SQL_NO_DATA: nothing is left of the column in this row.
            return Err(CliError::Local(format!(
                "Column {} of the current row has already been read",
                column
            )));
        }
        let row = self.current_row()?;
        match row.get((column as usize).wrapping_sub(1)) {
            Some(c) => Ok(c.clone()),
            None => self.fail(diag("07009", -99999, "Invalid descriptor index.")),
        }
    }

    fn complete_execution(&mut self) {
        let query = self.query.clone().unwrap_or_default();
        lock(&self.state).executions.push(Execution {
            sql: self.sql.clone().unwrap_or_default(),
            bindings: self.bindings.clone(),
            deferred: std::mem::take(&mut self.deferred),
        });
        self.results = query.results.into_iter().collect();
        self.current = self.results.pop_front();
        self.cursor = None;
        self.consumed.clear();
        self.executed = true;
    }

    fn cursor_type(&self) -> i64 {
        match self.attrs.get(&SQL_ATTR_CURSOR_TYPE) {
            Some(AttrValue::Int(v)) => *v,
            _ => SQL_CURSOR_FORWARD_ONLY,
        }
    }
}

impl CliStatement for MockStatement {
    fn set_attr(&mut self, attr: i32, value: &AttrValue) -> CliResult<()> {
        self.live()?;
        let rejected = {
            let mut state = lock(&self.state);
            state.stmt_attrs.push((attr, value.clone()));
            state.rejected_attrs.contains(&attr)
        };
        if rejected {
            return self.fail(diag("HY092", -99999, "Option type out of range."));
        }
        self.attrs.insert(attr, value.clone());
        Ok(())
    }

    fn get_attr_int(&self, attr: i32) -> CliResult<i64> {
        if attr == SQL_ATTR_CURSOR_TYPE {
            return Ok(self.cursor_type());
        }
        match self.attrs.get(&attr) {
            Some(AttrValue::Int(v)) => Ok(*v),
            _ => Ok(0),
        }
    }

    fn get_attr_str(&self, attr: i32) -> CliResult<String> {
        if attr == SQL_ATTR_GET_GENERATED_VALUE {
            return Ok(lock(&self.state).serial_value.clone());
        }
        Ok(match self.attrs.get(&attr) {
            Some(AttrValue::Str(s)) => s.clone(),
            Some(AttrValue::Int(v)) => v.to_string(),
            None => String::new(),
        })
    }

    fn prepare(&mut self, sql: &str) -> CliResult<()> {
        self.live()?;
        let query = lock(&self.state).queries.get(sql).cloned();
        let query = match query {
            Some(q) => q,
            None => {
                return self.fail(diag(
                    "42601",
                    -104,
                    "[IBM][CLI Driver][DB2/LINUXX8664] SQL0104N  An unexpected token was found.",
                ))
            }
        };
        if let Some(records) = query.prepare_error.clone() {
            return self.fail(records);
        }
        self.sql = Some(sql.to_string());
        self.query = Some(query);
        self.executed = false;
        self.current = None;
        self.results.clear();
        self.cursor = None;
        Ok(())
    }

    fn exec_direct(&mut self, sql: &str) -> CliResult<ExecStatus> {
        self.prepare(sql)?;
        self.execute()
    }

    fn execute(&mut self) -> CliResult<ExecStatus> {
        self.live()?;
        let query = self.prepared()?;
        if let Some(records) = query.execute_error {
            return self.fail(records);
        }
        self.deferred.clear();
        self.pending = self
            .bindings
            .iter()
            .filter(|(_, b)| b.needs_data_at_exec())
            .map(|(p, _)| *p)
            .collect();
        if !self.pending.is_empty() {
            return Ok(ExecStatus::NeedData);
        }
        self.complete_execution();
        Ok(ExecStatus::Done)
    }

    fn param_data(&mut self) -> CliResult<Option<u16>> {
        self.live()?;
        if let Some(position) = self.pending.pop_front() {
            return Ok(Some(position));
        }
        self.complete_execution();
        Ok(None)
    }

    fn put_param_data(&mut self, position: u16) -> CliResult<()> {
        self.live()?;
        let data = match self.bindings.get(&position).map(|b| b.buffer.clone()) {
            Some(ParamBuffer::Deferred(data)) => data,
            Some(ParamBuffer::File(path)) => std::fs::read(&path).map_err(|e| {
                CliError::Local(format!("Cannot read {}: {}", path.display(), e))
            })?,
            _ => return self.fail(diag("HY010", -99999, "Function sequence error.")),
        };
        self.deferred.entry(position).or_default().extend(data);
        Ok(())
    }

    fn num_params(&mut self) -> CliResult<u16> {
        self.live()?;
        Ok(self.prepared()?.params.len() as u16)
    }

    fn describe_param(&mut self, position: u16) -> CliResult<ParamDescription> {
        self.live()?;
        let query = self.prepared()?;
        match query.params.get((position as usize).wrapping_sub(1)) {
            Some(p) => Ok(*p),
            None => self.fail(diag("07009", -99999, "Invalid descriptor index.")),
        }
    }

    fn bind_param(&mut self, position: u16, binding: ParamBinding) -> CliResult<()> {
        self.live()?;
        self.bindings.insert(position, binding);
        Ok(())
    }

    fn param_output(&self, position: u16) -> Option<ParamBuffer> {
        if self.executed {
            if let Some(out) = self.query.as_ref().and_then(|q| q.outputs.get(&position)) {
                return Some(out.clone());
            }
        }
        self.bindings.get(&position).map(|b| b.buffer.clone())
    }

    fn reset_params(&mut self) -> CliResult<()> {
        self.live()?;
        self.bindings.clear();
        Ok(())
    }

    fn close_cursor(&mut self) -> CliResult<()> {
        self.live()?;
        self.current = None;
        self.results.clear();
        self.cursor = None;
        self.consumed.clear();
        Ok(())
    }

    fn num_result_cols(&mut self) -> CliResult<i16> {
        self.live()?;
        Ok(self.current.as_ref().map_or(0, |rs| rs.columns.len() as i16))
    }

    fn describe_col(&mut self, column: u16) -> CliResult<ColumnDescription> {
        self.live()?;
        let col = self
            .current
            .as_ref()
            .and_then(|rs| rs.columns.get((column as usize).wrapping_sub(1)).cloned());
        match col {
            Some(c) => Ok(c),
            None => self.fail(diag("07009", -99999, "Invalid descriptor index.")),
        }
    }

    fn col_attribute(&mut self, column: u16, field: u16) -> CliResult<i64> {
        let col = self.describe_col(column)?;
        match field {
            SQL_DESC_DISPLAY_SIZE | SQL_DESC_LENGTH => Ok(col.size as i64),
            _ => self.fail(diag("HY091", -99999, "Invalid descriptor field identifier.")),
        }
    }

    fn bind_col(&mut self, column: u16, c_type: CType, capacity: usize) -> CliResult<()> {
        self.live()?;
        self.bound.insert(column, (c_type, capacity));
        Ok(())
    }

    fn unbind_cols(&mut self) -> CliResult<()> {
        self.live()?;
        self.bound.clear();
        Ok(())
    }

    fn bound_data(&self, column: u16) -> CliResult<BoundData> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CliError::InvalidHandle);
        }
        let (c_type, capacity) = self
            .bound
            .get(&column)
            .copied()
            .ok_or_else(|| CliError::Local(format!("Column {} is not bound", column)))?;
        let cell = match (&self.current, self.cursor) {
            (Some(rs), Some(i)) => rs
                .rows
                .get(i)
                .and_then(|r| r.get((column as usize).wrapping_sub(1)))
                .cloned(),
            _ => None,
        }
        .ok_or_else(|| CliError::Diagnostic(DiagRecord::new("24000", -99999, "Invalid cursor state.")))?;
        Ok(match cell.convert(c_type)? {
            None => BoundData::Null,
            Some(bytes) if c_type.fixed_width().is_none() && bytes.len() > capacity => {
                BoundData::Truncated
            }
            Some(bytes) => BoundData::Value(bytes),
        })
    }

    fn fetch(&mut self, orientation: FetchOrientation) -> CliResult<bool> {
        self.live()?;
        self.consumed.clear();
        let len = match &self.current {
            Some(rs) => rs.rows.len(),
            None => return self.fail(diag("24000", -99999, "Invalid cursor state.")),
        };
        match orientation {
            FetchOrientation::Next => {
                let next = self.cursor.map_or(0, |i| i + 1);
                if next < len {
                    self.cursor = Some(next);
                    Ok(true)
                } else {
                    self.cursor = Some(len);
                    Ok(false)
                }
            }
            FetchOrientation::Absolute(row) => {
                if self.cursor_type() == SQL_CURSOR_FORWARD_ONLY {
                    return self.fail(diag("HY106", -99999, "Fetch type out of range."));
                }
                if row >= 1 && (row as usize) <= len {
                    self.cursor = Some(row as usize - 1);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    fn data_length(&mut self, column: u16, c_type: CType) -> CliResult<Option<usize>> {
        self.live()?;
        let cell = self.cell(column)?;
        Ok(cell.convert(c_type)?.map(|b| b.len()))
    }

    fn get_data(
        &mut self,
        column: u16,
        c_type: CType,
        _size_hint: usize,
    ) -> CliResult<Option<Vec<u8>>> {
        self.live()?;
        let cell = self.cell(column)?;
        let data = cell.convert(c_type)?;
        self.consumed.insert(column);
        Ok(data)
    }

    fn row_count(&mut self) -> CliResult<i64> {
        self.live()?;
        Ok(self.query.as_ref().map_or(-1, |q| q.row_count))
    }

    fn more_results(&mut self) -> CliResult<bool> {
        self.live()?;
        self.cursor = None;
        self.consumed.clear();
        self.current = self.results.pop_front();
        Ok(self.current.is_some())
    }

    fn catalog(&mut self, call: &CatalogCall) -> CliResult<()> {
        self.live()?;
        let rs = {
            let mut state = lock(&self.state);
            state.catalog_calls.push(call.clone());
            state.catalogs.get(call.name()).cloned().unwrap_or_default()
        };
        self.sql = None;
        self.query = None;
        self.results.clear();
        self.current = Some(rs);
        self.cursor = None;
        self.consumed.clear();
        self.executed = true;
        Ok(())
    }

    fn diagnostic(&self, recno: i16) -> Option<DiagRecord> {
        record_at(&self.diag, recno)
    }
}

impl Drop for MockStatement {
    fn drop(&mut self) {
        if self.connected.load(Ordering::SeqCst) {
            lock(&self.state).statements_freed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(driver: &MockDriver) -> Box<dyn CliConnection> {
        let mut conn = driver.allocate_connection().unwrap();
        conn.connect("SAMPLE", "db2inst1", "secret").unwrap();
        conn
    }

    #[test]
    fn test_unknown_sql_fails_prepare_with_syntax_error() {
        let driver = MockDriver::new();
        let mut conn = connected(&driver);
        let mut stmt = conn.allocate_statement().unwrap();
        let err = stmt.prepare("SELEC 1").unwrap_err();
        assert_eq!(err.record().map(|r| r.native_error), Some(-104));
        assert_eq!(stmt.diagnostic(1).map(|r| r.state_str()), Some("42601".to_string()));
        assert!(stmt.diagnostic(2).is_none());
    }

    #[test]
    fn test_fetch_walks_rows_then_reports_end() {
        let driver = MockDriver::new().with_query(
            "SELECT ID FROM T",
            MockQuery::new().result(
                MockResultSet::new(vec![column("ID", SQL_INTEGER, 10)])
                    .row(vec![MockCell::Int(1)])
                    .row(vec![MockCell::Int(2)]),
            ),
        );
        let mut conn = connected(&driver);
        let mut stmt = conn.allocate_statement().unwrap();
        assert_eq!(stmt.exec_direct("SELECT ID FROM T").unwrap(), ExecStatus::Done);
        stmt.bind_col(1, CType::SLong, 4).unwrap();
        assert!(stmt.fetch(FetchOrientation::Next).unwrap());
        assert_eq!(stmt.bound_data(1).unwrap(), BoundData::Value(1i32.to_ne_bytes().to_vec()));
        assert!(stmt.fetch(FetchOrientation::Next).unwrap());
        assert!(!stmt.fetch(FetchOrientation::Next).unwrap());
        assert!(!stmt.fetch(FetchOrientation::Next).unwrap());
    }

    #[test]
    fn test_deferred_params_request_data_in_order() {
        let driver = MockDriver::new().with_query("INSERT INTO B VALUES (?)", MockQuery::new().param(SQL_BLOB, 1024));
        let mut conn = connected(&driver);
        let mut stmt = conn.allocate_statement().unwrap();
        stmt.prepare("INSERT INTO B VALUES (?)").unwrap();
        stmt.bind_param(
            1,
            ParamBinding {
                io: super::super::ParamIo::Input,
                c_type: CType::Binary,
                sql_type: SQL_BLOB,
                column_size: 1024,
                decimal_digits: 0,
                buffer: ParamBuffer::Deferred(vec![9, 8, 7]),
            },
        )
        .unwrap();
        assert_eq!(stmt.execute().unwrap(), ExecStatus::NeedData);
        assert_eq!(stmt.param_data().unwrap(), Some(1));
        stmt.put_param_data(1).unwrap();
        assert_eq!(stmt.param_data().unwrap(), None);
        let state = driver.state();
        assert_eq!(state.executions[0].deferred.get(&1), Some(&vec![9, 8, 7]));
    }

    #[test]
    fn test_statement_after_disconnect_is_invalid() {
        let driver = MockDriver::new().with_query("VALUES 1", MockQuery::new());
        let mut conn = connected(&driver);
        let mut stmt = conn.allocate_statement().unwrap();
        conn.disconnect().unwrap();
        assert_eq!(stmt.prepare("VALUES 1").unwrap_err(), CliError::InvalidHandle);
        drop(stmt);
        assert_eq!(driver.state().statements_freed, 0);
        assert_eq!(driver.state().disconnects, 1);
    }

    #[test]
    fn test_get_data_drains_column_until_next_fetch() {
        let driver = MockDriver::new().with_query(
            "SELECT DOC FROM T",
            MockQuery::new().result(
                MockResultSet::new(vec![column("DOC", SQL_CLOB, 1_048_576)])
                    .row(vec![MockCell::text("first")])
                    .row(vec![MockCell::text("second")]),
            ),
        );
        let mut conn = connected(&driver);
        let mut stmt = conn.allocate_statement().unwrap();
        stmt.exec_direct("SELECT DOC FROM T").unwrap();
        assert!(stmt.fetch(FetchOrientation::Next).unwrap());
        assert_eq!(stmt.data_length(1, CType::Char).unwrap(), Some(5));
        assert_eq!(stmt.get_data(1, CType::Char, 5).unwrap(), Some(b"first".to_vec()));
        assert!(stmt.get_data(1, CType::Char, 5).is_err());
        assert!(stmt.data_length(1, CType::Char).is_err());
        assert!(stmt.fetch(FetchOrientation::Next).unwrap());
        assert_eq!(stmt.get_data(1, CType::Char, 6).unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_bound_column_too_small_reports_truncation() {
        let driver = MockDriver::new().with_query(
            "SELECT NAME FROM T",
            MockQuery::new().result(
                MockResultSet::new(vec![column("NAME", SQL_VARCHAR, 4)])
                    .row(vec![MockCell::text("abcdef")]),
            ),
        );
        let mut conn = connected(&driver);
        let mut stmt = conn.allocate_statement().unwrap();
        stmt.exec_direct("SELECT NAME FROM T").unwrap();
        stmt.bind_col(1, CType::Char, 4).unwrap();
        assert!(stmt.fetch(FetchOrientation::Next).unwrap());
        assert_eq!(stmt.bound_data(1).unwrap(), BoundData::Truncated);
    }

    #[test]
    fn test_binary_cell_as_char_is_hex() {
        let cell = MockCell::Bytes(vec![0xAB, 0x01]);
        assert_eq!(cell.convert(CType::Char).unwrap(), Some(b"AB01".to_vec()));
        assert_eq!(MockCell::Null.convert(CType::Char).unwrap(), None);
    }
}
