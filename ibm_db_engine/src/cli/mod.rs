//! Driver seam: the subset of the CLI/ODBC call surface the binding layer
//! sequences. `odbc` talks to a real driver manager; `mock` is an in-memory
//! driver for tests.

pub mod codes;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;
pub mod odbc;

use std::fmt;
use std::path::PathBuf;

/// One diagnostic record as returned by `SQLGetDiagRec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagRecord {
    pub state: [u8; 5],
    pub native_error: i32,
    pub message: String,
}

impl DiagRecord {
    pub fn new(state: &str, native_error: i32, message: impl Into<String>) -> Self {
        let mut buf = [b'0'; 5];
        for (dst, src) in buf.iter_mut().zip(state.bytes()) {
            *dst = src;
        }
        Self {
            state: buf,
            native_error,
            message: message.into(),
        }
    }

    pub fn state_str(&self) -> String {
        String::from_utf8_lossy(&self.state).into_owned()
    }

    /// `"<message> SQLCODE=<native>"`, with the message cut at its first line break.
    pub fn formatted(&self) -> String {
        let first_line = self
            .message
            .split('\n')
            .next()
            .unwrap_or("")
            .trim_end_matches('\r');
        format!("{} SQLCODE={}", first_line, self.native_error)
    }
}

impl fmt::Display for DiagRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.state_str(), self.formatted())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CliError {
    /// The call failed and the handle carried at least one diagnostic record.
    Diagnostic(DiagRecord),
    /// The call failed without leaving a diagnostic record.
    NoDiagnostic(&'static str),
    InvalidHandle,
    /// Raised on the binding side of the seam, e.g. an unreadable parameter file.
    Local(String),
}

impl CliError {
    pub fn record(&self) -> Option<&DiagRecord> {
        match self {
            CliError::Diagnostic(r) => Some(r),
            _ => None,
        }
    }

    pub fn formatted(&self) -> String {
        match self {
            CliError::Diagnostic(r) => r.formatted(),
            CliError::NoDiagnostic(function) => format!("{} failed", function),
            CliError::InvalidHandle => "Invalid handle".to_string(),
            CliError::Local(message) => message.clone(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

pub type CliResult<T> = std::result::Result<T, CliError>;

/// C buffer types the binding layer asks the driver to convert into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CType {
    Char,
    Binary,
    SShort,
    SLong,
    SBigInt,
    Double,
}

impl CType {
    /// Fixed element width, `None` for variable-length buffers.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            CType::SShort => Some(2),
            CType::SLong => Some(4),
            CType::SBigInt | CType::Double => Some(8),
            CType::Char | CType::Binary => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamIo {
    Input,
    InputOutput,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDescription {
    pub sql_type: i16,
    pub size: usize,
    pub scale: i16,
    pub nullable: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub sql_type: i16,
    pub size: usize,
    pub scale: i16,
    pub nullable: i16,
}

/// Value storage handed to the driver for one parameter marker.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamBuffer {
    Null,
    Long(i32),
    BigInt(i64),
    Double(f64),
    /// Character data bound with a NUL-terminated buffer of at least `capacity` bytes.
    Text { data: Vec<u8>, capacity: usize },
    /// Raw bytes bound with an explicit length indicator.
    Bytes { data: Vec<u8>, capacity: usize },
    /// Bound as data-at-execution; pushed during the deferred-data loop.
    Deferred(Vec<u8>),
    /// Large-object input read from a file during the deferred-data loop.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamBinding {
    pub io: ParamIo,
    pub c_type: CType,
    pub sql_type: i16,
    pub column_size: usize,
    pub decimal_digits: i16,
    pub buffer: ParamBuffer,
}

impl ParamBinding {
    pub fn needs_data_at_exec(&self) -> bool {
        matches!(self.buffer, ParamBuffer::Deferred(_) | ParamBuffer::File(_))
    }
}

/// Content of a bound column after a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundData {
    Null,
    Value(Vec<u8>),
    /// The value did not fit the bound buffer; read it with `get_data` instead.
    Truncated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Done,
    NeedData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrientation {
    Next,
    Absolute(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Commit,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Int(i64),
    Str(String),
}

/// Catalog function request; `None` filters are passed to the driver as NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCall {
    Tables {
        catalog: Option<String>,
        schema: Option<String>,
        table: Option<String>,
        table_type: Option<String>,
    },
    Columns {
        catalog: Option<String>,
        schema: Option<String>,
        table: Option<String>,
        column: Option<String>,
    },
    PrimaryKeys {
        catalog: Option<String>,
        schema: Option<String>,
        table: Option<String>,
    },
    ForeignKeys {
        pk_catalog: Option<String>,
        pk_schema: Option<String>,
        pk_table: Option<String>,
        fk_catalog: Option<String>,
        fk_schema: Option<String>,
        fk_table: Option<String>,
    },
    Procedures {
        catalog: Option<String>,
        schema: Option<String>,
        procedure: Option<String>,
    },
    ProcedureColumns {
        catalog: Option<String>,
        schema: Option<String>,
        procedure: Option<String>,
        column: Option<String>,
    },
    Statistics {
        catalog: Option<String>,
        schema: Option<String>,
        table: Option<String>,
        unique_only: bool,
    },
    TablePrivileges {
        catalog: Option<String>,
        schema: Option<String>,
        table: Option<String>,
    },
    ColumnPrivileges {
        catalog: Option<String>,
        schema: Option<String>,
        table: Option<String>,
        column: Option<String>,
    },
    SpecialColumns {
        catalog: Option<String>,
        schema: Option<String>,
        table: Option<String>,
        scope: i16,
    },
}

impl CatalogCall {
    pub fn name(&self) -> &'static str {
        match self {
            CatalogCall::Tables { .. } => "tables",
            CatalogCall::Columns { .. } => "columns",
            CatalogCall::PrimaryKeys { .. } => "primary_keys",
            CatalogCall::ForeignKeys { .. } => "foreign_keys",
            CatalogCall::Procedures { .. } => "procedures",
            CatalogCall::ProcedureColumns { .. } => "procedure_columns",
            CatalogCall::Statistics { .. } => "statistics",
            CatalogCall::TablePrivileges { .. } => "table_privileges",
            CatalogCall::ColumnPrivileges { .. } => "column_privileges",
            CatalogCall::SpecialColumns { .. } => "special_columns",
        }
    }
}

/// Allocates connection handles. One driver corresponds to one CLI environment.
pub trait CliDriver: Send + Sync {
    fn allocate_connection(&self) -> CliResult<Box<dyn CliConnection>>;
}

pub trait CliConnection: Send {
    fn set_attr(&mut self, attr: i32, value: &AttrValue) -> CliResult<()>;
    fn get_attr_int(&self, attr: i32) -> CliResult<i64>;
    fn get_attr_str(&self, attr: i32) -> CliResult<String>;

    /// Discrete-credential connect (`SQLConnect`).
    fn connect(&mut self, dsn: &str, user: &str, password: &str) -> CliResult<()>;
    /// Attribute-string connect (`SQLDriverConnect`, no prompting).
    fn driver_connect(&mut self, connection_string: &str) -> CliResult<()>;
    fn disconnect(&mut self) -> CliResult<()>;

    fn end_transaction(&mut self, completion: Completion) -> CliResult<()>;
    /// Driver liveness check. Any failure counts as dead.
    fn is_alive(&self) -> bool;

    fn get_info_str(&self, info: u16) -> CliResult<String>;
    fn get_info_u16(&self, info: u16) -> CliResult<u16>;
    fn get_info_u32(&self, info: u16) -> CliResult<u32>;

    fn allocate_statement(&mut self) -> CliResult<Box<dyn CliStatement>>;
    /// Diagnostic record `recno` (1-based) of the connection handle.
    fn diagnostic(&self, recno: i16) -> Option<DiagRecord>;
}

pub trait CliStatement: Send {
    fn set_attr(&mut self, attr: i32, value: &AttrValue) -> CliResult<()>;
    fn get_attr_int(&self, attr: i32) -> CliResult<i64>;
    fn get_attr_str(&self, attr: i32) -> CliResult<String>;

    fn prepare(&mut self, sql: &str) -> CliResult<()>;
    fn exec_direct(&mut self, sql: &str) -> CliResult<ExecStatus>;
    fn execute(&mut self) -> CliResult<ExecStatus>;
    /// Next parameter position waiting for deferred data, `None` once execution completed.
    fn param_data(&mut self) -> CliResult<Option<u16>>;
    /// Push the buffered deferred data of `position`.
    fn put_param_data(&mut self, position: u16) -> CliResult<()>;

    fn num_params(&mut self) -> CliResult<u16>;
    fn describe_param(&mut self, position: u16) -> CliResult<ParamDescription>;
    fn bind_param(&mut self, position: u16, binding: ParamBinding) -> CliResult<()>;
    /// Current content of an output or input-output parameter after execution.
    fn param_output(&self, position: u16) -> Option<ParamBuffer>;
    fn reset_params(&mut self) -> CliResult<()>;

    fn close_cursor(&mut self) -> CliResult<()>;
    fn num_result_cols(&mut self) -> CliResult<i16>;
    fn describe_col(&mut self, column: u16) -> CliResult<ColumnDescription>;
    fn col_attribute(&mut self, column: u16, field: u16) -> CliResult<i64>;
    fn bind_col(&mut self, column: u16, c_type: CType, capacity: usize) -> CliResult<()>;
    fn unbind_cols(&mut self) -> CliResult<()>;
    /// What the last fetch wrote into a bound column.
    fn bound_data(&self, column: u16) -> CliResult<BoundData>;
    /// `Ok(false)` when the cursor is past the last row.
    fn fetch(&mut self, orientation: FetchOrientation) -> CliResult<bool>;
    /// Total length in bytes of an unbound column of the current row, `None` for SQL NULL.
    /// Fails once the column has been read in full.
    fn data_length(&mut self, column: u16, c_type: CType) -> CliResult<Option<usize>>;
    /// Read an unbound column of the current row; `size_hint` sizes the first read.
    fn get_data(&mut self, column: u16, c_type: CType, size_hint: usize)
        -> CliResult<Option<Vec<u8>>>;

    fn row_count(&mut self) -> CliResult<i64>;
    /// Advance to the next result set; `Ok(false)` when there is none.
    fn more_results(&mut self) -> CliResult<bool>;
    fn catalog(&mut self, call: &CatalogCall) -> CliResult<()>;

    fn diagnostic(&self, recno: i16) -> Option<DiagRecord>;
}
