use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::cli::codes::{
    SQL_ATTR_CURSOR_TYPE, SQL_ATTR_GET_GENERATED_VALUE, SQL_CURSOR_FORWARD_ONLY, SQL_DESC_DISPLAY_SIZE,
    SQL_DESC_LENGTH, SQL_NO_NULLS, SQL_NULLABLE,
};
use crate::cli::{AttrValue, CliError, CliStatement, ExecStatus, FetchOrientation, ParamDescription};
use crate::config::BinMode;
use crate::error::{IbmDbError, Result};
use crate::protocol::{field_type_name, FetchShape, Row, Value};

use super::binding::{build_binding, output_value};
use super::connection::ConnectionState;
use super::context::Shared;
use super::diagnostics::{HandleKind, RecnoTracker};
use super::fetch::{build_row, read_column, RowCache};
use super::lock;
use super::metadata::{describe_and_bind, find_column, ColumnMeta, ColumnRef};
use super::options::{cursor_kind, CaseMode, OptionValue, Options, ATTR_CASE, INVALID_PARAMETER};
use super::param_cache::{BindOptions, ParamCache, ParamNode};

const ROW_NUMBER_ERROR: &str = "Requested row number must be a positive value";
const COLUMN_INFO_ERROR: &str = "Column information cannot be retrieved: ";
const NO_ROW_ERROR: &str = "No row has been fetched";

/// Session settings a statement copies from its connection when created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementModes {
    pub bin_mode: BinMode,
    pub case_mode: CaseMode,
    /// Raw `SQL_ATTR_CURSOR_TYPE` value.
    pub cursor_attr: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// No row fetched since the last execute.
    Before,
    OnRow,
    Exhausted,
}

/// A driver statement plus its parameter cache and result metadata.
pub struct Statement {
    conn: Arc<Mutex<ConnectionState>>,
    shared: Arc<Shared>,
    cli: Box<dyn CliStatement>,
    sql: Option<String>,
    params: ParamCache,
    output_positions: BTreeSet<u16>,
    columns: Option<Vec<ColumnMeta>>,
    released: bool,
    cursor: Cursor,
    row_cache: RowCache,
    modes: StatementModes,
    recno: RecnoTracker,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("params", &self.params.len())
            .field("modes", &self.modes)
            .finish_non_exhaustive()
    }
}

impl Statement {
    pub(crate) fn new(
        conn: Arc<Mutex<ConnectionState>>,
        shared: Arc<Shared>,
        mut cli: Box<dyn CliStatement>,
        modes: StatementModes,
        sql: Option<&str>,
    ) -> Result<Self> {
        if modes.cursor_attr != SQL_CURSOR_FORWARD_ONLY {
            cli.set_attr(SQL_ATTR_CURSOR_TYPE, &AttrValue::Int(modes.cursor_attr))
                .map_err(|e| shared.fail(HandleKind::Statement, "", e))?;
        }
        Ok(Self {
            conn,
            shared,
            cli,
            sql: sql.map(str::to_string),
            params: ParamCache::new(),
            output_positions: BTreeSet::new(),
            columns: None,
            released: false,
            cursor: Cursor::Before,
            row_cache: RowCache::new(),
            modes,
            recno: RecnoTracker::default(),
        })
    }

    fn fail(&self, context: &str, err: CliError) -> IbmDbError {
        self.shared.fail(HandleKind::Statement, context, err)
    }

    fn ensure_active(&self) -> Result<()> {
        lock(&self.conn)?.ensure_active()
    }

    fn log(&self, action: &str, fields: &[(&str, String)]) {
        if let Some(sql) = &self.sql {
            self.shared
                .logger
                .log_statement(log::Level::Debug, action, sql, fields);
        }
    }

    pub(crate) fn prepare_sql(&mut self) -> Result<()> {
        let sql = self.sql.clone().unwrap_or_default();
        self.cli
            .prepare(&sql)
            .map_err(|e| self.fail("Statement Prepare Failed: ", e))?;
        self.log("prepare", &[]);
        Ok(())
    }

    pub(crate) fn exec_sql(&mut self) -> Result<()> {
        let sql = self.sql.clone().unwrap_or_default();
        let status = self
            .cli
            .exec_direct(&sql)
            .map_err(|e| self.fail("Statement Execute Failed: ", e))?;
        if status == ExecStatus::NeedData {
            self.send_deferred()?;
        }
        self.log("exec", &[]);
        Ok(())
    }

    /// Point the statement at a catalog result set.
    pub(crate) fn run_catalog(&mut self, call: &crate::cli::CatalogCall) -> Result<()> {
        self.cli.catalog(call).map_err(|e| self.fail("", e))
    }

    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// Forget the current result set: close the cursor and drop column buffers.
    fn reset_result(&mut self) {
        if let Err(e) = self.cli.close_cursor() {
            log::debug!("Closing cursor failed: {}", e);
        }
        if self.columns.take().is_some_and(|cols| !cols.is_empty()) {
            if let Err(e) = self.cli.unbind_cols() {
                log::debug!("Unbinding columns failed: {}", e);
            }
        }
        self.released = false;
        self.cursor = Cursor::Before;
        self.row_cache.clear();
    }

    /// Register a value for marker `position` (1-based) until the next execute.
    /// Without an explicit type, precision and scale the marker is described.
    pub fn bind_param(
        &mut self,
        position: u16,
        value: impl Into<Value>,
        options: BindOptions,
    ) -> Result<()> {
        if position == 0 {
            return Err(IbmDbError::Argument(
                "Parameter position must be 1 or greater".to_string(),
            ));
        }
        self.ensure_active()?;
        let desc = if options.fully_typed() {
            ParamDescription {
                sql_type: options.sql_type.unwrap_or_default(),
                size: options.precision.unwrap_or_default(),
                scale: options.scale.unwrap_or_default(),
                nullable: SQL_NO_NULLS,
            }
        } else {
            self.cli
                .describe_param(position)
                .map_err(|e| self.fail("Describe Param Failed: ", e))?
        };
        let mut node = ParamNode::described(position, desc, value.into());
        node.apply(&options);
        self.params.upsert(node);
        Ok(())
    }

    /// Execute the prepared statement, with `params` as positional values or,
    /// when `None`, with the values registered by `bind_param`.
    pub fn execute(&mut self, params: Option<&[Value]>) -> Result<bool> {
        self.ensure_active()?;
        self.reset_result();

        let required = self
            .cli
            .num_params()
            .map_err(|e| self.fail("Statement Execute Failed: ", e))? as usize;

        let nodes = if required == 0 {
            Vec::new()
        } else {
            match params {
                Some(values) => self.positional_nodes(values, required)?,
                None => {
                    if self.params.is_empty() {
                        return Err(IbmDbError::Data("Parameters not bound".to_string()));
                    }
                    if self.params.len() != required {
                        return Err(count_mismatch(self.params.len(), required));
                    }
                    self.params.iter().cloned().collect()
                }
            }
        };

        if !nodes.is_empty() {
            self.cli
                .reset_params()
                .map_err(|e| self.fail("Binding Error: ", e))?;
        }
        self.output_positions.clear();
        for node in &nodes {
            let binding = build_binding(node)?;
            self.cli
                .bind_param(node.position, binding)
                .map_err(|e| self.fail("Binding Error: ", e))?;
            if node.direction.is_output() {
                self.output_positions.insert(node.position);
            }
        }

        let status = self
            .cli
            .execute()
            .map_err(|e| self.fail("Statement Execute Failed: ", e))?;
        if status == ExecStatus::NeedData {
            self.send_deferred()?;
        }
        self.log("execute", &[("params", nodes.len().to_string())]);
        Ok(true)
    }

    /// Temporary nodes for a positional execute; never stored in the cache.
    fn positional_nodes(&mut self, values: &[Value], required: usize) -> Result<Vec<ParamNode>> {
        if values.len() != required {
            return Err(count_mismatch(values.len(), required));
        }
        let mut nodes = Vec::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            let position = (index + 1) as u16;
            let node = match self.params.get(position) {
                Some(bound) => ParamNode {
                    value: value.clone(),
                    ..bound.clone()
                },
                None => {
                    let desc = self
                        .cli
                        .describe_param(position)
                        .map_err(|e| self.fail("Describe Param Failed: ", e))?;
                    ParamNode::described(position, desc, value.clone())
                }
            };
            nodes.push(node);
        }
        Ok(nodes)
    }

    fn send_deferred(&mut self) -> Result<()> {
        loop {
            let next = self
                .cli
                .param_data()
                .map_err(|e| self.fail("Statement Execute Failed: ", e))?;
            let Some(position) = next else {
                return Ok(());
            };
            self.cli
                .put_param_data(position)
                .map_err(|e| self.fail("Sending data failed: ", e))?;
        }
    }

    /// Value of an OUTPUT or INPUT_OUTPUT parameter after the last execute.
    pub fn param_value(&self, position: u16) -> Option<Value> {
        if !self.output_positions.contains(&position) {
            return None;
        }
        self.cli.param_output(position).map(output_value)
    }

    /// Describe and bind the result columns on first use. An empty list means
    /// the statement produced no result set.
    fn columns(&mut self) -> Result<&[ColumnMeta]> {
        if self.released {
            return Err(IbmDbError::InvalidHandle(format!(
                "{}result set was freed",
                COLUMN_INFO_ERROR
            )));
        }
        if self.columns.is_none() {
            let count = self
                .cli
                .num_result_cols()
                .map_err(|e| self.fail("SQLNumResultCols failed: ", e))?;
            let described = describe_and_bind(self.cli.as_mut(), count.max(0) as u16, self.modes.bin_mode)
                .map_err(|e| self.fail(COLUMN_INFO_ERROR, e))?;
            self.columns = Some(described);
        }
        Ok(self.columns.as_deref().unwrap_or_default())
    }

    fn result_columns(&mut self) -> Result<Vec<ColumnMeta>> {
        let columns = self.columns()?;
        if columns.is_empty() {
            return Err(IbmDbError::Data(format!(
                "{}statement has no result set",
                COLUMN_INFO_ERROR
            )));
        }
        Ok(columns.to_vec())
    }

    /// Advance the cursor. `Ok(false)` is end-of-data; once reached, further
    /// calls return it without asking the driver, except for an explicit row
    /// number on a scrollable cursor.
    pub fn fetch_row(&mut self, row_number: Option<i64>) -> Result<bool> {
        let orientation = match row_number {
            Some(n) if n <= 0 => return Err(IbmDbError::Argument(ROW_NUMBER_ERROR.to_string())),
            Some(n) => FetchOrientation::Absolute(n),
            None => FetchOrientation::Next,
        };
        self.ensure_active()?;
        self.result_columns()?;
        self.recno.reset();

        let scroll = matches!(orientation, FetchOrientation::Absolute(_)) && self.cursor_type() != 0;
        if self.cursor == Cursor::Exhausted && !scroll {
            return Ok(false);
        }
        self.row_cache.clear();
        let found = self
            .cli
            .fetch(orientation)
            .map_err(|e| self.fail("Fetch Failure: ", e))?;
        self.cursor = if found { Cursor::OnRow } else { Cursor::Exhausted };
        Ok(found)
    }

    fn fetch_shaped(&mut self, row_number: Option<i64>, shape: FetchShape) -> Result<Option<Row>> {
        if !self.fetch_row(row_number)? {
            return Ok(None);
        }
        self.current_row(shape).map(Some)
    }

    /// The row the cursor is on, in `shape`. The cursor does not move.
    pub fn current_row(&mut self, shape: FetchShape) -> Result<Row> {
        self.ensure_active()?;
        let columns = self.result_columns()?;
        if self.cursor != Cursor::OnRow {
            return Err(IbmDbError::Data(NO_ROW_ERROR.to_string()));
        }
        build_row(
            self.cli.as_mut(),
            &columns,
            shape,
            self.modes.case_mode,
            self.modes.bin_mode,
            &mut self.row_cache,
        )
        .map_err(|e| self.fail("Fetch Failure: ", e))
    }

    /// Next row keyed by (case-folded) column name.
    pub fn fetch_assoc(&mut self, row_number: Option<i64>) -> Result<Option<Row>> {
        self.fetch_shaped(row_number, FetchShape::Assoc)
    }

    /// Next row keyed by 0-based column position.
    pub fn fetch_array(&mut self, row_number: Option<i64>) -> Result<Option<Row>> {
        self.fetch_shaped(row_number, FetchShape::Index)
    }

    /// Next row keyed by both name and position.
    pub fn fetch_both(&mut self, row_number: Option<i64>) -> Result<Option<Row>> {
        self.fetch_shaped(row_number, FetchShape::Both)
    }

    /// One column of the row the cursor is on.
    pub fn result(&mut self, column: impl Into<ColumnRef>) -> Result<Value> {
        self.ensure_active()?;
        let column = column.into();
        let columns = self.result_columns()?;
        let index = find_column(&columns, &column, self.modes.case_mode)
            .ok_or_else(|| IbmDbError::Argument("Column ordinal out of range".to_string()))?;
        if self.cursor != Cursor::OnRow {
            return Err(IbmDbError::Data(NO_ROW_ERROR.to_string()));
        }
        read_column(
            self.cli.as_mut(),
            &columns[index],
            index,
            self.modes.bin_mode,
            &mut self.row_cache,
        )
        .map_err(|e| self.fail("Fetch Failure: ", e))
    }

    pub fn num_fields(&mut self) -> Result<usize> {
        self.ensure_active()?;
        let count = self
            .cli
            .num_result_cols()
            .map_err(|e| self.fail("SQLNumResultCols failed: ", e))?;
        Ok(count.max(0) as usize)
    }

    /// Rows affected by the last INSERT/UPDATE/DELETE.
    pub fn num_rows(&mut self) -> Result<i64> {
        self.ensure_active()?;
        self.cli
            .row_count()
            .map_err(|e| self.fail("SQLRowCount failed: ", e))
    }

    fn field(&mut self, column: &ColumnRef) -> Result<Option<(usize, ColumnMeta)>> {
        self.ensure_active()?;
        let case_mode = self.modes.case_mode;
        let columns = self.columns()?;
        Ok(find_column(columns, column, case_mode).map(|i| (i, columns[i].clone())))
    }

    pub fn field_name(&mut self, column: impl Into<ColumnRef>) -> Result<Option<String>> {
        let case_mode = self.modes.case_mode;
        Ok(self
            .field(&column.into())?
            .map(|(_, meta)| case_mode.apply(&meta.name)))
    }

    /// 0-based position of the column.
    pub fn field_num(&mut self, column: impl Into<ColumnRef>) -> Result<Option<usize>> {
        Ok(self.field(&column.into())?.map(|(i, _)| i))
    }

    pub fn field_type(&mut self, column: impl Into<ColumnRef>) -> Result<Option<&'static str>> {
        Ok(self
            .field(&column.into())?
            .map(|(_, meta)| field_type_name(meta.sql_type)))
    }

    pub fn field_precision(&mut self, column: impl Into<ColumnRef>) -> Result<Option<i64>> {
        Ok(self.field(&column.into())?.map(|(_, meta)| meta.size as i64))
    }

    pub fn field_scale(&mut self, column: impl Into<ColumnRef>) -> Result<Option<i64>> {
        Ok(self.field(&column.into())?.map(|(_, meta)| meta.scale as i64))
    }

    pub fn field_nullable(&mut self, column: impl Into<ColumnRef>) -> Result<Option<bool>> {
        Ok(self
            .field(&column.into())?
            .map(|(_, meta)| meta.nullable == SQL_NULLABLE))
    }

    pub fn field_display_size(&mut self, column: impl Into<ColumnRef>) -> Result<Option<i64>> {
        self.column_attribute(&column.into(), SQL_DESC_DISPLAY_SIZE)
    }

    pub fn field_width(&mut self, column: impl Into<ColumnRef>) -> Result<Option<i64>> {
        self.column_attribute(&column.into(), SQL_DESC_LENGTH)
    }

    fn column_attribute(&mut self, column: &ColumnRef, field: u16) -> Result<Option<i64>> {
        let Some((index, _)) = self.field(column)? else {
            return Ok(None);
        };
        self.cli
            .col_attribute((index + 1) as u16, field)
            .map(Some)
            .map_err(|e| self.fail(COLUMN_INFO_ERROR, e))
    }

    /// 0 for a forward-only cursor, 1 for a scrollable one.
    pub fn cursor_type(&self) -> i64 {
        cursor_kind(self.modes.cursor_attr)
    }

    pub fn case_mode(&self) -> CaseMode {
        self.modes.case_mode
    }

    pub fn bin_mode(&self) -> BinMode {
        self.modes.bin_mode
    }

    /// Move to the next result set of a multi-result call. The returned
    /// statement owns the driver cursor there; this one gets a fresh driver
    /// statement, re-prepared from its SQL so its bound parameters stay usable.
    pub fn next_result(&mut self) -> Result<Option<Statement>> {
        self.ensure_active()?;
        self.shared.clear(HandleKind::Statement);
        let more = self
            .cli
            .more_results()
            .map_err(|e| self.fail("", e))?;
        if !more {
            return Ok(None);
        }

        let fresh = {
            let mut conn = lock(&self.conn)?;
            conn.cli
                .allocate_statement()
                .map_err(|e| self.shared.fail(HandleKind::Connection, "", e))?
        };
        let next = Statement::new(
            self.conn.clone(),
            self.shared.clone(),
            std::mem::replace(&mut self.cli, fresh),
            self.modes,
            self.sql.as_deref(),
        )?;

        self.columns = None;
        self.cursor = Cursor::Before;
        self.row_cache.clear();
        self.released = false;
        self.output_positions.clear();
        if self.modes.cursor_attr != SQL_CURSOR_FORWARD_ONLY {
            if let Err(e) = self
                .cli
                .set_attr(SQL_ATTR_CURSOR_TYPE, &AttrValue::Int(self.modes.cursor_attr))
            {
                log::warn!("Restoring cursor type failed: {}", e);
            }
        }
        if let Some(sql) = self.sql.clone() {
            if let Err(e) = self.cli.prepare(&sql) {
                log::warn!("Re-preparing statement after next_result failed: {}", e);
            }
        }
        Ok(Some(next))
    }

    /// Close the cursor and drop the result metadata.
    pub fn free_result(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.cli.close_cursor().map_err(|e| self.fail("", e))?;
        if self.columns.take().is_some_and(|cols| !cols.is_empty()) {
            self.cli.unbind_cols().map_err(|e| self.fail("", e))?;
        }
        self.released = true;
        self.cursor = Cursor::Before;
        self.row_cache.clear();
        Ok(())
    }

    /// Statements are released when dropped; kept for callers of the old API.
    #[deprecated(note = "statements release their driver handle when dropped")]
    pub fn free_stmt(&mut self) -> Result<()> {
        log::warn!("free_stmt is deprecated; the statement is released when dropped");
        Ok(())
    }

    pub fn set_option(&mut self, options: &Options) -> Result<()> {
        for (key, value) in options.iter() {
            self.apply_option(*key, value)?;
        }
        Ok(())
    }

    fn apply_option(&mut self, key: i32, value: &OptionValue) -> Result<()> {
        if key == ATTR_CASE {
            self.modes.case_mode = CaseMode::parse(value)?;
            return Ok(());
        }
        self.ensure_active()?;
        self.cli
            .set_attr(key, &AttrValue::from(value))
            .map_err(|e| self.fail("", e))?;
        if key == SQL_ATTR_CURSOR_TYPE {
            self.modes.cursor_attr = value.as_int().unwrap_or(SQL_CURSOR_FORWARD_ONLY);
        }
        Ok(())
    }

    /// Only `SQL_ATTR_CURSOR_TYPE` can be read back from a statement.
    pub fn get_option(&self, key: i32) -> Result<OptionValue> {
        if key != SQL_ATTR_CURSOR_TYPE {
            return Err(IbmDbError::Argument(INVALID_PARAMETER.to_string()));
        }
        self.ensure_active()?;
        self.cli
            .get_attr_int(key)
            .map(OptionValue::Int)
            .map_err(|e| self.fail("", e))
    }

    /// Identity value generated by the last INSERT on this statement.
    pub fn get_last_serial_value(&self) -> Result<Option<i64>> {
        self.ensure_active()?;
        let raw = self
            .cli
            .get_attr_str(SQL_ATTR_GET_GENERATED_VALUE)
            .map_err(|e| self.fail("", e))?;
        Ok(leading_integer(&raw))
    }

    /// SQLSTATE of the next diagnostic record of this statement.
    pub fn error(&mut self) -> String {
        let cli = &self.cli;
        self.recno.next_state(|n| cli.diagnostic(n))
    }

    /// Message of the next diagnostic record of this statement.
    pub fn errormsg(&mut self) -> String {
        let cli = &self.cli;
        self.recno.next_message(|n| cli.diagnostic(n))
    }
}

fn count_mismatch(bound: usize, required: usize) -> IbmDbError {
    IbmDbError::Data(format!(
        "{} params bound not matching {} required",
        bound, required
    ))
}

fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    let digits = text
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .count();
    text[..digits].parse().ok()
}
