//! Server and client attributes read through `SQLGetInfo`.

use serde::Serialize;

use crate::cli::codes::*;
use crate::cli::{CliConnection, CliResult};
use crate::error::Result;

use super::connection::Connection;
use super::diagnostics::HandleKind;
use super::lock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub dbms_name: String,
    pub dbms_ver: String,
    pub db_codepage: u32,
    pub db_name: String,
    pub inst_name: String,
    pub special_chars: String,
    pub keywords: Vec<String>,
    pub dft_isolation: String,
    pub isolation_option: Vec<String>,
    pub sql_conformance: String,
    pub procedures: bool,
    pub identifier_quote_char: String,
    pub like_escape_clause: bool,
    pub max_col_name_len: u32,
    pub max_row_size: u32,
    pub max_identifier_len: u32,
    pub max_index_size: u32,
    pub max_proc_name_len: u32,
    pub max_schema_name_len: u32,
    pub max_statement_len: u32,
    pub max_table_name_len: u32,
    pub non_nullable_columns: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub driver_name: String,
    pub driver_ver: String,
    pub data_source_name: String,
    pub driver_odbc_ver: String,
    pub odbc_ver: String,
    pub odbc_sql_conformance: String,
    pub appl_codepage: u32,
    pub conn_codepage: u32,
}

const ISOLATION_LEVELS: [(u32, &str); 5] = [
    (SQL_TXN_READ_UNCOMMITTED, "UR"),
    (SQL_TXN_READ_COMMITTED, "CS"),
    (SQL_TXN_REPEATABLE_READ, "RS"),
    (SQL_TXN_SERIALIZABLE, "RR"),
    (SQL_TXN_NOCOMMIT, "NC"),
];

fn isolation_names(mask: u32) -> Vec<String> {
    ISOLATION_LEVELS
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, name)| name.to_string())
        .collect()
}

fn sql_conformance(mask: u32) -> &'static str {
    match mask {
        SQL_SC_SQL92_ENTRY => "ENTRY",
        SQL_SC_FIPS127_2_TRANSITIONAL => "FIPS127",
        SQL_SC_SQL92_FULL => "FULL",
        SQL_SC_SQL92_INTERMEDIATE => "INTERMEDIATE",
        _ => "",
    }
}

fn odbc_conformance(level: u16) -> &'static str {
    match level {
        SQL_OSC_MINIMUM => "MINIMUM",
        SQL_OSC_CORE => "CORE",
        SQL_OSC_EXTENDED => "EXTENDED",
        _ => "",
    }
}

fn read_server_info(cli: &dyn CliConnection) -> CliResult<ServerInfo> {
    let text = |info| cli.get_info_str(info);
    let short = |info| cli.get_info_u16(info).map(u32::from);
    let long = |info| cli.get_info_u32(info);

    let keywords = text(SQL_KEYWORDS)?
        .split(',')
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    let dft_isolation = isolation_names(long(SQL_DEFAULT_TXN_ISOLATION)?)
        .pop()
        .unwrap_or_default();
    let non_nullable_columns = match cli.get_info_u16(SQL_NON_NULLABLE_COLUMNS)? {
        SQL_NNC_NON_NULL => Some(true),
        SQL_NNC_NULL => Some(false),
        _ => None,
    };

    Ok(ServerInfo {
        dbms_name: text(SQL_DBMS_NAME)?,
        dbms_ver: text(SQL_DBMS_VER)?,
        db_codepage: long(SQL_DATABASE_CODEPAGE)?,
        db_name: text(SQL_DATABASE_NAME)?,
        inst_name: text(SQL_SERVER_NAME)?,
        special_chars: text(SQL_SPECIAL_CHARACTERS)?,
        keywords,
        dft_isolation,
        isolation_option: isolation_names(long(SQL_TXN_ISOLATION_OPTION)?),
        sql_conformance: sql_conformance(long(SQL_SQL_CONFORMANCE)?).to_string(),
        procedures: text(SQL_PROCEDURES)? == "Y",
        identifier_quote_char: text(SQL_IDENTIFIER_QUOTE_CHAR)?,
        like_escape_clause: text(SQL_LIKE_ESCAPE_CLAUSE)? == "Y",
        max_col_name_len: short(SQL_MAX_COLUMN_NAME_LEN)?,
        max_row_size: long(SQL_MAX_ROW_SIZE)?,
        max_identifier_len: short(SQL_MAX_IDENTIFIER_LEN)?,
        max_index_size: long(SQL_MAX_INDEX_SIZE)?,
        max_proc_name_len: short(SQL_MAX_PROCEDURE_NAME_LEN)?,
        max_schema_name_len: short(SQL_MAX_SCHEMA_NAME_LEN)?,
        max_statement_len: long(SQL_MAX_STATEMENT_LEN)?,
        max_table_name_len: short(SQL_MAX_TABLE_NAME_LEN)?,
        non_nullable_columns,
    })
}

fn read_client_info(cli: &dyn CliConnection) -> CliResult<ClientInfo> {
    Ok(ClientInfo {
        driver_name: cli.get_info_str(SQL_DRIVER_NAME)?,
        driver_ver: cli.get_info_str(SQL_DRIVER_VER)?,
        data_source_name: cli.get_info_str(SQL_DATA_SOURCE_NAME)?,
        driver_odbc_ver: cli.get_info_str(SQL_DRIVER_ODBC_VER)?,
        odbc_ver: cli.get_info_str(SQL_ODBC_VER)?,
        odbc_sql_conformance: odbc_conformance(cli.get_info_u16(SQL_ODBC_SQL_CONFORMANCE)?)
            .to_string(),
        appl_codepage: cli.get_info_u32(SQL_APPLICATION_CODEPAGE)?,
        conn_codepage: cli.get_info_u32(SQL_CONNECT_CODEPAGE)?,
    })
}

impl Connection {
    pub fn server_info(&self) -> Result<ServerInfo> {
        let state = lock(&self.inner)?;
        state.ensure_active()?;
        read_server_info(state.cli.as_ref())
            .map_err(|e| self.shared.fail(HandleKind::Connection, "", e))
    }

    pub fn client_info(&self) -> Result<ClientInfo> {
        let state = lock(&self.inner)?;
        state.ensure_active()?;
        read_client_info(state.cli.as_ref())
            .map_err(|e| self.shared.fail(HandleKind::Connection, "", e))
    }
}
