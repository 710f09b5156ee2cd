//! Entry points odbc-sys does not declare, or declares with closed enums.
//! Attribute and info codes are plain integers so DB2 vendor values pass
//! through unchanged.

use std::ffi::c_void;

use odbc_api::sys::{HDbc, HStmt, SqlReturn};

#[cfg_attr(windows, link(name = "odbc32"))]
#[cfg_attr(not(windows), link(name = "odbc"))]
extern "system" {
    pub fn SQLSetStmtAttr(
        statement: HStmt,
        attribute: i32,
        value: *mut c_void,
        string_length: i32,
    ) -> SqlReturn;

    pub fn SQLGetStmtAttr(
        statement: HStmt,
        attribute: i32,
        value: *mut c_void,
        buffer_length: i32,
        string_length: *mut i32,
    ) -> SqlReturn;

    pub fn SQLGetInfo(
        connection: HDbc,
        info_type: u16,
        value: *mut c_void,
        buffer_length: i16,
        string_length: *mut i16,
    ) -> SqlReturn;

    pub fn SQLPrimaryKeys(
        statement: HStmt,
        catalog: *const u8,
        catalog_len: i16,
        schema: *const u8,
        schema_len: i16,
        table: *const u8,
        table_len: i16,
    ) -> SqlReturn;

    pub fn SQLProcedures(
        statement: HStmt,
        catalog: *const u8,
        catalog_len: i16,
        schema: *const u8,
        schema_len: i16,
        procedure: *const u8,
        procedure_len: i16,
    ) -> SqlReturn;

    pub fn SQLProcedureColumns(
        statement: HStmt,
        catalog: *const u8,
        catalog_len: i16,
        schema: *const u8,
        schema_len: i16,
        procedure: *const u8,
        procedure_len: i16,
        column: *const u8,
        column_len: i16,
    ) -> SqlReturn;

    pub fn SQLStatistics(
        statement: HStmt,
        catalog: *const u8,
        catalog_len: i16,
        schema: *const u8,
        schema_len: i16,
        table: *const u8,
        table_len: i16,
        unique: u16,
        reserved: u16,
    ) -> SqlReturn;

    pub fn SQLTablePrivileges(
        statement: HStmt,
        catalog: *const u8,
        catalog_len: i16,
        schema: *const u8,
        schema_len: i16,
        table: *const u8,
        table_len: i16,
    ) -> SqlReturn;

    pub fn SQLColumnPrivileges(
        statement: HStmt,
        catalog: *const u8,
        catalog_len: i16,
        schema: *const u8,
        schema_len: i16,
        table: *const u8,
        table_len: i16,
        column: *const u8,
        column_len: i16,
    ) -> SqlReturn;

    pub fn SQLSpecialColumns(
        statement: HStmt,
        identifier_type: u16,
        catalog: *const u8,
        catalog_len: i16,
        schema: *const u8,
        schema_len: i16,
        table: *const u8,
        table_len: i16,
        scope: u16,
        nullable: u16,
    ) -> SqlReturn;
}
