//! Numeric codes of the CLI surface (sql.h / sqlext.h / sqlcli1.h).

// SQL data types
pub const SQL_UNKNOWN_TYPE: i16 = 0;
pub const SQL_CHAR: i16 = 1;
pub const SQL_NUMERIC: i16 = 2;
pub const SQL_DECIMAL: i16 = 3;
pub const SQL_INTEGER: i16 = 4;
pub const SQL_SMALLINT: i16 = 5;
pub const SQL_FLOAT: i16 = 6;
pub const SQL_REAL: i16 = 7;
pub const SQL_DOUBLE: i16 = 8;
pub const SQL_DATE: i16 = 9;
pub const SQL_TIME: i16 = 10;
pub const SQL_TIMESTAMP: i16 = 11;
pub const SQL_VARCHAR: i16 = 12;
pub const SQL_TYPE_DATE: i16 = 91;
pub const SQL_TYPE_TIME: i16 = 92;
pub const SQL_TYPE_TIMESTAMP: i16 = 93;
pub const SQL_LONGVARCHAR: i16 = -1;
pub const SQL_BINARY: i16 = -2;
pub const SQL_VARBINARY: i16 = -3;
pub const SQL_LONGVARBINARY: i16 = -4;
pub const SQL_BIGINT: i16 = -5;
pub const SQL_TINYINT: i16 = -6;
pub const SQL_BIT: i16 = -7;
pub const SQL_WCHAR: i16 = -8;
pub const SQL_WVARCHAR: i16 = -9;
pub const SQL_WLONGVARCHAR: i16 = -10;
pub const SQL_GRAPHIC: i16 = -95;
pub const SQL_VARGRAPHIC: i16 = -96;
pub const SQL_LONGVARGRAPHIC: i16 = -97;
pub const SQL_BLOB: i16 = -98;
pub const SQL_CLOB: i16 = -99;
pub const SQL_DBCLOB: i16 = -350;
pub const SQL_DBCLOB_LOCATOR: i16 = -351;
pub const SQL_DECFLOAT: i16 = -360;
pub const SQL_XML: i16 = -370;
pub const SQL_BLOB_LOCATOR: i16 = 31;
pub const SQL_CLOB_LOCATOR: i16 = 41;

// Length/indicator values
pub const SQL_NULL_DATA: isize = -1;
pub const SQL_DATA_AT_EXEC: isize = -2;
pub const SQL_NO_TOTAL: isize = -4;

// Nullability
pub const SQL_NO_NULLS: i16 = 0;
pub const SQL_NULLABLE: i16 = 1;
pub const SQL_NULLABLE_UNKNOWN: i16 = 2;

// Connection attributes
pub const SQL_ATTR_AUTOCOMMIT: i32 = 102;
pub const SQL_AUTOCOMMIT_OFF: i64 = 0;
pub const SQL_AUTOCOMMIT_ON: i64 = 1;
pub const SQL_ATTR_CONNECTION_DEAD: i32 = 1209;
pub const SQL_CD_FALSE: i64 = 0;
pub const SQL_ATTR_CURRENT_SCHEMA: i32 = 1254;
pub const SQL_ATTR_INFO_USERID: i32 = 1281;
pub const SQL_ATTR_INFO_WRKSTNNAME: i32 = 1282;
pub const SQL_ATTR_INFO_APPLNAME: i32 = 1283;
pub const SQL_ATTR_INFO_ACCTSTR: i32 = 1284;
pub const SQL_ATTR_PING_DB: i32 = 2545;
pub const SQL_ATTR_REPLACE_QUOTED_LITERALS: i32 = 2586;

// Statement attributes
pub const SQL_ATTR_QUERY_TIMEOUT: i32 = 0;
pub const SQL_ATTR_MAX_ROWS: i32 = 1;
pub const SQL_ATTR_CURSOR_TYPE: i32 = 6;
pub const SQL_ATTR_CONCURRENCY: i32 = 7;
pub const SQL_ATTR_ROW_ARRAY_SIZE: i32 = 27;
pub const SQL_ATTR_GET_GENERATED_VALUE: i32 = 2578;
pub const SQL_CURSOR_FORWARD_ONLY: i64 = 0;
pub const SQL_CURSOR_KEYSET_DRIVEN: i64 = 1;
pub const SQL_CURSOR_DYNAMIC: i64 = 2;
pub const SQL_CURSOR_STATIC: i64 = 3;

// Column attribute fields
pub const SQL_DESC_DISPLAY_SIZE: u16 = 6;
pub const SQL_DESC_LENGTH: u16 = 1003;

// SQLGetInfo
pub const SQL_DATA_SOURCE_NAME: u16 = 2;
pub const SQL_DRIVER_NAME: u16 = 6;
pub const SQL_DRIVER_VER: u16 = 7;
pub const SQL_ODBC_VER: u16 = 10;
pub const SQL_SERVER_NAME: u16 = 13;
pub const SQL_ODBC_SQL_CONFORMANCE: u16 = 15;
pub const SQL_DATABASE_NAME: u16 = 16;
pub const SQL_DBMS_NAME: u16 = 17;
pub const SQL_DBMS_VER: u16 = 18;
pub const SQL_PROCEDURES: u16 = 21;
pub const SQL_DEFAULT_TXN_ISOLATION: u16 = 26;
pub const SQL_IDENTIFIER_QUOTE_CHAR: u16 = 29;
pub const SQL_MAX_COLUMN_NAME_LEN: u16 = 30;
pub const SQL_MAX_SCHEMA_NAME_LEN: u16 = 32;
pub const SQL_MAX_PROCEDURE_NAME_LEN: u16 = 33;
pub const SQL_MAX_TABLE_NAME_LEN: u16 = 35;
pub const SQL_TXN_ISOLATION_OPTION: u16 = 72;
pub const SQL_NON_NULLABLE_COLUMNS: u16 = 75;
pub const SQL_DRIVER_ODBC_VER: u16 = 77;
pub const SQL_KEYWORDS: u16 = 89;
pub const SQL_SPECIAL_CHARACTERS: u16 = 94;
pub const SQL_MAX_INDEX_SIZE: u16 = 102;
pub const SQL_MAX_ROW_SIZE: u16 = 104;
pub const SQL_MAX_STATEMENT_LEN: u16 = 105;
pub const SQL_LIKE_ESCAPE_CLAUSE: u16 = 113;
pub const SQL_SQL_CONFORMANCE: u16 = 118;
pub const SQL_DATABASE_CODEPAGE: u16 = 2519;
pub const SQL_APPLICATION_CODEPAGE: u16 = 2520;
pub const SQL_CONNECT_CODEPAGE: u16 = 2521;
pub const SQL_MAX_IDENTIFIER_LEN: u16 = 10005;

// Transaction isolation bitmask
pub const SQL_TXN_READ_UNCOMMITTED: u32 = 0x01;
pub const SQL_TXN_READ_COMMITTED: u32 = 0x02;
pub const SQL_TXN_REPEATABLE_READ: u32 = 0x04;
pub const SQL_TXN_SERIALIZABLE: u32 = 0x08;
pub const SQL_TXN_NOCOMMIT: u32 = 0x20;

// SQL_SQL_CONFORMANCE
pub const SQL_SC_SQL92_ENTRY: u32 = 0x01;
pub const SQL_SC_FIPS127_2_TRANSITIONAL: u32 = 0x02;
pub const SQL_SC_SQL92_INTERMEDIATE: u32 = 0x04;
pub const SQL_SC_SQL92_FULL: u32 = 0x08;

// SQL_ODBC_SQL_CONFORMANCE
pub const SQL_OSC_MINIMUM: u16 = 0;
pub const SQL_OSC_CORE: u16 = 1;
pub const SQL_OSC_EXTENDED: u16 = 2;

// SQL_NON_NULLABLE_COLUMNS
pub const SQL_NNC_NULL: u16 = 0;
pub const SQL_NNC_NON_NULL: u16 = 1;

// Catalog function arguments
pub const SQL_BEST_ROWID: i16 = 1;
pub const SQL_INDEX_UNIQUE: u16 = 0;
pub const SQL_INDEX_ALL: u16 = 1;
pub const SQL_QUICK: u16 = 0;
pub const SQL_SCOPE_CURROW: i16 = 0;
pub const SQL_SCOPE_TRANSACTION: i16 = 1;
pub const SQL_SCOPE_SESSION: i16 = 2;

// Parameter directions, including the file-input extension
pub const SQL_PARAM_INPUT: i16 = 1;
pub const SQL_PARAM_INPUT_OUTPUT: i16 = 2;
pub const SQL_PARAM_OUTPUT: i16 = 4;
pub const PARAM_FILE: i16 = 11;
