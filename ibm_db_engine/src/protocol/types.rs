use crate::cli::codes::*;

/// How a result column is buffered and which host value it surfaces as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    /// Double-byte and wide character types. The size is in characters, each
    /// of which takes up to four bytes once converted to UTF-8.
    WideText,
    /// Character types without a useful bound; read with get-data.
    LongText,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Decimal,
    Date,
    Time,
    Timestamp,
    Binary,
    Clob,
    Blob,
    Xml,
}

impl ColumnKind {
    pub fn from_sql_type(sql_type: i16) -> Self {
        match sql_type {
            SQL_CHAR | SQL_VARCHAR => Self::Text,
            SQL_WCHAR | SQL_WVARCHAR | SQL_GRAPHIC | SQL_VARGRAPHIC => Self::WideText,
            SQL_LONGVARCHAR | SQL_WLONGVARCHAR | SQL_LONGVARGRAPHIC => Self::LongText,
            SQL_SMALLINT | SQL_TINYINT | SQL_BIT => Self::SmallInt,
            SQL_INTEGER => Self::Integer,
            SQL_BIGINT => Self::BigInt,
            SQL_REAL | SQL_FLOAT | SQL_DOUBLE => Self::Float,
            SQL_DECIMAL | SQL_NUMERIC | SQL_DECFLOAT => Self::Decimal,
            SQL_DATE | SQL_TYPE_DATE => Self::Date,
            SQL_TIME | SQL_TYPE_TIME => Self::Time,
            SQL_TIMESTAMP | SQL_TYPE_TIMESTAMP => Self::Timestamp,
            SQL_BINARY | SQL_VARBINARY | SQL_LONGVARBINARY => Self::Binary,
            SQL_CLOB | SQL_DBCLOB => Self::Clob,
            SQL_BLOB => Self::Blob,
            SQL_XML => Self::Xml,
            _ => Self::Text,
        }
    }

    /// Large objects are never pre-bound; they are sized then read per row.
    pub fn is_lob(self) -> bool {
        matches!(self, Self::Clob | Self::Blob | Self::Xml)
    }

    pub fn is_long(self) -> bool {
        self.is_lob() || self == Self::LongText
    }
}

/// Host-facing type name reported by field introspection.
pub fn field_type_name(sql_type: i16) -> &'static str {
    match sql_type {
        SQL_SMALLINT | SQL_INTEGER | SQL_BIGINT => "int",
        SQL_REAL | SQL_FLOAT | SQL_DOUBLE | SQL_DECIMAL | SQL_NUMERIC => "real",
        SQL_CLOB => "clob",
        SQL_BLOB => "blob",
        SQL_XML => "xml",
        SQL_DATE | SQL_TYPE_DATE => "date",
        SQL_TIME | SQL_TYPE_TIME => "time",
        SQL_TIMESTAMP | SQL_TYPE_TIMESTAMP => "timestamp",
        _ => "string",
    }
}

/// Parameter SQL types whose string/bytes values travel as large objects.
pub fn is_lob_param(sql_type: i16) -> bool {
    matches!(sql_type, SQL_CLOB | SQL_BLOB | SQL_DBCLOB)
}

/// Parameter SQL types whose string/bytes values are bound as raw bytes.
pub fn is_binary_param(sql_type: i16) -> bool {
    matches!(
        sql_type,
        SQL_BINARY | SQL_VARBINARY | SQL_LONGVARBINARY | SQL_XML
    )
}
