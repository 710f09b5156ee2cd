use thiserror::Error;

use crate::cli::CliError;

/// Coarse grouping a caller can branch on. Nothing inside the crate retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// SQLSTATE 40001 or HYT00.
    Transient,
    Fatal,
    /// Rejected before reaching the driver.
    Validation,
    /// SQLSTATE class 08, or the connection was already closed.
    ConnectionLost,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IbmDbError {
    /// Wrong arity, type or value for a call's parameters; no driver call was made.
    #[error("{0}")]
    Argument(String),

    /// Operation on a freed or null handle.
    #[error("{0}")]
    InvalidHandle(String),

    #[error("Connection is not active")]
    ConnectionNotActive,

    /// A CLI call failed. `message` is already formatted as `"<text> SQLCODE=<n>"`.
    #[error("{message}")]
    Driver {
        sqlstate: [u8; 5],
        native_code: i32,
        message: String,
    },

    /// Unsupported value type or parameter-count mismatch.
    #[error("{0}")]
    Data(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),
}

impl From<CliError> for IbmDbError {
    fn from(err: CliError) -> Self {
        driver("", err)
    }
}

/// Wrap a driver failure, prefixing the call site's context to its message.
pub fn driver(context: &str, err: CliError) -> IbmDbError {
    match err {
        CliError::Diagnostic(record) => IbmDbError::Driver {
            sqlstate: record.state,
            native_code: record.native_error,
            message: format!("{}{}", context, record.formatted()),
        },
        CliError::NoDiagnostic(function) => IbmDbError::Driver {
            sqlstate: *b"HY000",
            native_code: 0,
            message: format!("{}{} failed", context, function),
        },
        CliError::InvalidHandle => {
            IbmDbError::InvalidHandle(format!("{}Invalid handle", context))
        }
        CliError::Local(message) => IbmDbError::Data(format!("{}{}", context, message)),
    }
}

impl IbmDbError {
    pub fn sqlstate(&self) -> [u8; 5] {
        match self {
            IbmDbError::Driver { sqlstate, .. } => *sqlstate,
            _ => [0u8; 5],
        }
    }

    pub fn native_code(&self) -> i32 {
        match self {
            IbmDbError::Driver { native_code, .. } => *native_code,
            _ => 0,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn to_structured(&self) -> StructuredError {
        StructuredError {
            sqlstate: self.sqlstate(),
            native_code: self.native_code(),
            message: self.message(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            IbmDbError::Driver { sqlstate, .. } => {
                sqlstate.starts_with(b"08") || sqlstate == b"40001" || sqlstate == b"HYT00"
            }
            _ => false,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        match self {
            IbmDbError::ConnectionNotActive => true,
            IbmDbError::Driver { sqlstate, .. } => sqlstate.starts_with(b"08"),
            _ => false,
        }
    }

    pub fn error_category(&self) -> ErrorCategory {
        match self {
            IbmDbError::Argument(_) | IbmDbError::Data(_) => ErrorCategory::Validation,
            _ if self.is_connection_error() => ErrorCategory::ConnectionLost,
            _ if self.is_retryable() => ErrorCategory::Transient,
            _ => ErrorCategory::Fatal,
        }
    }
}

/// Binary error record handed across the C ABI:
/// `[sqlstate: 5][native_code: i32 LE][msg_len: u32 LE][message]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredError {
    pub sqlstate: [u8; 5],
    pub native_code: i32,
    pub message: String,
}

const HEADER_LEN: usize = 13;

impl StructuredError {
    pub fn serialize(&self) -> Vec<u8> {
        let text = self.message.as_bytes();
        let mut out = Vec::with_capacity(HEADER_LEN + text.len());
        out.extend_from_slice(&self.sqlstate);
        out.extend_from_slice(&self.native_code.to_le_bytes());
        out.extend_from_slice(&(text.len() as u32).to_le_bytes());
        out.extend_from_slice(text);
        out
    }

    /// `None` when the record is truncated or the message is not UTF-8.
    pub fn deserialize(data: &[u8]) -> Option<Self> {
        let sqlstate: [u8; 5] = data.get(0..5)?.try_into().ok()?;
        let native_code = i32::from_le_bytes(data.get(5..9)?.try_into().ok()?);
        let len = u32::from_le_bytes(data.get(9..HEADER_LEN)?.try_into().ok()?) as usize;
        let text = data.get(HEADER_LEN..HEADER_LEN.checked_add(len)?)?;
        Some(Self {
            sqlstate,
            native_code,
            message: String::from_utf8(text.to_vec()).ok()?,
        })
    }
}

pub type Result<T> = std::result::Result<T, IbmDbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::DiagRecord;

    fn driver_error(state: &[u8; 5]) -> IbmDbError {
        IbmDbError::Driver {
            sqlstate: *state,
            native_code: -30081,
            message: "link failure SQLCODE=-30081".to_string(),
        }
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            IbmDbError::ConnectionNotActive.to_string(),
            "Connection is not active"
        );
        assert_eq!(
            IbmDbError::Data("2 params bound not matching 1 required".to_string()).to_string(),
            "2 params bound not matching 1 required"
        );
        assert!(IbmDbError::Internal("lock poisoned".to_string())
            .to_string()
            .contains("lock poisoned"));
    }

    #[test]
    fn test_driver_helper_prefixes_context() {
        let err = driver(
            "Statement Execute Failed: ",
            CliError::Diagnostic(DiagRecord::new("23505", -803, "SQL0803N duplicate\nkey")),
        );
        assert_eq!(
            err.to_string(),
            "Statement Execute Failed: SQL0803N duplicate SQLCODE=-803"
        );
        assert_eq!(&err.sqlstate(), b"23505");
        assert_eq!(err.native_code(), -803);
    }

    #[test]
    fn test_driver_helper_maps_non_diagnostic_failures() {
        let err = driver("Fetch Failure: ", CliError::NoDiagnostic("SQLFetch"));
        assert_eq!(err.to_string(), "Fetch Failure: SQLFetch failed");
        assert_eq!(&err.sqlstate(), b"HY000");

        assert!(matches!(
            IbmDbError::from(CliError::InvalidHandle),
            IbmDbError::InvalidHandle(_)
        ));
        assert!(matches!(
            IbmDbError::from(CliError::Local("cannot read".to_string())),
            IbmDbError::Data(_)
        ));
    }

    #[test]
    fn test_non_driver_error_defaults() {
        let err = IbmDbError::Argument("bad".to_string());
        assert_eq!(err.sqlstate(), [0u8; 5]);
        assert_eq!(err.native_code(), 0);
        let structured = err.to_structured();
        assert_eq!(structured.message, "bad");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            IbmDbError::Argument("x".to_string()).error_category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            IbmDbError::ConnectionNotActive.error_category(),
            ErrorCategory::ConnectionLost
        );
        assert_eq!(
            driver_error(b"08001").error_category(),
            ErrorCategory::ConnectionLost
        );
        assert_eq!(
            driver_error(b"40001").error_category(),
            ErrorCategory::Transient
        );
        assert_eq!(
            driver_error(b"42S02").error_category(),
            ErrorCategory::Fatal
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(driver_error(b"08001").is_retryable());
        assert!(driver_error(b"HYT00").is_retryable());
        assert!(!driver_error(b"23000").is_retryable());
        assert!(!IbmDbError::Data("x".to_string()).is_retryable());
    }

    #[test]
    fn test_structured_error_record() {
        let record = driver_error(b"08001").to_structured();
        let bytes = record.serialize();
        assert_eq!(&bytes[..5], b"08001");
        assert_eq!(bytes[5..9], (-30081i32).to_le_bytes());
        assert_eq!(bytes[9..13], (record.message.len() as u32).to_le_bytes());
        assert_eq!(&bytes[13..], record.message.as_bytes());
        assert_eq!(StructuredError::deserialize(&bytes), Some(record));
    }

    #[test]
    fn test_structured_error_rejects_truncated_records() {
        assert_eq!(StructuredError::deserialize(b"080"), None);
        let mut bytes = driver_error(b"08001").to_structured().serialize();
        bytes.pop();
        assert_eq!(StructuredError::deserialize(&bytes), None);
    }
}
