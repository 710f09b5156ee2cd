pub mod binding;
pub mod catalog;
pub mod connection;
pub mod context;
pub mod diagnostics;
pub mod fetch;
pub mod metadata;
pub mod options;
pub mod param_cache;
pub mod server_info;
pub mod statement;

use std::sync::{Mutex, MutexGuard};

use crate::error::{IbmDbError, Result};

pub use connection::{Connection, ServerKind};
pub use context::IbmDb;
pub use diagnostics::HandleKind;
pub use metadata::{ColumnMeta, ColumnRef};
pub use options::{
    CaseMode, OptionValue, Options, ATTR_CASE, CASE_LOWER, CASE_NATURAL, CASE_UPPER,
    RESOURCE_CONNECTION,
};
pub use param_cache::{BindOptions, ParamDirection};
pub use server_info::{ClientInfo, ServerInfo};
pub use statement::{Statement, StatementModes};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| IbmDbError::Internal("Lock poisoned".to_string()))
}
