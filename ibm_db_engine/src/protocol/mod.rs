pub mod row;
pub mod types;
pub mod value;

pub use row::{FetchShape, Row, RowKey};
pub use types::{field_type_name, ColumnKind};
pub use value::{decode_values, encode_values, Value};
