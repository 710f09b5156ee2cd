pub mod logging;

pub use logging::{redact_connection_string, StructuredLogger};
