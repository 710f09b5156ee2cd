//! Helper functions for reading environment variables in tests

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Database alias or `KEY=value;` connection string for live tests.
/// Returns None if not set (live tests skip in this case)
pub fn get_test_dsn() -> Option<String> {
    non_empty("IBM_DB_TEST_DSN")
}

pub fn get_test_user() -> String {
    non_empty("IBM_DB_TEST_USER").unwrap_or_default()
}

pub fn get_test_password() -> String {
    non_empty("IBM_DB_TEST_PASSWORD").unwrap_or_default()
}
