//! Helpers shared by unit and integration tests.

/// Load `.env` from the working directory or its parents, if present.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
