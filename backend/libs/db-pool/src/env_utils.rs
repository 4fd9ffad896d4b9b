//! Environment variable parsing utilities
//!
//! A variable that is absent falls back to its default; a variable that is set but
//! does not parse is an error, so a typo never silently becomes the default.

use std::str::FromStr;

/// Parse an environment variable, using `default` when it is unset or empty.
///
/// # Example
/// ```
/// let max: u32 = db_pool::env_utils::parse_env_or("DOC_EXAMPLE_UNSET_VAR", 5).unwrap();
/// assert_eq!(max, 5);
/// ```
pub fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| format!("Failed to parse environment variable {}={:?}", key, raw)),
        _ => Ok(default),
    }
}

/// Read a required environment variable.
pub fn parse_env_required<T: FromStr>(key: &str) -> Result<T, String> {
    std::env::var(key)
        .map_err(|_| format!("Environment variable {} not found", key))?
        .parse()
        .map_err(|_| format!("Failed to parse environment variable {}", key))
}
