//! Environment variable parsing helpers
//!
//! Missing and malformed values both fall back to the caller's default; a
//! malformed value is logged so a typo in deployment config does not go
//! unnoticed.

use std::str::FromStr;
use tracing::warn;

/// Parse `key`, falling back to `default` when unset or unparsable
///
/// # Example
/// ```ignore
/// let max: u32 = parse_env_with_default("DB_MAX_CONNECTIONS", 20);
/// ```
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    parse_env_optional(key).unwrap_or(default)
}

/// Parse `key`, returning `None` when unset or unparsable
pub fn parse_env_optional<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}

/// Read a required string variable
pub fn require_env(key: &str) -> Result<String, String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(format!("{} environment variable not set", key)),
    }
}
