//! Environment variable helpers
//!
//! ```ignore
//! use vserial_core::env::{env_get, env_get_bool};
//!
//! let size: usize = env_get("VSERIAL_BUFFER_SIZE", 300);
//! let flush = env_get_bool("VSERIAL_FLUSH_EPRINT", false);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Boolean flag: "1", "true", "yes", "on" (any case) are true, anything else
/// that is set is false, unset yields `default`
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if `key` is set and parses
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}
