//! Process-wide reviewer target.
//!
//! Loaded once at startup from `TARGET_USER_ID` and read on every
//! reviewer-forward. Kept behind a lock for publication safety; tests set it
//! explicitly.

use once_cell::sync::Lazy;
use std::sync::RwLock;

static TARGET_USER_ID: Lazy<RwLock<i64>> = Lazy::new(|| RwLock::new(0));

/// Publishes the reviewer target id. Zero disables reviewer-forward.
pub fn set(id: i64) {
    match TARGET_USER_ID.write() {
        Ok(mut guard) => *guard = id,
        Err(poisoned) => *poisoned.into_inner() = id,
    }
}

/// Returns the configured reviewer target id (0 when unset).
pub fn get() -> i64 {
    match TARGET_USER_ID.read() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        set(999);
        assert_eq!(get(), 999);
        set(0);
        assert_eq!(get(), 0);
    }
}
