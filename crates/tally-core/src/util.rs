//! Shared utility functions used across the sync service and its clients.

use std::hash::{Hash, Hasher};

/// Stable-per-process hash of a user id, safe to put in logs.
pub fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" user-1 ".to_string())),
            Some("user-1".to_string())
        );
    }

    #[test]
    fn fingerprint_hides_user_id() {
        let fingerprint = user_fingerprint("user-1");
        assert_eq!(fingerprint, user_fingerprint("user-1"));
        assert_ne!(fingerprint, user_fingerprint("user-2"));
        assert!(!fingerprint.to_string().contains("user-1"));
    }
}
