//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole days elapsed between `since` and `now`
///
/// Truncates partial days. A `since` in the future yields a negative count.
pub fn days_between(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(since).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_days_between_truncates_partial_days() {
        let base = now();
        assert_eq!(days_between(base - Duration::hours(47), base), 1);
        assert_eq!(days_between(base - Duration::hours(48), base), 2);
    }

    #[test]
    fn test_days_between_same_instant() {
        let base = now();
        assert_eq!(days_between(base, base), 0);
    }

    #[test]
    fn test_days_between_future_is_negative() {
        let base = now();
        assert_eq!(days_between(base + Duration::days(3), base), -3);
    }
}
