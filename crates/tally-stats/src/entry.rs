//! Cache entry envelope
//!
//! The payload is kept as a JSON value so the store never needs to know
//! its type; callers decode it at the cache edge.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::clock::{add_duration, elapsed_between};

/// A stored statistic with its expiry metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Serialized payload
    pub data: serde_json::Value,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
    /// Lifetime from `created_at` (milliseconds)
    pub ttl_ms: u64,
    /// When the entry was last confirmed current
    pub validated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry written at `created_at`
    pub fn new(data: serde_json::Value, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            data,
            created_at,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            validated_at: created_at,
        }
    }

    /// Lifetime from `created_at`
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// First instant at which the entry is no longer valid
    pub fn expires_at(&self) -> DateTime<Utc> {
        add_duration(self.created_at, self.ttl())
    }

    /// Valid iff `now < created_at + ttl`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Whether the entry was validated less than `window` before `now`
    pub fn is_fresh_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        elapsed_between(self.validated_at, now) < window
    }

    pub fn to_bytes(&self) -> tally_core::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> tally_core::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_expiry_boundary() {
        let entry = CacheEntry::new(serde_json::json!(1), created(), Duration::from_millis(60_000));
        let just_before = created() + chrono::Duration::milliseconds(59_999);
        let boundary = created() + chrono::Duration::milliseconds(60_000);

        assert!(!entry.is_expired_at(created()));
        assert!(!entry.is_expired_at(just_before));
        assert!(entry.is_expired_at(boundary));
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let entry = CacheEntry::new(serde_json::json!(1), created(), Duration::ZERO);
        assert!(entry.is_expired_at(created()));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let entry = CacheEntry::new(serde_json::json!(1), created(), Duration::MAX);
        assert_eq!(entry.ttl_ms, u64::MAX);
        assert!(!entry.is_expired_at(created() + chrono::Duration::days(365 * 100)));
    }

    #[test]
    fn test_freshness_window() {
        let mut entry = CacheEntry::new(serde_json::json!(1), created(), Duration::from_secs(600));
        let window = Duration::from_secs(60);

        assert!(entry.is_fresh_at(created() + chrono::Duration::seconds(59), window));
        assert!(!entry.is_fresh_at(created() + chrono::Duration::seconds(60), window));

        entry.validated_at = created() + chrono::Duration::seconds(120);
        assert!(entry.is_fresh_at(created() + chrono::Duration::seconds(150), window));
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        assert!(CacheEntry::from_bytes(b"{\"data\":").is_err());
    }
}
