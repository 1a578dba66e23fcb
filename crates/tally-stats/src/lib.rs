//! Tally Stats - Financial statistics and their cache
//!
//! This crate provides:
//! - Deterministic cache keys for `(user, statistic type, period)`
//! - A TTL cache over the injected key-value store with lazy expiry
//! - Aggregation of transactions into statistic payloads
//! - A get-or-compute service with a precache pass
//! - An optional background sweeper for expired entries

pub mod aggregate;
pub mod cache;
pub mod entry;
pub mod error;
pub mod key;
pub mod payload;
pub mod service;
pub mod sweeper;

pub use aggregate::{compute, Transaction, TransactionKind};
pub use cache::StatisticsCache;
pub use entry::CacheEntry;
pub use error::{Result, StatsError};
pub use key::{CacheKey, Period, StatType, CACHE_KEY_PREFIX};
pub use payload::{SeriesPoint, StatisticPayload};
pub use service::{PrecacheReport, StatisticsService, TransactionSource};
pub use sweeper::{spawn_sweeper, spawn_sweeper_with_settings, SweeperHandle, MIN_SWEEP_INTERVAL};
