//! Tally Core - Shared building blocks for the Tally banking support layer
//!
//! This crate provides the pieces the PIN and statistics crates share:
//! - Error types and the crate `Result` alias
//! - A `Clock` abstraction with a manually advanced clock for tests
//! - The `KeyValueStore` seam with in-memory and file-backed stores
//! - TOML configuration and tracing setup

pub mod clock;
pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CacheSettings, PinSettings, TallyConfig};
pub use error::{Error, Result};
pub use store::{with_timeout, FileStore, KeyValueStore, MemoryStore};

/// Default timeout for a single store operation (milliseconds)
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;
