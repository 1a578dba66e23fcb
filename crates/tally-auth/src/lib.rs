//! Tally Auth - PIN gating for the banking client
//!
//! ALL PIN checks go through this crate.
//!
//! # Model
//!
//! - Consecutive failed PIN entries are counted per device/session scope
//! - Reaching the attempt limit locks PIN entry for a fixed duration
//! - Lockout expiry is observed lazily on the next check, there is no timer
//! - The PIN itself is hashed with Argon2id and never stored in the clear
//! - Biometric unlock is refused while locked out

mod lockout;
mod pin;
mod tracker;

pub use lockout::LockoutPolicy;
pub use pin::{PinGate, MAX_PIN_LENGTH, MIN_PIN_LENGTH};
pub use tracker::{AttemptOutcome, AttemptState, PinAttemptTracker};

use chrono::{DateTime, Utc};

/// Result type alias for auth operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Authentication state of the device
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum AuthState {
    /// PIN needs to be set up (first run)
    SetupRequired,
    /// PIN required for authentication
    #[default]
    RequiresPin,
    /// PIN entry is locked until the specified time
    LockedOut(DateTime<Utc>),
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("PIN not set up")]
    PinNotSetUp,

    #[error("Incorrect PIN ({0} attempts remaining)")]
    IncorrectPin(u32),

    #[error("PIN entry locked for {0} seconds")]
    LockedOut(u64),

    #[error("PIN must be {0}-{1} digits")]
    InvalidPinLength(usize, usize),

    #[error("PIN must contain only digits")]
    InvalidPinFormat,

    #[error("PINs do not match")]
    PinMismatch,

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Attempt tracker unavailable: {0}")]
    TrackerUnavailable(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] tally_core::Error),
}
