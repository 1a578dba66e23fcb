//! Lockout policy for failed PIN entries
//!
//! A fixed number of consecutive failures locks PIN entry for a fixed
//! duration. The default allows 3 attempts and locks for 5 minutes.

use std::time::Duration;

use tally_core::PinSettings;

/// Attempt limit and lockout length
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger a lockout
    pub max_attempts: u32,
    /// How long PIN entry stays locked
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lockout_duration: Duration::from_secs(5 * 60),
        }
    }
}

impl From<&PinSettings> for LockoutPolicy {
    fn from(settings: &PinSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            lockout_duration: settings.lockout_duration(),
        }
    }
}

impl LockoutPolicy {
    /// Create a strict policy (fewer attempts, longer lockout)
    pub fn strict() -> Self {
        Self {
            max_attempts: 2,
            lockout_duration: Duration::from_secs(30 * 60),
        }
    }

    /// Create a lenient policy (more attempts, shorter lockout)
    pub fn lenient() -> Self {
        Self {
            max_attempts: 5,
            lockout_duration: Duration::from_secs(60),
        }
    }

    /// Whether `failed_attempts` has reached the lockout threshold
    pub fn should_lock(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_attempts
    }

    /// Attempts left before lockout, saturating at zero
    pub fn attempts_remaining(&self, failed_attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(failed_attempts)
    }

    /// Get a human-readable description of the current lockout state
    pub fn describe(&self, failed_attempts: u32) -> String {
        if !self.should_lock(failed_attempts) {
            return format!(
                "{} attempts remaining",
                self.attempts_remaining(failed_attempts)
            );
        }

        let secs = self.lockout_duration.as_secs();
        if secs < 60 {
            format!("Locked for {} seconds", secs)
        } else if secs < 3600 {
            format!("Locked for {} minutes", secs / 60)
        } else {
            format!("Locked for {} hours", secs / 3600)
        }
    }
}
