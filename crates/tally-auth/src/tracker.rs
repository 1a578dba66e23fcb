//! Consecutive failed-attempt tracking with timed lockout
//!
//! State machine:
//!
//! - `UNLOCKED(n)` --failure--> `UNLOCKED(n + 1)` while `n + 1 < max_attempts`
//! - `UNLOCKED(n)` --failure--> `LOCKED(now + lockout)` when `n + 1 == max_attempts`
//! - `LOCKED(until)` --any check at `now >= until`--> `UNLOCKED(0)`
//! - any state --reset--> `UNLOCKED(0)`
//!
//! Expiry is lazy: the transition out of `LOCKED` happens on the first
//! check that observes the deadline has passed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tally_core::clock::{add_duration, elapsed_between};
use tally_core::{with_timeout, Clock, KeyValueStore, SharedClock};

use super::{AuthError, LockoutPolicy, Result};

/// Store key prefix for persisted attempt state
pub const ATTEMPTS_KEY_PREFIX: &str = "pin-attempts/";

/// Attempt bookkeeping for one device or session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptState {
    /// Consecutive failed PIN entries
    pub failed_attempts: u32,
    /// End of the current lockout, if any
    pub locked_until: Option<DateTime<Utc>>,
}

impl AttemptState {
    /// Whether PIN entry is locked at `now`
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Return to the unlocked state if the lockout has elapsed
    ///
    /// Returns true when the state changed.
    fn expire_lockout(&mut self, now: DateTime<Utc>) -> bool {
        match self.locked_until {
            Some(until) if now >= until => {
                *self = Self::default();
                true
            }
            _ => false,
        }
    }
}

/// Result of recording a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// More attempts are allowed
    Retry {
        /// Attempts left before lockout
        attempts_remaining: u32,
    },
    /// PIN entry is locked
    LockedOut {
        /// When PIN entry unlocks
        until: DateTime<Utc>,
    },
}

struct Persistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
    timeout: Duration,
}

/// Tracks failed PIN entries and enforces the lockout policy
///
/// All operations are infallible. When backed by a store, every mutation is
/// written through; a failed write is logged and the in-memory state stays
/// authoritative for the rest of the session.
pub struct PinAttemptTracker {
    policy: LockoutPolicy,
    clock: SharedClock,
    /// Guards increment-then-compare and the write-through as one unit
    state: Mutex<AttemptState>,
    persistence: Option<Persistence>,
}

impl PinAttemptTracker {
    /// Create a tracker that keeps its state in memory only
    pub fn in_memory(policy: LockoutPolicy, clock: SharedClock) -> Self {
        Self {
            policy,
            clock,
            state: Mutex::new(AttemptState::default()),
            persistence: None,
        }
    }

    /// Restore the tracker for `scope` from `store`
    ///
    /// Fails with `TrackerUnavailable` if the store cannot be read within
    /// `timeout` or holds unreadable state.
    pub async fn load(
        scope: &str,
        policy: LockoutPolicy,
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
        timeout: Duration,
    ) -> Result<Self> {
        let key = format!("{}{}", ATTEMPTS_KEY_PREFIX, scope);

        let stored = with_timeout(timeout, store.get(&key))
            .await
            .map_err(|e| AuthError::TrackerUnavailable(e.to_string()))?;

        let mut state = match stored {
            Some(bytes) => serde_json::from_slice::<AttemptState>(&bytes).map_err(|e| {
                AuthError::TrackerUnavailable(format!("Failed to parse attempt state: {}", e))
            })?,
            None => AttemptState::default(),
        };

        // A count at the threshold without a deadline cannot come from this
        // tracker; lock from now rather than hand out fresh attempts.
        let now = clock.now();
        if policy.should_lock(state.failed_attempts) && state.locked_until.is_none() {
            state.locked_until = Some(add_duration(now, policy.lockout_duration));
        }
        state.expire_lockout(now);

        debug!(
            "Loaded PIN attempt state for {}: {} failed, locked: {}",
            scope,
            state.failed_attempts,
            state.is_locked_at(now)
        );

        Ok(Self {
            policy,
            clock,
            state: Mutex::new(state),
            persistence: Some(Persistence {
                store,
                key,
                timeout,
            }),
        })
    }

    /// The policy this tracker enforces
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Whether PIN entry is currently locked
    pub async fn is_locked(&self) -> bool {
        let mut state = self.state.lock().await;
        let now = self.observe(&mut state).await;
        state.is_locked_at(now)
    }

    /// Attempts left before lockout, zero while locked
    pub async fn attempts_remaining(&self) -> u32 {
        let mut state = self.state.lock().await;
        self.observe(&mut state).await;
        self.policy.attempts_remaining(state.failed_attempts)
    }

    /// Time until the current lockout ends, if locked
    pub async fn lockout_remaining(&self) -> Option<Duration> {
        let mut state = self.state.lock().await;
        let now = self.observe(&mut state).await;
        state
            .locked_until
            .filter(|&until| now < until)
            .map(|until| elapsed_between(now, until))
    }

    /// Record a failed PIN entry
    ///
    /// A failure while already locked does not extend the lockout.
    pub async fn record_failed_attempt(&self) -> AttemptOutcome {
        let mut state = self.state.lock().await;
        let now = self.observe(&mut state).await;

        if let Some(until) = state.locked_until.filter(|&until| now < until) {
            return AttemptOutcome::LockedOut { until };
        }

        state.failed_attempts = state.failed_attempts.saturating_add(1);

        let outcome = if self.policy.should_lock(state.failed_attempts) {
            let until = add_duration(now, self.policy.lockout_duration);
            state.locked_until = Some(until);
            warn!(
                "PIN entry locked after {} failed attempts until {}",
                state.failed_attempts, until
            );
            AttemptOutcome::LockedOut { until }
        } else {
            AttemptOutcome::Retry {
                attempts_remaining: self.policy.attempts_remaining(state.failed_attempts),
            }
        };

        self.persist(&state).await;
        outcome
    }

    /// Clear the failure count and any lockout (after a successful PIN match)
    pub async fn reset_attempts(&self) {
        let mut state = self.state.lock().await;
        if *state != AttemptState::default() {
            *state = AttemptState::default();
            self.persist(&state).await;
        }
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> AttemptState {
        let mut state = self.state.lock().await;
        self.observe(&mut state).await;
        state.clone()
    }

    /// Apply lazy lockout expiry and return the instant it was checked at
    async fn observe(&self, state: &mut AttemptState) -> DateTime<Utc> {
        let now = self.clock.now();
        if state.expire_lockout(now) {
            info!("PIN lockout expired");
            self.persist(state).await;
        }
        now
    }

    async fn persist(&self, state: &AttemptState) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        let bytes = match serde_json::to_vec(state) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize PIN attempt state: {}", e);
                return;
            }
        };

        if let Err(e) = with_timeout(
            persistence.timeout,
            persistence.store.put(&persistence.key, bytes),
        )
        .await
        {
            warn!(
                "Failed to persist PIN attempt state to {}: {}",
                persistence.key, e
            );
        }
    }
}
