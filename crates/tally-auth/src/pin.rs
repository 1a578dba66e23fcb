//! PIN verification gated by the attempt tracker
//!
//! The PIN is hashed using Argon2id and the PHC string is kept in the
//! injected store. Every verification consults the tracker first, so a
//! locked device refuses even the correct PIN.
//!
//! Hashing and verification run on tokio's blocking pool.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::{debug, info};
use zeroize::Zeroizing;

use tally_core::{with_timeout, KeyValueStore, PinSettings};

use super::{AttemptOutcome, AuthError, AuthState, PinAttemptTracker, Result};

/// Default minimum PIN length
pub const MIN_PIN_LENGTH: usize = 4;
/// Default maximum PIN length
pub const MAX_PIN_LENGTH: usize = 6;

/// Store key prefix for the PIN hash
pub const CREDENTIAL_KEY_PREFIX: &str = "pin-credential/";

/// Verifies PINs and biometric unlocks for one device scope
pub struct PinGate {
    tracker: PinAttemptTracker,
    store: Arc<dyn KeyValueStore>,
    key: String,
    timeout: Duration,
    min_length: usize,
    max_length: usize,
    /// Argon2id PHC string, if a PIN has been set
    credential: Option<String>,
}

impl PinGate {
    /// Open the gate for `scope`, loading any stored credential
    pub async fn open(
        scope: &str,
        tracker: PinAttemptTracker,
        store: Arc<dyn KeyValueStore>,
        timeout: Duration,
    ) -> Result<Self> {
        let key = format!("{}{}", CREDENTIAL_KEY_PREFIX, scope);

        let credential = with_timeout(timeout, store.get(&key))
            .await?
            .map(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| AuthError::CryptoError(format!("Invalid stored hash: {}", e)))
            })
            .transpose()?;

        Ok(Self {
            tracker,
            store,
            key,
            timeout,
            min_length: MIN_PIN_LENGTH,
            max_length: MAX_PIN_LENGTH,
            credential,
        })
    }

    /// Apply the PIN length bounds from configuration
    pub fn with_settings(mut self, settings: &PinSettings) -> Self {
        self.min_length = settings.min_length;
        self.max_length = settings.max_length;
        self
    }

    /// The attempt tracker behind this gate
    pub fn tracker(&self) -> &PinAttemptTracker {
        &self.tracker
    }

    /// Check if a PIN has been set
    pub fn is_pin_set(&self) -> bool {
        self.credential.is_some()
    }

    /// Current authentication state
    pub async fn state(&self) -> AuthState {
        if self.credential.is_none() {
            return AuthState::SetupRequired;
        }
        match self.tracker.snapshot().await.locked_until {
            Some(until) if self.tracker.is_locked().await => AuthState::LockedOut(until),
            _ => AuthState::RequiresPin,
        }
    }

    /// Set a new PIN (first time setup or change)
    pub async fn set_pin(&mut self, pin: &str) -> Result<()> {
        self.validate_pin(pin)?;
        let hash = hash_pin(pin).await?;

        with_timeout(
            self.timeout,
            self.store.put(&self.key, hash.clone().into_bytes()),
        )
        .await?;
        self.credential = Some(hash);
        self.tracker.reset_attempts().await;

        info!("PIN set");
        Ok(())
    }

    /// Set a new PIN after checking the confirmation entry matches
    pub async fn set_pin_confirmed(&mut self, pin: &str, confirmation: &str) -> Result<()> {
        if pin != confirmation {
            return Err(AuthError::PinMismatch);
        }
        self.set_pin(pin).await
    }

    /// Verify a PIN
    ///
    /// Refused while locked out. A match resets the attempt count; a
    /// mismatch is recorded and may start a lockout.
    pub async fn verify_pin(&self, pin: &str) -> Result<()> {
        self.ensure_unlocked().await?;

        let hash = self.credential.as_ref().ok_or(AuthError::PinNotSetUp)?;

        if pin_matches(pin, hash).await? {
            self.tracker.reset_attempts().await;
            debug!("PIN accepted");
            return Ok(());
        }

        match self.tracker.record_failed_attempt().await {
            AttemptOutcome::Retry { attempts_remaining } => {
                Err(AuthError::IncorrectPin(attempts_remaining))
            }
            AttemptOutcome::LockedOut { .. } => Err(self.locked_out_error().await),
        }
    }

    /// Accept a successful biometric check from the platform
    ///
    /// Biometrics unlock like a correct PIN, except while locked out.
    pub async fn accept_biometric(&self) -> Result<()> {
        self.ensure_unlocked().await?;
        if self.credential.is_none() {
            return Err(AuthError::PinNotSetUp);
        }
        self.tracker.reset_attempts().await;
        debug!("Biometric unlock accepted");
        Ok(())
    }

    /// Change PIN (requires the current PIN)
    pub async fn change_pin(&mut self, current_pin: &str, new_pin: &str) -> Result<()> {
        self.verify_pin(current_pin).await?;
        self.set_pin(new_pin).await
    }

    /// Factory reset - removes the PIN and clears attempt state
    pub async fn clear_pin(&mut self) -> Result<()> {
        with_timeout(self.timeout, self.store.delete(&self.key)).await?;
        self.credential = None;
        self.tracker.reset_attempts().await;
        info!("PIN cleared");
        Ok(())
    }

    /// Validate PIN format
    fn validate_pin(&self, pin: &str) -> Result<()> {
        if pin.len() < self.min_length || pin.len() > self.max_length {
            return Err(AuthError::InvalidPinLength(self.min_length, self.max_length));
        }

        if !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(AuthError::InvalidPinFormat);
        }

        Ok(())
    }

    async fn ensure_unlocked(&self) -> Result<()> {
        if self.tracker.is_locked().await {
            return Err(self.locked_out_error().await);
        }
        Ok(())
    }

    async fn locked_out_error(&self) -> AuthError {
        let remaining = self
            .tracker
            .lockout_remaining()
            .await
            .unwrap_or_default();
        // Round up so a lockout with 0.4s left does not report 0
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        AuthError::LockedOut(secs)
    }
}

/// Argon2id PHC string for `pin`
async fn hash_pin(pin: &str) -> Result<String> {
    let pin_bytes = Zeroizing::new(pin.as_bytes().to_vec());
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(&pin_bytes, &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::CryptoError(format!("Failed to hash PIN: {}", e)))
    })
    .await
    .map_err(|e| AuthError::CryptoError(format!("PIN hashing task failed: {}", e)))?
}

async fn pin_matches(pin: &str, hash: &str) -> Result<bool> {
    let pin_bytes = Zeroizing::new(pin.as_bytes().to_vec());
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || -> Result<bool> {
        let parsed_hash = PasswordHash::new(&hash)
            .map_err(|e| AuthError::CryptoError(format!("Invalid stored hash: {}", e)))?;

        // Verify with constant-time comparison
        Ok(Argon2::default()
            .verify_password(&pin_bytes, &parsed_hash)
            .is_ok())
    })
    .await
    .map_err(|e| AuthError::CryptoError(format!("PIN verification task failed: {}", e)))?
}
