//! Session key cache and refresh policy.
//!
//! # Design
//! `SessionManager` owns the only shared mutable state of a client. The lock
//! around `SessionState` is held across the `verifyUser` exchange, so
//! concurrent callers sharing one client wait for a single bootstrap call and
//! then observe its result instead of each fetching a key of their own.
//!
//! The manager does not know how to talk to the API. `ensure_key` takes the
//! bootstrap call as a closure, which the client implements with its own
//! `send("verifyUser", ..)`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::error::ApiError;
use crate::types::SessionRecord;

/// Seconds subtracted from the server-declared session lifetime.
pub const SAFETY_MARGIN_SECS: i64 = 30;

/// Source of the current unix time, in seconds.
pub trait Clock {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> i64 {
        (**self).now()
    }
}

/// Cached session key and its expiry (unix seconds).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub key: Option<String>,
    pub expires_at: Option<i64>,
}

impl SessionState {
    /// The key, if set and `expires_at` is strictly after `now`.
    pub fn usable_key(&self, now: i64) -> Option<&str> {
        match (&self.key, self.expires_at) {
            (Some(key), Some(expires_at)) if !key.is_empty() && expires_at > now => Some(key),
            _ => None,
        }
    }
}

/// Result of `SessionManager::ensure_key`.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    Key(String),
    /// `verifyUser` completed without a usable key; its decoded response.
    Rejected(Value),
}

#[derive(Debug, Default)]
pub struct SessionManager {
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn set_key(&self, key: Option<String>) {
        self.lock().key = key;
    }

    pub fn set_expires_at(&self, expires_at: Option<i64>) {
        self.lock().expires_at = expires_at;
    }

    pub fn seed(&self, key: String, expires_at: i64) {
        *self.lock() = SessionState {
            key: Some(key),
            expires_at: Some(expires_at),
        };
    }

    pub fn clear(&self) {
        *self.lock() = SessionState::default();
    }

    /// Return a valid session key, calling `verify` at most once to get one.
    ///
    /// `verify` performs the `verifyUser` call and returns its decoded
    /// response. Its errors propagate unchanged and leave the cache as it
    /// was. A response without a usable key clears the cached key and is
    /// handed back as `KeyOutcome::Rejected`.
    pub fn ensure_key<C, F>(&self, clock: &C, verify: F) -> Result<KeyOutcome, ApiError>
    where
        C: Clock + ?Sized,
        F: FnOnce() -> Result<Value, ApiError>,
    {
        let mut state = self.lock();
        if let Some(key) = state.usable_key(clock.now()) {
            return Ok(KeyOutcome::Key(key.to_string()));
        }

        let response = verify()?;
        match SessionRecord::from_response(&response) {
            Some(record) => {
                let expires_at = clock
                    .now()
                    .saturating_add(record.session_length)
                    .saturating_sub(SAFETY_MARGIN_SECS);
                tracing::info!(
                    session_length = record.session_length,
                    expires_at,
                    "obtained API session key"
                );
                state.key = Some(record.session_key.clone());
                state.expires_at = Some(expires_at);
                Ok(KeyOutcome::Key(record.session_key))
            }
            None => {
                tracing::warn!("verifyUser returned no session key");
                state.key = None;
                Ok(KeyOutcome::Rejected(response))
            }
        }
    }

    // The state is plain data, so a panic elsewhere cannot leave it torn.
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
