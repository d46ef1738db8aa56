//! Transient status messages shown after operator commands.
//!
//! A message replaces the previous one and disappears on its own once its
//! lifetime has passed. Expiry is evaluated lazily against the injected
//! [`Clock`], so no timer task is involved.

use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Lifetime of messages about local edits and reloads.
pub const SHORT_MESSAGE_TTL: Duration = Duration::from_secs(3);
/// Lifetime of messages about sync cycles and connection tests.
pub const LONG_MESSAGE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub text: String,
    pub level: StatusLevel,
    pub expires_at: DateTime<Utc>,
}

impl StatusMessage {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct StatusBoard {
    clock: Arc<dyn Clock>,
    current: Mutex<Option<StatusMessage>>,
}

impl StatusBoard {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            current: Mutex::new(None),
        }
    }

    pub fn post(&self, text: impl Into<String>, level: StatusLevel, ttl: Duration) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let message = StatusMessage {
            text: text.into(),
            level,
            expires_at: self.clock.now() + ttl,
        };
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    /// The live message, if it has not expired yet.
    pub fn current(&self) -> Option<StatusMessage> {
        let now = self.clock.now();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|m| m.is_expired(now)) {
            *current = None;
        }
        current.clone()
    }

    pub fn dismiss(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
