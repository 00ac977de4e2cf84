//! Expiry of staging records.
//!
//! Expiry is evaluated against the time at which a query runs. Nothing here
//! schedules work; callers purge expired records themselves.

use std::{fmt, sync::Mutex};

use chrono::{DateTime, TimeDelta, Utc};

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Source of "now" for expiry stamping and filtering.
pub trait Clock: fmt::Debug + Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self { Self(Mutex::new(start)) }

  pub fn set(&self, now: DateTime<Utc>) {
    *self.0.lock().unwrap_or_else(|e| e.into_inner()) = now;
  }

  pub fn advance(&self, by: TimeDelta) {
    let mut now = self.0.lock().unwrap_or_else(|e| e.into_inner());
    *now += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.0.lock().unwrap_or_else(|e| e.into_inner())
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Time-to-live attached to a staging schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
  pub lifetime: TimeDelta,
}

impl ExpiryPolicy {
  pub fn new(lifetime: TimeDelta) -> Self { Self { lifetime } }

  /// Expiry timestamp for a record created at `created`, or `None` when it
  /// falls outside the representable range.
  pub fn expires_at(&self, created: DateTime<Utc>) -> Option<DateTime<Utc>> {
    created.checked_add_signed(self.lifetime)
  }

  /// A record is active up to and including its expiry instant.
  pub fn is_active(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at >= now
  }

  /// Eligible for purging: strictly past its expiry instant.
  pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at < now
  }
}
