//! Consecutive-failure lockout per identity.
//!
//! Flow Overview:
//! 1) Every failed credential check increments the identity's failure count.
//! 2) Reaching the threshold stamps a lockout expiry of `now + duration`.
//! 3) `is_locked_out` evaluates expiry lazily and clears the record once it
//!    has passed. There is no background sweep.
//!
//! Further failures while locked never move the expiry, so the longest
//! possible lockout is exactly one duration after the triggering failure.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{clock::Clock, keyed::KeyedState};

#[derive(Debug, Default)]
struct LockoutRecord {
    failures: u32,
    locked_until: Option<DateTime<Utc>>,
}

impl LockoutRecord {
    fn clear(&mut self) {
        self.failures = 0;
        self.locked_until = None;
    }
}

pub struct LockoutTracker {
    clock: Arc<dyn Clock>,
    records: KeyedState<LockoutRecord>,
    threshold: u32,
    duration: TimeDelta,
}

impl LockoutTracker {
    pub fn new(clock: Arc<dyn Clock>, threshold: u32, duration: TimeDelta) -> Self {
        Self {
            clock,
            records: KeyedState::new(),
            threshold,
            duration,
        }
    }

    pub fn record_failure(&self, identity: &str) {
        let now = self.clock.now();
        let (failures, locked_until) = self.records.update(identity, |record| {
            record.failures = record.failures.saturating_add(1);
            if record.locked_until.is_none() && record.failures >= self.threshold {
                let until = now
                    .checked_add_signed(self.duration)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                record.locked_until = Some(until);
            }
            (record.failures, record.locked_until)
        });

        match locked_until {
            Some(until) if failures == self.threshold => {
                warn!(identity = %identity, failures, %until, "identity locked out");
            }
            _ => debug!(identity = %identity, failures, "credential failure recorded"),
        }
    }

    /// Clears failures and any lockout. Safe to call repeatedly.
    pub fn record_success(&self, identity: &str) {
        let cleared = self.records.inspect(identity, |record| record.is_some());
        if cleared {
            self.records.update(identity, LockoutRecord::clear);
        }
    }

    pub fn is_locked_out(&self, identity: &str) -> bool {
        self.remaining(identity).is_some()
    }

    /// Time left on an active lockout, or `None` when the identity may try.
    pub fn remaining(&self, identity: &str) -> Option<TimeDelta> {
        let now = self.clock.now();
        let locked = self
            .records
            .inspect(identity, |record| record.and_then(|r| r.locked_until))?;
        if now < locked {
            return Some(locked - now);
        }

        self.records.update(identity, |record| {
            // Another caller may have cleared or relocked in between.
            if record.locked_until.is_some_and(|until| now >= until) {
                debug!(identity = %identity, "lockout expired");
                record.clear();
            }
        });
        None
    }

    /// Consecutive failures currently on record.
    #[must_use]
    pub fn failures(&self, identity: &str) -> u32 {
        self.records
            .inspect(identity, |record| record.map_or(0, |r| r.failures))
    }
}
