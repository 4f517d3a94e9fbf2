//! Fixed-window rate limiting for login and password-reset attempts.
//!
//! Windows are keyed per action and identity (`login:<email>`,
//! `reset:<email>`), so throttling one flow never blocks another. Counters
//! live in memory only; a restart resets them.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::debug;

use super::{clock::Clock, keyed::KeyedState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitAction {
    Login,
    PasswordReset,
}

impl RateLimitAction {
    fn prefix(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::PasswordReset => "reset",
        }
    }

    /// Window key for an already-normalized identity.
    #[must_use]
    pub fn key(self, identity: &str) -> String {
        format!("{}:{identity}", self.prefix())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Debug, Default)]
struct RateWindow {
    started_at: Option<DateTime<Utc>>,
    count: u32,
}

pub struct RateGate {
    clock: Arc<dyn Clock>,
    windows: KeyedState<RateWindow>,
    window: TimeDelta,
    max_per_window: u32,
}

impl RateGate {
    pub fn new(clock: Arc<dyn Clock>, window: TimeDelta, max_per_window: u32) -> Self {
        Self {
            clock,
            windows: KeyedState::new(),
            window,
            max_per_window,
        }
    }

    /// Count one request against `key` and report whether it was throttled.
    ///
    /// A rejected request does not consume a slot.
    pub fn check_and_consume(
        &self,
        key: &str,
        window: TimeDelta,
        max_per_window: u32,
    ) -> RateLimitDecision {
        let now = self.clock.now();
        self.windows.update(key, |state| {
            let expired = state
                .started_at
                .map_or(true, |started_at| {
                    // A window that ends past the last representable instant never ends.
                    started_at
                        .checked_add_signed(window)
                        .is_some_and(|ends_at| now >= ends_at)
                });
            if expired {
                if max_per_window == 0 {
                    return RateLimitDecision::Limited;
                }
                state.started_at = Some(now);
                state.count = 1;
                return RateLimitDecision::Allowed;
            }

            if state.count >= max_per_window {
                return RateLimitDecision::Limited;
            }
            state.count += 1;
            RateLimitDecision::Allowed
        })
    }

    /// Requests counted so far in the current window for `key`.
    #[must_use]
    pub fn count(&self, key: &str) -> u32 {
        self.windows
            .inspect(key, |state| state.map_or(0, |window| window.count))
    }
}

impl RateLimiter for RateGate {
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        let key = action.key(email);
        let decision = self.check_and_consume(&key, self.window, self.max_per_window);
        if decision == RateLimitDecision::Limited {
            debug!(key = %key, "rate window exhausted");
        }
        decision
    }
}
