//! Request and token budgets shared across all LLM calls.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::error::{Error, Result};

#[derive(Debug)]
struct QuotaState {
    window_start: DateTime<Utc>,
    requests_in_window: u32,
    day_start: DateTime<Utc>,
    tokens_today: u64,
}

/// Token-bucket style quota: a per-minute request window plus a daily token
/// ceiling. One instance is shared by every caller that talks to the LLM,
/// so the budget holds across concurrent generations.
///
/// Callers pass `now` explicitly, which keeps the arithmetic deterministic
/// under test.
pub struct RequestQuota {
    requests_per_minute: u32,
    daily_token_ceiling: u64,
    state: Mutex<QuotaState>,
}

impl RequestQuota {
    pub fn new(requests_per_minute: u32, daily_token_ceiling: u64) -> Self {
        let now = Utc::now();
        Self {
            requests_per_minute,
            daily_token_ceiling,
            state: Mutex::new(QuotaState {
                window_start: now,
                requests_in_window: 0,
                day_start: now,
                tokens_today: 0,
            }),
        }
    }

    /// Claim one request slot, or fail with `QuotaExceeded`.
    pub fn acquire(&self, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock();
        Self::roll(&mut state, now);

        if state.tokens_today >= self.daily_token_ceiling {
            return Err(Error::QuotaExceeded(format!(
                "daily token budget of {} exhausted",
                self.daily_token_ceiling
            )));
        }
        if state.requests_in_window >= self.requests_per_minute {
            return Err(Error::QuotaExceeded(format!(
                "request budget of {}/minute exhausted",
                self.requests_per_minute
            )));
        }

        state.requests_in_window += 1;
        Ok(())
    }

    /// Record tokens consumed by a completed call.
    pub fn record_tokens(&self, tokens: u64, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        Self::roll(&mut state, now);
        state.tokens_today = state.tokens_today.saturating_add(tokens);
    }

    pub fn tokens_used_today(&self, now: DateTime<Utc>) -> u64 {
        let mut state = self.state.lock();
        Self::roll(&mut state, now);
        state.tokens_today
    }

    fn roll(state: &mut QuotaState, now: DateTime<Utc>) {
        if now - state.window_start >= Duration::minutes(1) {
            state.window_start = now;
            state.requests_in_window = 0;
        }
        if now - state.day_start >= Duration::days(1) {
            state.day_start = now;
            state.tokens_today = 0;
        }
    }
}
