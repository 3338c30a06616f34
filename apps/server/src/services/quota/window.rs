//! Quota window arithmetic.
//!
//! Everything here is a pure function of the policy, the limit, the instant
//! being evaluated and the user's generation history, so it can be tested
//! without a store.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::Serialize;

use crate::config::QuotaWindowPolicy;
use crate::models::GenerationEvent;

/// Length of one quota window
pub const WINDOW_LENGTH: TimeDelta = TimeDelta::hours(24);

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Boundaries of the window that is active at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Quota state of one user at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStatus {
    pub current_count: i64,
    pub daily_limit: i64,
    pub remaining: i64,
    pub has_reached_limit: bool,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub hours_until_reset: f64,
    /// Instant the status was computed for
    pub as_of: DateTime<Utc>,
    /// Generations counted in this window, oldest first
    pub generations: Vec<GenerationEvent>,
}

impl QuotaWindowPolicy {
    /// Earliest instant an event can have and still count at `now`.
    ///
    /// Stores may return events from this bound onwards; `contains` does the
    /// exact filtering.
    pub fn lookback(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            QuotaWindowPolicy::CalendarDay { .. } => self.calendar_start(now),
            QuotaWindowPolicy::Rolling => now - WINDOW_LENGTH,
        }
    }

    /// Whether an event at `occurred_at` counts against the quota at `now`
    pub fn contains(&self, now: DateTime<Utc>, occurred_at: DateTime<Utc>) -> bool {
        if occurred_at > now {
            return false;
        }
        match self {
            QuotaWindowPolicy::CalendarDay { .. } => occurred_at >= self.calendar_start(now),
            // An event stops counting exactly 24h after it happened
            QuotaWindowPolicy::Rolling => occurred_at > now - WINDOW_LENGTH,
        }
    }

    /// Window boundaries at `now`, given the events that count in it (oldest first)
    pub fn window(
        &self,
        now: DateTime<Utc>,
        counted: &[GenerationEvent],
        daily_limit: i64,
    ) -> QuotaWindow {
        match self {
            QuotaWindowPolicy::CalendarDay { .. } => {
                let start = self.calendar_start(now);
                QuotaWindow {
                    start,
                    end: start + WINDOW_LENGTH,
                }
            }
            QuotaWindowPolicy::Rolling => {
                // The window "resets" when the user next regains a generation:
                // once enough of the oldest events have aged out to drop below the limit.
                let count = counted.len() as i64;
                let freeing_index = if count >= daily_limit {
                    count - daily_limit
                } else {
                    0
                };
                let end = usize::try_from(freeing_index)
                    .ok()
                    .and_then(|i| counted.get(i))
                    .map(|event| event.occurred_at + WINDOW_LENGTH)
                    // Nothing pending: always a full day ahead of `now`
                    .unwrap_or(now + WINDOW_LENGTH);
                QuotaWindow {
                    start: now - WINDOW_LENGTH,
                    end,
                }
            }
        }
    }

    /// Most recent local midnight at or before `now`, expressed in UTC
    fn calendar_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = match self {
            QuotaWindowPolicy::CalendarDay { reset_offset } => *reset_offset,
            QuotaWindowPolicy::Rolling => return now - WINDOW_LENGTH,
        };
        let local_midnight = now
            .with_timezone(&offset)
            .date_naive()
            .and_time(NaiveTime::MIN);
        (local_midnight - TimeDelta::seconds(i64::from(offset.local_minus_utc()))).and_utc()
    }
}

impl QuotaStatus {
    /// Computes the status at `now` from a user's generation history.
    ///
    /// `events` may include events outside the window; they are ignored.
    pub fn compute(
        policy: &QuotaWindowPolicy,
        daily_limit: i64,
        now: DateTime<Utc>,
        events: impl IntoIterator<Item = GenerationEvent>,
    ) -> Self {
        let mut counted: Vec<GenerationEvent> = events
            .into_iter()
            .filter(|event| policy.contains(now, event.occurred_at))
            .collect();
        counted.sort_by_key(|event| (event.occurred_at, event.id));

        let window = policy.window(now, &counted, daily_limit);
        let current_count = counted.len() as i64;

        Self {
            current_count,
            daily_limit,
            remaining: (daily_limit - current_count).max(0),
            has_reached_limit: current_count >= daily_limit,
            window_start: window.start,
            window_end: window.end,
            hours_until_reset: (window.end - now).num_milliseconds() as f64 / MILLIS_PER_HOUR,
            as_of: now,
            generations: counted,
        }
    }

    /// Whole seconds until the window resets, at least 1
    pub fn retry_after_secs(&self) -> u64 {
        (self.window_end - self.as_of).num_seconds().max(1) as u64
    }
}
