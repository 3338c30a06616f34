//! Property tests for quota window arithmetic

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use oneiri::config::QuotaWindowPolicy;
use oneiri::models::GenerationEvent;
use oneiri::services::quota::{QuotaStatus, WINDOW_LENGTH};
use proptest::prelude::*;
use proptest::test_runner::Config;

fn midnight() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 3, 0, 0, 0).unwrap()
}

fn events_at(base: DateTime<Utc>, offsets_secs: &[i64]) -> Vec<GenerationEvent> {
    offsets_secs
        .iter()
        .map(|s| GenerationEvent::new(1, None, base + TimeDelta::seconds(*s)))
        .collect()
}

fn any_policy() -> impl Strategy<Value = QuotaWindowPolicy> {
    prop_oneof![
        (-840i32..=840).prop_map(|minutes| QuotaWindowPolicy::CalendarDay {
            reset_offset: FixedOffset::east_opt(minutes * 60).unwrap(),
        }),
        Just(QuotaWindowPolicy::Rolling),
    ]
}

proptest! {
    #![proptest_config(Config::with_cases(256))]

    #[test]
    fn count_tracks_generations_within_one_day(
        limit in 0i64..6,
        mut offsets in prop::collection::vec(0i64..86_000, 0..10),
    ) {
        offsets.sort_unstable();
        let policy = QuotaWindowPolicy::default();
        let now = midnight() + TimeDelta::seconds(86_399);
        let status = QuotaStatus::compute(&policy, limit, now, events_at(midnight(), &offsets));

        let n = offsets.len() as i64;
        prop_assert_eq!(status.current_count, n);
        prop_assert_eq!(status.remaining, (limit - n).max(0));
        prop_assert!(status.remaining >= 0);
        prop_assert_eq!(status.has_reached_limit, n >= limit);
    }

    #[test]
    fn reset_is_always_ahead_and_consistent(
        policy in any_policy(),
        limit in 0i64..5,
        offsets in prop::collection::vec(-200_000i64..0, 0..8),
        now_secs in 0i64..200_000,
    ) {
        let now = midnight() + TimeDelta::seconds(now_secs);
        let status = QuotaStatus::compute(&policy, limit, now, events_at(now, &offsets));

        prop_assert!(status.window_end > now);
        prop_assert!(status.hours_until_reset > 0.0);
        prop_assert!(status.window_end - now <= WINDOW_LENGTH);
        let expected = (status.window_end - now).num_milliseconds() as f64 / 3_600_000.0;
        prop_assert!((status.hours_until_reset - expected).abs() < 1e-9);
        prop_assert!(status.generations.iter().all(|e| e.occurred_at <= now));
        prop_assert_eq!(status.has_reached_limit, status.current_count >= limit);
    }

    #[test]
    fn hours_until_reset_decreases_then_jumps_at_midnight(
        earlier in 0i64..86_399,
        step in 1i64..86_400,
    ) {
        let policy = QuotaWindowPolicy::default();
        let later = earlier + step;
        let a = QuotaStatus::compute(&policy, 2, midnight() + TimeDelta::seconds(earlier), vec![]);
        let b = QuotaStatus::compute(&policy, 2, midnight() + TimeDelta::seconds(later), vec![]);

        if later < 86_400 {
            prop_assert!(b.hours_until_reset < a.hours_until_reset);
            prop_assert_eq!(a.window_end, b.window_end);
        } else {
            // A whole day is added back on crossing the boundary
            let expected = a.hours_until_reset - step as f64 / 3600.0 + 24.0;
            prop_assert!((b.hours_until_reset - expected).abs() < 1e-6);
            prop_assert!(b.window_end > a.window_end);
        }
    }

    #[test]
    fn rolling_reset_counts_down_while_events_are_pending(
        limit in 1i64..4,
        offsets in prop::collection::vec(-40_000i64..=0, 1..6),
        step in 1i64..40_000,
    ) {
        let policy = QuotaWindowPolicy::Rolling;
        let now = midnight() + TimeDelta::hours(12);
        let later = now + TimeDelta::seconds(step);
        let a = QuotaStatus::compute(&policy, limit, now, events_at(now, &offsets));
        let b = QuotaStatus::compute(&policy, limit, later, events_at(now, &offsets));

        // No event is old enough to age out between the two reads
        prop_assert_eq!(a.current_count, b.current_count);
        prop_assert_eq!(a.window_end, b.window_end);
        prop_assert!(b.hours_until_reset < a.hours_until_reset);
        let elapsed = step as f64 / 3600.0;
        prop_assert!((a.hours_until_reset - b.hours_until_reset - elapsed).abs() < 1e-6);
    }

    #[test]
    fn compute_is_deterministic(
        policy in any_policy(),
        limit in 0i64..5,
        offsets in prop::collection::vec(-100_000i64..100_000, 0..8),
    ) {
        let now = midnight() + TimeDelta::hours(12);
        let events = events_at(now, &offsets);
        let first = QuotaStatus::compute(&policy, limit, now, events.clone());
        let second = QuotaStatus::compute(&policy, limit, now, events.into_iter().rev());
        prop_assert_eq!(first, second);
    }
}
