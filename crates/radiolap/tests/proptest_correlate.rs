//! Property-based tests for the event-to-lap correlator.
//!
//! - Every event gets a lap from the lap set, or none
//! - Containment covers `[start, start + duration]` and nothing past it
//! - Nearest-start results do not depend on lap order
//! - `resolve_unknown` never touches resolved rows and is idempotent

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use radiolap::correlate::{
    correlate, resolve_unknown, ContainmentMatcher, CorrelationPolicy, LapMatcher,
    NearestStartMatcher,
};
use radiolap::model::{Lap, RadioMessage};
use radiolap::EventTime;

// ────────────────────────────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────────────────────────────

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 9, 17, 12, 0, 0).unwrap()
}

fn at_ms(offset_ms: i64) -> DateTime<Utc> {
    origin() + Duration::milliseconds(offset_ms)
}

/// Arbitrary laps: numbers and starts may be missing, starts may collide.
fn arb_lap() -> impl Strategy<Value = Lap> {
    (
        proptest::option::weighted(0.9, 1u32..80),
        proptest::option::weighted(0.9, 0i64..600_000),
        proptest::option::weighted(0.8, 60.0f64..130.0),
    )
        .prop_map(|(lap_number, start_ms, duration)| Lap {
            lap_number,
            driver_number: 55,
            date_start: start_ms.map(at_ms).into(),
            lap_duration: duration,
            ..Lap::default()
        })
}

/// Sequential laps separated by gaps of at least one second.
fn arb_spaced_laps() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((60_000i64..130_000, 1_000i64..20_000), 1..15)
}

fn arb_event_offsets() -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(proptest::option::weighted(0.9, -60_000i64..700_000), 0..40)
}

fn radio(offset_ms: Option<i64>) -> RadioMessage {
    RadioMessage {
        date: offset_ms.map(at_ms).into(),
        recording_url: format!("radio_{}.mp3", offset_ms.unwrap_or(-1)),
        driver_number: 55,
        session_key: 9161,
    }
}

fn lap_numbers(laps: &[Lap]) -> BTreeSet<u32> {
    laps.iter().filter_map(|lap| lap.lap_number).collect()
}

// ────────────────────────────────────────────────────────────────────
// Properties
// ────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn assigned_lap_comes_from_lap_set(
        laps in prop::collection::vec(arb_lap(), 0..30),
        offsets in arb_event_offsets(),
        nearest in any::<bool>(),
    ) {
        let policy = if nearest {
            CorrelationPolicy::NearestStart
        } else {
            CorrelationPolicy::Containment
        };
        let matcher = policy.matcher(&laps, None);
        let events: Vec<RadioMessage> = offsets.iter().copied().map(radio).collect();
        let rows = correlate(&events, matcher.as_ref());
        let numbers = lap_numbers(&laps);

        prop_assert_eq!(rows.len(), events.len());
        for (row, event) in rows.iter().zip(&events) {
            prop_assert_eq!(&row.event, event);
            if let Some(n) = row.lap_number {
                prop_assert!(numbers.contains(&n));
            }
            if event.date == EventTime::Unknown {
                prop_assert_eq!(row.lap_number, None);
            }
        }
    }

    #[test]
    fn containment_boundaries(spacing in arb_spaced_laps()) {
        let mut laps = Vec::new();
        let mut cursor = 0i64;
        for (i, (duration_ms, gap_ms)) in spacing.iter().enumerate() {
            laps.push((u32::try_from(i).unwrap() + 1, cursor, *duration_ms, *gap_ms));
            cursor += duration_ms + gap_ms;
        }
        let lap_records: Vec<Lap> = laps
            .iter()
            .map(|(n, start, duration_ms, _)| Lap {
                lap_number: Some(*n),
                date_start: at_ms(*start).into(),
                lap_duration: Some(*duration_ms as f64 / 1000.0),
                ..Lap::default()
            })
            .collect();
        let matcher = ContainmentMatcher::new(&lap_records);

        for (n, start, duration_ms, gap_ms) in &laps {
            let end = start + duration_ms;
            prop_assert_eq!(matcher.lap_at(at_ms(*start)), Some(*n));
            prop_assert_eq!(matcher.lap_at(at_ms(start + duration_ms / 2)), Some(*n));
            prop_assert_eq!(matcher.lap_at(at_ms(end)), Some(*n));
            prop_assert_eq!(matcher.lap_at(at_ms(end + gap_ms / 2)), None);
        }
        prop_assert_eq!(matcher.lap_at(at_ms(-1)), None);
    }

    #[test]
    fn nearest_start_ignores_lap_order(
        (laps, shuffled) in prop::collection::vec(arb_lap(), 0..30)
            .prop_flat_map(|laps| (Just(laps.clone()), Just(laps).prop_shuffle())),
        offsets in arb_event_offsets(),
    ) {
        let forward = NearestStartMatcher::new(&laps);
        let reordered = NearestStartMatcher::new(&shuffled);
        for offset in offsets.into_iter().flatten() {
            let at = at_ms(offset);
            prop_assert_eq!(forward.lap_at(at), reordered.lap_at(at));
        }
    }

    #[test]
    fn nearest_start_tolerance_only_removes(
        laps in prop::collection::vec(arb_lap(), 0..30),
        offsets in arb_event_offsets(),
        tolerance_ms in 0i64..120_000,
    ) {
        let open = NearestStartMatcher::new(&laps);
        let bounded = NearestStartMatcher::new(&laps)
            .with_tolerance(Duration::milliseconds(tolerance_ms));
        for offset in offsets.into_iter().flatten() {
            let at = at_ms(offset);
            if let Some(n) = bounded.lap_at(at) {
                prop_assert_eq!(open.lap_at(at), Some(n));
            }
        }
    }

    #[test]
    fn resolve_unknown_keeps_resolved_rows(
        laps in prop::collection::vec(arb_lap(), 0..30),
        offsets in arb_event_offsets(),
    ) {
        let events: Vec<RadioMessage> = offsets.iter().copied().map(radio).collect();
        let containment = ContainmentMatcher::new(&laps);
        let nearest = NearestStartMatcher::new(&laps);

        let before = correlate(&events, &containment);
        let mut rows = before.clone();
        let newly = resolve_unknown(&mut rows, &nearest);

        let mut changed = 0;
        for (old, new) in before.iter().zip(&rows) {
            if old.is_resolved() {
                prop_assert_eq!(old.lap_number, new.lap_number);
            } else if new.is_resolved() {
                changed += 1;
            }
        }
        prop_assert_eq!(newly, changed);

        let snapshot = rows.clone();
        prop_assert_eq!(resolve_unknown(&mut rows, &nearest), 0);
        prop_assert_eq!(rows, snapshot);
    }
}
