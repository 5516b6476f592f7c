//! Property tests for merging and evaluation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use proximity_attendance::core::{
    compute_records, cumulative_duration, group_by_device, merge_intervals, EngineConfig,
    IntervalPolicy,
};
use proximity_attendance::{Session, Sighting};

fn window_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

fn lecture() -> Session {
    Session::new("lecture", window_start(), window_start() + Duration::hours(1), 0.75)
}

/// Second offsets inside a one-hour window.
fn offsets() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..=3600, 0..80)
}

fn timestamps(offsets: &[i64]) -> Vec<DateTime<Utc>> {
    let mut ts: Vec<_> = offsets
        .iter()
        .map(|s| window_start() + Duration::seconds(*s))
        .collect();
    ts.sort();
    ts
}

proptest! {
    #[test]
    fn prop_adding_sightings_never_reduces_presence(base in offsets(), extra in offsets()) {
        let gap = EngineConfig::default().gap_threshold;
        let before = cumulative_duration(&merge_intervals(&timestamps(&base), gap));

        let mut combined = base.clone();
        combined.extend(extra);
        let after = cumulative_duration(&merge_intervals(&timestamps(&combined), gap));

        prop_assert!(after >= before);
    }

    #[test]
    fn prop_intervals_are_ordered_and_separated(offsets in offsets()) {
        let gap = EngineConfig::default().gap_threshold;
        let intervals = merge_intervals(&timestamps(&offsets), gap);

        for interval in &intervals {
            prop_assert!(interval.end >= interval.start);
        }
        for pair in intervals.windows(2) {
            prop_assert!(pair[1].start - pair[0].end > gap);
        }
    }

    #[test]
    fn prop_clipped_presence_within_span(offsets in prop::collection::vec(-1800i64..=5400, 0..80)) {
        let sightings: Vec<Sighting> = offsets
            .iter()
            .map(|s| Sighting::new("device", window_start() + Duration::seconds(*s)))
            .collect();
        let session = lecture();
        let config = EngineConfig { interval_policy: IntervalPolicy::ClipToWindow, ..EngineConfig::default() };

        let records = compute_records(&session, &group_by_device(&sightings), &config, Utc::now()).unwrap();
        for record in records {
            prop_assert!(record.cumulative_present_duration <= session.span());
        }
    }

    #[test]
    fn prop_input_order_does_not_change_verdict(offsets in offsets(), devices in 1usize..4) {
        let sightings: Vec<Sighting> = offsets
            .iter()
            .enumerate()
            .map(|(i, s)| Sighting::new(format!("device-{}", i % devices), window_start() + Duration::seconds(*s)))
            .collect();
        let mut reversed = sightings.clone();
        reversed.reverse();

        let session = lecture();
        let config = EngineConfig::default();
        let stamp = Utc::now();
        let forward = compute_records(&session, &group_by_device(&sightings), &config, stamp).unwrap();
        let backward = compute_records(&session, &group_by_device(&reversed), &config, stamp).unwrap();

        prop_assert_eq!(forward, backward);
    }
}
