//! Coalescing sightings into presence intervals.
//!
//! Sightings for a device are grouped and sorted, then folded into
//! contiguous intervals. Consecutive sightings separated by more than the
//! gap threshold start a new interval.

use crate::core::types::{PresenceInterval, Sighting};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Default maximum silence between sightings of one interval.
pub const DEFAULT_GAP_THRESHOLD_SECS: u64 = 300;

/// Convert a gap threshold in whole seconds, or `None` if it is out of range.
pub fn gap_threshold_from_secs(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

/// Sorted sighting timestamps keyed by device identifier.
pub type DeviceTimeline = BTreeMap<String, Vec<DateTime<Utc>>>;

/// Group sightings by device, sorting each device's timestamps ascending.
///
/// Devices are keyed in lexicographic order so downstream batches come out
/// in a stable order regardless of the input order.
pub fn group_by_device<'a, I>(sightings: I) -> DeviceTimeline
where
    I: IntoIterator<Item = &'a Sighting>,
{
    let mut timeline = DeviceTimeline::new();
    for sighting in sightings {
        timeline
            .entry(sighting.device_id.clone())
            .or_default()
            .push(sighting.observed_at);
    }
    for timestamps in timeline.values_mut() {
        timestamps.sort_unstable();
    }
    timeline
}

/// Merge ascending timestamps into presence intervals.
///
/// `timestamps` must be sorted non-decreasing. A gap exactly equal to
/// `gap_threshold` does not split an interval. A lone timestamp yields a
/// zero-length interval.
pub fn merge_intervals(timestamps: &[DateTime<Utc>], gap_threshold: Duration) -> Vec<PresenceInterval> {
    let Some((&first, rest)) = timestamps.split_first() else {
        return Vec::new();
    };

    let mut intervals = Vec::new();
    let mut block_start = first;
    let mut last = first;

    for &t in rest {
        debug_assert!(t >= last, "timestamps must be sorted ascending");
        if t - last > gap_threshold {
            intervals.push(PresenceInterval::new(block_start, last));
            block_start = t;
        }
        last = t;
    }

    intervals.push(PresenceInterval::new(block_start, last));
    intervals
}

/// Clip intervals to `[window_start, window_end]`.
///
/// Intervals entirely outside the window are dropped.
pub fn clip_intervals(
    intervals: &[PresenceInterval],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<PresenceInterval> {
    intervals
        .iter()
        .filter(|i| i.end >= window_start && i.start <= window_end)
        .map(|i| PresenceInterval::new(i.start.max(window_start), i.end.min(window_end)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    fn gap() -> Duration {
        Duration::seconds(DEFAULT_GAP_THRESHOLD_SECS as i64)
    }

    #[test]
    fn test_empty_input() {
        assert!(merge_intervals(&[], gap()).is_empty());
    }

    #[test]
    fn test_single_timestamp_is_zero_length() {
        let intervals = merge_intervals(&[t0()], gap());
        assert_eq!(intervals, vec![PresenceInterval::instant(t0())]);
        assert_eq!(intervals[0].duration(), Duration::zero());
    }

    #[test]
    fn test_gap_equal_to_threshold_merges() {
        let t = t0();
        let intervals = merge_intervals(&[t, t + Duration::minutes(5)], gap());
        assert_eq!(intervals, vec![PresenceInterval::new(t, t + Duration::minutes(5))]);
    }

    #[test]
    fn test_gap_over_threshold_splits() {
        let t = t0();
        let later = t + Duration::minutes(5) + Duration::seconds(1);
        let intervals = merge_intervals(&[t, later], gap());
        assert_eq!(
            intervals,
            vec![PresenceInterval::instant(t), PresenceInterval::instant(later)]
        );
    }

    #[test]
    fn test_multiple_blocks() {
        let t = t0();
        let timestamps = [
            t,
            t + Duration::minutes(2),
            t + Duration::minutes(4),
            t + Duration::minutes(20),
            t + Duration::minutes(23),
        ];
        let intervals = merge_intervals(&timestamps, gap());
        assert_eq!(
            intervals,
            vec![
                PresenceInterval::new(t, t + Duration::minutes(4)),
                PresenceInterval::new(t + Duration::minutes(20), t + Duration::minutes(23)),
            ]
        );
    }

    #[test]
    fn test_duplicate_timestamps() {
        let t = t0();
        let intervals = merge_intervals(&[t, t, t + Duration::minutes(1), t + Duration::minutes(1)], gap());
        assert_eq!(intervals, vec![PresenceInterval::new(t, t + Duration::minutes(1))]);
    }

    #[test]
    fn test_merge_is_stable_on_own_endpoints() {
        let t = t0();
        let timestamps: Vec<_> = (0..30).map(|m| t + Duration::minutes(m)).collect();
        let merged = merge_intervals(&timestamps, gap());
        for interval in &merged {
            let again = merge_intervals(&[interval.start, interval.end], gap());
            assert_eq!(again, vec![*interval]);
        }
    }

    #[test]
    fn test_group_by_device_sorts_per_device() {
        let t = t0();
        let sightings = vec![
            Sighting::new("b", t + Duration::minutes(3)),
            Sighting::new("a", t + Duration::minutes(2)),
            Sighting::new("b", t),
            Sighting::new("a", t + Duration::minutes(1)),
        ];

        let grouped = group_by_device(&sightings);
        let devices: Vec<_> = grouped.keys().cloned().collect();
        assert_eq!(devices, vec!["a", "b"]);
        assert_eq!(grouped["a"], vec![t + Duration::minutes(1), t + Duration::minutes(2)]);
        assert_eq!(grouped["b"], vec![t, t + Duration::minutes(3)]);
    }

    #[test]
    fn test_clip_intervals() {
        let start = t0();
        let end = start + Duration::hours(1);
        let intervals = vec![
            PresenceInterval::new(start - Duration::minutes(30), start - Duration::minutes(10)),
            PresenceInterval::new(start - Duration::minutes(2), start + Duration::minutes(10)),
            PresenceInterval::new(start + Duration::minutes(20), start + Duration::minutes(30)),
            PresenceInterval::new(end - Duration::minutes(5), end + Duration::minutes(5)),
            PresenceInterval::instant(end + Duration::minutes(1)),
        ];

        let clipped = clip_intervals(&intervals, start, end);
        assert_eq!(
            clipped,
            vec![
                PresenceInterval::new(start, start + Duration::minutes(10)),
                PresenceInterval::new(start + Duration::minutes(20), start + Duration::minutes(30)),
                PresenceInterval::new(end - Duration::minutes(5), end),
            ]
        );
    }

    #[test]
    fn test_gap_threshold_from_secs_bounds() {
        assert_eq!(gap_threshold_from_secs(300), Some(Duration::minutes(5)));
        assert_eq!(gap_threshold_from_secs(0), Some(Duration::zero()));
        assert_eq!(gap_threshold_from_secs(10_000_000_000_000_000), None);
        assert_eq!(gap_threshold_from_secs(u64::MAX), None);
    }
}
