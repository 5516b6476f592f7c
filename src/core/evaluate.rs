//! Presence evaluation against a session's requirement.
//!
//! The evaluator sums merged intervals and compares the total against the
//! session's required duration. It never clips; clipping is applied by
//! [`compute_records`] according to the configured [`IntervalPolicy`].

use crate::core::merge::{clip_intervals, merge_intervals, DeviceTimeline, DEFAULT_GAP_THRESHOLD_SECS};
use crate::core::types::{AttendanceRecord, AttendanceStatus, PresenceInterval, Session};
use crate::error::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How merged intervals relate to the session window before summing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalPolicy {
    /// Clip intervals to the session window, so presence never exceeds the span.
    #[default]
    ClipToWindow,
    /// Sum intervals as merged, including time outside the window.
    Unclipped,
}

/// Parameters of a computation run that do not come from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum silence between sightings of the same interval
    pub gap_threshold: Duration,
    pub interval_policy: IntervalPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gap_threshold: Duration::seconds(DEFAULT_GAP_THRESHOLD_SECS as i64),
            interval_policy: IntervalPolicy::default(),
        }
    }
}

/// Total time covered by a set of intervals.
pub fn cumulative_duration(intervals: &[PresenceInterval]) -> Duration {
    intervals
        .iter()
        .fold(Duration::zero(), |total, interval| total + interval.duration())
}

/// Drop any sub-millisecond remainder, matching the unit of the required duration.
fn whole_millis(duration: Duration) -> Duration {
    Duration::milliseconds(duration.num_milliseconds())
}

/// Evaluate one device, stamping the record with the current time.
pub fn evaluate(session: &Session, device_id: &str, intervals: &[PresenceInterval]) -> AttendanceRecord {
    evaluate_at(session, device_id, intervals, Utc::now())
}

/// Evaluate one device with an explicit `computed_at`.
pub fn evaluate_at(
    session: &Session,
    device_id: &str,
    intervals: &[PresenceInterval],
    computed_at: DateTime<Utc>,
) -> AttendanceRecord {
    let cumulative = whole_millis(cumulative_duration(intervals));
    let required = session.required_duration();

    let status = if cumulative >= required {
        AttendanceStatus::Present
    } else {
        AttendanceStatus::Absent
    };

    AttendanceRecord {
        session_id: session.id.clone(),
        device_id: device_id.to_string(),
        cumulative_present_duration: cumulative,
        required_duration: required,
        status,
        computed_at,
    }
}

/// Produce one record per device in `timeline`.
///
/// Devices mapped to an empty list are evaluated with zero presence.
/// Every record in the batch shares the same `computed_at`.
pub fn compute_records(
    session: &Session,
    timeline: &DeviceTimeline,
    config: &EngineConfig,
    computed_at: DateTime<Utc>,
) -> Result<Vec<AttendanceRecord>, ValidationError> {
    session.validate()?;

    let mut records = Vec::with_capacity(timeline.len());
    for (device_id, timestamps) in timeline {
        let merged = merge_intervals(timestamps, config.gap_threshold);
        let intervals = match config.interval_policy {
            IntervalPolicy::ClipToWindow => {
                clip_intervals(&merged, session.window_start, session.window_end)
            }
            IntervalPolicy::Unclipped => merged,
        };

        let record = evaluate_at(session, device_id, &intervals, computed_at);
        tracing::debug!(
            session_id = %session.id,
            device_id = %device_id,
            sightings = timestamps.len(),
            intervals = intervals.len(),
            present_ms = record.cumulative_present_duration.num_milliseconds(),
            status = %record.status,
            "Evaluated device"
        );
        records.push(record);
    }

    Ok(records)
}
