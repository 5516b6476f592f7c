//! Core attendance logic.
//!
//! This module contains:
//! - The data model for sightings, sessions and attendance records
//! - Interval merging of per-device sightings
//! - Presence evaluation against a session's requirement

pub mod evaluate;
pub mod merge;
pub mod types;

// Re-export commonly used types
pub use evaluate::{
    compute_records, cumulative_duration, evaluate, evaluate_at, EngineConfig, IntervalPolicy,
};
pub use merge::{
    clip_intervals, gap_threshold_from_secs, group_by_device, merge_intervals, DeviceTimeline,
    DEFAULT_GAP_THRESHOLD_SECS,
};
pub use types::{AttendanceRecord, AttendanceStatus, PresenceInterval, Session, Sighting};
