//! Data model for the attendance engine.
//!
//! Sightings and sessions come from the stores; presence intervals are
//! derived per device and never persisted; attendance records are the output.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Resolution of the presence fraction (parts per million).
const FRACTION_SCALE: i128 = 1_000_000;

/// A single observation that a device's beacon was detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sighting {
    /// Opaque device identifier (e.g. a rotating BLE identifier)
    pub device_id: String,
    /// When the beacon was observed
    pub observed_at: DateTime<Utc>,
    /// Received signal strength, if the observer reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<i32>,
}

impl Sighting {
    pub fn new(device_id: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            observed_at,
            signal_strength: None,
        }
    }

    /// Attach a signal strength reading.
    pub fn with_signal_strength(mut self, rssi: i32) -> Self {
        self.signal_strength = Some(rssi);
        self
    }
}

/// A bounded attendance window with its presence requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Course or event this session belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Fraction of the window a device must be present, in (0, 1]
    pub required_presence_fraction: f64,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        required_presence_fraction: f64,
    ) -> Self {
        Self {
            id: id.into(),
            course_id: None,
            window_start,
            window_end,
            required_presence_fraction,
        }
    }

    /// Check the window and presence fraction.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptySessionId);
        }
        if self.window_end <= self.window_start {
            return Err(ValidationError::DegenerateWindow {
                start: self.window_start,
                end: self.window_end,
            });
        }
        let fraction = self.required_presence_fraction;
        // NaN fails both comparisons
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ValidationError::FractionOutOfRange(fraction));
        }
        Ok(())
    }

    /// Total span of the session window.
    pub fn span(&self) -> Duration {
        self.window_end - self.window_start
    }

    /// Presence required to be marked present.
    ///
    /// The fraction is quantized to parts per million so decimal fractions
    /// multiply exactly; the product is computed in whole milliseconds and
    /// any fractional millisecond is truncated toward zero.
    pub fn required_duration(&self) -> Duration {
        let span_ms = i128::from(self.span().num_milliseconds());
        let ppm = (self.required_presence_fraction * FRACTION_SCALE as f64).round() as i128;
        let required_ms = span_ms * ppm / FRACTION_SCALE;
        Duration::milliseconds(required_ms as i64)
    }
}

/// A contiguous span during which a device is considered present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PresenceInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(end >= start, "interval end precedes start");
        Self { start, end }
    }

    /// A zero-length interval at a single instant.
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Attendance verdict for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn is_present(&self) -> bool {
        matches!(self, AttendanceStatus::Present)
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "Present"),
            AttendanceStatus::Absent => write!(f, "Absent"),
        }
    }
}

/// Result of evaluating one device against one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub session_id: String,
    pub device_id: String,
    #[serde(rename = "cumulative_present_ms", with = "duration_ms")]
    pub cumulative_present_duration: Duration,
    #[serde(rename = "required_ms", with = "duration_ms")]
    pub required_duration: Duration,
    pub status: AttendanceStatus,
    pub computed_at: DateTime<Utc>,
}

impl AttendanceRecord {
    /// Whether two records carry the same verdict, ignoring `computed_at`.
    pub fn same_verdict(&self, other: &AttendanceRecord) -> bool {
        self.session_id == other.session_id
            && self.device_id == other.device_id
            && self.cumulative_present_duration == other.cumulative_present_duration
            && self.required_duration == other.required_duration
            && self.status == other.status
    }
}

/// Serde support for durations as integer milliseconds.
mod duration_ms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.num_milliseconds().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = i64::deserialize(deserializer)?;
        Ok(Duration::milliseconds(ms))
    }
}
