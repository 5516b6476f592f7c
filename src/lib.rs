//! Proximity Attendance - beacon-sighting attendance engine.
//!
//! Given timestamped beacon sightings for devices during a session window,
//! decide per device whether cumulative presence meets the session's
//! required fraction.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Proximity Attendance                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Grouping   │──▶│   Merging   │──▶│ Evaluation  │       │
//! │  │ (per device)│   │ (5 min gap) │   │ (threshold) │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         ▲                                    │              │
//! │         │                                    ▼              │
//! │  ┌─────────────┐                     ┌─────────────┐       │
//! │  │Session and  │                     │   Record    │       │
//! │  │Sighting     │                     │    Sink     │       │
//! │  │Stores       │                     └─────────────┘       │
//! │  └─────────────┘                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::{Duration, TimeZone, Utc};
//! use proximity_attendance::{
//!     AttendanceEngine, AttendanceStatus, EngineConfig, MemoryStore, Session, SessionStore,
//!     Sighting, SightingStore,
//! };
//!
//! let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
//! let store = Arc::new(MemoryStore::default());
//! store
//!     .upsert_session(Session::new("lecture", start, start + Duration::hours(1), 0.75))
//!     .unwrap();
//! for minute in 0..=50 {
//!     store
//!         .record_sighting("lecture", Sighting::new("phone-a", start + Duration::minutes(minute)))
//!         .unwrap();
//! }
//!
//! let engine = AttendanceEngine::new(store.clone(), store.clone(), store, EngineConfig::default());
//! let records = engine.compute("lecture").unwrap();
//! assert_eq!(records[0].status, AttendanceStatus::Present);
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use audit::{AuditLog, AuditStats, SharedAuditLog};
pub use config::{Config, ConfigError};
pub use crate::core::{
    compute_records, evaluate, group_by_device, merge_intervals, AttendanceRecord,
    AttendanceStatus, EngineConfig, IntervalPolicy, PresenceInterval, Session, Sighting,
};
pub use engine::AttendanceEngine;
pub use error::{AttendanceError, StoreError, ValidationError};
pub use store::{MemoryStore, RecordMode, RecordSink, SessionStore, SightingStore};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
