//! Store abstractions the engine reads from and writes to.
//!
//! The engine only depends on these traits. Implementations own their
//! lifecycle and are shared across requests through `Arc`; the bundled
//! [`MemoryStore`] implements all three.

use crate::core::{AttendanceRecord, Session, Sighting};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};

pub mod memory;

pub use memory::MemoryStore;

/// Source of session definitions.
pub trait SessionStore: Send + Sync {
    /// Look up a session by id, returning `None` if it does not exist.
    fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// All sessions, newest window first.
    fn list_sessions(&self) -> Result<Vec<Session>, StoreError>;

    /// Insert or replace a session.
    fn upsert_session(&self, session: Session) -> Result<(), StoreError>;

    /// Insert a new session, failing with [`StoreError::Conflict`] if the id
    /// is taken. The check and the insert are one atomic step.
    fn insert_session(&self, session: Session) -> Result<(), StoreError>;
}

/// Source of beacon sightings.
pub trait SightingStore: Send + Sync {
    /// All sightings recorded for a session, in no particular order.
    fn sightings_for_session(&self, session_id: &str) -> Result<Vec<Sighting>, StoreError>;

    /// Append a sighting to a session.
    ///
    /// Sightings with a blank device identifier are rejected with
    /// [`StoreError::Rejected`] and never stored.
    fn record_sighting(&self, session_id: &str, sighting: Sighting) -> Result<(), StoreError>;
}

/// Destination for computed attendance records.
pub trait RecordSink: Send + Sync {
    /// Persist a full batch. Implementations must store all of it or none.
    fn save_records(&self, records: &[AttendanceRecord]) -> Result<(), StoreError>;

    /// Stored records for a session, present devices first.
    fn records_for_session(&self, session_id: &str) -> Result<Vec<AttendanceRecord>, StoreError>;
}

/// What happens to earlier records when a session is recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Replace the stored record for each (session, device) pair.
    #[default]
    Upsert,
    /// Keep every run's records as history.
    Append,
}
