//! Batch attendance computation over injected stores.
//!
//! ```text
//! SessionStore ──▶ validate ──┐
//!                             ├──▶ group ──▶ merge ──▶ evaluate ──▶ RecordSink
//! SightingStore ──────────────┘
//! ```

use crate::core::{compute_records, group_by_device, AttendanceRecord, EngineConfig};
use crate::error::{AttendanceError, Result};
use crate::store::{RecordSink, SessionStore, SightingStore};
use chrono::Utc;
use std::sync::Arc;

/// Computes attendance for a session using the configured stores.
#[derive(Clone)]
pub struct AttendanceEngine {
    sessions: Arc<dyn SessionStore>,
    sightings: Arc<dyn SightingStore>,
    sink: Arc<dyn RecordSink>,
    config: EngineConfig,
}

impl AttendanceEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        sightings: Arc<dyn SightingStore>,
        sink: Arc<dyn RecordSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sessions,
            sightings,
            sink,
            config,
        }
    }

    /// Compute, persist and return attendance records for a session.
    ///
    /// The full batch is handed to the sink in one call. On any error
    /// nothing is saved and no records are returned.
    pub fn compute(&self, session_id: &str) -> Result<Vec<AttendanceRecord>> {
        let session = self
            .sessions
            .get_session(session_id)?
            .ok_or_else(|| AttendanceError::NotFound {
                session_id: session_id.to_string(),
            })?;
        session.validate()?;

        let sightings = self.sightings.sightings_for_session(session_id)?;
        let timeline = group_by_device(&sightings);

        let records = compute_records(&session, &timeline, &self.config, Utc::now())?;

        self.sink.save_records(&records)?;

        tracing::info!(
            session_id = %session_id,
            sightings = sightings.len(),
            devices = records.len(),
            present = records.iter().filter(|r| r.status.is_present()).count(),
            "Computed attendance"
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AttendanceStatus, Session, Sighting};
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use chrono::{DateTime, Duration, TimeZone};
    use parking_lot::Mutex;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
    }

    fn engine_for(store: &Arc<MemoryStore>) -> AttendanceEngine {
        AttendanceEngine::new(store.clone(), store.clone(), store.clone(), EngineConfig::default())
    }

    /// Sink that fails every write and remembers what it was offered.
    #[derive(Default)]
    struct FailingSink {
        offered: Mutex<Vec<usize>>,
    }

    impl RecordSink for FailingSink {
        fn save_records(&self, records: &[AttendanceRecord]) -> Result<(), StoreError> {
            self.offered.lock().push(records.len());
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        fn records_for_session(&self, _session_id: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_compute_scenario_and_persist() {
        let store = Arc::new(MemoryStore::default());
        store
            .upsert_session(Session::new("lecture", at(9, 0, 0), at(10, 0, 0), 0.75))
            .unwrap();
        // Record out of order; the engine sorts per device
        for m in (0..=50).rev() {
            store
                .record_sighting("lecture", Sighting::new("a", at(9, 0, 0) + Duration::minutes(m)))
                .unwrap();
        }
        store.record_sighting("lecture", Sighting::new("b", at(9, 5, 1))).unwrap();
        store.record_sighting("lecture", Sighting::new("b", at(9, 0, 0))).unwrap();

        let records = engine_for(&store).compute("lecture").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, AttendanceStatus::Present);
        assert_eq!(records[1].status, AttendanceStatus::Absent);

        assert_eq!(store.records_for_session("lecture").unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let err = engine_for(&store).compute("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_invalid_session_saves_nothing() {
        let store = Arc::new(MemoryStore::default());
        store
            .upsert_session(Session::new("bad", at(9, 0, 0), at(10, 0, 0), 1.5))
            .unwrap();
        store.record_sighting("bad", Sighting::new("a", at(9, 0, 0))).unwrap();

        let err = engine_for(&store).compute("bad").unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)));
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_sink_failure_offers_full_batch_and_returns_error() {
        let store = Arc::new(MemoryStore::default());
        store
            .upsert_session(Session::new("s", at(9, 0, 0), at(10, 0, 0), 0.5))
            .unwrap();
        for device in ["a", "b", "c"] {
            store.record_sighting("s", Sighting::new(device, at(9, 10, 0))).unwrap();
        }

        let sink = Arc::new(FailingSink::default());
        let engine = AttendanceEngine::new(store.clone(), store.clone(), sink.clone(), EngineConfig::default());

        let err = engine.compute("s").unwrap_err();
        assert!(matches!(err, AttendanceError::Store(_)));
        assert_eq!(*sink.offered.lock(), vec![3]);
    }

    #[test]
    fn test_session_without_sightings_yields_empty_batch() {
        let store = Arc::new(MemoryStore::default());
        store
            .upsert_session(Session::new("quiet", at(9, 0, 0), at(10, 0, 0), 0.5))
            .unwrap();
        assert!(engine_for(&store).compute("quiet").unwrap().is_empty());
    }

    #[test]
    fn test_recompute_is_deterministic() {
        let store = Arc::new(MemoryStore::default());
        store
            .upsert_session(Session::new("s", at(9, 0, 0), at(10, 0, 0), 0.25))
            .unwrap();
        for m in [0, 3, 6, 20, 24] {
            store
                .record_sighting("s", Sighting::new("a", at(9, m, 0)))
                .unwrap();
        }

        let engine = engine_for(&store);
        let first = engine.compute("s").unwrap();
        let second = engine.compute("s").unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert!(a.same_verdict(b));
        }
        // Upsert mode keeps one record per device
        assert_eq!(store.records_for_session("s").unwrap().len(), 1);
    }
}
