//! Audit log of engine activity.
//!
//! Counts what the service ingested and computed so operators can see how
//! verdicts were produced, without keeping any per-device detail.

use crate::core::AttendanceRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the running process.
#[derive(Debug)]
pub struct AuditLog {
    /// Number of sightings accepted
    sightings_ingested: AtomicU64,
    /// Number of sessions created or updated
    sessions_written: AtomicU64,
    /// Number of successful computation runs
    computations_run: AtomicU64,
    /// Number of computation runs that returned an error
    computations_failed: AtomicU64,
    /// Number of records produced
    records_produced: AtomicU64,
    /// Records with a Present verdict
    present_verdicts: AtomicU64,
    /// Records with an Absent verdict
    absent_verdicts: AtomicU64,
    /// Process start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl AuditLog {
    /// Create a new audit log.
    pub fn new() -> Self {
        Self {
            sightings_ingested: AtomicU64::new(0),
            sessions_written: AtomicU64::new(0),
            computations_run: AtomicU64::new(0),
            computations_failed: AtomicU64::new(0),
            records_produced: AtomicU64::new(0),
            present_verdicts: AtomicU64::new(0),
            absent_verdicts: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create an audit log with persistence, continuing from saved counters.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous audit stats: {e}");
        }

        log
    }

    pub fn record_sighting(&self) {
        self.sightings_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_written(&self) {
        self.sessions_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful computation and the verdicts it produced.
    pub fn record_computation(&self, records: &[AttendanceRecord]) {
        let present = records.iter().filter(|r| r.status.is_present()).count() as u64;
        let total = records.len() as u64;

        self.computations_run.fetch_add(1, Ordering::Relaxed);
        self.records_produced.fetch_add(total, Ordering::Relaxed);
        self.present_verdicts.fetch_add(present, Ordering::Relaxed);
        self.absent_verdicts.fetch_add(total - present, Ordering::Relaxed);
    }

    pub fn record_failed_computation(&self) {
        self.computations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> AuditStats {
        AuditStats {
            sightings_ingested: self.sightings_ingested.load(Ordering::Relaxed),
            sessions_written: self.sessions_written.load(Ordering::Relaxed),
            computations_run: self.computations_run.load(Ordering::Relaxed),
            computations_failed: self.computations_failed.load(Ordering::Relaxed),
            records_produced: self.records_produced.load(Ordering::Relaxed),
            present_verdicts: self.present_verdicts.load(Ordering::Relaxed),
            absent_verdicts: self.absent_verdicts.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Attendance Activity:\n\
             - Sightings ingested: {}\n\
             - Sessions written: {}\n\
             - Computations run: {} ({} failed)\n\
             - Records produced: {} ({} present, {} absent)\n\
             - Uptime: {} seconds",
            stats.sightings_ingested,
            stats.sessions_written,
            stats.computations_run,
            stats.computations_failed,
            stats.records_produced,
            stats.present_verdicts,
            stats.absent_verdicts,
            stats.uptime_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                sightings_ingested: stats.sightings_ingested,
                sessions_written: stats.sessions_written,
                computations_run: stats.computations_run,
                computations_failed: stats.computations_failed,
                records_produced: stats.records_produced,
                present_verdicts: stats.present_verdicts,
                absent_verdicts: stats.absent_verdicts,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.sightings_ingested
                    .store(persisted.sightings_ingested, Ordering::Relaxed);
                self.sessions_written
                    .store(persisted.sessions_written, Ordering::Relaxed);
                self.computations_run
                    .store(persisted.computations_run, Ordering::Relaxed);
                self.computations_failed
                    .store(persisted.computations_failed, Ordering::Relaxed);
                self.records_produced
                    .store(persisted.records_produced, Ordering::Relaxed);
                self.present_verdicts
                    .store(persisted.present_verdicts, Ordering::Relaxed);
                self.absent_verdicts
                    .store(persisted.absent_verdicts, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of audit statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub sightings_ingested: u64,
    pub sessions_written: u64,
    pub computations_run: u64,
    pub computations_failed: u64,
    pub records_produced: u64,
    pub present_verdicts: u64,
    pub absent_verdicts: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    sightings_ingested: u64,
    sessions_written: u64,
    computations_run: u64,
    computations_failed: u64,
    records_produced: u64,
    present_verdicts: u64,
    absent_verdicts: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared audit log.
pub type SharedAuditLog = Arc<AuditLog>;

/// Create a new shared audit log.
pub fn create_shared_log() -> SharedAuditLog {
    Arc::new(AuditLog::new())
}

/// Create a new shared audit log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedAuditLog {
    Arc::new(AuditLog::with_persistence(path))
}
