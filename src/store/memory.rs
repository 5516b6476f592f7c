//! In-memory store with optional JSON persistence.
//!
//! Sessions and records are kept in a JSON snapshot that is rewritten on
//! each change. Sightings arrive far more often, so they go to a separate
//! JSON-lines log that is only ever appended to and is replayed on load.

use crate::core::{AttendanceRecord, Session, Sighting};
use crate::error::{StoreError, ValidationError};
use crate::store::{RecordMode, RecordSink, SessionStore, SightingStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sessions and records; also the on-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    sessions: BTreeMap<String, Session>,
    records: Vec<AttendanceRecord>,
}

#[derive(Debug, Default)]
struct StoreState {
    snapshot: Snapshot,
    sightings: BTreeMap<String, Vec<Sighting>>,
}

/// One line of the sighting log.
#[derive(Debug, Serialize, Deserialize)]
struct LoggedSighting {
    session_id: String,
    sighting: Sighting,
}

#[derive(Debug)]
struct Persistence {
    snapshot: PathBuf,
    sighting_log: PathBuf,
}

/// Store backed by process memory.
///
/// When created with [`MemoryStore::with_persistence`], every change is
/// written to disk before it becomes visible. A failed write leaves the
/// in-memory state untouched.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    record_mode: RecordMode,
    persistence: Option<Persistence>,
}

impl MemoryStore {
    /// Create an empty, non-persistent store.
    pub fn new(record_mode: RecordMode) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            record_mode,
            persistence: None,
        }
    }

    /// Create a store persisted at `path`, loading existing data if present.
    ///
    /// Sightings are logged next to the snapshot in `<stem>.sightings.jsonl`.
    pub fn with_persistence(path: PathBuf, record_mode: RecordMode) -> Result<Self, StoreError> {
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Snapshot::default()
        };

        let sighting_log = sighting_log_path(&path);
        let sightings = replay_sighting_log(&sighting_log)?;

        tracing::info!(
            path = %path.display(),
            sessions = snapshot.sessions.len(),
            records = snapshot.records.len(),
            sightings = sightings.values().map(Vec::len).sum::<usize>(),
            "Loaded store"
        );

        Ok(Self {
            state: RwLock::new(StoreState {
                snapshot,
                sightings,
            }),
            record_mode,
            persistence: Some(Persistence {
                snapshot: path,
                sighting_log,
            }),
        })
    }

    /// Number of stored sessions.
    pub fn session_count(&self) -> usize {
        self.state.read().snapshot.sessions.len()
    }

    /// Number of stored attendance records across all sessions.
    pub fn record_count(&self) -> usize {
        self.state.read().snapshot.records.len()
    }

    /// Apply a change to sessions or records, writing the snapshot first
    /// when persistence is enabled.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Snapshot) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.state.write();
        match &self.persistence {
            None => f(&mut state.snapshot),
            Some(persistence) => {
                let mut next = state.snapshot.clone();
                let out = f(&mut next)?;
                write_snapshot(&persistence.snapshot, &next)?;
                state.snapshot = next;
                Ok(out)
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(RecordMode::default())
    }
}

fn sighting_log_path(snapshot: &Path) -> PathBuf {
    snapshot.with_extension("sightings.jsonl")
}

/// Write the snapshot to a sibling temp file, then rename over the target.
fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Append one newline-terminated entry to the sighting log.
fn append_sighting(path: &Path, entry: &LoggedSighting) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Rebuild per-session sightings from the log.
///
/// An unterminated final line is a write cut short by a crash; it is
/// dropped and truncated away so later appends start on a clean line.
/// Any other malformed line is an error.
fn replay_sighting_log(path: &Path) -> Result<BTreeMap<String, Vec<Sighting>>, StoreError> {
    let mut sightings: BTreeMap<String, Vec<Sighting>> = BTreeMap::new();
    if !path.exists() {
        return Ok(sightings);
    }

    let content = std::fs::read_to_string(path)?;
    let mut valid_len = 0;
    for line in content.split_inclusive('\n') {
        if !line.ends_with('\n') {
            tracing::warn!(
                path = %path.display(),
                bytes = line.len(),
                "Dropping incomplete trailing sighting log entry"
            );
            OpenOptions::new().write(true).open(path)?.set_len(valid_len as u64)?;
            break;
        }
        valid_len += line.len();

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: LoggedSighting = serde_json::from_str(line)?;
        sightings.entry(entry.session_id).or_default().push(entry.sighting);
    }
    Ok(sightings)
}

impl SessionStore for MemoryStore {
    fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.state.read().snapshot.sessions.get(id).cloned())
    }

    fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .state
            .read()
            .snapshot
            .sessions
            .values()
            .cloned()
            .collect();
        sessions.sort_by_key(|s| Reverse(s.window_start));
        Ok(sessions)
    }

    fn upsert_session(&self, session: Session) -> Result<(), StoreError> {
        self.mutate(|snapshot| {
            snapshot.sessions.insert(session.id.clone(), session);
            Ok(())
        })
    }

    fn insert_session(&self, session: Session) -> Result<(), StoreError> {
        self.mutate(|snapshot| {
            if snapshot.sessions.contains_key(&session.id) {
                return Err(StoreError::Conflict(session.id));
            }
            snapshot.sessions.insert(session.id.clone(), session);
            Ok(())
        })
    }
}

impl SightingStore for MemoryStore {
    fn sightings_for_session(&self, session_id: &str) -> Result<Vec<Sighting>, StoreError> {
        Ok(self
            .state
            .read()
            .sightings
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn record_sighting(&self, session_id: &str, sighting: Sighting) -> Result<(), StoreError> {
        if sighting.device_id.trim().is_empty() {
            return Err(ValidationError::EmptyDeviceId.into());
        }

        let entry = LoggedSighting {
            session_id: session_id.to_string(),
            sighting,
        };
        let mut state = self.state.write();
        if let Some(persistence) = &self.persistence {
            append_sighting(&persistence.sighting_log, &entry)?;
        }
        state
            .sightings
            .entry(entry.session_id)
            .or_default()
            .push(entry.sighting);
        Ok(())
    }
}

impl RecordSink for MemoryStore {
    fn save_records(&self, records: &[AttendanceRecord]) -> Result<(), StoreError> {
        let mode = self.record_mode;
        self.mutate(|snapshot| {
            if mode == RecordMode::Upsert {
                let replaced: HashSet<(&str, &str)> = records
                    .iter()
                    .map(|r| (r.session_id.as_str(), r.device_id.as_str()))
                    .collect();
                snapshot.records.retain(|r| {
                    !replaced.contains(&(r.session_id.as_str(), r.device_id.as_str()))
                });
            }
            snapshot.records.extend_from_slice(records);
            Ok(())
        })
    }

    fn records_for_session(&self, session_id: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut records: Vec<AttendanceRecord> = self
            .state
            .read()
            .snapshot
            .records
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.status
                .is_present()
                .cmp(&a.status.is_present())
                .then_with(|| a.device_id.cmp(&b.device_id))
                .then_with(|| a.computed_at.cmp(&b.computed_at))
        });
        Ok(records)
    }
}
