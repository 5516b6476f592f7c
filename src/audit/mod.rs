//! Audit module for the attendance service.
//!
//! Tracks sightings ingested and verdicts produced so a computation run
//! can be accounted for after the fact.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, AuditLog, AuditStats, SharedAuditLog,
};
