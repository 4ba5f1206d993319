//! Core domain logic for storekeep.
//! Session-scoped staging of record edits, merged reads and end-of-session
//! flush into a durable record store.

pub mod config;
pub mod db;
pub mod flush;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod session;
pub mod share;
pub mod staging;
pub mod view;

pub use config::{ConfigError, CoreConfig};
pub use flush::{FlushCoordinator, FlushFailure, FlushPhase, FlushReport, PendingCounts};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::record::{
    ProvisionalId, Record, RecordDraft, RecordId, RecordValidationError, StagedId, UserId,
};
pub use repo::record_store::{
    DateRange, RecordFilter, RecordStore, RepoError, RepoResult, SharedStore,
};
pub use repo::sqlite_store::SqliteRecordStore;
pub use service::record_service::{
    RecordService, ServiceError, ServiceResult, ShareChanges, ShareLink,
};
pub use session::{Session, SessionClosed, SessionId, SessionRegistry, TerminationReason};
pub use share::ShareVisit;
pub use staging::buffer::{DeleteEffect, StagingBuffer, StagingError};
pub use view::merge::ViewRecord;
pub use view::query::{ListNotice, ListOutcome, ListQuery, SortDirection, SortKey};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
