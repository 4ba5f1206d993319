//! Durable record store contract.
//!
//! # Responsibility
//! - Define the persistence operations core relies on.
//! - Carry semantic errors (`NotFound`, `Validation`) next to transport errors.
//!
//! # Invariants
//! - `save`/`save_all` are upserts: a record without id receives a fresh one.
//! - `delete_all_by_id` tolerates ids that no longer exist.
//! - Provisional identifiers never cross this boundary.

use crate::db::DbError;
use crate::model::record::{Record, RecordId, RecordValidationError, UserId};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type RepoResult<T> = Result<T, RepoError>;

/// Store handle shared by sessions, flushes and request handlers.
pub type SharedStore = Arc<dyn RecordStore + Send + Sync>;

/// Repository error for record persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(RecordValidationError),
    Db(DbError),
    NotFound(RecordId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<RecordValidationError> for RepoError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Inclusive range over `date_added` epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: i64,
    pub end: i64,
}

impl DateRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// A range whose start lies after its end matches nothing.
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, epoch_ms: i64) -> bool {
        self.start <= epoch_ms && epoch_ms <= self.end
    }
}

/// Store-side filters applied before any staging overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Exact category name match.
    pub category: Option<String>,
    pub added_between: Option<DateRange>,
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        let category_ok = match self.category.as_deref() {
            Some(category) => record.category.as_deref() == Some(category),
            None => true,
        };
        let date_ok = self
            .added_between
            .map_or(true, |range| range.contains(record.date_added));
        category_ok && date_ok
    }
}

/// Durable system of record consumed by core.
///
/// Implementations are used as opaque repositories; query planning and
/// indexing stay on their side of this trait.
pub trait RecordStore {
    fn find_by_id(&self, id: RecordId) -> RepoResult<Option<Record>>;
    /// Records owned by `owner` matching `filter`, ordered by id.
    fn find_by_owner(&self, owner: UserId, filter: &RecordFilter) -> RepoResult<Vec<Record>>;
    /// Records whose shared set contains `user`.
    fn find_shared_with(&self, user: UserId) -> RepoResult<Vec<Record>>;
    fn find_by_token(&self, token: &str) -> RepoResult<Option<Record>>;
    /// Upserts one record and returns it with its durable id.
    fn save(&self, record: &Record) -> RepoResult<Record>;
    /// Upserts every record in order and returns them with durable ids.
    fn save_all(&self, records: &[Record]) -> RepoResult<Vec<Record>>;
    /// Deletes by id and returns how many rows actually existed.
    fn delete_all_by_id(&self, ids: &[RecordId]) -> RepoResult<usize>;
    /// Runs `work` as one atomic unit where the store supports it.
    ///
    /// Stores without transactions call `work(self)` directly.
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn RecordStore) -> RepoResult<()>,
    ) -> RepoResult<()>;
}
