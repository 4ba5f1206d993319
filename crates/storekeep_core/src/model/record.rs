//! Record domain model and identifier types.
//!
//! # Responsibility
//! - Define the owned, shareable record persisted by the record store.
//! - Separate durable identity (`RecordId`) from session-local provisional
//!   identity (`ProvisionalId`) at the type level.
//!
//! # Invariants
//! - A record with `id == None` has never been persisted.
//! - Identity equality between persisted records is decided by `RecordId` only.
//! - `share_token` is immutable once set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub const TITLE_MAX_CHARS: usize = 255;
pub const CONTENT_MAX_CHARS: usize = 2000;

/// Durable identifier assigned by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session-local identifier for a record staged but not yet persisted.
///
/// Never written to the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvisionalId(pub u64);

impl Display for ProvisionalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Principal reference. Authentication lives outside core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier accepted by request-level operations.
///
/// "Is this persisted yet" is answered by the variant, not by a null check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StagedId {
    Durable(RecordId),
    Provisional(ProvisionalId),
}

impl StagedId {
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable(_))
    }
}

impl From<RecordId> for StagedId {
    fn from(value: RecordId) -> Self {
        Self::Durable(value)
    }
}

impl From<ProvisionalId> for StagedId {
    fn from(value: ProvisionalId) -> Self {
        Self::Provisional(value)
    }
}

impl Display for StagedId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Durable(id) => write!(f, "{id}"),
            Self::Provisional(id) => write!(f, "{id}"),
        }
    }
}

/// Validation failures for record content fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    BlankTitle,
    TitleTooLong { chars: usize },
    ContentTooLong { chars: usize },
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "title cannot be empty"),
            Self::TitleTooLong { chars } => write!(
                f,
                "title has {chars} characters; at most {TITLE_MAX_CHARS} allowed"
            ),
            Self::ContentTooLong { chars } => write!(
                f,
                "content has {chars} characters; at most {CONTENT_MAX_CHARS} allowed"
            ),
        }
    }
}

impl Error for RecordValidationError {}

/// Owned item of stored content.
///
/// `PartialEq` compares every field; use [`Record::same_identity`] for
/// identity semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Durable id, `None` until the record store assigns one.
    pub id: Option<RecordId>,
    pub owner: UserId,
    pub title: String,
    pub content: String,
    /// Optional external URL attached to the record.
    pub link: Option<String>,
    /// Category name. Categories are managed outside core.
    pub category: Option<String>,
    /// Unix epoch milliseconds.
    pub date_added: i64,
    /// Additional principals granted read access.
    pub shared_with: BTreeSet<UserId>,
    /// Opaque link-sharing token; immutable once set.
    pub share_token: Option<String>,
}

impl Record {
    /// Creates an unpersisted record stamped with the current time.
    pub fn new(owner: UserId, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            owner,
            title: title.into(),
            content: content.into(),
            link: None,
            category: None,
            date_added: now_epoch_ms(),
            shared_with: BTreeSet::new(),
            share_token: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// Whether `user` may read this record (owner or explicitly shared).
    pub fn is_visible_to(&self, user: UserId) -> bool {
        self.is_owned_by(user) || self.shared_with.contains(&user)
    }

    /// Identity equality: both persisted with the same durable id.
    pub fn same_identity(&self, other: &Record) -> bool {
        matches!((self.id, other.id), (Some(a), Some(b)) if a == b)
    }

    /// Validates user-editable content fields.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.title.trim().is_empty() {
            return Err(RecordValidationError::BlankTitle);
        }
        let title_chars = self.title.chars().count();
        if title_chars > TITLE_MAX_CHARS {
            return Err(RecordValidationError::TitleTooLong { chars: title_chars });
        }
        let content_chars = self.content.chars().count();
        if content_chars > CONTENT_MAX_CHARS {
            return Err(RecordValidationError::ContentTooLong {
                chars: content_chars,
            });
        }
        Ok(())
    }
}

/// Editable fields submitted by a caller for create/update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDraft {
    pub title: String,
    pub content: String,
    pub link: Option<String>,
    pub category: Option<String>,
}

impl RecordDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            link: None,
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Copies editable fields onto `record`, leaving identity, ownership,
    /// sharing and timestamps untouched.
    pub fn apply_to(&self, record: &mut Record) {
        record.title = self.title.clone();
        record.content = self.content.clone();
        record.link = self.link.clone();
        record.category = self.category.clone();
    }

    /// Builds a fresh unpersisted record owned by `owner`.
    pub fn into_record(self, owner: UserId) -> Record {
        let mut record = Record::new(owner, self.title, self.content);
        record.link = self.link;
        record.category = self.category;
        record
    }
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
