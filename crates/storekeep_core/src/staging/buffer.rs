//! Per-session staging overlay of pending record changes.
//!
//! # Responsibility
//! - Hold new (provisional id -> record), modified (durable id -> record)
//!   and deleted (durable id) containers for one session.
//! - Apply stage operations without touching durable storage.
//!
//! # Invariants
//! - A durable id is in at most one of {modified, deleted}.
//! - Provisional ids only ever key the new map.
//! - Provisional ids are never reused within one buffer.
//! - Records in the new map carry `id == None`; records in the modified map
//!   carry their map key as `id`.

use crate::model::record::{ProvisionalId, Record, RecordId, StagedId};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Misuse of the staging buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingError {
    /// Provisional id was never issued by this buffer, or was retracted.
    UnknownProvisional(ProvisionalId),
}

impl Display for StagingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownProvisional(id) => write!(f, "no staged record for provisional id {id}"),
        }
    }
}

impl Error for StagingError {}

/// Result of `stage_delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteEffect {
    /// Provisional record dropped; nothing durable will be touched.
    Retracted,
    /// Durable id marked for deletion at flush.
    Marked,
    /// Provisional id unknown; buffer unchanged.
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct StagingBuffer {
    last_provisional: u64,
    new_records: BTreeMap<ProvisionalId, Record>,
    modified: BTreeMap<RecordId, Record>,
    deleted: BTreeSet<RecordId>,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` under a fresh provisional id and returns that id.
    pub fn stage_new(&mut self, mut record: Record) -> ProvisionalId {
        self.last_provisional += 1;
        let id = ProvisionalId(self.last_provisional);
        record.id = None;
        self.new_records.insert(id, record);
        id
    }

    /// Replaces a staged record.
    ///
    /// Provisional ids replace in place. Durable ids overwrite the modified
    /// entry and lift any pending deletion for that id.
    pub fn stage_update(&mut self, id: StagedId, mut record: Record) -> Result<(), StagingError> {
        match id {
            StagedId::Provisional(provisional) => {
                let slot = self
                    .new_records
                    .get_mut(&provisional)
                    .ok_or(StagingError::UnknownProvisional(provisional))?;
                record.id = None;
                *slot = record;
            }
            StagedId::Durable(durable) => {
                record.id = Some(durable);
                self.deleted.remove(&durable);
                self.modified.insert(durable, record);
            }
        }
        Ok(())
    }

    /// Marks `id` for deletion, or retracts a provisional creation.
    pub fn stage_delete(&mut self, id: StagedId) -> DeleteEffect {
        match id {
            StagedId::Provisional(provisional) => match self.new_records.remove(&provisional) {
                Some(_) => DeleteEffect::Retracted,
                None => DeleteEffect::Ignored,
            },
            StagedId::Durable(durable) => {
                self.modified.remove(&durable);
                self.deleted.insert(durable);
                DeleteEffect::Marked
            }
        }
    }

    /// Empties every container. The provisional counter keeps counting.
    pub fn clear(&mut self) {
        self.new_records.clear();
        self.modified.clear();
        self.deleted.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.new_records.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// New records in creation order.
    pub fn new_records(&self) -> impl Iterator<Item = (ProvisionalId, &Record)> + '_ {
        self.new_records.iter().map(|(id, record)| (*id, record))
    }

    pub fn modified_records(&self) -> impl Iterator<Item = (RecordId, &Record)> + '_ {
        self.modified.iter().map(|(id, record)| (*id, record))
    }

    pub fn deleted_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.deleted.iter().copied()
    }

    pub fn new_record(&self, id: ProvisionalId) -> Option<&Record> {
        self.new_records.get(&id)
    }

    pub fn modified_record(&self, id: RecordId) -> Option<&Record> {
        self.modified.get(&id)
    }

    pub fn is_deleted(&self, id: RecordId) -> bool {
        self.deleted.contains(&id)
    }

    pub fn new_count(&self) -> usize {
        self.new_records.len()
    }

    pub fn modified_count(&self) -> usize {
        self.modified.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{DeleteEffect, StagingBuffer, StagingError};
    use crate::model::record::{ProvisionalId, Record, RecordId, StagedId, UserId};

    fn record(title: &str) -> Record {
        Record::new(UserId(1), title, "")
    }

    #[test]
    fn provisional_ids_are_not_reused_after_retraction_or_clear() {
        let mut buffer = StagingBuffer::new();
        let first = buffer.stage_new(record("a"));
        buffer.stage_delete(StagedId::Provisional(first));
        let second = buffer.stage_new(record("b"));
        buffer.clear();
        let third = buffer.stage_new(record("c"));

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
    }

    #[test]
    fn update_of_unknown_provisional_is_rejected() {
        let mut buffer = StagingBuffer::new();
        let err = buffer
            .stage_update(StagedId::Provisional(ProvisionalId(42)), record("x"))
            .unwrap_err();
        assert_eq!(err, StagingError::UnknownProvisional(ProvisionalId(42)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn update_after_delete_resurrects_as_modified() {
        let mut buffer = StagingBuffer::new();
        let id = RecordId(5);
        assert_eq!(buffer.stage_delete(id.into()), DeleteEffect::Marked);
        buffer.stage_update(id.into(), record("back")).unwrap();

        assert!(!buffer.is_deleted(id));
        let staged = buffer.modified_record(id).unwrap();
        assert_eq!(staged.id, Some(id));
        assert_eq!(staged.title, "back");
    }

    #[test]
    fn delete_of_unknown_provisional_is_ignored() {
        let mut buffer = StagingBuffer::new();
        assert_eq!(
            buffer.stage_delete(StagedId::Provisional(ProvisionalId(9))),
            DeleteEffect::Ignored
        );
        assert_eq!(buffer.deleted_count(), 0);
    }
}
