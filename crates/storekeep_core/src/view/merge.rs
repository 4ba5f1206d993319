//! Merged read view over durable rows and the staging overlay.
//!
//! # Invariants
//! - Ids in the deleted set never appear, even if the snapshot still has them.
//! - A modified entry replaces its durable row in place (snapshot order kept).
//! - Staged-new records follow the snapshot, in creation order.
//! - Store filters ran before the merge, so an edit that changes filter
//!   membership (e.g. a new category) shows up only after flush.

use crate::model::record::{Record, StagedId};
use crate::staging::buffer::StagingBuffer;
use log::warn;
use serde::Serialize;

/// Record as the session user currently sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewRecord {
    pub id: StagedId,
    pub record: Record,
}

/// Combines a pre-filtered durable snapshot with `buffer`.
pub fn merge_view(snapshot: Vec<Record>, buffer: &StagingBuffer) -> Vec<ViewRecord> {
    let mut merged = Vec::with_capacity(snapshot.len() + buffer.new_count());

    for durable in snapshot {
        let Some(id) = durable.id else {
            warn!("event=view_merge module=view status=skipped reason=snapshot_row_without_id");
            continue;
        };
        if buffer.is_deleted(id) {
            continue;
        }
        let record = match buffer.modified_record(id) {
            Some(staged) => staged.clone(),
            None => durable,
        };
        merged.push(ViewRecord {
            id: StagedId::Durable(id),
            record,
        });
    }

    // Retracted provisional records are already gone from the new map.
    merged.extend(buffer.new_records().map(|(id, record)| ViewRecord {
        id: StagedId::Provisional(id),
        record: record.clone(),
    }));

    merged
}
