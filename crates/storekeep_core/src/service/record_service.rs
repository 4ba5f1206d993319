//! Record use-case service for one request.
//!
//! # Responsibility
//! - Serve list/add/get/update/delete/share requests against a session.
//! - Enforce ownership with the caller identity passed in explicitly.
//! - Write only to the staging buffer; read durable rows through the store.
//!
//! # Invariants
//! - `NotFound`/`Unauthorized` never modify the buffer.
//! - Durable lookups consult the modified map before the store.
//! - Updating an id staged for deletion lifts the deletion.
//! - Edits re-read and stage the record under one exclusive session lock.

use crate::model::record::{Record, RecordDraft, RecordValidationError, StagedId, UserId};
use crate::repo::record_store::{RecordStore, RepoError};
use crate::session::{Session, SessionClosed, SessionId};
use crate::share::{self, ShareVisit};
use crate::staging::buffer::{DeleteEffect, StagingError};
use crate::view::merge::{merge_view, ViewRecord};
use crate::view::query::{finish_listing, ListOutcome, ListQuery};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

const DEFAULT_SHARE_LINK_PREFIX: &str = "/shared/";

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    /// No staged or durable record for the id.
    NotFound(StagedId),
    /// Caller does not own the record, or does not own the session.
    Unauthorized { caller: UserId },
    SessionClosed(SessionId),
    Validation(RecordValidationError),
    Staging(StagingError),
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::Unauthorized { caller } => write!(f, "user {caller} is not authorized"),
            Self::SessionClosed(id) => write!(f, "session {id} has already ended"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Staging(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Staging(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(StagedId::Durable(id)),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<SessionClosed> for ServiceError {
    fn from(value: SessionClosed) -> Self {
        Self::SessionClosed(value.0)
    }
}

impl From<StagingError> for ServiceError {
    fn from(value: StagingError) -> Self {
        Self::Staging(value)
    }
}

impl From<RecordValidationError> for ServiceError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Sharing edits submitted together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareChanges {
    pub add: Vec<UserId>,
    pub remove: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub token: String,
    /// Prefix plus token, e.g. `/shared/{token}`.
    pub path: String,
}

/// Request-scoped facade over the record store and a session buffer.
pub struct RecordService<'s> {
    store: &'s dyn RecordStore,
    share_link_prefix: String,
}

impl<'s> RecordService<'s> {
    pub fn new(store: &'s dyn RecordStore) -> Self {
        Self {
            store,
            share_link_prefix: DEFAULT_SHARE_LINK_PREFIX.to_string(),
        }
    }

    pub fn with_share_link_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.share_link_prefix = prefix.into();
        self
    }

    /// Caller's records as they would look after flush, filtered, searched
    /// and sorted.
    pub fn list_records(
        &self,
        session: &Session,
        caller: UserId,
        query: &ListQuery,
    ) -> ServiceResult<ListOutcome> {
        ensure_session_owner(session, caller)?;
        let (filter, notices) = query.effective_filter();
        let snapshot = self.store.find_by_owner(caller, &filter)?;
        let merged = session.read(|buffer| merge_view(snapshot, buffer))?;
        Ok(ListOutcome {
            items: finish_listing(merged, query),
            notices,
        })
    }

    /// Stages a new record owned by the caller.
    pub fn add_record(
        &self,
        session: &Session,
        caller: UserId,
        draft: RecordDraft,
    ) -> ServiceResult<StagedId> {
        ensure_session_owner(session, caller)?;
        let record = draft.into_record(caller);
        record.validate()?;
        let id = session.mutate(|buffer| buffer.stage_new(record))?;
        info!(
            "event=record_stage module=service status=ok op=add session_id={} id={id}",
            session.id()
        );
        Ok(StagedId::Provisional(id))
    }

    /// One record as the caller currently sees it.
    ///
    /// Ids staged for deletion read as not found.
    pub fn get_record(
        &self,
        session: &Session,
        caller: UserId,
        id: StagedId,
    ) -> ServiceResult<ViewRecord> {
        ensure_session_owner(session, caller)?;
        if let StagedId::Durable(durable) = id {
            if session.read(|buffer| buffer.is_deleted(durable))? {
                return Err(ServiceError::NotFound(id));
            }
        }
        let record = self.lookup_owned(session, caller, id)?;
        Ok(ViewRecord { id, record })
    }

    /// Replaces the editable fields of an owned record in the buffer.
    pub fn update_record(
        &self,
        session: &Session,
        caller: UserId,
        id: StagedId,
        draft: RecordDraft,
    ) -> ServiceResult<ViewRecord> {
        ensure_session_owner(session, caller)?;
        let record = self.stage_edit(session, caller, id, |record| {
            draft.apply_to(record);
            record.validate()?;
            Ok(())
        })?;
        info!(
            "event=record_stage module=service status=ok op=update session_id={} id={id}",
            session.id()
        );
        Ok(ViewRecord { id, record })
    }

    /// Stages deletion of an owned record.
    pub fn delete_record(
        &self,
        session: &Session,
        caller: UserId,
        id: StagedId,
    ) -> ServiceResult<DeleteEffect> {
        ensure_session_owner(session, caller)?;
        self.lookup_owned(session, caller, id)?;
        let effect = session.mutate(|buffer| buffer.stage_delete(id))?;
        if effect == DeleteEffect::Ignored {
            // Retracted by a concurrent request between lookup and delete.
            return Err(ServiceError::NotFound(id));
        }
        info!(
            "event=record_stage module=service status=ok op=delete session_id={} id={id} effect={effect:?}",
            session.id()
        );
        Ok(effect)
    }

    /// Edits the shared set of an owned record and returns its share link.
    ///
    /// The token is minted on first share and staged with the record, so a
    /// new link resolves once the session has flushed.
    pub fn share_record(
        &self,
        session: &Session,
        caller: UserId,
        id: StagedId,
        changes: &ShareChanges,
    ) -> ServiceResult<ShareLink> {
        ensure_session_owner(session, caller)?;
        let record = self.stage_edit(session, caller, id, |record| {
            for user in &changes.add {
                if *user != record.owner {
                    record.shared_with.insert(*user);
                }
            }
            for user in &changes.remove {
                record.shared_with.remove(user);
            }
            share::ensure_token(record);
            Ok(())
        })?;
        let token = record.share_token.unwrap_or_default();

        info!(
            "event=record_stage module=service status=ok op=share session_id={} id={id} added={} removed={}",
            session.id(),
            changes.add.len(),
            changes.remove.len()
        );
        Ok(ShareLink {
            path: share::share_link_path(&self.share_link_prefix, &token),
            token,
        })
    }

    /// Records other users shared with `caller`, from durable state only.
    pub fn list_shared(&self, caller: UserId, query: &ListQuery) -> ServiceResult<ListOutcome> {
        let (filter, notices) = query.effective_filter();
        let items = self
            .store
            .find_shared_with(caller)?
            .into_iter()
            .filter(|record| filter.matches(record))
            .filter_map(|record| {
                record.id.map(|id| ViewRecord {
                    id: StagedId::Durable(id),
                    record,
                })
            })
            .collect();
        Ok(ListOutcome {
            items: finish_listing(items, query),
            notices,
        })
    }

    /// Follows a share link as `caller`.
    pub fn visit_shared_link(&self, caller: UserId, token: &str) -> ServiceResult<ShareVisit> {
        Ok(share::visit(self.store, caller, token)?)
    }

    /// Read-modify-write of one owned record under the session's exclusive
    /// lock, so concurrent requests on the same session serialize.
    ///
    /// The durable row is fetched before locking; the staged copy, when
    /// present, is re-read under the lock and wins.
    fn stage_edit(
        &self,
        session: &Session,
        caller: UserId,
        id: StagedId,
        edit: impl FnOnce(&mut Record) -> ServiceResult<()>,
    ) -> ServiceResult<Record> {
        let durable = match id {
            StagedId::Durable(durable) => self.store.find_by_id(durable)?,
            StagedId::Provisional(_) => None,
        };

        session.mutate(|buffer| -> ServiceResult<Record> {
            let staged = match id {
                StagedId::Provisional(provisional) => buffer.new_record(provisional).cloned(),
                StagedId::Durable(durable) => buffer.modified_record(durable).cloned(),
            };
            let mut record = staged.or(durable).ok_or(ServiceError::NotFound(id))?;
            ensure_record_owner(&record, caller, id)?;
            edit(&mut record)?;
            buffer.stage_update(id, record.clone())?;
            Ok(record)
        })?
    }

    /// Current version of `id` for the caller, ignoring deletion markers.
    fn lookup_owned(&self, session: &Session, caller: UserId, id: StagedId) -> ServiceResult<Record> {
        let staged = session.read(|buffer| match id {
            StagedId::Provisional(provisional) => buffer.new_record(provisional).cloned(),
            StagedId::Durable(durable) => buffer.modified_record(durable).cloned(),
        })?;

        let record = match (staged, id) {
            (Some(record), _) => record,
            (None, StagedId::Durable(durable)) => self
                .store
                .find_by_id(durable)?
                .ok_or(ServiceError::NotFound(id))?,
            (None, StagedId::Provisional(_)) => return Err(ServiceError::NotFound(id)),
        };

        ensure_record_owner(&record, caller, id)?;
        Ok(record)
    }
}

fn ensure_record_owner(record: &Record, caller: UserId, id: StagedId) -> ServiceResult<()> {
    if !record.is_owned_by(caller) {
        warn!(
            "event=record_access module=service status=error error_code=not_owner id={id} caller={caller}"
        );
        return Err(ServiceError::Unauthorized { caller });
    }
    Ok(())
}

fn ensure_session_owner(session: &Session, caller: UserId) -> ServiceResult<()> {
    if session.user() != caller {
        warn!(
            "event=session_access module=service status=error error_code=foreign_session session_id={} caller={caller}",
            session.id()
        );
        return Err(ServiceError::Unauthorized { caller });
    }
    Ok(())
}
