//! Link-based sharing tokens.
//!
//! # Responsibility
//! - Mint one unguessable token per record, lazily, on first share.
//! - Resolve tokens through the record store and grant access on visit.
//!
//! # Invariants
//! - A token, once set, never changes.
//! - An unknown or malformed token is a plain "not found" outcome.
//! - The owner is never added to their own shared set.

use crate::model::record::{Record, UserId};
use crate::repo::record_store::{RecordStore, RepoResult};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static SHARE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("valid share token regex")
});

/// Outcome of following a share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareVisit {
    /// Visitor was added to the shared set.
    Granted(Record),
    /// Visitor is the owner or already had access; nothing changed.
    AlreadyVisible(Record),
    NotFound,
}

/// Sets a fresh token on `record` unless it already has one.
///
/// Returns `true` when a token was minted.
pub fn ensure_token(record: &mut Record) -> bool {
    if record
        .share_token
        .as_deref()
        .is_some_and(|token| !token.trim().is_empty())
    {
        return false;
    }
    record.share_token = Some(Uuid::new_v4().to_string());
    true
}

/// Whether `token` has the shape of a minted token.
pub fn is_well_formed_token(token: &str) -> bool {
    SHARE_TOKEN_RE.is_match(token)
}

/// Looks up the record behind `token`.
///
/// Malformed tokens are answered without a store lookup.
pub fn resolve(store: &dyn RecordStore, token: &str) -> RepoResult<Option<Record>> {
    if !is_well_formed_token(token) {
        return Ok(None);
    }
    store.find_by_token(token)
}

/// Follows a share link as `visitor`, granting read access on first visit.
pub fn visit(store: &dyn RecordStore, visitor: UserId, token: &str) -> RepoResult<ShareVisit> {
    let Some(mut record) = resolve(store, token)? else {
        info!("event=share_visit module=share status=ok outcome=not_found visitor={visitor}");
        return Ok(ShareVisit::NotFound);
    };

    if record.is_visible_to(visitor) {
        return Ok(ShareVisit::AlreadyVisible(record));
    }

    record.shared_with.insert(visitor);
    let saved = store.save(&record)?;
    info!(
        "event=share_visit module=share status=ok outcome=granted visitor={visitor} record_id={}",
        saved
            .id
            .map_or_else(|| "none".to_string(), |id| id.to_string())
    );
    Ok(ShareVisit::Granted(saved))
}

/// Link path for `token` under `prefix` (e.g. `/shared/{token}`).
pub fn share_link_path(prefix: &str, token: &str) -> String {
    format!("{prefix}{token}")
}
