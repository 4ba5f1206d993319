//! Durable record store contract and its SQLite implementation.
//!
//! # Responsibility
//! - Define the persistence operations the staging overlay sits on top of.
//! - Isolate SQLite query details from session and service orchestration.
//!
//! # Invariants
//! - Only the flush coordinator and grant-on-visit write through this layer.

pub mod record_store;
pub mod sqlite_store;
