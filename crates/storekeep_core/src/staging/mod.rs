//! Session-local staging of record changes.
//!
//! # Responsibility
//! - Accumulate create/update/delete operations between session start and end.
//! - Stay free of I/O; synchronization is owned by the session.

pub mod buffer;
