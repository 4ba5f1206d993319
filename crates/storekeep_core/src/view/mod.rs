//! Read path: merged view of durable and staged records.
//!
//! # Responsibility
//! - Produce "what the user would see if everything staged were committed".
//! - Apply search and sort after merging.

pub mod merge;
pub mod query;
