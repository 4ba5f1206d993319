//! Record domain model.
//!
//! # Responsibility
//! - Define the canonical owned record and its identifier types.
//!
//! # Invariants
//! - Durable and provisional identifiers never share a type.

pub mod record;
