//! Request-level use-case services.
//!
//! # Responsibility
//! - Turn caller requests into staging-buffer edits and merged reads.
//! - Keep the CLI and any future transport decoupled from storage details.

pub mod record_service;
