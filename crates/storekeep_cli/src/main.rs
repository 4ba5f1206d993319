//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `storekeep_core` linkage with a deterministic session round trip.
//! - Optionally load a JSON `CoreConfig` from the first argument.

use log::info;
use std::process::ExitCode;
use std::sync::Arc;
use storekeep_core::db::{open_db, open_db_in_memory};
use storekeep_core::{
    init_logging_from_config, CoreConfig, ListQuery, RecordDraft, RecordService, SessionRegistry,
    SharedStore, SqliteRecordStore, TerminationReason, UserId,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("storekeep error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("storekeep_core ping={}", storekeep_core::ping());
    println!("storekeep_core version={}", storekeep_core::core_version());

    let config = match std::env::args().nth(1) {
        Some(path) => CoreConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => CoreConfig::default(),
    };
    init_logging_from_config(&config)?;

    let conn = match config.db_path.as_deref() {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let store: SharedStore = Arc::new(SqliteRecordStore::new(conn));
    let registry = SessionRegistry::from_config(Arc::clone(&store), &config);

    let user = UserId(1);
    let session = registry.open_session(user);
    let service = RecordService::new(&*store)
        .with_share_link_prefix(config.share_link_prefix.clone());

    let staged = service.add_record(&session, user, RecordDraft::new("smoke", "staged record"))?;
    let listed = service.list_records(&session, user, &ListQuery::default())?;
    println!("staged id={staged} visible={}", listed.items.len());

    let report = registry
        .terminate(session.id(), TerminationReason::Logout)
        .ok_or("session vanished before logout")?;
    info!(
        "event=cli_smoke module=cli status=ok inserted={}",
        report.inserted_ids.len()
    );
    println!(
        "flush ok={} inserted={} deleted={} updated={}",
        report.is_success(),
        report.inserted_ids.len(),
        report.deleted_rows,
        report.pending.updates
    );

    let after = registry.open_session(user);
    let durable = service.list_records(&after, user, &ListQuery::default())?;
    println!("durable records={}", durable.items.len());
    registry.shutdown();
    Ok(())
}
