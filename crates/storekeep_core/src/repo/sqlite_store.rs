//! SQLite implementation of the record store.
//!
//! # Responsibility
//! - Persist records and their share grants in `records`/`record_shares`.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call `Record::validate()` before SQL mutations.
//! - Every bulk write runs in one transaction.
//! - Read paths reject malformed rows instead of masking them.

use crate::model::record::{Record, RecordId, UserId};
use crate::repo::record_store::{RecordFilter, RecordStore, RepoError, RepoResult};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    owner_id,
    title,
    content,
    link,
    category,
    date_added,
    share_token
FROM records";

/// Thread-safe SQLite-backed record store.
///
/// One connection is shared behind a mutex; SQLite serializes writers anyway.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-call leaves the connection usable; any open
        // transaction was rolled back when it was dropped.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for SqliteRecordStore {
    fn find_by_id(&self, id: RecordId) -> RepoResult<Option<Record>> {
        find_by_id_in(&self.lock(), id)
    }

    fn find_by_owner(&self, owner: UserId, filter: &RecordFilter) -> RepoResult<Vec<Record>> {
        find_by_owner_in(&self.lock(), owner, filter)
    }

    fn find_shared_with(&self, user: UserId) -> RepoResult<Vec<Record>> {
        find_shared_with_in(&self.lock(), user)
    }

    fn find_by_token(&self, token: &str) -> RepoResult<Option<Record>> {
        find_by_token_in(&self.lock(), token)
    }

    fn save(&self, record: &Record) -> RepoResult<Record> {
        let mut saved = self.save_all(std::slice::from_ref(record))?;
        saved
            .pop()
            .ok_or_else(|| RepoError::InvalidData("save returned no record".to_string()))
    }

    fn save_all(&self, records: &[Record]) -> RepoResult<Vec<Record>> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let saved = save_all_in(&tx, records)?;
        tx.commit()?;
        Ok(saved)
    }

    fn delete_all_by_id(&self, ids: &[RecordId]) -> RepoResult<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = delete_all_in(&tx, ids)?;
        tx.commit()?;
        Ok(deleted)
    }

    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn RecordStore) -> RepoResult<()>,
    ) -> RepoResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        work(&ScopedStore { conn: &*tx })?;
        tx.commit()?;
        Ok(())
    }
}

/// Store view bound to an open transaction.
///
/// Writes join the enclosing transaction; nested `atomically` calls run inline.
struct ScopedStore<'c> {
    conn: &'c Connection,
}

impl RecordStore for ScopedStore<'_> {
    fn find_by_id(&self, id: RecordId) -> RepoResult<Option<Record>> {
        find_by_id_in(self.conn, id)
    }

    fn find_by_owner(&self, owner: UserId, filter: &RecordFilter) -> RepoResult<Vec<Record>> {
        find_by_owner_in(self.conn, owner, filter)
    }

    fn find_shared_with(&self, user: UserId) -> RepoResult<Vec<Record>> {
        find_shared_with_in(self.conn, user)
    }

    fn find_by_token(&self, token: &str) -> RepoResult<Option<Record>> {
        find_by_token_in(self.conn, token)
    }

    fn save(&self, record: &Record) -> RepoResult<Record> {
        save_in(self.conn, record)
    }

    fn save_all(&self, records: &[Record]) -> RepoResult<Vec<Record>> {
        save_all_in(self.conn, records)
    }

    fn delete_all_by_id(&self, ids: &[RecordId]) -> RepoResult<usize> {
        delete_all_in(self.conn, ids)
    }

    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn RecordStore) -> RepoResult<()>,
    ) -> RepoResult<()> {
        work(self)
    }
}

fn find_by_id_in(conn: &Connection, id: RecordId) -> RepoResult<Option<Record>> {
    let mut stmt = conn.prepare(&format!("{RECORD_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.0])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_record_row(conn, row)?)),
        None => Ok(None),
    }
}

fn find_by_token_in(conn: &Connection, token: &str) -> RepoResult<Option<Record>> {
    let mut stmt = conn.prepare(&format!("{RECORD_SELECT_SQL} WHERE share_token = ?1;"))?;
    let mut rows = stmt.query([token])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_record_row(conn, row)?)),
        None => Ok(None),
    }
}

fn find_by_owner_in(
    conn: &Connection,
    owner: UserId,
    filter: &RecordFilter,
) -> RepoResult<Vec<Record>> {
    let mut sql = format!("{RECORD_SELECT_SQL} WHERE owner_id = ?");
    let mut bind_values: Vec<Value> = vec![Value::Integer(owner.0)];

    if let Some(category) = filter.category.as_ref() {
        sql.push_str(" AND category = ?");
        bind_values.push(Value::Text(category.clone()));
    }

    if let Some(range) = filter.added_between {
        sql.push_str(" AND date_added BETWEEN ? AND ?");
        bind_values.push(Value::Integer(range.start));
        bind_values.push(Value::Integer(range.end));
    }

    sql.push_str(" ORDER BY id ASC");
    query_records(conn, &sql, bind_values)
}

fn find_shared_with_in(conn: &Connection, user: UserId) -> RepoResult<Vec<Record>> {
    let sql = format!(
        "{RECORD_SELECT_SQL}
         WHERE EXISTS (
             SELECT 1
             FROM record_shares s
             WHERE s.record_id = records.id
               AND s.user_id = ?
         )
         ORDER BY id ASC"
    );
    query_records(conn, &sql, vec![Value::Integer(user.0)])
}

fn query_records(conn: &Connection, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse_record_row(conn, row)?);
    }
    Ok(records)
}

fn save_all_in(conn: &Connection, records: &[Record]) -> RepoResult<Vec<Record>> {
    records.iter().map(|record| save_in(conn, record)).collect()
}

fn save_in(conn: &Connection, record: &Record) -> RepoResult<Record> {
    record.validate()?;

    let id = match record.id {
        None => {
            conn.execute(
                "INSERT INTO records (
                    owner_id,
                    title,
                    content,
                    link,
                    category,
                    date_added,
                    share_token
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    record.owner.0,
                    record.title.as_str(),
                    record.content.as_str(),
                    record.link.as_deref(),
                    record.category.as_deref(),
                    record.date_added,
                    record.share_token.as_deref(),
                ],
            )?;
            RecordId(conn.last_insert_rowid())
        }
        Some(id) => {
            conn.execute(
                "INSERT INTO records (
                    id,
                    owner_id,
                    title,
                    content,
                    link,
                    category,
                    date_added,
                    share_token
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    title = excluded.title,
                    content = excluded.content,
                    link = excluded.link,
                    category = excluded.category,
                    date_added = excluded.date_added,
                    share_token = excluded.share_token;",
                params![
                    id.0,
                    record.owner.0,
                    record.title.as_str(),
                    record.content.as_str(),
                    record.link.as_deref(),
                    record.category.as_deref(),
                    record.date_added,
                    record.share_token.as_deref(),
                ],
            )?;
            id
        }
    };

    replace_shares(conn, id, &record.shared_with)?;
    debug!(
        "event=record_save module=repo status=ok record_id={id} shares={}",
        record.shared_with.len()
    );

    let mut saved = record.clone();
    saved.id = Some(id);
    Ok(saved)
}

fn delete_all_in(conn: &Connection, ids: &[RecordId]) -> RepoResult<usize> {
    let mut stmt = conn.prepare("DELETE FROM records WHERE id = ?1;")?;
    let mut deleted = 0;
    for id in ids {
        deleted += stmt.execute([id.0])?;
    }
    Ok(deleted)
}

fn replace_shares(conn: &Connection, id: RecordId, users: &BTreeSet<UserId>) -> RepoResult<()> {
    conn.execute("DELETE FROM record_shares WHERE record_id = ?1;", [id.0])?;
    let mut stmt =
        conn.prepare("INSERT INTO record_shares (record_id, user_id) VALUES (?1, ?2);")?;
    for user in users {
        stmt.execute(params![id.0, user.0])?;
    }
    Ok(())
}

fn load_shares(conn: &Connection, id: RecordId) -> RepoResult<BTreeSet<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT user_id
         FROM record_shares
         WHERE record_id = ?1
         ORDER BY user_id ASC;",
    )?;
    let mut rows = stmt.query([id.0])?;
    let mut users = BTreeSet::new();
    while let Some(row) = rows.next()? {
        users.insert(UserId(row.get(0)?));
    }
    Ok(users)
}

fn parse_record_row(conn: &Connection, row: &Row<'_>) -> RepoResult<Record> {
    let id = RecordId(row.get("id")?);
    let share_token = match row.get::<_, Option<String>>("share_token")? {
        Some(token) if token.trim().is_empty() => {
            return Err(RepoError::InvalidData(format!(
                "empty share token for record {id} in records.share_token"
            )));
        }
        other => other,
    };

    let record = Record {
        id: Some(id),
        owner: UserId(row.get("owner_id")?),
        title: row.get("title")?,
        content: row.get("content")?,
        link: row.get("link")?,
        category: row.get("category")?,
        date_added: row.get("date_added")?,
        shared_with: load_shares(conn, id)?,
        share_token,
    };
    record.validate()?;
    Ok(record)
}
