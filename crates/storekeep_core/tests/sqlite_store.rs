use storekeep_core::db::open_db_in_memory;
use storekeep_core::{
    DateRange, Record, RecordFilter, RecordId, RecordStore, RepoError, SqliteRecordStore, UserId,
};

fn store() -> SqliteRecordStore {
    SqliteRecordStore::new(open_db_in_memory().unwrap())
}

fn record(owner: i64, title: &str, category: Option<&str>, date_added: i64) -> Record {
    let mut record = Record::new(UserId(owner), title, "body");
    record.category = category.map(str::to_string);
    record.date_added = date_added;
    record
}

#[test]
fn save_assigns_id_and_upserts_by_id() {
    let store = store();
    let saved = store.save(&record(1, "first", None, 10)).unwrap();
    let id = saved.id.unwrap();

    let mut edited = saved.clone();
    edited.title = "renamed".to_string();
    edited.shared_with.insert(UserId(2));
    store.save(&edited).unwrap();

    let loaded = store.find_by_id(id).unwrap().unwrap();
    assert_eq!(loaded.title, "renamed");
    assert!(loaded.shared_with.contains(&UserId(2)));
    assert_eq!(store.find_by_owner(UserId(1), &RecordFilter::default()).unwrap().len(), 1);
}

#[test]
fn save_rejects_invalid_record_without_writing() {
    let store = store();
    let err = store.save(&record(1, "  ", None, 0)).unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(store
        .find_by_owner(UserId(1), &RecordFilter::default())
        .unwrap()
        .is_empty());
}

#[test]
fn delete_tolerates_missing_ids() {
    let store = store();
    let id = store.save(&record(1, "a", None, 0)).unwrap().id.unwrap();

    let deleted = store.delete_all_by_id(&[id, RecordId(9_999)]).unwrap();
    assert_eq!(deleted, 1);
    assert!(store.find_by_id(id).unwrap().is_none());
    assert_eq!(store.delete_all_by_id(&[]).unwrap(), 0);
}

#[test]
fn find_by_owner_applies_category_and_date_filters() {
    let store = store();
    store
        .save_all(&[
            record(1, "work early", Some("work"), 100),
            record(1, "work late", Some("work"), 500),
            record(1, "home", Some("home"), 200),
            record(2, "other owner", Some("work"), 100),
        ])
        .unwrap();

    let work = RecordFilter {
        category: Some("work".to_string()),
        added_between: None,
    };
    let titles: Vec<String> = store
        .find_by_owner(UserId(1), &work)
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, vec!["work early", "work late"]);

    let window = RecordFilter {
        category: None,
        added_between: Some(DateRange::new(150, 500)),
    };
    let titles: Vec<String> = store
        .find_by_owner(UserId(1), &window)
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, vec!["work late", "home"]);
}

#[test]
fn find_shared_with_and_by_token() {
    let store = store();
    let mut shared = record(1, "shared", None, 0);
    shared.shared_with.insert(UserId(7));
    shared.share_token = Some("7f1c2a4e-8d7b-4c1e-9a3b-2f6d5e4c3b2a".to_string());
    let saved = store.save(&shared).unwrap();
    store.save(&record(1, "private", None, 0)).unwrap();

    let visible = store.find_shared_with(UserId(7)).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, saved.id);

    let by_token = store
        .find_by_token("7f1c2a4e-8d7b-4c1e-9a3b-2f6d5e4c3b2a")
        .unwrap()
        .unwrap();
    assert_eq!(by_token.id, saved.id);
    assert!(store.find_by_token("missing").unwrap().is_none());
}

#[test]
fn deleting_record_removes_its_shares() {
    let store = store();
    let mut shared = record(1, "shared", None, 0);
    shared.shared_with.insert(UserId(3));
    let id = store.save(&shared).unwrap().id.unwrap();

    store.delete_all_by_id(&[id]).unwrap();
    assert!(store.find_shared_with(UserId(3)).unwrap().is_empty());
}

#[test]
fn atomically_rolls_back_on_error() {
    let store = store();
    let kept = store.save(&record(1, "kept", None, 0)).unwrap().id.unwrap();

    let result = store.atomically(&mut |scoped: &dyn RecordStore| {
        scoped.delete_all_by_id(&[kept])?;
        scoped.save(&record(1, "doomed", None, 0))?;
        scoped.save(&record(1, "", None, 0))?;
        Ok(())
    });

    assert!(matches!(result, Err(RepoError::Validation(_))));
    let titles: Vec<String> = store
        .find_by_owner(UserId(1), &RecordFilter::default())
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, vec!["kept"]);
}

#[test]
fn atomically_commits_on_success() {
    let store = store();
    store
        .atomically(&mut |scoped: &dyn RecordStore| {
            scoped.save_all(&[record(1, "a", None, 0), record(1, "b", None, 0)])?;
            Ok(())
        })
        .unwrap();
    assert_eq!(
        store
            .find_by_owner(UserId(1), &RecordFilter::default())
            .unwrap()
            .len(),
        2
    );
}
