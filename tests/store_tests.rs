use std::sync::Arc;

use entgraph::{
    Client, EntGraphError, EntityStore, FieldValues, StoreConfig, Value, demo::demo_registry,
    open_store,
};

fn store() -> EntityStore {
    let registry = Arc::new(demo_registry().expect("registry"));
    EntityStore::open_in_memory(registry).expect("store")
}

fn user_fields(name: &str, age: i64) -> FieldValues {
    let mut fields = FieldValues::new();
    fields.insert("name".into(), Value::from(name));
    fields.insert("age".into(), Value::Int(age));
    fields
}

#[test]
fn test_insert_then_get_returns_fields() {
    let store = store();
    let id = store.insert("User", user_fields("a8m", 30)).expect("insert");
    let user = store.get("User", id).expect("get");
    assert_eq!(user.id, id);
    assert_eq!(user.entity_type, "User");
    assert_eq!(user.text("name"), Some("a8m"));
    assert_eq!(user.int("age"), Some(30));
    assert_eq!(user.to_string(), format!("User(id={id}, age=30, name=a8m)"));
}

#[test]
fn test_ids_increase_across_types() {
    let store = store();
    let a = store.insert("User", user_fields("a", 1)).expect("a");
    let mut group = FieldValues::new();
    group.insert("name".into(), Value::from("GitHub"));
    let b = store.insert("Group", group).expect("b");
    let c = store.insert("User", user_fields("c", 2)).expect("c");
    assert!(a < b && b < c);
    assert_eq!(store.ids("User").expect("ids"), vec![a, c]);
    assert_eq!(store.count("User").expect("count"), 2);
    assert_eq!(store.count("Group").expect("count"), 1);
}

#[test]
fn test_get_with_wrong_type_or_missing_id_is_not_found() {
    let store = store();
    let id = store.insert("User", user_fields("a8m", 30)).expect("insert");
    assert!(matches!(
        store.get("Group", id).expect_err("wrong type"),
        EntGraphError::NotFound(_)
    ));
    assert!(matches!(
        store.get("User", id + 100).expect_err("missing"),
        EntGraphError::NotFound(_)
    ));
    assert!(matches!(
        store.get("Boat", id).expect_err("unknown type"),
        EntGraphError::UnknownType(_)
    ));
}

#[test]
fn test_delete_removes_row_and_is_not_repeatable() {
    let store = store();
    let id = store.insert("User", user_fields("a8m", 30)).expect("insert");
    store.delete("User", id).expect("delete");
    assert_eq!(store.count("User").expect("count"), 0);
    assert!(matches!(
        store.delete("User", id).expect_err("second delete"),
        EntGraphError::NotFound(_)
    ));
}

#[test]
fn test_default_and_validator_applied_on_insert() {
    let store = store();
    let mut fields = FieldValues::new();
    fields.insert("age".into(), Value::Int(41));
    let id = store.insert("User", fields).expect("insert with default name");
    assert_eq!(store.get("User", id).expect("get").text("name"), Some("unknown"));

    let err = store
        .insert("User", user_fields("neg", -1))
        .expect_err("age must be positive");
    assert!(matches!(err, EntGraphError::ConstraintViolation(_)));

    let mut fields = FieldValues::new();
    fields.insert("name".into(), Value::from("no age"));
    assert!(matches!(
        store.insert("User", fields).expect_err("age required"),
        EntGraphError::ConstraintViolation(_)
    ));
}

#[test]
fn test_file_store_persists_between_opens() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fleet.db");
    let registry = Arc::new(demo_registry().expect("registry"));
    let id = {
        let store = open_store(&StoreConfig::file(&path), registry.clone()).expect("open");
        store.insert("User", user_fields("a8m", 30)).expect("insert")
    };
    let client = Client::open(&StoreConfig::file(&path), registry).expect("reopen");
    assert_eq!(client.get("User", id).expect("get").text("name"), Some("a8m"));
}

#[test]
fn test_corrupt_row_reports_store_unavailable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("corrupt.db");
    let registry = Arc::new(demo_registry().expect("registry"));
    let id = {
        let store = open_store(&StoreConfig::file(&path), registry.clone()).expect("open");
        store.insert("User", user_fields("a8m", 30)).expect("insert")
    };
    let conn = rusqlite::Connection::open(&path).expect("raw open");
    conn.execute(
        "UPDATE ent_rows SET data='not json' WHERE id=?1",
        rusqlite::params![id],
    )
    .expect("corrupt");
    drop(conn);

    let store = open_store(&StoreConfig::file(&path), registry).expect("reopen");
    assert!(matches!(
        store.get("User", id).expect_err("corrupt"),
        EntGraphError::StoreUnavailable(_)
    ));
}

#[test]
fn test_pragma_settings_are_applied() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = StoreConfig::file(dir.path().join("wal.db"))
        .with_pragma("journal_mode", "WAL")
        .with_cache_capacity(0);
    let registry = Arc::new(demo_registry().expect("registry"));
    let store = open_store(&cfg, registry).expect("open");
    store.insert("User", user_fields("a8m", 30)).expect("insert");
    assert_eq!(store.cache_stats().hits, 0);
}
