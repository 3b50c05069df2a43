use std::sync::Arc;

use chrono::Utc;
use entgraph::{
    Client, EdgeDef, EntityType, FieldDef, SchemaRegistry, StoreConfig, check_integrity,
    demo::demo_registry, safety::check_integrity_strict,
};

fn registry() -> Arc<entgraph::SchemaRegistry> {
    Arc::new(demo_registry().expect("registry"))
}

#[test]
fn test_clean_store_reports_no_issues() {
    let client = Client::open_in_memory(registry()).expect("client");
    let a8m = client
        .create("User")
        .set("name", "a8m")
        .set("age", 30)
        .save()
        .expect("user");
    client
        .create("Car")
        .set("model", "Tesla")
        .set("registered_at", Utc::now())
        .add_entities("owner", &[&a8m])
        .exec()
        .expect("car");
    let report = check_integrity(client.store()).expect("report");
    assert_eq!(report.total_rows, 2);
    assert_eq!(report.total_edges, 1);
    assert!(!report.has_issues());
    check_integrity_strict(client.store()).expect("strict");
}

#[test]
fn test_tampered_store_reports_orphans_and_cardinality() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tampered.db");
    let (a8m, neta, tesla) = {
        let client = Client::open(&StoreConfig::file(&path), registry()).expect("client");
        let user = |name: &str| {
            client
                .create("User")
                .set("name", name)
                .set("age", 30)
                .save()
                .expect("user")
                .id
        };
        let a8m = user("a8m");
        let neta = user("neta");
        let tesla = client
            .create("Car")
            .set("model", "Tesla")
            .set("registered_at", Utc::now())
            .add_edge("owner", [a8m])
            .save()
            .expect("car")
            .id;
        (a8m, neta, tesla)
    };

    let conn = rusqlite::Connection::open(&path).expect("raw open");
    conn.execute(
        "INSERT INTO ent_edges(edge_type, from_id, to_id) VALUES('User.cars', ?1, ?2)",
        rusqlite::params![neta, tesla],
    )
    .expect("second owner");
    conn.execute(
        "INSERT INTO ent_edges(edge_type, from_id, to_id) VALUES('Group.users', 999, ?1)",
        rusqlite::params![a8m],
    )
    .expect("orphan");
    drop(conn);

    let client = Client::open(&StoreConfig::file(&path), registry()).expect("reopen");
    let report = check_integrity(client.store()).expect("report");
    assert_eq!(report.orphan_edges, 1);
    assert_eq!(report.cardinality_violations, 1);
    assert_eq!(report.mistyped_edges, 0);
    assert!(report.has_issues());
    let err = check_integrity_strict(client.store()).expect_err("strict");
    assert_eq!(err.report, report);
}

#[test]
fn test_deleted_partner_leaves_required_edge_missing() {
    let mut builder = SchemaRegistry::builder();
    builder
        .register(
            EntityType::new("Team")
                .field(FieldDef::text("name"))
                .edge(EdgeDef::to("players", "Player")),
        )
        .expect("team")
        .register(
            EntityType::new("Player")
                .field(FieldDef::text("name"))
                .edge(EdgeDef::from("team", "Team", "players").unique().required()),
        )
        .expect("player");
    let client = Client::open_in_memory(Arc::new(builder.build().expect("build"))).expect("client");
    let team = client.create("Team").set("name", "blue").save().expect("team");
    for name in ["p1", "p2"] {
        client
            .create("Player")
            .set("name", name)
            .add_entities("team", &[&team])
            .save()
            .expect("player");
    }
    assert!(!check_integrity(client.store()).expect("report").has_issues());

    client.delete_one("Team", team.id).expect("delete team");
    let report = check_integrity(client.store()).expect("report");
    assert_eq!(report.missing_required_edges, 2);
    assert_eq!(report.orphan_edges, 0);
    assert!(report.has_issues());
    assert!(check_integrity_strict(client.store()).is_err());
}
