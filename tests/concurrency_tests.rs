use std::{sync::Arc, thread};

use entgraph::{Client, EntGraphError, check_integrity, demo::demo_registry};

fn client() -> Client {
    let registry = Arc::new(demo_registry().expect("registry"));
    Client::open_in_memory(registry).expect("client")
}

#[test]
fn test_parallel_creates_get_distinct_ids() {
    let client = client();
    let ids: Vec<i64> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let client = &client;
                scope.spawn(move || {
                    (0..25)
                        .map(|n| {
                            client
                                .create("User")
                                .set("name", format!("w{worker}-{n}"))
                                .set("age", 20 + n)
                                .save()
                                .expect("create")
                                .id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("join"))
            .collect()
    });
    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 100);
    assert_eq!(client.count("User").expect("count"), 100);
}

#[test]
fn test_readers_see_complete_memberships() {
    let client = client();
    let group = client
        .create("Group")
        .set("name", "GitHub")
        .save()
        .expect("group");
    thread::scope(|scope| {
        let writer = scope.spawn(|| {
            for n in 0..50 {
                client
                    .create("User")
                    .set("name", format!("member-{n}"))
                    .set("age", 30)
                    .add_edge("groups", [group.id])
                    .exec()
                    .expect("member");
            }
        });
        let failing = scope.spawn(|| {
            for n in 0..50 {
                let err = client
                    .create("User")
                    .set("name", format!("broken-{n}"))
                    .set("age", 30)
                    .add_edge("groups", [group.id, 999_999])
                    .exec()
                    .expect_err("missing group");
                assert!(matches!(err, EntGraphError::NotFound(_)));
            }
        });
        let reader = scope.spawn(|| {
            for _ in 0..50 {
                let users = client
                    .query("User")
                    .expect("query")
                    .with_edge("groups")
                    .all()
                    .expect("users");
                for user in &users {
                    assert!(!user.text("name").unwrap_or_default().starts_with("broken"));
                    assert_eq!(user.edge("groups"), Some(&[group.id][..]));
                }
            }
        });
        writer.join().expect("writer");
        failing.join().expect("failing writer");
        reader.join().expect("reader");
    });
    let members = client
        .query_from(&group)
        .query_edge("users")
        .expect("users")
        .count()
        .expect("count");
    assert_eq!(members, 50);
    assert_eq!(client.count("User").expect("users"), 50);
    let report = check_integrity(client.store()).expect("integrity");
    assert_eq!(report.total_edges, 50);
    assert!(!report.has_issues());
}
