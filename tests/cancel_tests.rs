use std::sync::Arc;

use entgraph::{CancelToken, Client, EntGraphError, Predicate, demo::demo_registry};

fn populated() -> Client {
    let registry = Arc::new(demo_registry().expect("registry"));
    let client = Client::open_in_memory(registry).expect("client");
    let users: Vec<_> = (0..5)
        .map(|n| {
            client
                .create("User")
                .set("name", format!("user-{n}"))
                .set("age", 20 + n)
                .save()
                .expect("user")
        })
        .collect();
    client
        .create("Group")
        .set("name", "all")
        .add_edge("users", users.iter().map(|u| u.id))
        .exec()
        .expect("group");
    client
}

#[test]
fn test_cancelled_token_fails_query() {
    let client = populated();
    let token = CancelToken::new();
    token.cancel();
    let err = client
        .query("User")
        .expect("query")
        .with_cancel(token)
        .all()
        .expect_err("cancelled");
    assert!(matches!(err, EntGraphError::Cancelled(_)));
}

#[test]
fn test_cancelled_token_fails_traversal() {
    let client = populated();
    let token = CancelToken::new();
    let query = client
        .query("Group")
        .expect("query")
        .with_cancel(token.clone())
        .query_edge("users")
        .expect("users")
        .filter(Predicate::gt("age", 21));
    assert_eq!(query.count().expect("before cancel"), 3);
    token.cancel();
    assert!(token.is_cancelled());
    assert!(matches!(
        query.count().expect_err("after cancel"),
        EntGraphError::Cancelled(_)
    ));
    assert_eq!(client.count("User").expect("count"), 5);
}

#[test]
fn test_token_check() {
    let token = CancelToken::new();
    token.check().expect("fresh token");
    let clone = token.clone();
    clone.cancel();
    assert!(matches!(
        token.check().expect_err("shared flag"),
        EntGraphError::Cancelled(_)
    ));
}
