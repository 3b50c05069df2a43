use std::sync::Arc;

use entgraph::{Client, Entity, demo::{demo_registry, run_demo}};

fn client() -> Client {
    let registry = Arc::new(demo_registry().expect("registry"));
    Client::open_in_memory(registry).expect("client")
}

fn models(rows: &[Entity]) -> Vec<&str> {
    rows.iter().filter_map(|e| e.text("model")).collect()
}

#[test]
fn test_demo_rounds_report_expected_results() {
    let client = client();
    let report = run_demo(&client).expect("demo");

    let a8m = report.round1_user.expect("round1 user");
    assert_eq!(a8m.text("name"), Some("a8m"));
    assert_eq!(a8m.int("age"), Some(30));

    assert_eq!(models(&report.round2_cars), vec!["Tesla", "Ford"]);
    let ford = report.round2_ford.expect("ford");
    assert_eq!(ford.text("model"), Some("Ford"));
    assert!(ford.time("registered_at").is_some());

    assert_eq!(models(&report.round3_github_cars), vec!["Tesla", "Mazda"]);
    assert_eq!(models(&report.round3_ariel_cars), vec!["Tesla", "Ford"]);
    let groups: Vec<&str> = report
        .round3_groups
        .iter()
        .filter_map(|g| g.text("name"))
        .collect();
    assert_eq!(groups, vec!["GitLab", "GitHub"]);
}

#[test]
fn test_demo_cleans_up_between_rounds() {
    let client = client();
    run_demo(&client).expect("first run");
    for ty in ["User", "Car", "Group"] {
        assert_eq!(client.count(ty).expect("count"), 0);
    }
    let report = run_demo(&client).expect("second run");
    assert_eq!(models(&report.round3_ariel_cars), vec!["Tesla", "Ford"]);
}
