//! The users, cars and groups fleet schema and the three demo rounds run by
//! `entgraph --command demo`.

use chrono::Utc;

use crate::{
    client::Client,
    entity::Entity,
    errors::Result,
    predicate::Predicate,
    registry::{EdgeDef, EntityType, FieldDef, SchemaRegistry},
};

pub fn demo_registry() -> Result<SchemaRegistry> {
    let mut builder = SchemaRegistry::builder();
    builder
        .register(
            EntityType::new("User")
                .field(FieldDef::int("age").positive())
                .field(FieldDef::text("name").default_value("unknown"))
                .edge(EdgeDef::to("cars", "Car"))
                .edge(EdgeDef::from("groups", "Group", "users")),
        )?
        .register(
            EntityType::new("Car")
                .field(FieldDef::text("model"))
                .field(FieldDef::time("registered_at"))
                .edge(EdgeDef::from("owner", "User", "cars").unique()),
        )?
        .register(
            EntityType::new("Group")
                .field(FieldDef::text("name").not_empty())
                .edge(EdgeDef::to("users", "User")),
        )?;
    builder.build()
}

/// What each round observed, for printing and assertions.
#[derive(Clone, Debug, Default)]
pub struct DemoReport {
    pub round1_user: Option<Entity>,
    pub round2_cars: Vec<Entity>,
    pub round2_ford: Option<Entity>,
    pub round3_github_cars: Vec<Entity>,
    pub round3_ariel_cars: Vec<Entity>,
    pub round3_groups: Vec<Entity>,
}

pub fn run_demo(client: &Client) -> Result<DemoReport> {
    let mut report = DemoReport::default();
    round1(client, &mut report)?;
    round2(client, &mut report)?;
    round3(client, &mut report)?;
    Ok(report)
}

fn round1(client: &Client, report: &mut DemoReport) -> Result<()> {
    tracing::info!(target: "entgraph::demo", "round1 start");
    let user = create_user(client)?;
    tracing::info!(target: "entgraph::demo", %user, "user was created");
    let found = client
        .query("User")?
        .filter(Predicate::eq("name", "a8m"))
        .only()?;
    tracing::info!(target: "entgraph::demo", user = %found, "user returned");
    report.round1_user = Some(found);
    client.delete("User")?.exec()?;
    tracing::info!(target: "entgraph::demo", "round1 end");
    Ok(())
}

fn round2(client: &Client, report: &mut DemoReport) -> Result<()> {
    tracing::info!(target: "entgraph::demo", "round2 start");
    let a8m = create_cars(client)?;
    let cars = client.query_from(&a8m).query_edge("cars")?.all()?;
    tracing::info!(target: "entgraph::demo", cars = %join(&cars), "returned cars");
    let ford = client
        .query_from(&a8m)
        .query_edge("cars")?
        .filter(Predicate::eq("model", "Ford"))
        .only()?;
    tracing::info!(target: "entgraph::demo", car = %ford, "ford returned");
    report.round2_cars = cars;
    report.round2_ford = Some(ford);
    client.delete("User")?.exec()?;
    client.delete("Car")?.exec()?;
    tracing::info!(target: "entgraph::demo", "round2 end");
    Ok(())
}

fn round3(client: &Client, report: &mut DemoReport) -> Result<()> {
    tracing::info!(target: "entgraph::demo", "round3 start");
    create_graph(client)?;

    let github_cars = client
        .query("Group")?
        .filter(Predicate::eq("name", "GitHub"))
        .query_path(&["users", "cars"])?
        .all()?;
    tracing::info!(target: "entgraph::demo", cars = %join(&github_cars), "cars returned");

    let ariel = client
        .query("User")?
        .filter(Predicate::has_edge("cars"))
        .filter(Predicate::eq("name", "Ariel"))
        .only()?;
    let ariel_cars = client
        .query_from(&ariel)
        .query_path(&["groups", "users", "cars"])?
        .filter(Predicate::not(Predicate::eq("model", "Mazda")))
        .all()?;
    tracing::info!(target: "entgraph::demo", cars = %join(&ariel_cars), "cars returned");

    let groups = client
        .query("Group")?
        .filter(Predicate::has_edge("users"))
        .all()?;
    tracing::info!(target: "entgraph::demo", groups = %join(&groups), "groups returned");

    report.round3_github_cars = github_cars;
    report.round3_ariel_cars = ariel_cars;
    report.round3_groups = groups;
    for entity_type in ["User", "Car", "Group"] {
        client.delete(entity_type)?.exec()?;
    }
    tracing::info!(target: "entgraph::demo", "round3 end");
    Ok(())
}

fn create_user(client: &Client) -> Result<Entity> {
    client
        .create("User")
        .set("age", 30)
        .set("name", "a8m")
        .save()
}

fn create_cars(client: &Client) -> Result<Entity> {
    let tesla = client
        .create("Car")
        .set("model", "Tesla")
        .set("registered_at", Utc::now())
        .save()?;
    tracing::info!(target: "entgraph::demo", car = %tesla, "car was created");
    let ford = client
        .create("Car")
        .set("model", "Ford")
        .set("registered_at", Utc::now())
        .save()?;
    tracing::info!(target: "entgraph::demo", car = %ford, "car was created");
    let a8m = client
        .create("User")
        .set("age", 30)
        .set("name", "a8m")
        .add_entities("cars", &[&tesla, &ford])
        .save()?;
    tracing::info!(target: "entgraph::demo", user = %a8m, "user was created");
    Ok(a8m)
}

fn create_graph(client: &Client) -> Result<()> {
    let ariel = client
        .create("User")
        .set("age", 30)
        .set("name", "Ariel")
        .save()?;
    let neta = client
        .create("User")
        .set("age", 28)
        .set("name", "Neta")
        .save()?;
    for (model, owner) in [("Tesla", &ariel), ("Mazda", &ariel), ("Ford", &neta)] {
        client
            .create("Car")
            .set("model", model)
            .set("registered_at", Utc::now())
            .add_entities("owner", &[owner])
            .exec()?;
    }
    client
        .create("Group")
        .set("name", "GitLab")
        .add_entities("users", &[&neta, &ariel])
        .exec()?;
    client
        .create("Group")
        .set("name", "GitHub")
        .add_entities("users", &[&ariel])
        .exec()?;
    tracing::info!(target: "entgraph::demo", "the graph was created successfully");
    Ok(())
}

fn join(entities: &[Entity]) -> String {
    let parts: Vec<String> = entities.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_registry_links_inverse_edges() {
        let registry = demo_registry().expect("registry");
        let owner = registry.edge("Car", "owner").expect("owner edge");
        let cars = registry.edge("User", "cars").expect("cars edge");
        assert_eq!(owner.key, cars.key);
        assert_eq!(owner.target_type, "User");
        let groups = registry.edge("User", "groups").expect("groups edge");
        assert_eq!(groups.key, "Group.users");
    }
}
