use std::sync::Arc;

use crate::{
    config::{StoreConfig, open_store},
    entity::Entity,
    errors::Result,
    mutation::{CreateBuilder, DeleteQuery, MutationExecutor, UpdateBuilder},
    query::EntityQuery,
    registry::SchemaRegistry,
    store::EntityStore,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLineConfig {
    pub database: String,
    pub command: String,
    pub entity_type: Option<String>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> std::result::Result<Self, String> {
        let mut database = String::from("memory");
        let mut command = String::from("status");
        let mut entity_type = None;
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match *arg {
                "--db" | "--database" => {
                    database = iter
                        .next()
                        .ok_or_else(|| "--db requires a value".to_string())?
                        .to_string();
                }
                "--command" => {
                    command = iter
                        .next()
                        .ok_or_else(|| "--command requires a value".to_string())?
                        .to_string();
                }
                "--type" => {
                    entity_type = Some(
                        iter.next()
                            .ok_or_else(|| "--type requires a value".to_string())?
                            .to_string(),
                    );
                }
                other if other.starts_with('-') => {
                    return Err(format!("unknown flag {other}"));
                }
                _ => {
                    command = arg.to_string();
                }
            }
        }
        Ok(Self {
            database,
            command,
            entity_type,
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        if self.database == "memory" {
            StoreConfig::in_memory()
        } else {
            StoreConfig::file(&self.database)
        }
    }

    pub fn help() -> &'static str {
        "Usage: entgraph [--db memory|PATH] [--command demo|status|list] [--type NAME]\n"
    }
}

/// Entry point bundling a store with typed query and mutation builders.
pub struct Client {
    store: EntityStore,
}

impl Client {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    pub fn open(cfg: &StoreConfig, registry: Arc<SchemaRegistry>) -> Result<Self> {
        open_store(cfg, registry).map(Self::new)
    }

    pub fn open_in_memory(registry: Arc<SchemaRegistry>) -> Result<Self> {
        EntityStore::open_in_memory(registry).map(Self::new)
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn registry(&self) -> &SchemaRegistry {
        self.store.registry()
    }

    pub fn query(&self, entity_type: &str) -> Result<EntityQuery<'_>> {
        EntityQuery::new(&self.store, entity_type)
    }

    /// Query rooted at one already-loaded entity, for `query_edge` hops.
    pub fn query_from(&self, entity: &Entity) -> EntityQuery<'_> {
        EntityQuery::from_ids(&self.store, &entity.entity_type, vec![entity.id])
    }

    pub fn create(&self, entity_type: &str) -> CreateBuilder<'_> {
        CreateBuilder::new(&self.store, entity_type)
    }

    pub fn update(&self, entity_type: &str, id: i64) -> UpdateBuilder<'_> {
        UpdateBuilder::new(&self.store, entity_type, id)
    }

    pub fn update_one(&self, entity: &Entity) -> UpdateBuilder<'_> {
        self.update(&entity.entity_type, entity.id)
    }

    pub fn delete(&self, entity_type: &str) -> Result<DeleteQuery<'_>> {
        self.query(entity_type).map(DeleteQuery::new)
    }

    pub fn delete_one(&self, entity_type: &str, id: i64) -> Result<()> {
        MutationExecutor::new(&self.store).delete(entity_type, id)
    }

    pub fn get(&self, entity_type: &str, id: i64) -> Result<Entity> {
        self.store.get(entity_type, id)
    }

    pub fn count(&self, entity_type: &str) -> Result<usize> {
        self.store.count(entity_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreLocation;

    #[test]
    fn from_args_defaults() {
        let cfg = CommandLineConfig::from_args(&["entgraph"]).expect("parse");
        assert_eq!(cfg.database, "memory");
        assert_eq!(cfg.command, "status");
        assert_eq!(cfg.entity_type, None);
        assert!(matches!(cfg.store_config().location, StoreLocation::Memory));
    }

    #[test]
    fn from_args_reads_flags_and_positional_command() {
        let cfg = CommandLineConfig::from_args(&[
            "entgraph", "--db", "/tmp/fleet.db", "--type", "Car", "list",
        ])
        .expect("parse");
        assert_eq!(cfg.database, "/tmp/fleet.db");
        assert_eq!(cfg.command, "list");
        assert_eq!(cfg.entity_type.as_deref(), Some("Car"));
        assert!(matches!(cfg.store_config().location, StoreLocation::Path(_)));
    }

    #[test]
    fn from_args_rejects_unknown_flag_and_missing_value() {
        assert!(CommandLineConfig::from_args(&["entgraph", "--verbose"]).is_err());
        assert!(CommandLineConfig::from_args(&["entgraph", "--db"]).is_err());
    }
}
