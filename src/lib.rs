//! Embedded entity-graph persistence on SQLite.
//!
//! Declare entity types and their edges in a [`SchemaRegistry`], open an
//! [`EntityStore`] (usually through a [`Client`]), then create, query,
//! traverse and delete entities with the typed builders.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod bench_utils;
pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod demo;
pub mod entity;
pub mod errors;
mod multi_hop;
pub mod mutation;
pub mod predicate;
pub mod query;
pub mod registry;
pub mod safety;
pub mod schema;
pub mod store;

pub use crate::cache::CacheStats;
pub use crate::cancel::CancelToken;
pub use crate::client::{Client, CommandLineConfig};
pub use crate::config::{StoreConfig, StoreLocation, open_store};
pub use crate::entity::{Entity, FieldKind, FieldValues, Value};
pub use crate::errors::{EntGraphError, Result};
pub use crate::mutation::{
    CreateBuilder, DeleteQuery, EdgeAssignment, MutationExecutor, UpdateBuilder, UpdateSpec,
};
pub use crate::predicate::Predicate;
pub use crate::query::{Direction, EntityQuery};
pub use crate::registry::{
    Cardinality, EdgeDef, EdgeRef, EntityType, FieldDef, RegistryBuilder, SchemaRegistry,
    Validator,
};
pub use crate::safety::{IntegrityReport, check_integrity};
pub use crate::store::EntityStore;
