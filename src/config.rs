//! Store configuration.
//!
//! A [`StoreConfig`] names the backing SQLite location and the few knobs the
//! store exposes. The connection itself is opened by [`open_store`].

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use rusqlite::Connection;

use crate::{
    errors::{EntGraphError, Result},
    registry::SchemaRegistry,
    store::EntityStore,
};

/// Where the backing database lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    /// Private in-memory database, dropped with the store.
    Memory,
    /// SQLite file, created if missing.
    Path(PathBuf),
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub location: StoreLocation,

    /// How long a writer waits for a locked database file before failing
    /// with `StoreUnavailable`.
    pub busy_timeout: Duration,

    /// Max cached ids per edge direction. Zero disables the edge cache.
    pub cache_capacity: usize,

    /// Extra `PRAGMA name = value` statements applied after opening.
    pub pragma_settings: HashMap<String, String>,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            busy_timeout: Duration::from_secs(5),
            cache_capacity: 4096,
            pragma_settings: HashMap::new(),
        }
    }

    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            location: StoreLocation::Path(path.as_ref().to_path_buf()),
            ..Self::in_memory()
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_pragma(mut self, name: &str, value: &str) -> Self {
        self.pragma_settings
            .insert(name.to_string(), value.to_string());
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Opens the configured connection and builds a store over `registry`.
pub fn open_store(cfg: &StoreConfig, registry: Arc<SchemaRegistry>) -> Result<EntityStore> {
    let conn = match &cfg.location {
        StoreLocation::Memory => Connection::open_in_memory(),
        StoreLocation::Path(path) => Connection::open(path),
    }
    .map_err(|e| EntGraphError::store(format!("open: {e}")))?;
    conn.busy_timeout(cfg.busy_timeout)
        .map_err(EntGraphError::from_sqlite)?;
    let mut pragmas: Vec<_> = cfg.pragma_settings.iter().collect();
    pragmas.sort();
    for (name, value) in pragmas {
        conn.pragma_update(None, name.as_str(), value.as_str())
            .map_err(|e| EntGraphError::store(format!("pragma {name}: {e}")))?;
    }
    EntityStore::from_connection(conn, registry, cfg.cache_capacity)
}
