//! Entity store over one SQLite connection.
//!
//! [`EntityStore`] owns the connection, the schema registry and the edge
//! index. Every terminal query and every mutation runs inside exactly one
//! lock acquisition of the connection, so a query sees one consistent state
//! across all its hops and a write is visible to the next read of the same
//! caller. Mutations additionally run inside an immediate SQLite
//! transaction (see [`EntityStore::with_transaction`]).

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::{
    cache::{CacheStats, EdgeIndex},
    cancel::{self, CancelToken},
    config::{StoreConfig, open_store},
    entity::{Entity, FieldValues, Value},
    errors::{EntGraphError, Result},
    mutation::MutationExecutor,
    registry::{SchemaRegistry, TraversalDirection},
    schema::ensure_schema,
};

pub struct EntityStore {
    conn: Mutex<Connection>,
    registry: Arc<SchemaRegistry>,
    index: EdgeIndex,
    /// Last `PRAGMA data_version` seen; changes when another connection commits.
    data_version: AtomicI64,
}

impl EntityStore {
    pub fn open_in_memory(registry: Arc<SchemaRegistry>) -> Result<Self> {
        open_store(&StoreConfig::in_memory(), registry)
    }

    pub(crate) fn from_connection(
        conn: Connection,
        registry: Arc<SchemaRegistry>,
        cache_capacity: usize,
    ) -> Result<Self> {
        ensure_schema(&conn)?;
        conn.set_prepared_statement_cache_capacity(128);
        let index = EdgeIndex::new(
            registry.owning_edges().iter().map(|e| e.key.as_str()),
            cache_capacity,
        );
        let data_version = read_data_version(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry,
            index,
            data_version: AtomicI64::new(data_version),
        })
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Inserts a row with no edges and returns its id.
    pub fn insert(&self, entity_type: &str, fields: FieldValues) -> Result<i64> {
        MutationExecutor::new(self)
            .create(entity_type, fields, Vec::new())
            .map(|entity| entity.id)
    }

    pub fn get(&self, entity_type: &str, id: i64) -> Result<Entity> {
        self.registry.describe(entity_type)?;
        self.read(|session| session.load(entity_type, id))
    }

    /// Deletes a row together with every edge membership it takes part in.
    pub fn delete(&self, entity_type: &str, id: i64) -> Result<()> {
        MutationExecutor::new(self).delete(entity_type, id)
    }

    pub fn count(&self, entity_type: &str) -> Result<usize> {
        self.registry.describe(entity_type)?;
        self.read(|session| session.count(entity_type))
    }

    /// Ids of every `entity_type` row in insertion order.
    pub fn ids(&self, entity_type: &str) -> Result<Vec<i64>> {
        self.registry.describe(entity_type)?;
        self.read(|session| session.ids(entity_type))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.index.stats()
    }

    /// Runs `f` against a read session holding the connection lock.
    ///
    /// The edge index is dropped first if another connection committed to
    /// the same database since the last read.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Session<'_>) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        let version = read_data_version(&conn)?;
        if self.data_version.swap(version, Ordering::AcqRel) != version {
            tracing::debug!(target: "entgraph", version, "external commit, edge index cleared");
            self.index.clear();
        }
        let session = Session {
            conn: &*conn,
            registry: &self.registry,
            index: Some(&self.index),
        };
        f(&session)
    }

    /// Runs `f` inside one immediate transaction.
    ///
    /// Commits when `f` returns `Ok`; any error, or an unwind out of `f`,
    /// rolls the transaction back when it is dropped. The edge index is
    /// cleared after every attempt, and sessions inside the transaction
    /// bypass it, so cached adjacency only ever holds committed rows.
    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Session<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(EntGraphError::from_sqlite)?;
        let result = {
            let session = Session {
                conn: &*tx,
                registry: &self.registry,
                index: None,
            };
            f(&session)
        };
        let outcome = match result {
            Ok(value) => tx
                .commit()
                .map(|_| value)
                .map_err(EntGraphError::from_sqlite),
            Err(err) => {
                drop(tx);
                tracing::warn!(target: "entgraph", error = %err, "transaction rolled back");
                Err(err)
            }
        };
        self.index.clear();
        outcome
    }
}

/// Row and edge primitives over a locked connection.
pub(crate) struct Session<'a> {
    conn: &'a Connection,
    registry: &'a SchemaRegistry,
    index: Option<&'a EdgeIndex>,
}

impl<'a> Session<'a> {
    pub(crate) fn conn(&self) -> &Connection {
        self.conn
    }

    pub(crate) fn registry(&self) -> &SchemaRegistry {
        self.registry
    }

    pub(crate) fn load(&self, entity_type: &str, id: i64) -> Result<Entity> {
        self.try_load(entity_type, id)?
            .ok_or_else(|| EntGraphError::not_found(format!("{entity_type} {id}")))
    }

    pub(crate) fn try_load(&self, entity_type: &str, id: i64) -> Result<Option<Entity>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data FROM ent_rows WHERE id=?1 AND entity_type=?2")
            .map_err(EntGraphError::from_sqlite)?;
        let data: Option<String> = stmt
            .query_row(params![id, entity_type], |row| row.get(0))
            .optional()
            .map_err(EntGraphError::from_sqlite)?;
        data.map(|data| decode_entity(entity_type, id, &data))
            .transpose()
    }

    /// Entity type of `id`, if the row exists.
    pub(crate) fn type_of(&self, id: i64) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT entity_type FROM ent_rows WHERE id=?1")
            .map_err(EntGraphError::from_sqlite)?;
        stmt.query_row(params![id], |row| row.get(0))
            .optional()
            .map_err(EntGraphError::from_sqlite)
    }

    /// Every row of `entity_type` in insertion order.
    pub(crate) fn scan(
        &self,
        entity_type: &str,
        token: Option<&CancelToken>,
    ) -> Result<Vec<Entity>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, data FROM ent_rows WHERE entity_type=?1 ORDER BY id")
            .map_err(EntGraphError::from_sqlite)?;
        let rows = stmt
            .query_map(params![entity_type], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(EntGraphError::from_sqlite)?;
        let mut entities = Vec::new();
        for row in rows {
            cancel::check(token)?;
            let (id, data) = row.map_err(EntGraphError::from_sqlite)?;
            entities.push(decode_entity(entity_type, id, &data)?);
        }
        Ok(entities)
    }

    /// Rows of `entity_type` among `ids`, in insertion order. Missing ids are skipped.
    pub(crate) fn load_many(
        &self,
        entity_type: &str,
        ids: &[i64],
        token: Option<&CancelToken>,
    ) -> Result<Vec<Entity>> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut entities = Vec::with_capacity(sorted.len());
        for id in sorted {
            cancel::check(token)?;
            if let Some(entity) = self.try_load(entity_type, id)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    pub(crate) fn count(&self, entity_type: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM ent_rows WHERE entity_type=?1",
                params![entity_type],
                |row| row.get(0),
            )
            .map_err(EntGraphError::from_sqlite)?;
        Ok(count as usize)
    }

    pub(crate) fn ids(&self, entity_type: &str) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM ent_rows WHERE entity_type=?1 ORDER BY id")
            .map_err(EntGraphError::from_sqlite)?;
        let rows = stmt
            .query_map(params![entity_type], |row| row.get::<_, i64>(0))
            .map_err(EntGraphError::from_sqlite)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(EntGraphError::from_sqlite)
    }

    pub(crate) fn insert_row(&self, entity_type: &str, fields: &FieldValues) -> Result<i64> {
        let data = encode_fields(fields)?;
        self.conn
            .prepare_cached("INSERT INTO ent_rows(entity_type, data) VALUES(?1, ?2)")
            .and_then(|mut stmt| stmt.execute(params![entity_type, data]))
            .map_err(EntGraphError::from_sqlite)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn update_row(&self, id: i64, fields: &FieldValues) -> Result<()> {
        let data = encode_fields(fields)?;
        let affected = self
            .conn
            .execute(
                "UPDATE ent_rows SET data=?1 WHERE id=?2",
                params![data, id],
            )
            .map_err(EntGraphError::from_sqlite)?;
        if affected == 0 {
            return Err(EntGraphError::not_found(format!("entity {id}")));
        }
        Ok(())
    }

    pub(crate) fn delete_row(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM ent_rows WHERE id=?1", params![id])
            .map_err(EntGraphError::from_sqlite)?;
        Ok(affected > 0)
    }

    /// Related ids of `id` over the stored edge `key`, read in `direction`.
    pub(crate) fn neighbors(
        &self,
        key: &str,
        direction: TraversalDirection,
        id: i64,
    ) -> Result<Vec<i64>> {
        let cache = self.index.and_then(|index| match direction {
            TraversalDirection::Outgoing => index.outgoing(key),
            TraversalDirection::Incoming => index.incoming(key),
        });
        if let Some(cached) = cache.and_then(|c| c.get(id)) {
            return Ok(cached);
        }
        let sql = match direction {
            TraversalDirection::Outgoing => {
                "SELECT to_id FROM ent_edges WHERE edge_type=?1 AND from_id=?2 ORDER BY to_id"
            }
            TraversalDirection::Incoming => {
                "SELECT from_id FROM ent_edges WHERE edge_type=?1 AND to_id=?2 ORDER BY from_id"
            }
        };
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(EntGraphError::from_sqlite)?;
        let rows = stmt
            .query_map(params![key, id], |row| row.get(0))
            .map_err(EntGraphError::from_sqlite)?;
        let mut result = Vec::new();
        for item in rows {
            result.push(item.map_err(EntGraphError::from_sqlite)?);
        }
        if let (Some(index), Some(cache)) = (self.index, cache) {
            if index.has_room(cache.len()) {
                cache.insert(id, result.clone());
            }
        }
        Ok(result)
    }

    pub(crate) fn insert_edge(&self, key: &str, from: i64, to: i64) -> Result<bool> {
        let affected = self
            .conn
            .prepare_cached(
                "INSERT OR IGNORE INTO ent_edges(edge_type, from_id, to_id) VALUES(?1, ?2, ?3)",
            )
            .and_then(|mut stmt| stmt.execute(params![key, from, to]))
            .map_err(EntGraphError::from_sqlite)?;
        Ok(affected > 0)
    }

    pub(crate) fn delete_edge(&self, key: &str, from: i64, to: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM ent_edges WHERE edge_type=?1 AND from_id=?2 AND to_id=?3",
                params![key, from, to],
            )
            .map_err(EntGraphError::from_sqlite)?;
        Ok(affected > 0)
    }

    /// Removes every membership row of `key` touching `id` from the given side.
    pub(crate) fn clear_edge(
        &self,
        key: &str,
        direction: TraversalDirection,
        id: i64,
    ) -> Result<usize> {
        let sql = match direction {
            TraversalDirection::Outgoing => "DELETE FROM ent_edges WHERE edge_type=?1 AND from_id=?2",
            TraversalDirection::Incoming => "DELETE FROM ent_edges WHERE edge_type=?1 AND to_id=?2",
        };
        self.conn
            .execute(sql, params![key, id])
            .map_err(EntGraphError::from_sqlite)
    }

    /// Removes every membership row of any edge that references `id`.
    pub(crate) fn delete_edges_of(&self, id: i64) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM ent_edges WHERE from_id=?1 OR to_id=?1",
                params![id],
            )
            .map_err(EntGraphError::from_sqlite)
    }
}

fn read_data_version(conn: &Connection) -> Result<i64> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
        .map_err(EntGraphError::from_sqlite)
}

fn encode_fields(fields: &FieldValues) -> Result<String> {
    serde_json::to_string(fields).map_err(|e| EntGraphError::store(format!("encode: {e}")))
}

fn decode_entity(entity_type: &str, id: i64, data: &str) -> Result<Entity> {
    let fields: BTreeMap<String, Value> = serde_json::from_str(data)
        .map_err(|e| EntGraphError::store(format!("corrupt row {entity_type} {id}: {e}")))?;
    Ok(Entity {
        id,
        entity_type: entity_type.to_string(),
        fields,
        edges: BTreeMap::new(),
    })
}
