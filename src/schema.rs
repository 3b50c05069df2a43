use rusqlite::Connection;

use crate::errors::{EntGraphError, Result};

/// Creates the row and edge tables if they are missing.
///
/// Rows of every entity type share `ent_rows`, so identifiers are unique
/// across types. Each related pair is stored once in `ent_edges` under the
/// owning edge's key; inverse edges read the same rows backwards.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS ent_rows (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            data        TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS ent_edges (
            edge_type TEXT NOT NULL,
            from_id   INTEGER NOT NULL,
            to_id     INTEGER NOT NULL,
            PRIMARY KEY (edge_type, from_id, to_id)
        );
        CREATE INDEX IF NOT EXISTS idx_rows_type ON ent_rows(entity_type, id);
        CREATE INDEX IF NOT EXISTS idx_edges_to ON ent_edges(edge_type, to_id);
        CREATE INDEX IF NOT EXISTS idx_edges_from_any ON ent_edges(from_id);
        CREATE INDEX IF NOT EXISTS idx_edges_to_any ON ent_edges(to_id);
        "#,
    )
    .map_err(|e| EntGraphError::store(format!("schema: {e}")))?;
    Ok(())
}
