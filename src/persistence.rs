//! # Persistent Graph Store
//!
//! SQLite-backed graph storage. Nodes and edges live in two tables; every
//! batch runs inside a SQLite transaction, which rolls back when dropped
//! without commit.
//!
//! The spatial index is not persisted. Rebuild it from the committed nodes
//! with [`crate::NodeIndex::rebuild`] after opening a database.

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::engine::graph_store::reject_self_loop;
use crate::engine::{GraphStore, GraphTransaction};
use crate::error::{ConflationError, OptionExt, Result};
use crate::{Coordinate, Edge, EdgeKind, Node, NodeId, NodeStats};

/// Graph store persisted in a SQLite database.
pub struct SqliteGraphStore {
    db: Connection,
    db_path: String,
}

impl SqliteGraphStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) a store at the given database path.
    pub fn open(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self {
            db,
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Conflated sample points
            CREATE TABLE IF NOT EXISTS nodes (
                id INTEGER PRIMARY KEY,
                lon REAL NOT NULL,
                lat REAL NOT NULL,
                speed REAL NOT NULL,
                occurrences INTEGER NOT NULL CHECK (occurrences >= 1)
            );

            -- Directed "visited next" links
            CREATE TABLE IF NOT EXISTS edges (
                seq INTEGER PRIMARY KEY,
                from_node INTEGER NOT NULL REFERENCES nodes(id),
                to_node INTEGER NOT NULL REFERENCES nodes(id),
                kind TEXT NOT NULL,
                CHECK (from_node <> to_node)
            );

            CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_node);
            "#,
        )?;
        Ok(())
    }

    /// Sample-weighted mean speed over all nodes, if any.
    pub fn mean_speed(&self) -> Result<Option<f64>> {
        let mean: Option<f64> = self.db.query_row(
            "SELECT SUM(speed * occurrences) / SUM(occurrences) FROM nodes",
            [],
            |row| row.get(0),
        )?;
        Ok(mean)
    }
}

fn node_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    let id: i64 = row.get(0)?;
    let occurrences: i64 = row.get(4)?;
    Ok(Node {
        id: NodeId(id as u64),
        coordinate: Coordinate::new(row.get(1)?, row.get(2)?),
        stats: NodeStats {
            average_speed: row.get(3)?,
            sample_count: occurrences as u64,
        },
    })
}

fn parse_edge_kind(kind: &str) -> Result<EdgeKind> {
    match kind {
        "SEQUENCE" => Ok(EdgeKind::Sequence),
        other => Err(ConflationError::Store(format!(
            "unknown edge kind '{}'",
            other
        ))),
    }
}

impl GraphStore for SqliteGraphStore {
    type Tx<'a> = SqliteTransaction<'a>;

    fn begin(&mut self) -> Result<SqliteTransaction<'_>> {
        Ok(SqliteTransaction {
            tx: self.db.transaction()?,
        })
    }

    fn node_count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn edge_count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn nodes(&self) -> Result<Vec<Node>> {
        let mut stmt = self
            .db
            .prepare("SELECT id, lon, lat, speed, occurrences FROM nodes ORDER BY id")?;
        let nodes = stmt
            .query_map([], node_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    fn edges(&self) -> Result<Vec<Edge>> {
        let mut stmt = self
            .db
            .prepare("SELECT from_node, to_node, kind FROM edges ORDER BY seq")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(from, to, kind)| {
                Ok(Edge {
                    from: NodeId(from as u64),
                    to: NodeId(to as u64),
                    kind: parse_edge_kind(&kind)?,
                })
            })
            .collect()
    }
}

/// A SQLite transaction over a [`SqliteGraphStore`].
///
/// Dropping it without [`GraphTransaction::commit`] rolls back.
pub struct SqliteTransaction<'a> {
    tx: Transaction<'a>,
}

impl GraphTransaction for SqliteTransaction<'_> {
    fn create_node(&mut self, coordinate: Coordinate, stats: NodeStats) -> Result<NodeId> {
        self.tx.execute(
            "INSERT INTO nodes (lon, lat, speed, occurrences) VALUES (?1, ?2, ?3, ?4)",
            params![
                coordinate.longitude,
                coordinate.latitude,
                stats.average_speed,
                stats.sample_count as i64
            ],
        )?;
        Ok(NodeId(self.tx.last_insert_rowid() as u64))
    }

    fn node(&self, id: NodeId) -> Result<Node> {
        self.tx
            .query_row(
                "SELECT id, lon, lat, speed, occurrences FROM nodes WHERE id = ?1",
                params![id.0 as i64],
                node_from_row,
            )
            .optional()?
            .ok_or_unknown_node(id)
    }

    fn update_node_stats(&mut self, id: NodeId, stats: NodeStats) -> Result<()> {
        let updated = self.tx.execute(
            "UPDATE nodes SET speed = ?1, occurrences = ?2 WHERE id = ?3",
            params![stats.average_speed, stats.sample_count as i64, id.0 as i64],
        )?;
        if updated == 0 {
            return Err(ConflationError::UnknownNode(id));
        }
        Ok(())
    }

    fn create_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<()> {
        reject_self_loop(from, to)?;
        self.tx.execute(
            "INSERT INTO edges (from_node, to_node, kind) VALUES (?1, ?2, ?3)",
            params![from.0 as i64, to.0 as i64, kind.as_str()],
        )?;
        Ok(())
    }

    fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}
