//! SQLite-backed graph store.
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, which is exactly the
//! contract the worker needs: the store moves onto the worker thread once and
//! is never shared.

use crate::store::{GraphError, GraphResult, GraphStore};
use crate::types::{EdgeRecord, NodeRecord, Page, validate_key};
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;

/// Graph store persisted in a single SQLite file.
pub struct SqliteGraph {
    db: Connection,
}

impl SqliteGraph {
    /// Open (or create) the graph database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let db = Connection::open(path).context("Failed to open SQLite database")?;
        let graph = Self { db };
        graph.init_schema()?;

        log::debug!("Opened graph database at {}", path.display());
        Ok(graph)
    }

    /// Open a throwaway in-memory graph.
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let graph = Self { db };
        graph.init_schema()?;
        Ok(graph)
    }

    /// Initialize SQLite schema.
    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS nodes (
                    idx INTEGER PRIMARY KEY AUTOINCREMENT,
                    key TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS edges (
                    idx INTEGER PRIMARY KEY AUTOINCREMENT,
                    source TEXT NOT NULL,
                    target TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE (source, target)
                );
                CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
            "#,
            )
            .context("Failed to initialize schema")?;

        Ok(())
    }

    fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<NodeRecord> {
        let index: i64 = row.get(1)?;
        let created_at: String = row.get(2)?;
        Ok(NodeRecord {
            key: row.get(0)?,
            index: index as u64,
            created_at: parse_timestamp(2, &created_at)?,
        })
    }

    fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<EdgeRecord> {
        let index: i64 = row.get(2)?;
        let created_at: String = row.get(3)?;
        Ok(EdgeRecord {
            source: row.get(0)?,
            target: row.get(1)?,
            index: index as u64,
            created_at: parse_timestamp(3, &created_at)?,
        })
    }

    /// Fail with `NodeNotFound` unless `key` is present.
    fn require_node(&self, key: &str) -> GraphResult<()> {
        if node_exists(&self.db, key)? {
            Ok(())
        } else {
            Err(GraphError::NodeNotFound(key.to_string()))
        }
    }

    /// Replace every edge on one side of `key`. `outgoing` selects whether
    /// `key` is the source (neighbors) or the target (predecessors).
    fn replace_adjacency(&mut self, key: &str, nodes: &[String], outgoing: bool) -> GraphResult<()> {
        check_key(key)?;
        for node in nodes {
            check_key(node)?;
        }

        let tx = self.db.transaction()?;
        insert_node(&tx, key)?;
        let clear = if outgoing {
            "DELETE FROM edges WHERE source = ?"
        } else {
            "DELETE FROM edges WHERE target = ?"
        };
        tx.execute(clear, params![key])?;

        for node in nodes {
            insert_node(&tx, node)?;
            if outgoing {
                insert_edge(&tx, key, node)?;
            } else {
                insert_edge(&tx, node, key)?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    fn adjacent(&self, key: &str, outgoing: bool) -> GraphResult<Vec<String>> {
        check_key(key)?;
        self.require_node(key)?;

        let sql = if outgoing {
            "SELECT target FROM edges WHERE source = ? ORDER BY idx"
        } else {
            "SELECT source FROM edges WHERE target = ? ORDER BY idx"
        };
        let mut stmt = self.db.prepare(sql)?;
        let keys = stmt
            .query_map(params![key], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}

impl GraphStore for SqliteGraph {
    fn node(&self, key: &str) -> GraphResult<NodeRecord> {
        check_key(key)?;
        self.db
            .query_row(
                "SELECT key, idx, created_at FROM nodes WHERE key = ?",
                params![key],
                Self::row_to_node,
            )
            .optional()?
            .ok_or_else(|| GraphError::NodeNotFound(key.to_string()))
    }

    fn add_node(&mut self, key: &str) -> GraphResult<bool> {
        check_key(key)?;
        insert_node(&self.db, key)
    }

    fn remove_node(&mut self, key: &str) -> GraphResult<()> {
        check_key(key)?;
        self.require_node(key)?;

        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM edges WHERE source = ?1 OR target = ?1", params![key])?;
        tx.execute("DELETE FROM nodes WHERE key = ?", params![key])?;
        tx.commit()?;

        Ok(())
    }

    fn edge(&self, source: &str, target: &str) -> GraphResult<EdgeRecord> {
        check_key(source)?;
        check_key(target)?;
        self.require_node(source)?;
        self.require_node(target)?;

        self.db
            .query_row(
                "SELECT source, target, idx, created_at FROM edges WHERE source = ? AND target = ?",
                params![source, target],
                Self::row_to_edge,
            )
            .optional()?
            .ok_or_else(|| GraphError::EdgeNotFound {
                source: source.to_string(),
                target: target.to_string(),
            })
    }

    fn add_edge(&mut self, source: &str, target: &str) -> GraphResult<bool> {
        check_key(source)?;
        check_key(target)?;

        let tx = self.db.transaction()?;
        insert_node(&tx, source)?;
        insert_node(&tx, target)?;
        let created = insert_edge(&tx, source, target)?;
        tx.commit()?;

        Ok(created)
    }

    fn remove_edge(&mut self, source: &str, target: &str) -> GraphResult<()> {
        check_key(source)?;
        check_key(target)?;
        self.require_node(source)?;
        self.require_node(target)?;

        let removed = self.db.execute(
            "DELETE FROM edges WHERE source = ? AND target = ?",
            params![source, target],
        )?;
        if removed == 0 {
            return Err(GraphError::EdgeNotFound {
                source: source.to_string(),
                target: target.to_string(),
            });
        }

        Ok(())
    }

    fn batch_nodes(&self, size: usize, cursor: u64) -> GraphResult<Page<NodeRecord>> {
        let mut stmt = self
            .db
            .prepare("SELECT key, idx, created_at FROM nodes WHERE idx > ? ORDER BY idx LIMIT ?")?;
        let nodes = stmt
            .query_map(params![sql_int(cursor), sql_int(size as u64)], Self::row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page::from_items(nodes, size, |n| n.index))
    }

    fn batch_edges(&self, size: usize, cursor: u64) -> GraphResult<Page<EdgeRecord>> {
        let mut stmt = self.db.prepare(
            "SELECT source, target, idx, created_at FROM edges WHERE idx > ? ORDER BY idx LIMIT ?",
        )?;
        let edges = stmt
            .query_map(params![sql_int(cursor), sql_int(size as u64)], Self::row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page::from_items(edges, size, |e| e.index))
    }

    fn neighbors(&self, key: &str) -> GraphResult<Vec<String>> {
        self.adjacent(key, true)
    }

    fn set_neighbors(&mut self, key: &str, nodes: &[String]) -> GraphResult<()> {
        self.replace_adjacency(key, nodes, true)
    }

    fn predecessors(&self, key: &str) -> GraphResult<Vec<String>> {
        self.adjacent(key, false)
    }

    fn set_predecessors(&mut self, key: &str, nodes: &[String]) -> GraphResult<()> {
        self.replace_adjacency(key, nodes, false)
    }

    fn node_count(&self) -> GraphResult<u64> {
        let count: i64 = self.db.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn edge_count(&self) -> GraphResult<u64> {
        let count: i64 = self.db.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn check_key(key: &str) -> GraphResult<()> {
    validate_key(key).map_err(|reason| GraphError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}

fn node_exists(db: &Connection, key: &str) -> GraphResult<bool> {
    let found = db
        .query_row("SELECT 1 FROM nodes WHERE key = ?", params![key], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn insert_node(db: &Connection, key: &str) -> GraphResult<bool> {
    let inserted = db.execute(
        "INSERT OR IGNORE INTO nodes (key, created_at) VALUES (?, ?)",
        params![key, Utc::now().to_rfc3339()],
    )?;
    Ok(inserted > 0)
}

fn insert_edge(db: &Connection, source: &str, target: &str) -> GraphResult<bool> {
    let inserted = db.execute(
        "INSERT OR IGNORE INTO edges (source, target, created_at) VALUES (?, ?, ?)",
        params![source, target, Utc::now().to_rfc3339()],
    )?;
    Ok(inserted > 0)
}

fn parse_timestamp(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

/// Cursors and page sizes past `i64::MAX` saturate instead of wrapping.
fn sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
