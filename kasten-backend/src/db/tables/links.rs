//! Link adjacency queries (forward links, backlinks, broken links)

use rusqlite::{params, Result as SqliteResult};

use super::super::Database;
use crate::models::{BrokenLink, LinkRef};

impl Database {
    /// Outgoing links of a note, in the order they appear in the file
    pub fn forward_links(&self, source_id: &str) -> SqliteResult<Vec<LinkRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT l.target_id, n.title
             FROM links l
             LEFT JOIN notes n ON n.id = l.target_id
             WHERE l.source_id = ?1
             ORDER BY l.position",
        )?;
        let rows = stmt.query_map(params![source_id], |row| {
            let title: Option<String> = row.get(1)?;
            Ok(LinkRef {
                id: row.get(0)?,
                exists: title.is_some(),
                title,
            })
        })?;
        rows.collect()
    }

    /// Notes that link to the given id. The target does not need to exist.
    pub fn backlinks(&self, target_id: &str) -> SqliteResult<Vec<LinkRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT l.source_id, n.title
             FROM links l
             JOIN notes n ON n.id = l.source_id
             WHERE l.target_id = ?1
             ORDER BY l.source_id",
        )?;
        let rows = stmt.query_map(params![target_id], |row| {
            Ok(LinkRef {
                id: row.get(0)?,
                title: Some(row.get(1)?),
                exists: true,
            })
        })?;
        rows.collect()
    }

    /// Links whose target has no note file
    pub fn broken_links(&self) -> SqliteResult<Vec<BrokenLink>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT l.source_id, l.target_id
             FROM links l
             LEFT JOIN notes n ON n.id = l.target_id
             WHERE n.id IS NULL
             ORDER BY l.source_id, l.target_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BrokenLink {
                source_id: row.get(0)?,
                target_id: row.get(1)?,
            })
        })?;
        rows.collect()
    }
}
