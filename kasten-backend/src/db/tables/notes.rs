//! Note index operations: full replacement, listings, and the derived
//! entry-point / orphan queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Result as SqliteResult, Row};

use super::super::Database;
use crate::models::{IndexStats, Note, NoteSummary, ScannedNote};

const NOTE_COLUMNS: &str = "id, path, title, tags, word_count, modified, indexed_at";

const SUMMARY_SELECT: &str = "SELECT n.id, n.title,
        (SELECT COUNT(*) FROM links l WHERE l.source_id = n.id) AS outgoing,
        (SELECT COUNT(*) FROM links l WHERE l.target_id = n.id) AS incoming
     FROM notes n";

fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn split_tags(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn row_to_note(row: &Row) -> SqliteResult<Note> {
    let tags: String = row.get(3)?;
    let modified: Option<String> = row.get(5)?;
    let indexed_at: String = row.get(6)?;

    Ok(Note {
        id: row.get(0)?,
        path: row.get(1)?,
        title: row.get(2)?,
        tags: split_tags(&tags),
        word_count: row.get(4)?,
        modified: modified.as_deref().and_then(parse_ts),
        indexed_at: parse_ts(&indexed_at).unwrap_or_default(),
    })
}

/// Lowercased id and title, separated by a newline no query can contain
fn search_key(note: &ScannedNote) -> String {
    format!("{}\n{}", note.id, note.title).to_lowercase()
}

fn row_to_summary(row: &Row) -> SqliteResult<NoteSummary> {
    Ok(NoteSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        outgoing_count: row.get(2)?,
        incoming_count: row.get(3)?,
    })
}

impl Database {
    /// Replace the whole index with a freshly scanned note set.
    ///
    /// Runs in one transaction: readers see either the old index or the new
    /// one. Returns the number of link rows written.
    pub fn replace_index(&self, notes: &[ScannedNote]) -> SqliteResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM links", [])?;
        tx.execute("DELETE FROM notes", [])?;

        let mut link_count = 0;
        {
            let mut insert_note = tx.prepare(
                "INSERT INTO notes (id, path, title, tags, word_count, modified, indexed_at, search_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for note in notes {
                insert_note.execute(params![
                    note.id,
                    note.path,
                    note.title,
                    note.tags.join(", "),
                    note.word_count,
                    note.modified.map(|m| m.to_rfc3339()),
                    &now,
                    search_key(note),
                ])?;
            }

            let mut insert_link = tx.prepare(
                "INSERT OR IGNORE INTO links (source_id, target_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for note in notes {
                for (position, target) in note.links.iter().enumerate() {
                    if *target == note.id {
                        continue;
                    }
                    link_count += insert_link.execute(params![note.id, target, position as i64])?;
                }
            }
        }

        tx.execute(
            "INSERT INTO index_meta (key, value) VALUES ('last_scan_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![&now],
        )?;
        tx.commit()?;

        Ok(link_count)
    }

    /// Get a single note row by id
    pub fn get_note(&self, id: &str) -> SqliteResult<Option<Note>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM notes WHERE id = ?1", NOTE_COLUMNS),
            params![id],
            row_to_note,
        )
        .optional()
    }

    /// All notes with link counts, ordered by id
    pub fn list_notes(&self) -> SqliteResult<Vec<NoteSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{} ORDER BY n.id", SUMMARY_SELECT))?;
        let rows = stmt.query_map([], row_to_summary)?;
        rows.collect()
    }

    /// Case-insensitive substring match over id and title.
    ///
    /// SQLite's lower() only folds ASCII, so both sides are folded in Rust.
    pub fn search_notes(&self, query: &str) -> SqliteResult<Vec<NoteSummary>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.list_notes();
        }
        let pattern = format!(
            "%{}%",
            needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE n.search_key LIKE ?1 ESCAPE '\\' ORDER BY n.id",
            SUMMARY_SELECT
        ))?;
        let rows = stmt.query_map(params![pattern], row_to_summary)?;
        rows.collect()
    }

    /// Notes with at least one outgoing link and no incoming links.
    ///
    /// Outgoing links to missing notes still count; they are where the
    /// author meant to go next.
    pub fn entry_points(&self) -> SqliteResult<Vec<NoteSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE EXISTS (SELECT 1 FROM links l WHERE l.source_id = n.id)
               AND NOT EXISTS (SELECT 1 FROM links l WHERE l.target_id = n.id)
             ORDER BY n.id",
            SUMMARY_SELECT
        ))?;
        let rows = stmt.query_map([], row_to_summary)?;
        rows.collect()
    }

    /// Notes with neither outgoing nor incoming links
    pub fn orphans(&self) -> SqliteResult<Vec<NoteSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE NOT EXISTS (SELECT 1 FROM links l WHERE l.source_id = n.id)
               AND NOT EXISTS (SELECT 1 FROM links l WHERE l.target_id = n.id)
             ORDER BY n.id",
            SUMMARY_SELECT
        ))?;
        let rows = stmt.query_map([], row_to_summary)?;
        rows.collect()
    }

    /// All note ids (used for random selection)
    pub fn note_ids(&self) -> SqliteResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM notes ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect()
    }

    /// All tags with their note counts, most used first
    pub fn list_tags(&self) -> SqliteResult<Vec<(String, usize)>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare("SELECT tags FROM notes WHERE tags != ''")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut tag_counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for row in rows {
            for tag in split_tags(&row?) {
                *tag_counts.entry(tag.to_lowercase()).or_insert(0) += 1;
            }
        }

        let mut tags: Vec<(String, usize)> = tag_counts.into_iter().collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(tags)
    }

    pub fn index_stats(&self) -> SqliteResult<IndexStats> {
        let conn = self.conn.lock().unwrap();
        let count = |sql: &str| conn.query_row(sql, [], |row| row.get::<_, i64>(0));

        let notes = count("SELECT COUNT(*) FROM notes")?;
        let links = count("SELECT COUNT(*) FROM links")?;
        let entry_points = count(
            "SELECT COUNT(*) FROM notes n
             WHERE EXISTS (SELECT 1 FROM links l WHERE l.source_id = n.id)
               AND NOT EXISTS (SELECT 1 FROM links l WHERE l.target_id = n.id)",
        )?;
        let orphans = count(
            "SELECT COUNT(*) FROM notes n
             WHERE NOT EXISTS (SELECT 1 FROM links l WHERE l.source_id = n.id)
               AND NOT EXISTS (SELECT 1 FROM links l WHERE l.target_id = n.id)",
        )?;
        let broken_links = count(
            "SELECT COUNT(*) FROM links l LEFT JOIN notes n ON n.id = l.target_id WHERE n.id IS NULL",
        )?;
        let last_scan_at: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'last_scan_at'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(IndexStats {
            notes,
            links,
            entry_points,
            orphans,
            broken_links,
            last_scan_at: last_scan_at.as_deref().and_then(parse_ts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanned(id: &str, links: &[&str]) -> ScannedNote {
        ScannedNote {
            id: id.to_string(),
            path: format!("{}.md", id),
            title: format!("Title {}", id),
            tags: vec![],
            word_count: 3,
            modified: None,
            links: links.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn ids(notes: &[NoteSummary]) -> Vec<&str> {
        notes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_entry_points_have_outgoing_but_no_incoming() {
        let db = Database::open_in_memory().unwrap();
        db.replace_index(&[
            scanned("a", &["b", "c"]),
            scanned("b", &["c"]),
            scanned("c", &[]),
            scanned("d", &["missing"]),
            scanned("e", &[]),
        ])
        .unwrap();

        assert_eq!(ids(&db.entry_points().unwrap()), vec!["a", "d"]);
        assert_eq!(ids(&db.orphans().unwrap()), vec!["e"]);
    }

    #[test]
    fn test_self_links_are_dropped() {
        let db = Database::open_in_memory().unwrap();
        let written = db.replace_index(&[scanned("a", &["a", "b"]), scanned("b", &[])]).unwrap();
        assert_eq!(written, 1);

        // "a" only links to itself besides "b"; the self-link must not make it its own backlink
        assert_eq!(ids(&db.entry_points().unwrap()), vec!["a"]);
    }

    #[test]
    fn test_self_link_only_note_is_orphan() {
        let db = Database::open_in_memory().unwrap();
        db.replace_index(&[scanned("solo", &["solo"])]).unwrap();
        assert_eq!(ids(&db.orphans().unwrap()), vec!["solo"]);
        assert!(db.entry_points().unwrap().is_empty());
    }

    #[test]
    fn test_replace_index_is_full_replacement() {
        let db = Database::open_in_memory().unwrap();
        db.replace_index(&[scanned("old", &["x"])]).unwrap();
        db.replace_index(&[scanned("new", &[])]).unwrap();

        assert_eq!(db.note_ids().unwrap(), vec!["new"]);
        let stats = db.index_stats().unwrap();
        assert_eq!(stats.notes, 1);
        assert_eq!(stats.links, 0);
        assert!(stats.last_scan_at.is_some());
    }

    #[test]
    fn test_list_notes_counts() {
        let db = Database::open_in_memory().unwrap();
        db.replace_index(&[scanned("a", &["b"]), scanned("b", &["a"]), scanned("c", &["a"])])
            .unwrap();

        let notes = db.list_notes().unwrap();
        let a = notes.iter().find(|n| n.id == "a").unwrap();
        assert_eq!(a.outgoing_count, 1);
        assert_eq!(a.incoming_count, 2);
    }

    #[test]
    fn test_search_matches_id_and_title_case_insensitively() {
        let db = Database::open_in_memory().unwrap();
        let mut note = scanned("202401011200", &[]);
        note.title = "Spaced Repetition".to_string();
        db.replace_index(&[note, scanned("other", &[])]).unwrap();

        assert_eq!(ids(&db.search_notes("repetition").unwrap()), vec!["202401011200"]);
        assert_eq!(ids(&db.search_notes("2024").unwrap()), vec!["202401011200"]);
        assert!(db.search_notes("100%").unwrap().is_empty());
        assert_eq!(db.search_notes("  ").unwrap().len(), 2);
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let db = Database::open_in_memory().unwrap();
        let mut note = scanned("ärger", &[]);
        note.title = "Über Ärger und Öl".to_string();
        db.replace_index(&[note, scanned("other", &[])]).unwrap();

        assert_eq!(ids(&db.search_notes("über").unwrap()), vec!["ärger"]);
        assert_eq!(ids(&db.search_notes("ÄRGER").unwrap()), vec!["ärger"]);
        assert_eq!(ids(&db.search_notes("Öl").unwrap()), vec!["ärger"]);
    }

    #[test]
    fn test_list_tags_counts_case_insensitively() {
        let db = Database::open_in_memory().unwrap();
        let mut a = scanned("a", &[]);
        a.tags = vec!["Rust".to_string(), "notes".to_string()];
        let mut b = scanned("b", &[]);
        b.tags = vec!["rust".to_string()];
        db.replace_index(&[a, b]).unwrap();

        let tags = db.list_tags().unwrap();
        assert_eq!(tags[0], ("rust".to_string(), 2));
        assert_eq!(tags[1], ("notes".to_string(), 1));
    }

    #[test]
    fn test_get_note_round_trips_tags() {
        let db = Database::open_in_memory().unwrap();
        let mut a = scanned("a", &[]);
        a.tags = vec!["one".to_string(), "two".to_string()];
        db.replace_index(&[a]).unwrap();

        let note = db.get_note("a").unwrap().unwrap();
        assert_eq!(note.tags, vec!["one", "two"]);
        assert!(db.get_note("zzz").unwrap().is_none());
    }
}
