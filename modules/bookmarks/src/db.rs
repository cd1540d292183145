//! SQLite storage for bookmarks, feeds, and seen feed items.
//!
//! Timestamps are stored as second-precision UTC RFC 3339 strings
//! (`2024-01-01T00:00:00Z`), so string comparison in SQL is chronological.

use bookmarks_types::{Bookmark, Feed};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::Mutex;

pub struct Db {
    conn: Mutex<Connection>,
    expiry: Duration,
}

pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Accept only absolute http(s) URLs; returns the normalized form
pub fn normalize_url(raw: &str) -> Result<String, String> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| format!("Invalid URL '{}': {}", raw, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(format!("Unsupported URL scheme '{}'", other)),
    }
}

const BOOKMARK_COLUMNS: &str =
    "id, url, title, description, source, pinned, created_at, expires_at";

fn row_to_bookmark(row: &Row) -> SqliteResult<Bookmark> {
    Ok(Bookmark {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        source: row.get(4)?,
        pinned: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
        expires_at: row.get(7)?,
    })
}

fn row_to_feed(row: &Row) -> SqliteResult<Feed> {
    Ok(Feed {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        last_polled_at: row.get(3)?,
        last_error: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[allow(clippy::too_many_arguments)]
fn upsert_bookmark(
    conn: &Connection,
    expiry: Duration,
    url: &str,
    title: Option<&str>,
    description: Option<&str>,
    pinned: bool,
    source: &str,
    now: DateTime<Utc>,
) -> SqliteResult<(Bookmark, bool)> {
    let expires_at = ts(now + expiry);

    let existing: Option<i64> = conn
        .query_row("SELECT id FROM bookmarks WHERE url = ?1", params![url], |row| row.get(0))
        .optional()?;

    let (id, created) = match existing {
        Some(id) => {
            if pinned {
                conn.execute(
                    "UPDATE bookmarks SET pinned = 1, expires_at = NULL WHERE id = ?1",
                    params![id],
                )?;
            } else {
                conn.execute(
                    "UPDATE bookmarks SET expires_at = ?1 WHERE id = ?2 AND pinned = 0",
                    params![expires_at, id],
                )?;
            }
            conn.execute(
                "UPDATE bookmarks SET title = COALESCE(title, ?1), description = COALESCE(description, ?2)
                 WHERE id = ?3",
                params![title, description, id],
            )?;
            (id, false)
        }
        None => {
            conn.execute(
                "INSERT INTO bookmarks (url, title, description, source, pinned, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    url,
                    title,
                    description,
                    source,
                    pinned as i64,
                    ts(now),
                    if pinned { None } else { Some(expires_at) },
                ],
            )?;
            (conn.last_insert_rowid(), true)
        }
    };

    let bookmark = conn.query_row(
        &format!("SELECT {} FROM bookmarks WHERE id = ?1", BOOKMARK_COLUMNS),
        params![id],
        row_to_bookmark,
    )?;
    Ok((bookmark, created))
}

impl Db {
    pub fn open(path: &str, expiry_days: i64) -> SqliteResult<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        Self::init(Connection::open(path)?, expiry_days)
    }

    pub fn open_in_memory(expiry_days: i64) -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?, expiry_days)
    }

    fn init(conn: Connection, expiry_days: i64) -> SqliteResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bookmarks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                title TEXT,
                description TEXT,
                source TEXT NOT NULL DEFAULT 'manual',
                pinned INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                expires_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_bookmarks_expiry ON bookmarks(pinned, expires_at);

            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                title TEXT,
                last_polled_at TEXT,
                last_error TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feed_items (
                feed_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                first_seen_at TEXT NOT NULL,
                PRIMARY KEY (feed_id, url)
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            expiry: Duration::days(expiry_days),
        })
    }

    pub fn expiry_days(&self) -> i64 {
        self.expiry.num_days()
    }

    // =====================================================
    // Bookmarks
    // =====================================================

    /// Insert a bookmark, or return the existing row for the same URL.
    ///
    /// An existing unpinned row gets its expiry pushed out; asking for
    /// `pinned` on an existing row pins it. Returns `(bookmark, created)`.
    pub fn add_bookmark(
        &self,
        url: &str,
        title: Option<&str>,
        description: Option<&str>,
        pinned: bool,
        source: &str,
        now: DateTime<Utc>,
    ) -> SqliteResult<(Bookmark, bool)> {
        let conn = self.conn.lock().unwrap();
        upsert_bookmark(&conn, self.expiry, url, title, description, pinned, source, now)
    }

    /// Record a feed item as seen and bookmark it, in one transaction.
    ///
    /// `Ok(None)` when the feed has seen this URL before. A failed insert
    /// leaves the item unseen so the next poll retries it.
    pub fn ingest_feed_item(
        &self,
        feed_id: i64,
        url: &str,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> SqliteResult<Option<(Bookmark, bool)>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let first_time = tx.execute(
            "INSERT OR IGNORE INTO feed_items (feed_id, url, first_seen_at) VALUES (?1, ?2, ?3)",
            params![feed_id, url, ts(now)],
        )? > 0;
        if !first_time {
            return Ok(None);
        }
        let source = format!("feed:{}", feed_id);
        let added = upsert_bookmark(&tx, self.expiry, url, title, None, false, &source, now)?;
        tx.commit()?;
        Ok(Some(added))
    }

    pub fn get_bookmark(&self, id: i64) -> SqliteResult<Option<Bookmark>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM bookmarks WHERE id = ?1", BOOKMARK_COLUMNS),
            params![id],
            row_to_bookmark,
        )
        .optional()
    }

    /// Pinned first, then newest first
    pub fn list_bookmarks(&self, include_expired: bool, now: DateTime<Utc>) -> SqliteResult<Vec<Bookmark>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bookmarks
             WHERE pinned = 1 OR ?1 = 1 OR expires_at IS NULL OR expires_at >= ?2
             ORDER BY pinned DESC, created_at DESC, id DESC",
            BOOKMARK_COLUMNS
        ))?;
        let rows = stmt.query_map(params![include_expired as i64, ts(now)], row_to_bookmark)?;
        rows.collect()
    }

    /// Pin a bookmark: it no longer expires
    pub fn pin_bookmark(&self, id: i64) -> SqliteResult<Option<Bookmark>> {
        let changed = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE bookmarks SET pinned = 1, expires_at = NULL WHERE id = ?1",
                params![id],
            )?
        };
        if changed == 0 {
            return Ok(None);
        }
        self.get_bookmark(id)
    }

    /// Unpin a bookmark: its expiry clock restarts from `now`
    pub fn unpin_bookmark(&self, id: i64, now: DateTime<Utc>) -> SqliteResult<Option<Bookmark>> {
        let changed = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE bookmarks SET pinned = 0, expires_at = ?1 WHERE id = ?2",
                params![ts(now + self.expiry), id],
            )?
        };
        if changed == 0 {
            return Ok(None);
        }
        self.get_bookmark(id)
    }

    pub fn delete_bookmark(&self, id: i64) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM bookmarks WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Delete unpinned bookmarks whose expiry has passed
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> SqliteResult<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM bookmarks WHERE pinned = 0 AND expires_at IS NOT NULL AND expires_at < ?1",
            params![ts(now)],
        )
    }

    /// (total, pinned, feeds)
    pub fn counts(&self) -> SqliteResult<(i64, i64, i64)> {
        let conn = self.conn.lock().unwrap();
        let total = conn.query_row("SELECT COUNT(*) FROM bookmarks", [], |r| r.get(0))?;
        let pinned = conn.query_row("SELECT COUNT(*) FROM bookmarks WHERE pinned = 1", [], |r| r.get(0))?;
        let feeds = conn.query_row("SELECT COUNT(*) FROM feeds", [], |r| r.get(0))?;
        Ok((total, pinned, feeds))
    }

    // =====================================================
    // Feeds
    // =====================================================

    pub fn add_feed(&self, url: &str, title: Option<&str>, now: DateTime<Utc>) -> SqliteResult<Feed> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO feeds (url, title, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET title = COALESCE(excluded.title, feeds.title)",
            params![url, title, ts(now)],
        )?;
        conn.query_row(
            "SELECT id, url, title, last_polled_at, last_error, created_at FROM feeds WHERE url = ?1",
            params![url],
            row_to_feed,
        )
    }

    pub fn list_feeds(&self) -> SqliteResult<Vec<Feed>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, url, title, last_polled_at, last_error, created_at FROM feeds ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_feed)?;
        rows.collect()
    }

    pub fn get_feed(&self, id: i64) -> SqliteResult<Option<Feed>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, url, title, last_polled_at, last_error, created_at FROM feeds WHERE id = ?1",
            params![id],
            row_to_feed,
        )
        .optional()
    }

    /// Remove a feed and its seen-item history. Bookmarks it created stay.
    pub fn delete_feed(&self, id: i64) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM feed_items WHERE feed_id = ?1", params![id])?;
        let rows = conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn record_poll(&self, feed_id: i64, now: DateTime<Utc>, error: Option<&str>) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE feeds SET last_polled_at = ?1, last_error = ?2 WHERE id = ?3",
            params![ts(now), error, feed_id],
        )?;
        Ok(())
    }
}
