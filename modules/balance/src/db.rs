//! SQLite storage for sessions, priorities, and the single rhythm row.

use balance_types::{Mode, Priority, Session, SessionStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::Mutex;

pub struct Db {
    conn: Mutex<Connection>,
}

pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

const SESSION_COLUMNS: &str =
    "id, intention, priority_id, started_at, planned_minutes, ended_at, status";

fn row_to_session(row: &Row) -> SqliteResult<Session> {
    let status: String = row.get(6)?;
    Ok(Session {
        id: row.get(0)?,
        intention: row.get(1)?,
        priority_id: row.get(2)?,
        started_at: row.get(3)?,
        planned_minutes: row.get(4)?,
        ended_at: row.get(5)?,
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Abandoned),
    })
}

fn row_to_priority(row: &Row) -> SqliteResult<Priority> {
    Ok(Priority {
        id: row.get(0)?,
        name: row.get(1)?,
        weight: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
    })
}

impl Db {
    pub fn open(path: &str) -> SqliteResult<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS priorities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                weight REAL NOT NULL CHECK (weight > 0),
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                intention TEXT,
                priority_id INTEGER REFERENCES priorities(id),
                started_at TEXT NOT NULL,
                planned_minutes INTEGER NOT NULL,
                ended_at TEXT,
                status TEXT NOT NULL DEFAULT 'running'
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);

            CREATE TABLE IF NOT EXISTS rhythm (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                mode TEXT NOT NULL DEFAULT 'active',
                break_until TEXT
            );
            INSERT OR IGNORE INTO rhythm (id, mode) VALUES (1, 'active');",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // =====================================================
    // Rhythm
    // =====================================================

    pub fn get_mode(&self) -> SqliteResult<(Mode, Option<String>)> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT mode, break_until FROM rhythm WHERE id = 1", [], |row| {
            let mode: String = row.get(0)?;
            Ok((Mode::parse(&mode).unwrap_or(Mode::Active), row.get(1)?))
        })
    }

    pub fn set_mode(&self, mode: Mode, break_until: Option<DateTime<Utc>>) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE rhythm SET mode = ?1, break_until = ?2 WHERE id = 1",
            params![mode.as_str(), break_until.map(ts)],
        )?;
        Ok(())
    }

    // =====================================================
    // Sessions
    // =====================================================

    pub fn insert_session(
        &self,
        intention: Option<&str>,
        priority_id: Option<i64>,
        planned_minutes: i64,
        now: DateTime<Utc>,
    ) -> SqliteResult<Session> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (intention, priority_id, started_at, planned_minutes, status)
             VALUES (?1, ?2, ?3, ?4, 'running')",
            params![intention, priority_id, ts(now), planned_minutes],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS),
            params![id],
            row_to_session,
        )
    }

    pub fn running_session(&self) -> SqliteResult<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM sessions WHERE status = 'running' ORDER BY id DESC LIMIT 1",
                SESSION_COLUMNS
            ),
            [],
            row_to_session,
        )
        .optional()
    }

    /// Close the running session with the given status
    pub fn finish_session(&self, id: i64, status: SessionStatus, now: DateTime<Utc>) -> SqliteResult<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions SET status = ?1, ended_at = ?2 WHERE id = ?3 AND status = 'running'",
            params![status.as_str(), ts(now), id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        conn.query_row(
            &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS),
            params![id],
            row_to_session,
        )
        .optional()
    }

    pub fn count_completed_since(&self, since: DateTime<Utc>) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE status = 'completed' AND ended_at >= ?1",
            params![ts(since)],
            |row| row.get(0),
        )
    }

    /// Sessions started at or after `since`, newest first
    pub fn list_sessions(&self, since: DateTime<Utc>) -> SqliteResult<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions WHERE started_at >= ?1 ORDER BY started_at DESC, id DESC",
            SESSION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![ts(since)], row_to_session)?;
        rows.collect()
    }

    // =====================================================
    // Priorities
    // =====================================================

    pub fn create_priority(&self, name: &str, weight: f64) -> SqliteResult<Priority> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO priorities (name, weight, active) VALUES (?1, ?2, 1)",
            params![name, weight],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT id, name, weight, active FROM priorities WHERE id = ?1",
            params![id],
            row_to_priority,
        )
    }

    pub fn get_priority(&self, id: i64) -> SqliteResult<Option<Priority>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, weight, active FROM priorities WHERE id = ?1",
            params![id],
            row_to_priority,
        )
        .optional()
    }

    pub fn list_priorities(&self, include_archived: bool) -> SqliteResult<Vec<Priority>> {
        let conn = self.conn.lock().unwrap();
        let sql = if include_archived {
            "SELECT id, name, weight, active FROM priorities ORDER BY active DESC, weight DESC, id"
        } else {
            "SELECT id, name, weight, active FROM priorities WHERE active = 1 ORDER BY weight DESC, id"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_priority)?;
        rows.collect()
    }

    pub fn archive_priority(&self, id: i64) -> SqliteResult<Option<Priority>> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute("UPDATE priorities SET active = 0 WHERE id = ?1", params![id])?;
        if updated == 0 {
            return Ok(None);
        }
        conn.query_row(
            "SELECT id, name, weight, active FROM priorities WHERE id = ?1",
            params![id],
            row_to_priority,
        )
        .optional()
    }

    /// (sessions, active priorities)
    pub fn counts(&self) -> SqliteResult<(i64, i64)> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT (SELECT COUNT(*) FROM sessions),
                    (SELECT COUNT(*) FROM priorities WHERE active = 1)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_rhythm_row_defaults_to_active() {
        let db = Db::open_in_memory().unwrap();
        assert_eq!(db.get_mode().unwrap(), (Mode::Active, None));

        let until = t0() + Duration::minutes(5);
        db.set_mode(Mode::Break, Some(until)).unwrap();
        assert_eq!(db.get_mode().unwrap(), (Mode::Break, Some(ts(until))));
    }

    #[test]
    fn test_finish_only_touches_running_session() {
        let db = Db::open_in_memory().unwrap();
        let s = db.insert_session(Some("write"), None, 25, t0()).unwrap();
        assert_eq!(db.running_session().unwrap().unwrap().id, s.id);

        let done = db
            .finish_session(s.id, SessionStatus::Completed, t0() + Duration::minutes(25))
            .unwrap()
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.ended_at.as_deref(), Some("2024-03-01T09:25:00Z"));
        assert!(db.running_session().unwrap().is_none());

        // Second finish is a no-op
        assert!(db.finish_session(s.id, SessionStatus::Abandoned, t0()).unwrap().is_none());
    }

    #[test]
    fn test_count_completed_since() {
        let db = Db::open_in_memory().unwrap();
        for i in 0..3 {
            let start = t0() + Duration::hours(i);
            let s = db.insert_session(None, None, 25, start).unwrap();
            let status = if i == 1 { SessionStatus::Abandoned } else { SessionStatus::Completed };
            db.finish_session(s.id, status, start + Duration::minutes(25)).unwrap();
        }
        assert_eq!(db.count_completed_since(t0()).unwrap(), 2);
        assert_eq!(db.count_completed_since(t0() + Duration::hours(2)).unwrap(), 1);
    }

    #[test]
    fn test_priorities_archive() {
        let db = Db::open_in_memory().unwrap();
        let a = db.create_priority("health", 2.0).unwrap();
        db.create_priority("work", 1.0).unwrap();

        let archived = db.archive_priority(a.id).unwrap().unwrap();
        assert!(!archived.active);
        assert_eq!(db.list_priorities(false).unwrap().len(), 1);
        assert_eq!(db.list_priorities(true).unwrap().len(), 2);
        assert!(db.archive_priority(999).unwrap().is_none());
    }

    #[test]
    fn test_non_positive_weight_rejected_by_schema() {
        let db = Db::open_in_memory().unwrap();
        assert!(db.create_priority("nothing", 0.0).is_err());
    }
}
