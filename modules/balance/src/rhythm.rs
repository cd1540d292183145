//! The active/break rhythm.
//!
//! Two modes. Completing a session or taking a manual break moves to
//! `Break` with a `break_until` deadline; the deadline passing (checked
//! lazily on every read) or `end_break` moves back to `Active`. Sessions can
//! only start while `Active` and only one may run at a time.

use balance_types::*;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::Mutex;
use thiserror::Error;

use crate::db::{parse_ts, Db};

#[derive(Debug, Error)]
pub enum RhythmError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),
}

pub type RhythmResult<T> = Result<T, RhythmError>;

#[derive(Debug, Clone)]
pub struct RhythmConfig {
    pub session_minutes: i64,
    pub short_break_minutes: i64,
    pub long_break_minutes: i64,
    /// Every Nth completed session of the day earns the long break
    pub long_break_every: i64,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            session_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_every: 4,
        }
    }
}

pub struct Rhythm {
    db: Db,
    config: RhythmConfig,
    /// Held for every check-then-write transition
    transition: Mutex<()>,
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn minutes_after(now: DateTime<Utc>, minutes: i64) -> RhythmResult<DateTime<Utc>> {
    Duration::try_minutes(minutes)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| RhythmError::Invalid(format!("{} minutes is out of range", minutes)))
}

fn days_before(now: DateTime<Utc>, days: i64) -> RhythmResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|d| now.checked_sub_signed(d))
        .ok_or_else(|| RhythmError::Invalid(format!("{} days is out of range", days)))
}

impl Rhythm {
    pub fn new(db: Db, config: RhythmConfig) -> Self {
        Self {
            db,
            config,
            transition: Mutex::new(()),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Current mode, ending an elapsed break first
    fn current_mode(&self, now: DateTime<Utc>) -> RhythmResult<(Mode, Option<DateTime<Utc>>)> {
        let (mode, until) = self.db.get_mode()?;
        let until = until.as_deref().and_then(parse_ts);
        match (mode, until) {
            (Mode::Break, Some(t)) if now < t => Ok((Mode::Break, Some(t))),
            (Mode::Break, _) => {
                self.db.set_mode(Mode::Active, None)?;
                log::info!("[BALANCE] Break over, back to active");
                Ok((Mode::Active, None))
            }
            (Mode::Active, _) => Ok((Mode::Active, None)),
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> RhythmResult<RhythmState> {
        let (mode, until) = self.current_mode(now)?;
        Ok(RhythmState {
            mode,
            break_until: until.map(crate::db::ts),
            current_session: self.db.running_session()?,
            completed_today: self.db.count_completed_since(start_of_day(now))?,
        })
    }

    /// Seconds left on the current break, or None when active
    pub fn break_remaining(&self, now: DateTime<Utc>) -> RhythmResult<Option<i64>> {
        Ok(match self.current_mode(now)? {
            (Mode::Break, Some(until)) => Some((until - now).num_seconds().max(1)),
            _ => None,
        })
    }

    pub fn start_session(&self, req: &StartSessionRequest, now: DateTime<Utc>) -> RhythmResult<Session> {
        let _guard = self.transition.lock().unwrap();
        if let (Mode::Break, Some(until)) = self.current_mode(now)? {
            return Err(RhythmError::Conflict(format!(
                "On break until {}",
                crate::db::ts(until)
            )));
        }
        if let Some(running) = self.db.running_session()? {
            return Err(RhythmError::Conflict(format!("Session {} is already running", running.id)));
        }

        let planned = req.planned_minutes.unwrap_or(self.config.session_minutes);
        if planned <= 0 {
            return Err(RhythmError::Invalid("planned_minutes must be positive".to_string()));
        }
        minutes_after(now, planned)?;
        if let Some(pid) = req.priority_id {
            match self.db.get_priority(pid)? {
                Some(p) if p.active => {}
                Some(_) => return Err(RhythmError::Invalid(format!("Priority {} is archived", pid))),
                None => return Err(RhythmError::NotFound(format!("Priority {} not found", pid))),
            }
        }

        let intention = req.intention.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let session = self.db.insert_session(intention, req.priority_id, planned, now)?;
        log::info!("[BALANCE] Session {} started ({} min)", session.id, planned);
        Ok(session)
    }

    /// Complete the running session and start the earned break
    pub fn complete_session(&self, now: DateTime<Utc>) -> RhythmResult<RhythmState> {
        let _guard = self.transition.lock().unwrap();
        let running = self
            .db
            .running_session()?
            .ok_or_else(|| RhythmError::Conflict("No session is running".to_string()))?;
        self.db.finish_session(running.id, SessionStatus::Completed, now)?;

        let completed_today = self.db.count_completed_since(start_of_day(now))?;
        let every = self.config.long_break_every;
        let minutes = if every > 0 && completed_today > 0 && completed_today % every == 0 {
            self.config.long_break_minutes
        } else {
            self.config.short_break_minutes
        };
        self.db.set_mode(Mode::Break, Some(minutes_after(now, minutes)?))?;
        log::info!(
            "[BALANCE] Session {} completed ({} today), {} min break",
            running.id,
            completed_today,
            minutes
        );

        self.state(now)
    }

    /// Drop the running session; no break is earned
    pub fn abandon_session(&self, now: DateTime<Utc>) -> RhythmResult<Session> {
        let _guard = self.transition.lock().unwrap();
        let running = self
            .db
            .running_session()?
            .ok_or_else(|| RhythmError::Conflict("No session is running".to_string()))?;
        let session = self
            .db
            .finish_session(running.id, SessionStatus::Abandoned, now)?
            .ok_or_else(|| RhythmError::Conflict("No session is running".to_string()))?;
        log::info!("[BALANCE] Session {} abandoned", session.id);
        Ok(session)
    }

    pub fn take_break(&self, minutes: Option<i64>, now: DateTime<Utc>) -> RhythmResult<RhythmState> {
        let minutes = minutes.unwrap_or(self.config.short_break_minutes);
        if minutes <= 0 {
            return Err(RhythmError::Invalid("minutes must be positive".to_string()));
        }
        let until = minutes_after(now, minutes)?;
        let _guard = self.transition.lock().unwrap();
        if self.db.running_session()?.is_some() {
            return Err(RhythmError::Conflict(
                "Complete or abandon the running session first".to_string(),
            ));
        }
        self.db.set_mode(Mode::Break, Some(until))?;
        log::info!("[BALANCE] Manual break for {} min", minutes);
        self.state(now)
    }

    /// Skip the rest of the break. Already active is fine.
    pub fn end_break(&self, now: DateTime<Utc>) -> RhythmResult<RhythmState> {
        let _guard = self.transition.lock().unwrap();
        if let (Mode::Break, _) = self.current_mode(now)? {
            self.db.set_mode(Mode::Active, None)?;
            log::info!("[BALANCE] Break ended early");
        }
        self.state(now)
    }

    pub fn sessions(&self, days: i64, now: DateTime<Utc>) -> RhythmResult<Vec<Session>> {
        Ok(self.db.list_sessions(days_before(now, days.max(1))?)?)
    }

    pub fn create_priority(&self, req: &CreatePriorityRequest) -> RhythmResult<Priority> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(RhythmError::Invalid("name is required".to_string()));
        }
        if !(req.weight.is_finite() && req.weight > 0.0) {
            return Err(RhythmError::Invalid("weight must be a positive number".to_string()));
        }
        match self.db.create_priority(name, req.weight) {
            Ok(p) => Ok(p),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                Err(RhythmError::Conflict(format!("Priority '{}' already exists", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Time share per active priority against its weight share
    pub fn drift(&self, days: i64, now: DateTime<Utc>) -> RhythmResult<DriftReport> {
        let days = days.max(1);
        let since = days_before(now, days)?;
        let priorities = self.db.list_priorities(false)?;
        let sessions = self.db.list_sessions(since)?;

        let mut minutes_by_priority: std::collections::HashMap<i64, i64> = std::collections::HashMap::new();
        let mut unassigned_minutes = 0;
        for s in sessions.iter().filter(|s| s.status == SessionStatus::Completed) {
            let minutes = session_minutes(s);
            match s.priority_id {
                Some(pid) if priorities.iter().any(|p| p.id == pid) => {
                    *minutes_by_priority.entry(pid).or_default() += minutes;
                }
                _ => unassigned_minutes += minutes,
            }
        }

        let total_weight: f64 = priorities.iter().map(|p| p.weight).sum();
        let assigned_minutes: i64 = minutes_by_priority.values().sum();

        let report = priorities
            .into_iter()
            .map(|p| {
                let minutes = minutes_by_priority.get(&p.id).copied().unwrap_or(0);
                let expected_share = if total_weight > 0.0 { p.weight / total_weight } else { 0.0 };
                let actual_share = if assigned_minutes > 0 {
                    minutes as f64 / assigned_minutes as f64
                } else {
                    0.0
                };
                PriorityDrift {
                    priority_id: p.id,
                    name: p.name,
                    weight: p.weight,
                    minutes,
                    expected_share,
                    actual_share,
                    drift: actual_share - expected_share,
                }
            })
            .collect();

        Ok(DriftReport {
            window_days: days,
            priorities: report,
            assigned_minutes,
            unassigned_minutes,
        })
    }
}

/// Wall-clock minutes between start and end
fn session_minutes(s: &Session) -> i64 {
    match (parse_ts(&s.started_at), s.ended_at.as_deref().and_then(parse_ts)) {
        (Some(start), Some(end)) if end > start => (end - start).num_minutes(),
        _ => 0,
    }
}
