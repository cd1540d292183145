//! Shared types for the balance module service and its RPC clients.

use serde::{Deserialize, Serialize};

// =====================================================
// RPC Request Types
// =====================================================

/// Begin a focus session
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub intention: Option<String>,
    #[serde(default)]
    pub priority_id: Option<i64>,
    /// Defaults to the configured session length
    #[serde(default)]
    pub planned_minutes: Option<i64>,
}

/// Take a manual break
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StartBreakRequest {
    /// Defaults to the configured short break
    #[serde(default)]
    pub minutes: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePriorityRequest {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// `?days=N` window for history and drift
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WindowQuery {
    #[serde(default)]
    pub days: Option<i64>,
}

// =====================================================
// RPC Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// =====================================================
// Domain Types
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Active,
    Break,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Active => "active",
            Mode::Break => "break",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Mode::Active),
            "break" => Some(Mode::Break),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

/// A focus session. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub intention: Option<String>,
    pub priority_id: Option<i64>,
    pub started_at: String,
    pub planned_minutes: i64,
    pub ended_at: Option<String>,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Priority {
    pub id: i64,
    pub name: String,
    pub weight: f64,
    pub active: bool,
}

/// Current position in the work/break rhythm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RhythmState {
    pub mode: Mode,
    /// Set while on break
    pub break_until: Option<String>,
    pub current_session: Option<Session>,
    pub completed_today: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityDrift {
    pub priority_id: i64,
    pub name: String,
    pub weight: f64,
    pub minutes: i64,
    pub expected_share: f64,
    pub actual_share: f64,
    /// actual_share - expected_share
    pub drift: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub window_days: i64,
    pub priorities: Vec<PriorityDrift>,
    pub assigned_minutes: i64,
    pub unassigned_minutes: i64,
}

/// Service health status
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub mode: Mode,
    pub sessions_total: i64,
    pub priorities: i64,
}
