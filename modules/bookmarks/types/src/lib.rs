//! Shared types for the bookmarks module service and its RPC clients.

use serde::{Deserialize, Serialize};

// =====================================================
// RPC Request Types
// =====================================================

/// Save a URL
#[derive(Debug, Serialize, Deserialize)]
pub struct AddBookmarkRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Pinned bookmarks never expire
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListBookmarksQuery {
    /// Also return unpinned bookmarks past their expiry that the sweep has not removed yet
    #[serde(default)]
    pub include_expired: bool,
}

/// Subscribe to an RSS or Atom feed
#[derive(Debug, Serialize, Deserialize)]
pub struct AddFeedRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
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

/// A saved URL. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// `manual` or `feed:<feed_id>`
    pub source: String,
    pub pinned: bool,
    pub created_at: String,
    /// None while pinned
    pub expires_at: Option<String>,
}

/// Result of an add: the row, and whether it was newly created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBookmarkResult {
    pub bookmark: Bookmark,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub last_polled_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub deleted: usize,
}

/// Outcome of polling one feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPollResult {
    pub feed_id: i64,
    pub items_seen: usize,
    pub bookmarks_added: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Service health status
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub bookmarks: i64,
    pub pinned: i64,
    pub feeds: i64,
    pub expiry_days: i64,
}
