use chrono::{DateTime, Utc};
use serde::Serialize;

/// An indexed note row
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    /// File stem; this is what `[[id]]` links resolve against
    pub id: String,
    /// Path relative to the notes directory
    pub path: String,
    pub title: String,
    pub tags: Vec<String>,
    pub word_count: i64,
    pub modified: Option<DateTime<Utc>>,
    pub indexed_at: DateTime<Utc>,
}

/// A note as produced by the scanner, before it is written to the index
#[derive(Debug, Clone)]
pub struct ScannedNote {
    pub id: String,
    pub path: String,
    pub title: String,
    pub tags: Vec<String>,
    pub word_count: i64,
    pub modified: Option<DateTime<Utc>>,
    /// Outgoing link targets in order of first appearance, self-links removed
    pub links: Vec<String>,
}

/// Note listing entry with link counts
#[derive(Debug, Clone, Serialize)]
pub struct NoteSummary {
    pub id: String,
    pub title: String,
    pub outgoing_count: i64,
    pub incoming_count: i64,
}

/// One end of a link, as shown next to a note
#[derive(Debug, Clone, Serialize)]
pub struct LinkRef {
    pub id: String,
    pub title: Option<String>,
    /// False when the link target has no note file
    pub exists: bool,
}

/// Full note view: row, fresh body from disk, and both link directions
#[derive(Debug, Clone, Serialize)]
pub struct NoteDetail {
    #[serde(flatten)]
    pub note: Note,
    pub body: String,
    pub links: Vec<LinkRef>,
    pub backlinks: Vec<LinkRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    pub source_id: String,
    pub target_id: String,
}

/// Result of a full rescan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub notes_indexed: usize,
    pub links_indexed: usize,
    pub broken_links: usize,
    pub skipped_files: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub notes: i64,
    pub links: i64,
    pub entry_points: i64,
    pub orphans: i64,
    pub broken_links: i64,
    pub last_scan_at: Option<DateTime<Utc>>,
}
