//! NoteIndex: rebuilds the notes/links tables from the notes directory and
//! serves the operations that need both the index and the files.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::{file_ops, frontmatter};
use crate::db::Database;
use crate::models::{NoteDetail, ScanReport, ScannedNote};

pub struct NoteIndex {
    notes_dir: PathBuf,
    db: Arc<Database>,
}

impl NoteIndex {
    pub fn new(notes_dir: PathBuf, db: Arc<Database>) -> Self {
        Self { notes_dir, db }
    }

    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }

    /// Read every note file and replace the index with what was found.
    ///
    /// Idempotent: rescanning an unchanged directory yields identical tables
    /// (apart from `indexed_at`).
    pub fn rescan(&self) -> Result<ScanReport, String> {
        let started = Instant::now();
        let (notes, skipped_files) = self.scan_files()?;

        let known: HashSet<&str> = notes.iter().map(|n| n.id.as_str()).collect();
        let broken_links = notes
            .iter()
            .flat_map(|n| n.links.iter())
            .filter(|target| !known.contains(target.as_str()))
            .count();

        let links_indexed = self
            .db
            .replace_index(&notes)
            .map_err(|e| format!("Failed to write index: {}", e))?;

        let report = ScanReport {
            notes_indexed: notes.len(),
            links_indexed,
            broken_links,
            skipped_files,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        log::info!(
            "[KASTEN] Indexed {} notes, {} links ({} broken, {} files skipped) in {}ms",
            report.notes_indexed,
            report.links_indexed,
            report.broken_links,
            report.skipped_files,
            report.duration_ms
        );
        Ok(report)
    }

    fn scan_files(&self) -> Result<(Vec<ScannedNote>, usize), String> {
        let files = file_ops::list_notes(&self.notes_dir)
            .map_err(|e| format!("Failed to list notes in {:?}: {}", self.notes_dir, e))?;

        let mut notes: Vec<ScannedNote> = Vec::with_capacity(files.len());
        let mut seen: HashSet<String> = HashSet::new();
        let mut skipped = 0;

        for path in files {
            let (Some(id), Some(rel_path)) = (
                file_ops::note_id(&path),
                file_ops::relative_path(&self.notes_dir, &path),
            ) else {
                skipped += 1;
                continue;
            };

            // Sorted walk: the first file with a given stem owns the id, even if unreadable
            if !seen.insert(id.clone()) {
                log::warn!("[KASTEN] Duplicate note id '{}' at {}, skipping", id, rel_path);
                skipped += 1;
                continue;
            }

            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("[KASTEN] Skipping unreadable note {}: {}", rel_path, e);
                    skipped += 1;
                    continue;
                }
            };

            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);

            let parsed = frontmatter::parse_note(&content);
            let links = parsed.links.iter().filter(|t| **t != id).cloned().collect();

            notes.push(ScannedNote {
                title: parsed.title_or(&id),
                tags: parsed.all_tags.clone(),
                word_count: parsed.word_count() as i64,
                modified,
                links,
                path: rel_path,
                id,
            });
        }

        Ok((notes, skipped))
    }

    /// Note row, body read fresh from disk, outgoing links and backlinks.
    ///
    /// `Ok(None)` when the id is not indexed or its file was removed after
    /// the last scan.
    pub fn note_detail(&self, id: &str) -> Result<Option<NoteDetail>, String> {
        let note = match self.db.get_note(id).map_err(|e| e.to_string())? {
            Some(n) => n,
            None => return Ok(None),
        };

        let Some(raw) = file_ops::read_contained(&self.notes_dir, &note.path)? else {
            log::warn!("[KASTEN] Note '{}' is indexed but {} is gone", id, note.path);
            return Ok(None);
        };
        let body = frontmatter::parse_note(&raw).body;
        let links = self.db.forward_links(id).map_err(|e| e.to_string())?;
        let backlinks = self.db.backlinks(id).map_err(|e| e.to_string())?;

        Ok(Some(NoteDetail {
            note,
            body,
            links,
            backlinks,
        }))
    }

    /// A uniformly random note id, or None when nothing is indexed
    pub fn random_note(&self) -> Result<Option<String>, String> {
        let ids = self.db.note_ids().map_err(|e| e.to_string())?;
        Ok(ids.choose(&mut rand::thread_rng()).cloned())
    }
}
