//! File operations for the note collection: directory walk, id derivation,
//! and contained reads.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// List all markdown files under the notes directory, sorted by relative path.
///
/// Hidden files and hidden directories (`.git`, `.obsidian`, ...) are skipped.
pub fn list_notes(notes_dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !notes_dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(notes_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file()
            && entry.path().extension().map(|e| e == "md").unwrap_or(false)
        {
            files.push(entry.into_path());
        }
    }

    files.sort_by(|a, b| relative_key(notes_dir, a).cmp(&relative_key(notes_dir, b)));
    Ok(files)
}

fn relative_key(notes_dir: &Path, path: &Path) -> String {
    relative_path(notes_dir, path).unwrap_or_default()
}

/// Get relative path from notes_dir for a file, with `/` separators
pub fn relative_path(notes_dir: &Path, file_path: &Path) -> Option<String> {
    file_path.strip_prefix(notes_dir).ok().map(|p| {
        p.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    })
}

/// The note id is the file stem: `notes/2024/202401011200.md` -> `202401011200`
pub fn note_id(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
}

/// Read a note by its relative path, refusing paths that resolve outside the notes directory.
///
/// `Ok(None)` when the file has gone since the last scan.
pub fn read_contained(notes_dir: &Path, rel_path: &str) -> Result<Option<String>, String> {
    let canonical_notes = notes_dir
        .canonicalize()
        .map_err(|e| format!("Notes not accessible: {}", e))?;
    let canonical_path = match notes_dir.join(rel_path).canonicalize() {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(format!("Note file not accessible: {}: {}", rel_path, e)),
    };

    if !canonical_path.starts_with(&canonical_notes) {
        return Err("Access denied: path outside notes".to_string());
    }

    match fs::read_to_string(&canonical_path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("Failed to read note: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_notes_recursive_sorted_and_skips_hidden() {
        let dir = tempdir().unwrap();
        let notes_dir = dir.path();

        fs::write(notes_dir.join("b.md"), "content").unwrap();
        fs::write(notes_dir.join("a.md"), "content").unwrap();
        fs::write(notes_dir.join("readme.txt"), "not a note").unwrap();
        fs::create_dir(notes_dir.join("ideas")).unwrap();
        fs::write(notes_dir.join("ideas/c.md"), "content").unwrap();
        fs::create_dir(notes_dir.join(".obsidian")).unwrap();
        fs::write(notes_dir.join(".obsidian/hidden.md"), "content").unwrap();
        fs::write(notes_dir.join(".draft.md"), "content").unwrap();

        let files = list_notes(notes_dir).unwrap();
        let rel: Vec<String> = files
            .iter()
            .map(|f| relative_path(notes_dir, f).unwrap())
            .collect();
        assert_eq!(rel, vec!["a.md", "b.md", "ideas/c.md"]);
    }

    #[test]
    fn test_list_notes_missing_dir() {
        let dir = tempdir().unwrap();
        let files = list_notes(&dir.path().join("nope")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_note_id() {
        assert_eq!(note_id(Path::new("x/202401011200.md")).as_deref(), Some("202401011200"));
        assert_eq!(note_id(Path::new("zettel b.md")).as_deref(), Some("zettel b"));
    }

    #[test]
    fn test_read_contained_rejects_escape() {
        let dir = tempdir().unwrap();
        let notes_dir = dir.path().join("notes");
        fs::create_dir(&notes_dir).unwrap();
        fs::write(notes_dir.join("in.md"), "inside").unwrap();
        fs::write(dir.path().join("secret.md"), "outside").unwrap();

        assert_eq!(read_contained(&notes_dir, "in.md").unwrap().as_deref(), Some("inside"));
        let err = read_contained(&notes_dir, "../secret.md").unwrap_err();
        assert!(err.contains("Access denied"));
        assert!(read_contained(&notes_dir, "missing.md").unwrap().is_none());
    }
}
