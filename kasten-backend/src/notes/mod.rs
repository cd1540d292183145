//! Zettelkasten note scanning: markdown files linked via `[[id]]`.
//!
//! The directory is the source of truth. The SQLite index is rebuilt from
//! scratch on every scan and only used for traversal queries.

pub mod file_ops;
pub mod frontmatter;
pub mod index;
pub mod links;

pub use index::NoteIndex;
