pub mod note;

pub use note::{BrokenLink, IndexStats, LinkRef, Note, NoteDetail, NoteSummary, ScanReport, ScannedNote};
