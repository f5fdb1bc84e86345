use crate::db::DbAudioFile;
use std::path::PathBuf;

/// Aggregated result of one import batch
///
/// Per-path failures land in `failed` and never abort sibling paths;
/// byte-identical re-imports land in `duplicates` untouched.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub success: Vec<DbAudioFile>,
    pub failed: Vec<PathBuf>,
    pub duplicates: Vec<PathBuf>,
}

/// How a single path was handled
#[derive(Debug)]
pub enum ImportDisposition {
    Imported(DbAudioFile),
    Duplicate,
}
