// # Import module
//
// - **ImportService**: validates, hashes, dedups, copies, and catalogs
//   candidate files
// - **ImportOutcome**: per-batch aggregate (success / failed / duplicates)
//
// The watcher reuses `ImportService::register_existing_file` so externally
// added files go through the same dedup path as drag-and-drop imports.

mod service;
mod types;

pub use service::{ImportError, ImportService};
pub(crate) use service::unique_filename;
pub use types::{ImportDisposition, ImportOutcome};
