mod manager;

pub use manager::{LibraryError, LibraryManager, LibraryStats};

use crate::db::AssetClass;
use std::path::Path;

/// Create the managed library tree: the root plus one subdirectory per
/// asset class. Safe to call repeatedly.
pub async fn ensure_library_tree(root: &Path) -> Result<(), std::io::Error> {
    for class in [AssetClass::Music, AssetClass::Sfx] {
        tokio::fs::create_dir_all(root.join(class.as_str())).await?;
    }
    Ok(())
}
