//! Desktop cache directory resolution.

use bridge_traits::error::{BridgeError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "sonic-decode";

/// Platform cache directory for spooled PCM, e.g. `~/.cache/sonic-decode`.
///
/// Falls back to the system temp directory when the platform reports none.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// Creates `dir` (and parents) if missing and returns it.
pub fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(BridgeError::Io)?;
        debug!(path = ?dir, "Created cache directory");
    }
    Ok(dir.to_path_buf())
}
