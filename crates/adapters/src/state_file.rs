//! Durable per-account monitor state file.
//!
//! Written on shutdown so external tooling can observe where a monitor
//! stopped. Watermark bootstrap never reads it; the baseline is always
//! re-derived from a fresh fetch.

use post_archiver_domain::MonitorState;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StateFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Path of the state file for one account under the given state directory.
pub fn state_path(state_dir: &Path, account: &str) -> PathBuf {
    state_dir.join(account).join("state.json")
}

/// Persist the state for one account, creating directories as needed.
pub async fn save_state(
    state_dir: &Path,
    account: &str,
    state: &MonitorState,
) -> Result<PathBuf, StateFileError> {
    let path = state_path(state_dir, account);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let body = serde_json::to_vec_pretty(state)?;
    fs::write(&path, body).await?;

    Ok(path)
}

/// Load a previously saved state file.
pub async fn load_state(path: &Path) -> Result<MonitorState, StateFileError> {
    let contents = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&contents)?)
}
