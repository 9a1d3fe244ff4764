use anyhow::{Result, anyhow};
use std::path::PathBuf;

/// Overrides the per-user data directory. Set by tests and by deployments
/// that keep registry state somewhere non-standard.
pub const DATA_DIR_ENV: &str = "WERKBANK_DATA_DIR";

const DATABASE_FILE: &str = "werkbank.db";

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }

    dirs::data_dir()
        .map(|base| base.join("werkbank"))
        .ok_or_else(|| anyhow!("Could not determine a platform data directory"))
}

pub fn database_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(DATABASE_FILE))
}
