use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::db_schema::initialize_schema;

/// Handle to the single SQLite file backing the process registry and the
/// session table. Cheap to clone; every call locks, executes, and releases,
/// so no lock is held across an await point.
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl Database {
    /// Opens (or creates) the database. `None` resolves the per-user data
    /// directory, honoring the `WERKBANK_DATA_DIR` override.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let db_path = match path {
            Some(path) => path,
            None => crate::utils::paths::database_path()?,
        };

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create data directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        // Multiple session controllers may hit the registry concurrently.
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        };
        initialize_schema(&db)?;
        Ok(db)
    }

    pub fn get_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database mutex poisoned"))
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}
