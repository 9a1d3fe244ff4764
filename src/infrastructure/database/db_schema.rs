use super::connection::Database;

pub fn initialize_schema(db: &Database) -> anyhow::Result<()> {
    let conn = db.get_conn()?;

    // One row per live agent process ever registered; pruned lazily on read.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS background_processes (
            pid INTEGER PRIMARY KEY,
            command TEXT NOT NULL,
            description TEXT NOT NULL,
            session_name TEXT NOT NULL,
            start_time TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_background_processes_session
             ON background_processes(session_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            name TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            goal TEXT NOT NULL DEFAULT '',
            repos TEXT NOT NULL DEFAULT '[]',
            skills TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS app_config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            agent_command TEXT NOT NULL DEFAULT 'claude'
        )",
        [],
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO app_config (id, agent_command) VALUES (1, 'claude')",
        [],
    )?;

    apply_sessions_migrations(&conn)?;

    Ok(())
}

/// Apply migrations for the sessions table
fn apply_sessions_migrations(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    // These migrations are idempotent - they silently fail if column already exists
    let _ = conn.execute(
        "ALTER TABLE sessions ADD COLUMN skills TEXT NOT NULL DEFAULT '[]'",
        [],
    );
    Ok(())
}
