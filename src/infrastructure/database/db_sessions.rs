use super::connection::Database;
use super::timestamps::utc_from_epoch_seconds_lossy;
use crate::domains::repos::spec::RepoSpec;
use crate::domains::sessions::entity::Session;
use crate::errors::WerkbankError;
use anyhow::{Context, Result};
use rusqlite::params;
use std::path::PathBuf;

pub trait SessionMethods {
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session(&self, name: &str) -> Result<Session>;
    fn list_sessions(&self) -> Result<Vec<Session>>;
    fn update_session_settings(&self, session: &Session) -> Result<()>;
    fn delete_session(&self, name: &str) -> Result<()>;
    fn session_exists(&self, name: &str) -> Result<bool>;
}

struct SessionRow {
    name: String,
    path: String,
    goal: String,
    repos: String,
    skills: String,
    created_at: i64,
    updated_at: i64,
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        name: row.get(0)?,
        path: row.get(1)?,
        goal: row.get(2)?,
        repos: row.get(3)?,
        skills: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn into_session(raw: SessionRow) -> Result<Session> {
    let repos: Vec<RepoSpec> = serde_json::from_str(&raw.repos)
        .with_context(|| format!("Corrupt repos column for session '{}'", raw.name))?;
    let skills: Vec<String> = serde_json::from_str(&raw.skills)
        .with_context(|| format!("Corrupt skills column for session '{}'", raw.name))?;

    Ok(Session {
        name: raw.name,
        path: PathBuf::from(raw.path),
        goal: raw.goal,
        repos,
        skills,
        created_at: utc_from_epoch_seconds_lossy(raw.created_at),
        updated_at: utc_from_epoch_seconds_lossy(raw.updated_at),
    })
}

const SESSION_COLUMNS: &str = "name, path, goal, repos, skills, created_at, updated_at";

impl SessionMethods for Database {
    fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.get_conn()?;
        let repos = serde_json::to_string(&session.repos)?;
        let skills = serde_json::to_string(&session.skills)?;

        let result = conn.execute(
            "INSERT INTO sessions (name, path, goal, repos, skills, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.name,
                session.path.to_string_lossy(),
                session.goal,
                repos,
                skills,
                session.created_at.timestamp(),
                session.updated_at.timestamp(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) =>
            {
                Err(WerkbankError::SessionAlreadyExists {
                    name: session.name.clone(),
                }
                .into())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get_session(&self, name: &str) -> Result<Session> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE name = ?1"),
            params![name],
            row_to_session,
        );

        match result {
            Ok(raw) => into_session(raw),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(WerkbankError::SessionNotFound {
                name: name.to_string(),
            }
            .into()),
            Err(err) => Err(err.into()),
        }
    }

    fn list_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY name"))?;
        let rows = stmt.query_map([], row_to_session)?;

        let mut sessions = Vec::new();
        for raw in rows {
            sessions.push(into_session(raw?)?);
        }
        Ok(sessions)
    }

    fn update_session_settings(&self, session: &Session) -> Result<()> {
        let conn = self.get_conn()?;
        let repos = serde_json::to_string(&session.repos)?;
        let skills = serde_json::to_string(&session.skills)?;

        let changed = conn.execute(
            "UPDATE sessions SET goal = ?2, repos = ?3, skills = ?4, updated_at = ?5
             WHERE name = ?1",
            params![
                session.name,
                session.goal,
                repos,
                skills,
                session.updated_at.timestamp(),
            ],
        )?;

        if changed == 0 {
            return Err(WerkbankError::SessionNotFound {
                name: session.name.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn delete_session(&self, name: &str) -> Result<()> {
        let conn = self.get_conn()?;
        let deleted = conn.execute("DELETE FROM sessions WHERE name = ?1", params![name])?;
        if deleted == 0 {
            log::debug!("delete_session('{name}') removed no rows");
        }
        Ok(())
    }

    fn session_exists(&self, name: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::new(Some(dir.path().join("sessions.db"))).expect("open db");
        (dir, db)
    }

    fn sample_session(name: &str) -> Session {
        let now = Utc::now();
        Session {
            name: name.to_string(),
            path: PathBuf::from(format!("/tmp/werkbank/{name}")),
            goal: "ship the feature".to_string(),
            repos: vec![
                RepoSpec::parse("acme/lib").unwrap(),
                RepoSpec::parse("acme/docs:main").unwrap().with_read_only(true),
            ],
            skills: vec!["rust".to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_and_get_roundtrip() {
        let (_dir, db) = test_db();
        let session = sample_session("alpha");
        db.create_session(&session).unwrap();

        let loaded = db.get_session("alpha").unwrap();
        assert_eq!(loaded.name, "alpha");
        assert_eq!(loaded.goal, "ship the feature");
        assert_eq!(loaded.repos.len(), 2);
        assert_eq!(loaded.repos[1].spec, "acme/docs:main");
        assert!(loaded.repos[1].read_only);
        assert_eq!(loaded.skills, vec!["rust".to_string()]);
    }

    #[test]
    fn duplicate_create_reports_already_exists() {
        let (_dir, db) = test_db();
        db.create_session(&sample_session("alpha")).unwrap();

        let err = db.create_session(&sample_session("alpha")).unwrap_err();
        let domain = err.downcast_ref::<WerkbankError>();
        assert!(
            matches!(domain, Some(WerkbankError::SessionAlreadyExists { .. })),
            "expected SessionAlreadyExists, got {err:#}"
        );
    }

    #[test]
    fn get_missing_session_reports_not_found() {
        let (_dir, db) = test_db();
        let err = db.get_session("ghost").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WerkbankError>(),
            Some(WerkbankError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn update_settings_persists_new_values() {
        let (_dir, db) = test_db();
        let mut session = sample_session("alpha");
        db.create_session(&session).unwrap();

        session.goal = "new goal".to_string();
        session.repos.truncate(1);
        session.skills.push("sqlite".to_string());
        db.update_session_settings(&session).unwrap();

        let loaded = db.get_session("alpha").unwrap();
        assert_eq!(loaded.goal, "new goal");
        assert_eq!(loaded.repos.len(), 1);
        assert_eq!(loaded.skills.len(), 2);
    }

    #[test]
    fn delete_session_removes_row_and_is_idempotent() {
        let (_dir, db) = test_db();
        db.create_session(&sample_session("alpha")).unwrap();

        db.delete_session("alpha").unwrap();
        assert!(!db.session_exists("alpha").unwrap());

        // Second delete is a no-op, not an error.
        db.delete_session("alpha").unwrap();
    }
}
