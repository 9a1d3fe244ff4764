use super::connection::Database;
use super::timestamps::utc_from_rfc3339_lossy;
use crate::domains::processes::entity::BackgroundProcess;
use anyhow::Result;
use rusqlite::params;

pub trait ProcessMethods {
    fn insert_process(&self, process: &BackgroundProcess) -> Result<()>;
    fn list_processes(&self) -> Result<Vec<BackgroundProcess>>;
    fn list_processes_for_session(&self, session_name: &str) -> Result<Vec<BackgroundProcess>>;
    fn delete_process(&self, pid: i32) -> Result<()>;
    fn delete_processes(&self, pids: &[i32]) -> Result<()>;
    fn delete_processes_for_session(&self, session_name: &str) -> Result<()>;
}

fn row_to_process(row: &rusqlite::Row<'_>) -> rusqlite::Result<BackgroundProcess> {
    let start_time: String = row.get(4)?;
    Ok(BackgroundProcess {
        pid: row.get(0)?,
        command: row.get(1)?,
        description: row.get(2)?,
        session_name: row.get(3)?,
        start_time: utc_from_rfc3339_lossy(&start_time),
    })
}

impl ProcessMethods for Database {
    fn insert_process(&self, process: &BackgroundProcess) -> Result<()> {
        let conn = self.get_conn()?;
        // Pid reuse by the OS is a new process, so a prior row is replaced.
        conn.execute(
            "INSERT OR REPLACE INTO background_processes
                 (pid, command, description, session_name, start_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                process.pid,
                process.command,
                process.description,
                process.session_name,
                process.start_time.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_processes(&self) -> Result<Vec<BackgroundProcess>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT pid, command, description, session_name, start_time
             FROM background_processes ORDER BY start_time, pid",
        )?;
        let rows = stmt.query_map([], row_to_process)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn list_processes_for_session(&self, session_name: &str) -> Result<Vec<BackgroundProcess>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT pid, command, description, session_name, start_time
             FROM background_processes WHERE session_name = ?1 ORDER BY start_time, pid",
        )?;
        let rows = stmt.query_map(params![session_name], row_to_process)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn delete_process(&self, pid: i32) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM background_processes WHERE pid = ?1",
            params![pid],
        )?;
        Ok(())
    }

    fn delete_processes(&self, pids: &[i32]) -> Result<()> {
        if pids.is_empty() {
            return Ok(());
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM background_processes WHERE pid = ?1")?;
            for pid in pids {
                stmt.execute(params![pid])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_processes_for_session(&self, session_name: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM background_processes WHERE session_name = ?1",
            params![session_name],
        )?;
        Ok(())
    }
}
