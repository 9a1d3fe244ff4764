use super::entity::BackgroundProcess;
use super::probe::ProcessProbe;
use crate::infrastructure::database::{Database, ProcessMethods};
use anyhow::Result;
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// How often liveness is polled after SIGTERM.
const TERM_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Total time a process gets to exit gracefully before escalation.
const TERM_WAIT_TOTAL: Duration = Duration::from_millis(3000);
/// Fixed grace period after SIGKILL before the row is dropped.
const FORCE_KILL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// The process was confirmed dead after the graceful signal (or was
    /// already gone, which is the same success).
    Graceful,
    /// SIGKILL had to be sent; the process state was not re-confirmed.
    Forced,
}

/// Persistent table of live agent processes, reconciled against the
/// [`ProcessProbe`] on every read. Dead rows are pruned as a side effect of
/// reading; there is no background sweeper.
#[derive(Clone)]
pub struct ProcessRegistry {
    db: Database,
    probe: Arc<dyn ProcessProbe>,
}

impl ProcessRegistry {
    pub fn new(db: Database, probe: Arc<dyn ProcessProbe>) -> Self {
        Self { db, probe }
    }

    /// Upserts a row for `pid` with the current timestamp. A prior row with
    /// the same pid belongs to a finished incarnation and is replaced.
    pub fn register(
        &self,
        pid: i32,
        command: &str,
        description: &str,
        session_name: &str,
    ) -> Result<()> {
        debug!("Registering process {pid} for session '{session_name}'");
        self.db.insert_process(&BackgroundProcess {
            pid,
            command: command.to_string(),
            description: description.to_string(),
            session_name: session_name.to_string(),
            start_time: Utc::now(),
        })
    }

    pub fn list_running(&self) -> Result<Vec<BackgroundProcess>> {
        let rows = self.db.list_processes()?;
        self.prune_dead(rows)
    }

    pub fn list_for_session(&self, session_name: &str) -> Result<Vec<BackgroundProcess>> {
        let rows = self.db.list_processes_for_session(session_name)?;
        self.prune_dead(rows)
    }

    fn prune_dead(&self, rows: Vec<BackgroundProcess>) -> Result<Vec<BackgroundProcess>> {
        let mut live = Vec::with_capacity(rows.len());
        let mut dead = Vec::new();
        for row in rows {
            if self.probe.is_alive(row.pid) {
                live.push(row);
            } else {
                dead.push(row.pid);
            }
        }

        if !dead.is_empty() {
            debug!("Pruning {} dead registry row(s): {dead:?}", dead.len());
            self.db.delete_processes(&dead)?;
        }
        Ok(live)
    }

    /// Graceful-then-forced termination with a hard time cap. A pid that is
    /// already gone is success, never an error; the row is removed in every
    /// path.
    pub async fn kill(&self, pid: i32) -> Result<KillOutcome> {
        if self.probe.terminate(pid).is_err() {
            debug!("Process {pid} was already gone before SIGTERM");
            self.db.delete_process(pid)?;
            return Ok(KillOutcome::Graceful);
        }

        let polls = (TERM_WAIT_TOTAL.as_millis() / TERM_POLL_INTERVAL.as_millis()) as u32;
        for _ in 0..polls {
            if !self.probe.is_alive(pid) {
                info!("Process {pid} exited after SIGTERM");
                self.db.delete_process(pid)?;
                return Ok(KillOutcome::Graceful);
            }
            tokio::time::sleep(TERM_POLL_INTERVAL).await;
        }

        warn!(
            "Process {pid} survived SIGTERM for {}ms, sending SIGKILL",
            TERM_WAIT_TOTAL.as_millis()
        );
        if let Err(err) = self.probe.force_kill(pid) {
            debug!("SIGKILL for {pid} failed ({err}); treating as already exited");
        }
        tokio::time::sleep(FORCE_KILL_GRACE).await;

        self.db.delete_process(pid)?;
        Ok(KillOutcome::Forced)
    }

    /// Kills every live registered process, continuing past individual
    /// failures.
    pub async fn kill_all(&self) -> Result<usize> {
        let running = self.list_running()?;
        let mut killed = 0;
        for process in running {
            match self.kill(process.pid).await {
                Ok(outcome) => {
                    debug!("Killed {} ({outcome:?})", process.pid);
                    killed += 1;
                }
                Err(err) => {
                    warn!("Failed to kill process {}: {err:#}", process.pid);
                }
            }
        }
        Ok(killed)
    }

    /// Removes a single row without signalling; used when the owner already
    /// observed the process exit.
    pub fn remove(&self, pid: i32) -> Result<()> {
        self.db.delete_process(pid)
    }

    /// Removes every row belonging to a session, live or not. Session
    /// deletion uses this; it does not signal the processes.
    pub fn remove_for_session(&self, session_name: &str) -> Result<()> {
        self.db.delete_processes_for_session(session_name)
    }
}
