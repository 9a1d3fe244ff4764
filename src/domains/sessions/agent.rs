use super::entity::Session;
use crate::domains::processes::ProcessRegistry;
use crate::errors::WerkbankError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::process::Stdio;
use tokio::process::Command;

/// Set in the agent's environment when the session runs in interactive-rich
/// mode, so the child can enable its own rich rendering.
pub const INTERACTIVE_ENV: &str = "WERKBANK_INTERACTIVE";

const AGENT_DESCRIPTION: &str = "coding agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Rich,
    Plain,
}

#[derive(Debug, Clone)]
pub struct AgentExit {
    pub exit_code: Option<i32>,
}

/// Launches the agent for a session and blocks until it exits. The resume
/// controller only knows this trait; tests substitute a scripted runner.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, session: &Session, mode: DisplayMode) -> Result<AgentExit>;
}

/// Real runner: spawns the configured agent command in the session directory
/// with inherited standard streams, registering the pid for the session
/// while it runs.
pub struct SubprocessAgentRunner {
    registry: ProcessRegistry,
    command: String,
}

impl SubprocessAgentRunner {
    pub fn new(registry: ProcessRegistry, command: String) -> Self {
        Self { registry, command }
    }
}

fn resolve_agent_binary(program: &str) -> String {
    if let Ok(found) = which::which(program) {
        return found.to_string_lossy().to_string();
    }

    // PATH in a login shell often differs from ours; check the usual
    // user-local install locations before giving up.
    if let Some(home) = dirs::home_dir() {
        for candidate in [
            home.join(".local/bin").join(program),
            home.join(".cargo/bin").join(program),
            home.join("bin").join(program),
        ] {
            if candidate.exists() {
                return candidate.to_string_lossy().to_string();
            }
        }
    }

    program.to_string()
}

#[async_trait]
impl AgentRunner for SubprocessAgentRunner {
    async fn run(&self, session: &Session, mode: DisplayMode) -> Result<AgentExit> {
        let parts = shell_words::split(&self.command).map_err(|err| {
            WerkbankError::AgentLaunchFailed {
                command: self.command.clone(),
                message: err.to_string(),
            }
        })?;
        let Some((program, args)) = parts.split_first() else {
            return Err(WerkbankError::AgentLaunchFailed {
                command: self.command.clone(),
                message: "agent command is empty".to_string(),
            }
            .into());
        };

        let binary = resolve_agent_binary(program);
        let mut command = Command::new(&binary);
        command
            .args(args)
            .current_dir(&session.path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if mode == DisplayMode::Rich {
            command.env(INTERACTIVE_ENV, "1");
        }

        info!(
            "Launching agent '{}' in {}",
            self.command,
            session.path.display()
        );
        let mut child = command.spawn().map_err(|err| WerkbankError::AgentLaunchFailed {
            command: self.command.clone(),
            message: err.to_string(),
        })?;

        let pid = child.id().map(|id| id as i32);
        if let Some(pid) = pid
            && let Err(err) =
                self.registry
                    .register(pid, &self.command, AGENT_DESCRIPTION, &session.name)
        {
            warn!("Failed to register agent pid {pid}: {err:#}");
        }

        let status = child
            .wait()
            .await
            .context("Failed to wait for agent to exit")?;

        if let Some(pid) = pid
            && let Err(err) = self.registry.remove(pid)
        {
            warn!("Failed to remove registry row for agent pid {pid}: {err:#}");
        }

        info!(
            "Agent for session '{}' exited with {status}",
            session.name
        );
        Ok(AgentExit {
            exit_code: status.code(),
        })
    }
}
