use super::entity::Session;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// File the agent reads on startup to learn the session's goal, repo layout,
/// and installed skills. Regenerated whenever settings change.
pub const AGENT_CONTEXT_FILE: &str = "AGENT_CONTEXT.md";

pub fn render_agent_context(session: &Session) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Session: {}\n\n", session.name));

    out.push_str("## Goal\n\n");
    if session.goal.trim().is_empty() {
        out.push_str("(no goal recorded)\n");
    } else {
        out.push_str(session.goal.trim());
        out.push('\n');
    }

    out.push_str("\n## Repositories\n\n");
    for repo in &session.repos {
        if repo.read_only {
            out.push_str(&format!("- `{}/`: {} (read-only)\n", repo.dir, repo.spec));
        } else {
            out.push_str(&format!("- `{}/`: {}\n", repo.dir, repo.spec));
        }
    }

    if !session.skills.is_empty() {
        out.push_str("\n## Skills\n\n");
        for skill in &session.skills {
            out.push_str(&format!("- {skill}\n"));
        }
    }

    out
}

/// Writes the context file atomically: the agent may be reading the old one.
pub fn write_agent_context(session: &Session) -> Result<PathBuf> {
    let target = session.path.join(AGENT_CONTEXT_FILE);
    let staging = session.path.join(format!(".{AGENT_CONTEXT_FILE}.tmp"));

    std::fs::write(&staging, render_agent_context(session))
        .with_context(|| format!("Failed to write {}", staging.display()))?;
    std::fs::rename(&staging, &target)
        .with_context(|| format!("Failed to move context file into {}", target.display()))?;

    Ok(target)
}
