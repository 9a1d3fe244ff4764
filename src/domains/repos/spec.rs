use crate::errors::WerkbankError;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Overrides the remote base used to derive clone URLs. Tests point this at
/// a directory of local repositories; enterprise setups point it at their
/// own host.
pub const GIT_BASE_ENV: &str = "WERKBANK_GIT_BASE";

const DEFAULT_GIT_BASE: &str = "https://github.com";

/// One repository inside a session, parsed from the canonical
/// `owner/name[:branch]` form. Immutable once the session is created; only
/// `read_only` affects synchronization behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoSpec {
    pub owner: String,
    pub name: String,
    /// Directory name inside the session, defaults to `name`.
    pub dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    /// The canonical `owner/name[:branch]` string this spec was parsed from.
    pub spec: String,
}

impl RepoSpec {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(WerkbankError::invalid_spec(input, "spec is empty").into());
        }

        // The branch part may itself contain '/', so split on the first ':'.
        let (repo_part, branch) = match trimmed.split_once(':') {
            Some((repo, branch)) if !branch.is_empty() => (repo, Some(branch.to_string())),
            Some((_, _)) => {
                return Err(WerkbankError::invalid_spec(input, "branch is empty").into());
            }
            None => (trimmed, None),
        };

        let Some((owner, name)) = repo_part.split_once('/') else {
            return Err(WerkbankError::invalid_spec(input, "expected owner/name[:branch]").into());
        };

        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(WerkbankError::invalid_spec(input, "expected owner/name[:branch]").into());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            dir: name.to_string(),
            branch,
            read_only: false,
            spec: trimmed.to_string(),
        })
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_dir(mut self, dir: &str) -> Self {
        self.dir = dir.to_string();
        self
    }

    pub fn remote_url(&self) -> String {
        format!("{}/{}/{}.git", remote_base(), self.owner, self.name)
    }

    /// Repo identity for set comparison. Branch is deliberately excluded.
    pub fn same_repo(&self, other: &RepoSpec) -> bool {
        self.owner == other.owner && self.name == other.name && self.dir == other.dir
    }
}

fn remote_base() -> String {
    match std::env::var(GIT_BASE_ENV) {
        Ok(base) if !base.trim().is_empty() => base.trim_end_matches('/').to_string(),
        _ => DEFAULT_GIT_BASE.to_string(),
    }
}

/// Order-insensitive repo-set equality, ignoring branches.
pub fn repo_sets_match(a: &[RepoSpec], b: &[RepoSpec]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|repo| b.iter().any(|other| repo.same_repo(other)))
        && b.iter().all(|repo| a.iter().any(|other| repo.same_repo(other)))
}
