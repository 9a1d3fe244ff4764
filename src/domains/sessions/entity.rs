use crate::domains::repos::spec::RepoSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named on-disk workspace: one subdirectory per repo plus metadata.
/// Created by session creation, mutated by settings edits, destroyed by
/// deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub path: PathBuf,
    pub goal: String,
    pub repos: Vec<RepoSpec>,
    pub skills: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The editable subset of a session, returned by the settings editor.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub goal: String,
    pub repos: Vec<RepoSpec>,
    pub skills: Vec<String>,
}

impl Session {
    pub fn new(
        name: String,
        path: PathBuf,
        goal: String,
        repos: Vec<RepoSpec>,
        skills: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name,
            path,
            goal,
            repos,
            skills,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn read_only_repos(&self) -> Vec<RepoSpec> {
        self.repos
            .iter()
            .filter(|repo| repo.read_only)
            .cloned()
            .collect()
    }

    pub fn apply_update(&mut self, update: SessionUpdate) {
        self.goal = update.goal;
        self.repos = update.repos;
        self.skills = update.skills;
        self.updated_at = Utc::now();
    }
}
