use super::progress::{OUTPUT_TAIL_LINES, OutputRing, ProgressSink, ProgressStatus};
use super::spec::RepoSpec;
use crate::errors::WerkbankError;
use anyhow::{Context, Result, anyhow};
use futures::future::join_all;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

pub const UNCOMMITTED_CHANGES_REASON: &str = "uncommitted changes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    Updated,
    UpToDate,
    Skipped,
    Error,
}

impl RefreshStatus {
    pub fn as_progress(self) -> ProgressStatus {
        match self {
            Self::Updated => ProgressStatus::Updated,
            Self::UpToDate => ProgressStatus::UpToDate,
            Self::Skipped => ProgressStatus::Skipped,
            Self::Error => ProgressStatus::Error,
        }
    }
}

impl std::fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_progress())
    }
}

/// Outcome of refreshing one read-only repo. Not persisted anywhere.
#[derive(Debug, Clone)]
pub struct RefreshResult {
    pub repo: RepoSpec,
    pub status: RefreshStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DirtyReport {
    pub has_changes: bool,
    pub repos_with_changes: Vec<String>,
}

struct CapturedGit {
    exit: ExitStatus,
    text: String,
    tail: Vec<String>,
}

struct StreamState {
    ring: OutputRing,
    text: String,
}

fn record_line(
    raw: &[u8],
    state: &Mutex<StreamState>,
    sink: &ProgressSink,
    repo_index: Option<usize>,
    status: ProgressStatus,
) {
    if raw.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(raw);
    let mut guard = state.lock().expect("git output mutex poisoned");
    if !guard.ring.push(&line) {
        return;
    }
    guard.text.push_str(line.trim());
    guard.text.push('\n');
    let snapshot = guard.ring.snapshot();
    drop(guard);
    sink.emit(repo_index, status, Some(snapshot));
}

/// Reads one of the child's pipes to EOF, splitting on both `\n` and `\r`
/// because git progress rewrites its line with carriage returns.
async fn pump_output<R>(
    reader: Option<R>,
    state: &Mutex<StreamState>,
    sink: &ProgressSink,
    repo_index: Option<usize>,
    status: ProgressStatus,
) where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };

    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                for &byte in &buf[..n] {
                    if byte == b'\n' || byte == b'\r' {
                        record_line(&pending, state, sink, repo_index, status);
                        pending.clear();
                    } else {
                        pending.push(byte);
                    }
                }
            }
        }
    }
    record_line(&pending, state, sink, repo_index, status);
}

async fn run_git_streaming(
    args: &[String],
    sink: &ProgressSink,
    repo_index: Option<usize>,
    status: ProgressStatus,
) -> Result<CapturedGit> {
    let mut child = Command::new("git")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn git {}", args.join(" ")))?;

    let state = Mutex::new(StreamState {
        ring: OutputRing::new(OUTPUT_TAIL_LINES),
        text: String::new(),
    });
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tokio::join!(
        pump_output(stdout, &state, sink, repo_index, status),
        pump_output(stderr, &state, sink, repo_index, status),
    );

    let exit = child
        .wait()
        .await
        .context("Failed to wait for git process to finish")?;
    let state = state
        .into_inner()
        .expect("git output mutex poisoned");

    Ok(CapturedGit {
        exit,
        text: state.text,
        tail: state.ring.snapshot(),
    })
}

/// Shallow, single-branch clone of `repo` into `session_path/repo.dir`,
/// streaming progress through `sink`.
pub async fn clone_repo(
    repo: &RepoSpec,
    session_path: &Path,
    sink: &ProgressSink,
) -> Result<PathBuf> {
    clone_repo_at(repo, session_path, sink, None).await
}

pub(crate) async fn clone_repo_at(
    repo: &RepoSpec,
    session_path: &Path,
    sink: &ProgressSink,
    repo_index: Option<usize>,
) -> Result<PathBuf> {
    let target = session_path.join(&repo.dir);
    let url = repo.remote_url();

    let mut args: Vec<String> = vec![
        "clone".into(),
        "--depth".into(),
        "1".into(),
        "--single-branch".into(),
    ];
    if let Some(branch) = &repo.branch {
        args.push("--branch".into());
        args.push(branch.clone());
    }
    args.push("--progress".into());
    args.push(url);
    args.push(target.to_string_lossy().to_string());

    debug!("Cloning {} into {}", repo.spec, target.display());
    let captured = run_git_streaming(&args, sink, repo_index, ProgressStatus::Cloning).await?;

    if !captured.exit.success() {
        sink.emit(repo_index, ProgressStatus::Error, Some(captured.tail.clone()));
        return Err(WerkbankError::CloneFailed {
            repo: repo.spec.clone(),
            exit_code: captured.exit.code(),
            output_tail: captured.tail,
        }
        .into());
    }

    sink.emit(repo_index, ProgressStatus::Done, Some(captured.tail));
    Ok(target)
}

/// Destructive directory replacement followed by a fresh clone. Removal of
/// a missing directory is not an error; there is no rollback on failure.
pub async fn reclone_repo(
    repo: &RepoSpec,
    session_path: &Path,
    sink: &ProgressSink,
) -> Result<PathBuf> {
    reclone_repo_at(repo, session_path, sink, None).await
}

pub(crate) async fn reclone_repo_at(
    repo: &RepoSpec,
    session_path: &Path,
    sink: &ProgressSink,
    repo_index: Option<usize>,
) -> Result<PathBuf> {
    let target = session_path.join(&repo.dir);
    match tokio::fs::remove_dir_all(&target).await {
        Ok(()) => debug!("Removed {} before reclone", target.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(WerkbankError::RecloneFailed {
                repo: repo.spec.clone(),
                message: format!("failed to remove {}: {err}", target.display()),
            }
            .into());
        }
    }

    clone_repo_at(repo, session_path, sink, repo_index)
        .await
        .map_err(|err| {
            anyhow::Error::from(WerkbankError::RecloneFailed {
                repo: repo.spec.clone(),
                message: format!("{err:#}"),
            })
        })
}

/// Clones every repo concurrently, one independent task per repo; events
/// are tagged with the repo's index. A failing repo never cancels its
/// siblings: all tasks are awaited, then a single error is raised listing
/// every failure.
pub async fn clone_all(repos: &[RepoSpec], session_path: &Path, sink: &ProgressSink) -> Result<()> {
    if repos.is_empty() {
        return Ok(());
    }

    for index in 0..repos.len() {
        sink.emit(Some(index), ProgressStatus::Pending, None);
    }

    let mut tasks = Vec::with_capacity(repos.len());
    for (index, repo) in repos.iter().enumerate() {
        let repo = repo.clone();
        let session_path = session_path.to_path_buf();
        let sink = sink.clone();
        tasks.push(tokio::spawn(async move {
            clone_repo_at(&repo, &session_path, &sink, Some(index))
                .await
                .map(|_| ())
                .map_err(|err| format!("{}: {err:#}", repo.spec))
        }));
    }

    let mut failures = Vec::new();
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => failures.push(message),
            Err(err) => failures.push(format!("clone task aborted: {err}")),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} clones failed: {}",
            failures.len(),
            repos.len(),
            failures.join("; ")
        ))
    }
}

/// Working-tree dirty check via `git status --porcelain`. No network
/// access. A missing directory has nothing to lose and counts as clean.
pub async fn is_dirty(repo_path: &Path) -> Result<bool> {
    if !repo_path.is_dir() {
        return Ok(false);
    }

    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(repo_path)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to run git status in {}", repo_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WerkbankError::git("status", stderr.trim()).into());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .any(|line| !line.trim().is_empty()))
}

/// Runs `is_dirty` over all repos concurrently. A repo whose status cannot
/// be read is counted as dirty: the report gates destructive prompts.
pub async fn session_dirty(repos: &[RepoSpec], session_path: &Path) -> Result<DirtyReport> {
    let checks = repos.iter().map(|repo| {
        let path = session_path.join(&repo.dir);
        async move { (repo.dir.clone(), is_dirty(&path).await) }
    });

    let mut repos_with_changes = Vec::new();
    for (dir, result) in join_all(checks).await {
        match result {
            Ok(true) => repos_with_changes.push(dir),
            Ok(false) => {}
            Err(err) => {
                warn!("Dirty check failed for '{dir}': {err:#}");
                repos_with_changes.push(dir);
            }
        }
    }

    Ok(DirtyReport {
        has_changes: !repos_with_changes.is_empty(),
        repos_with_changes,
    })
}

/// Refreshes the read-only repos of a session, in list order. Sequential on
/// purpose: refresh results feed an interactive per-repo reclone prompt, and
/// one output buffer at a time keeps that flow unambiguous.
///
/// Returns one result per read-only repo; an empty list when the session
/// has none (no subprocess is spawned in that case).
pub async fn refresh_repos(
    repos: &[RepoSpec],
    session_path: &Path,
    sink: &ProgressSink,
) -> Result<Vec<RefreshResult>> {
    let targets: Vec<&RepoSpec> = repos.iter().filter(|repo| repo.read_only).collect();
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    for index in 0..targets.len() {
        sink.emit(Some(index), ProgressStatus::Pending, None);
    }

    let mut results = Vec::with_capacity(targets.len());
    for (index, repo) in targets.iter().enumerate() {
        let repo_path = session_path.join(&repo.dir);

        let dirty = match is_dirty(&repo_path).await {
            Ok(dirty) => dirty,
            Err(err) => {
                warn!(
                    "Skipping pull for '{}': status query failed: {err:#}",
                    repo.spec
                );
                sink.emit(Some(index), ProgressStatus::Error, None);
                results.push(RefreshResult {
                    repo: (*repo).clone(),
                    status: RefreshStatus::Error,
                    reason: Some(format!("{err:#}")),
                });
                continue;
            }
        };

        if dirty {
            sink.emit(Some(index), ProgressStatus::Skipped, None);
            results.push(RefreshResult {
                repo: (*repo).clone(),
                status: RefreshStatus::Skipped,
                reason: Some(UNCOMMITTED_CHANGES_REASON.to_string()),
            });
            continue;
        }

        let args: Vec<String> = vec![
            "-C".into(),
            repo_path.to_string_lossy().to_string(),
            "pull".into(),
            "--ff-only".into(),
            "--depth".into(),
            "1".into(),
        ];

        let captured =
            match run_git_streaming(&args, sink, Some(index), ProgressStatus::Refreshing).await {
                Ok(captured) => captured,
                Err(err) => {
                    sink.emit(Some(index), ProgressStatus::Error, None);
                    results.push(RefreshResult {
                        repo: (*repo).clone(),
                        status: RefreshStatus::Error,
                        reason: Some(format!("{err:#}")),
                    });
                    continue;
                }
            };

        if !captured.exit.success() {
            let text = captured.text.trim();
            let reason = if text.is_empty() {
                let code = captured
                    .exit
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                format!("git pull exited with code {code}")
            } else {
                text.to_string()
            };
            sink.emit(Some(index), ProgressStatus::Error, Some(captured.tail.clone()));
            results.push(RefreshResult {
                repo: (*repo).clone(),
                status: RefreshStatus::Error,
                reason: Some(reason),
            });
            continue;
        }

        let lowered = captured.text.to_lowercase();
        let status = if lowered.contains("already up to date") || lowered.contains("already up-to-date")
        {
            RefreshStatus::UpToDate
        } else {
            RefreshStatus::Updated
        };
        sink.emit(Some(index), status.as_progress(), None);
        results.push(RefreshResult {
            repo: (*repo).clone(),
            status,
            reason: None,
        });
    }

    Ok(results)
}
