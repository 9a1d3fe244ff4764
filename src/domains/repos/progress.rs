use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::mpsc;

/// How many trimmed output lines of a streaming git command are retained for
/// display. Older lines fall out of the ring.
pub const OUTPUT_TAIL_LINES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    Pending,
    Cloning,
    Refreshing,
    Updated,
    UpToDate,
    Skipped,
    Done,
    Error,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Cloning => "cloning",
            Self::Refreshing => "refreshing",
            Self::Updated => "updated",
            Self::UpToDate => "up-to-date",
            Self::Skipped => "skipped",
            Self::Done => "done",
            Self::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// One progress notification from a sync operation. `repo_index` identifies
/// the originating repo when several run concurrently; `lines` is the ring
/// buffer snapshot, present only when new output arrived with the event.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub repo_index: Option<usize>,
    pub status: ProgressStatus,
    pub lines: Option<Vec<String>>,
}

/// Multi-producer handle the sync engine emits progress through. Safe to
/// clone into concurrent clone tasks; a dropped or absent receiver makes
/// every emit a no-op.
#[derive(Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, repo_index: Option<usize>, status: ProgressStatus, lines: Option<Vec<String>>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent {
                repo_index,
                status,
                lines,
            });
        }
    }
}

/// Fixed-capacity tail of trimmed, non-empty output lines.
#[derive(Debug)]
pub struct OutputRing {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes a line after trimming. Returns false (and keeps the ring
    /// unchanged) when the trimmed line is empty.
    pub fn push(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return false;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(trimmed.to_string());
        true
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub struct RepoProgress {
    pub spec: String,
    pub status: ProgressStatus,
}

/// Owned render-session state for one multi-repo operation. The consumer
/// drains `ProgressEvent`s into it and hands it to whatever renders; no
/// module-level display state exists.
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub session_name: Option<String>,
    pub repos: Vec<RepoProgress>,
    pub phase: ProgressStatus,
    pub current_output: Vec<String>,
}

impl ProgressState {
    pub fn new(session_name: Option<String>, repo_specs: &[String]) -> Self {
        Self {
            session_name,
            repos: repo_specs
                .iter()
                .map(|spec| RepoProgress {
                    spec: spec.clone(),
                    status: ProgressStatus::Pending,
                })
                .collect(),
            phase: ProgressStatus::Pending,
            current_output: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: &ProgressEvent) {
        self.phase = event.status;
        if let Some(index) = event.repo_index
            && let Some(repo) = self.repos.get_mut(index)
        {
            repo.status = event.status;
        }
        if let Some(lines) = &event.lines {
            self.current_output = lines.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_keeps_only_the_last_lines() {
        let mut ring = OutputRing::new(OUTPUT_TAIL_LINES);
        for i in 0..8 {
            assert!(ring.push(&format!("line {i}")));
        }
        assert_eq!(
            ring.snapshot(),
            vec!["line 3", "line 4", "line 5", "line 6", "line 7"]
        );
    }

    #[test]
    fn ring_trims_and_drops_empty_lines() {
        let mut ring = OutputRing::new(OUTPUT_TAIL_LINES);
        assert!(!ring.push("   "));
        assert!(!ring.push(""));
        assert!(ring.push("  Receiving objects:  42%  "));
        assert_eq!(ring.snapshot(), vec!["Receiving objects:  42%"]);
    }

    #[test]
    fn sink_without_receiver_is_silent() {
        let sink = ProgressSink::discard();
        sink.emit(Some(0), ProgressStatus::Cloning, None);

        // A dropped receiver must not panic producers either.
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.emit(None, ProgressStatus::Done, None);
    }

    #[test]
    fn state_tracks_per_repo_status_and_output() {
        let mut state = ProgressState::new(
            Some("alpha".to_string()),
            &["acme/lib".to_string(), "acme/docs".to_string()],
        );

        state.apply(&ProgressEvent {
            repo_index: Some(1),
            status: ProgressStatus::Cloning,
            lines: Some(vec!["Cloning into 'docs'...".to_string()]),
        });

        assert_eq!(state.phase, ProgressStatus::Cloning);
        assert_eq!(state.repos[0].status, ProgressStatus::Pending);
        assert_eq!(state.repos[1].status, ProgressStatus::Cloning);
        assert_eq!(state.current_output, vec!["Cloning into 'docs'..."]);

        // Events without fresh output keep the previous tail on screen.
        state.apply(&ProgressEvent {
            repo_index: Some(1),
            status: ProgressStatus::Done,
            lines: None,
        });
        assert_eq!(state.repos[1].status, ProgressStatus::Done);
        assert_eq!(state.current_output, vec!["Cloning into 'docs'..."]);
    }

    #[test]
    fn status_display_matches_wire_labels() {
        assert_eq!(ProgressStatus::UpToDate.to_string(), "up-to-date");
        assert_eq!(ProgressStatus::Cloning.to_string(), "cloning");
    }
}
