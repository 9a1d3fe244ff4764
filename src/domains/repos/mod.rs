pub mod progress;
pub mod spec;
pub mod sync;

pub use progress::{ProgressEvent, ProgressSink, ProgressState, ProgressStatus};
pub use spec::{RepoSpec, repo_sets_match};
pub use sync::{DirtyReport, RefreshResult, RefreshStatus};
