pub mod cli;
pub mod domains;
pub mod errors;
pub mod infrastructure;
pub mod utils;

pub use domains::processes::{
    BackgroundProcess, KillOutcome, ProcessProbe, ProcessRegistry, UnixProcessProbe,
};
pub use domains::repos::progress::{ProgressEvent, ProgressSink, ProgressState, ProgressStatus};
pub use domains::repos::spec::RepoSpec;
pub use domains::repos::sync;
pub use domains::sessions::{
    DisplayMode, ResumeController, ResumeUi, Session, SubprocessAgentRunner,
};
pub use errors::WerkbankError;
pub use infrastructure::database::Database;
