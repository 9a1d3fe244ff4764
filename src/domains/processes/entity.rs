use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One registered agent process. Primary key is the pid; a row whose pid is
/// dead is never returned to callers and is pruned on the read that
/// discovers it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackgroundProcess {
    pub pid: i32,
    pub command: String,
    pub description: String,
    pub session_name: String,
    pub start_time: DateTime<Utc>,
}
