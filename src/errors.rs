use serde::Serialize;
use std::fmt;

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", content = "data")]
pub enum WerkbankError {
    SessionNotFound {
        name: String,
    },
    SessionAlreadyExists {
        name: String,
    },
    CloneFailed {
        repo: String,
        exit_code: Option<i32>,
        output_tail: Vec<String>,
    },
    RecloneFailed {
        repo: String,
        message: String,
    },
    GitOperationFailed {
        operation: String,
        message: String,
    },
    InvalidRepoSpec {
        spec: String,
        message: String,
    },
    AgentLaunchFailed {
        command: String,
        message: String,
    },
    DatabaseError {
        message: String,
    },
    IoError {
        operation: String,
        path: String,
        message: String,
    },
}

impl WerkbankError {
    pub fn git(operation: &str, error: impl ToString) -> Self {
        WerkbankError::GitOperationFailed {
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }

    pub fn io(operation: &str, path: impl ToString, error: impl ToString) -> Self {
        WerkbankError::IoError {
            operation: operation.to_string(),
            path: path.to_string(),
            message: error.to_string(),
        }
    }

    pub fn invalid_spec(spec: &str, message: impl ToString) -> Self {
        WerkbankError::InvalidRepoSpec {
            spec: spec.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for WerkbankError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SessionNotFound { name } => {
                write!(f, "Session '{name}' not found")
            }
            Self::SessionAlreadyExists { name } => {
                write!(f, "Session '{name}' already exists")
            }
            Self::CloneFailed {
                repo,
                exit_code,
                output_tail,
            } => {
                let code = exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                if output_tail.is_empty() {
                    write!(f, "Clone of '{repo}' failed (exit code {code})")
                } else {
                    write!(
                        f,
                        "Clone of '{repo}' failed (exit code {code}): {}",
                        output_tail.join(" | ")
                    )
                }
            }
            Self::RecloneFailed { repo, message } => {
                write!(f, "Reclone of '{repo}' failed: {message}")
            }
            Self::GitOperationFailed { operation, message } => {
                write!(f, "Git operation '{operation}' failed: {message}")
            }
            Self::InvalidRepoSpec { spec, message } => {
                write!(f, "Invalid repo spec '{spec}': {message}")
            }
            Self::AgentLaunchFailed { command, message } => {
                write!(f, "Failed to launch agent '{command}': {message}")
            }
            Self::DatabaseError { message } => {
                write!(f, "Database error: {message}")
            }
            Self::IoError {
                operation,
                path,
                message,
            } => {
                write!(f, "I/O error during '{operation}' on '{path}': {message}")
            }
        }
    }
}

impl std::error::Error for WerkbankError {}

impl From<WerkbankError> for String {
    fn from(error: WerkbankError) -> Self {
        error.to_string()
    }
}
