//! Error types for the engine.
//!
//! Task failures are data, not errors: they travel through `TaskUpdate` and
//! only become an `Error::TasksFailed` at the suite boundary.

use thiserror::Error;

/// A task definition that cannot be run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("task running `{command}` has no name")]
    MissingName { command: String },

    #[error("task '{label}' has no command")]
    MissingCommand { label: String },

    #[error("line {line}: expected `group/name: command`, got `{text}`")]
    Malformed { line: usize, text: String },
}

/// Errors surfaced by a suite run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid task: {0}")]
    Spec(#[from] SpecError),

    /// Tasks ran and at least one of them failed.
    #[error("one or more tasks failed (exit code {exit_code})")]
    TasksFailed { exit_code: i32 },

    #[error("terminal error: {0}")]
    Terminal(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error: the task verdict for failed runs,
    /// 2 for anything that stopped the engine itself.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::TasksFailed { exit_code } => *exit_code,
            _ => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_failed_carries_its_exit_code() {
        let err = Error::TasksFailed { exit_code: 1 };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "one or more tasks failed (exit code 1)");
    }

    #[test]
    fn engine_errors_map_to_exit_code_two() {
        let err = Error::from(SpecError::MissingCommand {
            label: "build/app".into(),
        });
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("build/app"));
    }
}
