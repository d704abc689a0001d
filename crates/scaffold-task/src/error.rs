/*
[INPUT]:  Task run failures, runner timeouts, cancellation
[OUTPUT]: Structured runner errors with retry hints
[POS]:    Error handling layer - runner-level error type
[UPDATE]: When the runner gains new failure modes
*/

use std::time::Duration;

use thiserror::Error;

/// Why a task did not succeed.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The task's run returned an error
    #[error("{title} failed: {source:#}")]
    TaskFailed {
        title: String,
        #[source]
        source: anyhow::Error,
    },

    /// Preconditions did not hold and the runner was told to fail fast
    #[error("{title} is not valid in this environment")]
    Invalid { title: String },

    /// The task did not settle in time
    #[error("{title} timed out after {after:?}")]
    Timeout { title: String, after: Duration },

    /// The task panicked while running
    #[error("{title} panicked: {message}")]
    Panicked { title: String, message: String },

    /// The run was cancelled while the task was pending or in flight
    #[error("run cancelled")]
    Cancelled,
}

impl RunnerError {
    /// Check if another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RunnerError::TaskFailed { .. } | RunnerError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;
