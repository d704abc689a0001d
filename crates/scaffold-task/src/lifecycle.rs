/*
[INPUT]:  TaskStatus, LifecycleAction emitted by the runner
[OUTPUT]: Validated lifecycle transitions for a single task of a run
[POS]:    Task domain logic - state machine for run bookkeeping
[UPDATE]: When task statuses or allowed transitions change
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a task is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Validated,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled
        )
    }
}

/// Actions that can trigger lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Validate,
    Start,
    Retry,
    Succeed,
    Fail,
    Skip,
    Cancel,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid transition: {from:?} -> {action:?}")]
    InvalidTransition {
        from: TaskStatus,
        action: LifecycleAction,
    },
}

/// State machine tracking one task through a run.
#[derive(Debug, Clone)]
pub struct TaskLifecycle {
    current: TaskStatus,
    attempts: u32,
}

impl TaskLifecycle {
    pub fn new() -> Self {
        Self {
            current: TaskStatus::Pending,
            attempts: 0,
        }
    }

    pub fn can_transition(&self, action: LifecycleAction) -> bool {
        self.next_state(action).is_some()
    }

    fn next_state(&self, action: LifecycleAction) -> Option<TaskStatus> {
        use LifecycleAction as A;
        use TaskStatus as S;

        match (self.current, action) {
            (S::Pending, A::Validate) => Some(S::Validated),
            (S::Pending | S::Validated, A::Start) => Some(S::Running),
            (S::Running, A::Retry) => Some(S::Running),
            (S::Running, A::Succeed) => Some(S::Succeeded),
            // Pending fails only when preconditions are enforced
            (S::Pending | S::Running, A::Fail) => Some(S::Failed),
            (S::Pending | S::Validated, A::Skip) => Some(S::Skipped),
            (S::Pending | S::Validated | S::Running, A::Cancel) => Some(S::Cancelled),
            _ => None,
        }
    }

    pub fn transition(&mut self, action: LifecycleAction) -> Result<TaskStatus, LifecycleError> {
        let Some(next) = self.next_state(action) else {
            return Err(LifecycleError::InvalidTransition {
                from: self.current,
                action,
            });
        };

        if matches!(action, LifecycleAction::Start | LifecycleAction::Retry) {
            self.attempts += 1;
        }
        self.current = next;
        Ok(next)
    }

    pub fn state(&self) -> TaskStatus {
        self.current
    }

    /// Number of times `run` has been entered.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for TaskLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
