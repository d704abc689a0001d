/*
[INPUT]:  Ordered Box<dyn Task> list, RunnerOptions, caller-owned StateBag, CancellationToken
[OUTPUT]: RunReport with one TaskOutcome per task, RunEvent stream
[POS]:    Execution layer - sequences heterogeneous tasks and interprets failures
[UPDATE]: When changing skip/fail/retry/timeout/cancellation semantics
*/

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::RunnerError;
use crate::event::{EventSender, RunEvent};
use crate::lifecycle::{LifecycleAction, TaskLifecycle, TaskStatus};
use crate::state::StateBag;
use crate::task::{Task, TaskContext, TaskHandle};

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const MAX_BACKOFF_EXPONENT: u32 = 16;

pub const SKIP_REASON_INVALID: &str = "preconditions not met";
pub const SKIP_REASON_DRY_RUN: &str = "dry run";

/// What to do with a task whose `is_valid` returns false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidTaskPolicy {
    /// Report the task as skipped and move on
    #[default]
    Skip,
    /// Treat the task as failed without running it
    Fail,
}

/// Exponential backoff between attempts of a failing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, clamped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(MAX_BACKOFF_EXPONENT));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    pub invalid_policy: InvalidTaskPolicy,
    /// Keep going after a failed task instead of cancelling the rest
    pub continue_on_error: bool,
    pub retry: RetryPolicy,
    pub task_timeout: Option<Duration>,
    /// Validate only; never call `run`
    pub dry_run: bool,
}

/// Result of one task within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub index: usize,
    pub title: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigation: Option<String>,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<TaskOutcome>,
}

impl RunReport {
    fn count(&self, status: TaskStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(TaskStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TaskStatus::Skipped)
    }

    pub fn cancelled(&self) -> usize {
        self.count(TaskStatus::Cancelled)
    }

    /// No task failed and nothing was cancelled.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.cancelled() == 0
    }

    pub fn first_failure(&self) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.status == TaskStatus::Failed)
    }
}

/// Validity of a task as seen before running anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub index: usize,
    pub title: String,
    pub valid: bool,
}

/// Sequential runner for heterogeneous tasks.
pub struct TaskRunner {
    tasks: Vec<Box<dyn Task>>,
    options: RunnerOptions,
    events: EventSender,
    shutdown: CancellationToken,
}

impl TaskRunner {
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            tasks: Vec::new(),
            options,
            events: EventSender::disabled(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Share cancellation with an outer token, e.g. one wired to Ctrl-C.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn push(&mut self, task: Box<dyn Task>) {
        self.tasks.push(task);
    }

    pub fn extend(&mut self, tasks: impl IntoIterator<Item = Box<dyn Task>>) {
        self.tasks.extend(tasks);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn descriptions(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.description()).collect()
    }

    /// Evaluate `is_valid` for every task without running anything.
    pub fn preflight(&self) -> Vec<Preflight> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| Preflight {
                index,
                title: task.description().to_string(),
                valid: task.is_valid(),
            })
            .collect()
    }

    /// Cancelling this token interrupts the task in flight and cancels the rest.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run every task in order. Always returns a report.
    pub async fn run(&self, state: &mut StateBag) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        let mut halted = false;

        info!(%run_id, total = self.tasks.len(), dry_run = self.options.dry_run, "run starting");
        self.events.emit(RunEvent::RunStarted {
            run_id,
            total: self.tasks.len(),
        });

        for (index, task) in self.tasks.iter().enumerate() {
            if halted || self.shutdown.is_cancelled() {
                outcomes.push(self.cancelled_outcome(index, task.description()));
                continue;
            }

            let outcome = self.run_task(run_id, index, &**task, state).await;
            match outcome.status {
                TaskStatus::Failed if !self.options.continue_on_error => halted = true,
                TaskStatus::Cancelled => halted = true,
                _ => {}
            }
            outcomes.push(outcome);
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };

        info!(
            %run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            cancelled = report.cancelled(),
            "run finished"
        );
        self.events.emit(RunEvent::RunFinished {
            run_id,
            succeeded: report.succeeded(),
            failed: report.failed(),
            skipped: report.skipped(),
            cancelled: report.cancelled(),
        });

        report
    }

    async fn run_task(
        &self,
        run_id: Uuid,
        index: usize,
        task: &dyn Task,
        state: &mut StateBag,
    ) -> TaskOutcome {
        let title = task.description().to_string();
        let mut lifecycle = TaskLifecycle::new();

        if !task.is_valid() {
            return match self.options.invalid_policy {
                InvalidTaskPolicy::Skip => {
                    self.skip(&mut lifecycle, index, title, SKIP_REASON_INVALID)
                }
                InvalidTaskPolicy::Fail => {
                    let status = advance(&mut lifecycle, LifecycleAction::Fail);
                    let err = RunnerError::Invalid {
                        title: title.clone(),
                    };
                    self.fail(run_id, index, title, status, 0, Duration::ZERO, task, &err)
                }
            };
        }
        advance(&mut lifecycle, LifecycleAction::Validate);

        if self.options.dry_run {
            return self.skip(&mut lifecycle, index, title, SKIP_REASON_DRY_RUN);
        }

        let handle = TaskHandle::new(index, title.clone(), self.events.clone());
        let started = Instant::now();
        advance(&mut lifecycle, LifecycleAction::Start);

        info!(%run_id, task_index = index, title = %title, "task starting");
        self.events.emit(RunEvent::TaskStarted {
            index,
            title: title.clone(),
        });

        let mut retry = 0_u32;
        loop {
            let result = self.run_once(task, state, &handle).await;

            let err = match result {
                Ok(()) => {
                    let status = advance(&mut lifecycle, LifecycleAction::Succeed);
                    let elapsed = started.elapsed();
                    let title = handle.title();
                    info!(
                        %run_id,
                        task_index = index,
                        title = %title,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "task succeeded"
                    );
                    self.events.emit(RunEvent::TaskSucceeded {
                        index,
                        title: title.clone(),
                        elapsed,
                    });
                    return TaskOutcome {
                        index,
                        title,
                        status,
                        attempts: lifecycle.attempts(),
                        elapsed_ms: elapsed.as_millis() as u64,
                        reason: None,
                        error: None,
                        mitigation: None,
                    };
                }
                Err(err) => err,
            };

            if matches!(err, RunnerError::Cancelled) {
                let status = advance(&mut lifecycle, LifecycleAction::Cancel);
                warn!(%run_id, task_index = index, "task cancelled in flight");
                return TaskOutcome {
                    index,
                    title: handle.title(),
                    status,
                    attempts: lifecycle.attempts(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    reason: Some(err.to_string()),
                    error: None,
                    mitigation: None,
                };
            }

            if err.is_retryable() && retry < self.options.retry.max_retries {
                let delay = self.options.retry.delay_for(retry);
                retry += 1;
                warn!(
                    %run_id,
                    task_index = index,
                    attempt = retry,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "task failed, retrying"
                );
                self.events.emit(RunEvent::TaskRetrying {
                    index,
                    attempt: retry,
                    delay,
                    error: err.to_string(),
                });

                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        let status = advance(&mut lifecycle, LifecycleAction::Cancel);
                        return TaskOutcome {
                            index,
                            title: handle.title(),
                            status,
                            attempts: lifecycle.attempts(),
                            elapsed_ms: started.elapsed().as_millis() as u64,
                            reason: Some(RunnerError::Cancelled.to_string()),
                            error: Some(err.to_string()),
                            mitigation: None,
                        };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                advance(&mut lifecycle, LifecycleAction::Retry);
                continue;
            }

            let status = advance(&mut lifecycle, LifecycleAction::Fail);
            return self.fail(
                run_id,
                index,
                handle.title(),
                status,
                lifecycle.attempts(),
                started.elapsed(),
                task,
                &err,
            );
        }
    }

    async fn run_once(
        &self,
        task: &dyn Task,
        state: &mut StateBag,
        handle: &TaskHandle,
    ) -> Result<(), RunnerError> {
        let title = handle.title();
        let mut ctx = TaskContext::new(state, handle, &self.events);
        let guarded = AssertUnwindSafe(task.run(&mut ctx)).catch_unwind();

        let settled = async {
            match self.options.task_timeout {
                Some(after) => tokio::time::timeout(after, guarded).await.map_err(|_| {
                    RunnerError::Timeout {
                        title: title.clone(),
                        after,
                    }
                }),
                None => Ok(guarded.await),
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(RunnerError::Cancelled),
            res = settled => match res? {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(RunnerError::TaskFailed { title: title.clone(), source }),
                Err(payload) => Err(RunnerError::Panicked {
                    title: title.clone(),
                    message: panic_message(payload.as_ref()),
                }),
            },
        }
    }

    fn skip(
        &self,
        lifecycle: &mut TaskLifecycle,
        index: usize,
        title: String,
        reason: &str,
    ) -> TaskOutcome {
        let status = advance(lifecycle, LifecycleAction::Skip);
        info!(task_index = index, title = %title, reason, "task skipped");
        self.events.emit(RunEvent::TaskSkipped {
            index,
            title: title.clone(),
            reason: reason.to_string(),
        });
        TaskOutcome {
            index,
            title,
            status,
            attempts: 0,
            elapsed_ms: 0,
            reason: Some(reason.to_string()),
            error: None,
            mitigation: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fail(
        &self,
        run_id: Uuid,
        index: usize,
        title: String,
        status: TaskStatus,
        attempts: u32,
        elapsed: Duration,
        task: &dyn Task,
        err: &RunnerError,
    ) -> TaskOutcome {
        let mitigation = task.mitigation_on_error();
        error!(
            %run_id,
            task_index = index,
            title = %title,
            error = %err,
            mitigation = %mitigation,
            "task failed"
        );
        self.events.emit(RunEvent::TaskFailed {
            index,
            title: title.clone(),
            error: err.to_string(),
            mitigation: mitigation.clone(),
        });
        TaskOutcome {
            index,
            title,
            status,
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
            reason: None,
            error: Some(err.to_string()),
            mitigation: Some(mitigation),
        }
    }

    fn cancelled_outcome(&self, index: usize, title: &str) -> TaskOutcome {
        TaskOutcome {
            index,
            title: title.to_string(),
            status: TaskStatus::Cancelled,
            attempts: 0,
            elapsed_ms: 0,
            reason: Some("not run".to_string()),
            error: None,
            mitigation: None,
        }
    }
}

/// Apply `action`, returning the status the outcome should report.
fn advance(lifecycle: &mut TaskLifecycle, action: LifecycleAction) -> TaskStatus {
    let result = lifecycle.transition(action);
    debug_assert!(result.is_ok(), "{result:?}");
    match result {
        Ok(status) => status,
        Err(err) => {
            error!(error = %err, "task lifecycle out of sync");
            lifecycle.state()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
