/*
[INPUT]:  Concrete scaffolding steps implementing the Task trait
[OUTPUT]: Uniform capability set the runner sequences
[POS]:    Task domain layer - contract between steps and the runner
[UPDATE]: When the contract gains or loses an operation
*/

pub mod context;

use async_trait::async_trait;

pub use context::{TaskContext, TaskHandle};

/// A single unit of work executed by a [`crate::TaskRunner`].
///
/// Implementations carry no shared base state. The runner decides what to do
/// with an invalid task or a failed run; a task never retries itself.
#[async_trait]
pub trait Task: Send + Sync {
    /// Label shown in progress output. Must be non-empty and stable.
    fn description(&self) -> &str;

    /// Whether the task's preconditions hold right now.
    ///
    /// Called before `run`. Must not touch the filesystem beyond reads, and
    /// must not mutate shared state.
    fn is_valid(&self) -> bool;

    /// Guidance shown to the user when `run` fails.
    fn mitigation_on_error(&self) -> String;

    /// Perform the effect. Failure is reported through the error, never
    /// through a partially-successful return.
    async fn run(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: Task + ?Sized> Task for Box<T> {
    fn description(&self) -> &str {
        (**self).description()
    }

    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn mitigation_on_error(&self) -> String {
        (**self).mitigation_on_error()
    }

    async fn run(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        (**self).run(ctx).await
    }
}
