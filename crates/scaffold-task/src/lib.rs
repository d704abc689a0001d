/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Task contract, context, runner and built-in scaffolding steps
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod error;
pub mod event;
pub mod lifecycle;
pub mod runner;
pub mod state;
pub mod task;
pub mod tasks;

// Re-export the contract surface
pub use task::{Task, TaskContext, TaskHandle};
pub use state::StateBag;

// Re-export runner types
pub use error::{Result, RunnerError};
pub use event::{EventReceiver, EventSender, RunEvent};
pub use lifecycle::{LifecycleAction, LifecycleError, TaskLifecycle, TaskStatus};
pub use runner::{
    InvalidTaskPolicy, Preflight, RetryPolicy, RunReport, RunnerOptions, TaskOutcome, TaskRunner,
};

// Re-export built-in steps
pub use tasks::{CheckToolTask, CommandTask, EnsureDirTask, TemplateTask, WriteFileTask};
