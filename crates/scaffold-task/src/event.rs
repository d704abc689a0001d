/*
[INPUT]:  Runner lifecycle transitions and task progress reports
[OUTPUT]: RunEvent stream consumed by renderers
[POS]:    Event layer - decouples task execution from presentation
[UPDATE]: When adding new run-level or task-level notifications
*/

use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Everything a renderer needs to draw the progress of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        total: usize,
    },
    TaskStarted {
        index: usize,
        title: String,
    },
    /// Free-form status line reported by a task through its context
    Progress {
        index: usize,
        message: String,
    },
    /// A task renamed its displayed label
    TitleChanged {
        index: usize,
        title: String,
    },
    TaskSkipped {
        index: usize,
        title: String,
        reason: String,
    },
    TaskRetrying {
        index: usize,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    TaskSucceeded {
        index: usize,
        title: String,
        elapsed: Duration,
    },
    TaskFailed {
        index: usize,
        title: String,
        error: String,
        mitigation: String,
    },
    RunFinished {
        run_id: Uuid,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        cancelled: usize,
    },
}

pub type EventReceiver = mpsc::UnboundedReceiver<RunEvent>;

/// Fire-and-forget sender. A dropped receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl EventSender {
    /// Sender that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx: Some(tx) }, rx)
}
