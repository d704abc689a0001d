/*
[INPUT]:  Runner-owned state bag, event sender, per-task index and title
[OUTPUT]: TaskContext lent to a task for the duration of one run call
[POS]:    Context layer - progress reporting and shared state access
[UPDATE]: When tasks need new ways to talk back to the runner
*/

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::event::{EventSender, RunEvent};
use crate::state::StateBag;

/// The runner's per-task wrapper, as seen from inside a task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    index: usize,
    title: Arc<Mutex<String>>,
    events: EventSender,
}

impl TaskHandle {
    pub fn new(index: usize, title: impl Into<String>, events: EventSender) -> Self {
        Self {
            index,
            title: Arc::new(Mutex::new(title.into())),
            events,
        }
    }

    /// Position of the task inside its run.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Label currently displayed for the task.
    pub fn title(&self) -> String {
        match self.title.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Rename the displayed label. Empty titles are ignored.
    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        if title.trim().is_empty() {
            return;
        }

        match self.title.lock() {
            Ok(mut guard) => *guard = title.clone(),
            Err(poisoned) => *poisoned.into_inner() = title.clone(),
        }
        self.events.emit(RunEvent::TitleChanged {
            index: self.index,
            title,
        });
    }
}

/// Everything a task may use while it runs.
#[derive(Debug)]
pub struct TaskContext<'a> {
    state: &'a mut StateBag,
    handle: &'a TaskHandle,
    events: &'a EventSender,
}

impl<'a> TaskContext<'a> {
    pub fn new(state: &'a mut StateBag, handle: &'a TaskHandle, events: &'a EventSender) -> Self {
        Self {
            state,
            handle,
            events,
        }
    }

    /// Report a human-readable status line. Never fails.
    pub fn update(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(task_index = self.handle.index, message = %message, "task progress");
        self.events.emit(RunEvent::Progress {
            index: self.handle.index,
            message,
        });
    }

    pub fn state(&self) -> &StateBag {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut StateBag {
        self.state
    }

    pub fn handle(&self) -> &TaskHandle {
        self.handle
    }
}
