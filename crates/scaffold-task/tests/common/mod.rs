/*
[INPUT]:  Behaviour knobs for test doubles
[OUTPUT]: StubTask implementing the Task contract, event collection helpers
[POS]:    Test infrastructure - shared across runner and contract tests
[UPDATE]: When tests need new stub behaviours
*/

//! Common test utilities for scaffold-task tests

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use scaffold_task::{EventReceiver, RunEvent, Task, TaskContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Behaviour {
    Succeed,
    Fail,
    /// Fail this many times, then succeed
    FailTimes(u32),
    Panic,
    Sleep(Duration),
}

/// Configurable test double.
#[derive(Debug, Clone)]
pub struct StubTask {
    pub description: String,
    pub valid: bool,
    pub behaviour: Behaviour,
    pub writes: Option<(String, String)>,
    pub runs: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl StubTask {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            valid: true,
            behaviour: Behaviour::Succeed,
            writes: None,
            runs: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }

    pub fn behaving(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn writing(mut self, key: &str, value: &str) -> Self {
        self.writes = Some((key.to_string(), value.to_string()));
        self
    }

    pub fn run_count(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn boxed(&self) -> Box<dyn Task> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl Task for StubTask {
    fn description(&self) -> &str {
        &self.description
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn mitigation_on_error(&self) -> String {
        format!("try {} again", self.description)
    }

    async fn run(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let attempt = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.update(format!("attempt {attempt}"));

        if let Some((key, value)) = &self.writes {
            ctx.state_mut().insert(key.clone(), value)?;
        }

        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => anyhow::bail!("{} broke", self.description),
            Behaviour::FailTimes(n) if attempt <= n => anyhow::bail!("flaky attempt {attempt}"),
            Behaviour::FailTimes(_) => Ok(()),
            Behaviour::Panic => panic!("stub panic"),
            Behaviour::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }
}

/// Drain every event currently queued.
#[allow(dead_code)]
pub fn drain(rx: &mut EventReceiver) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
