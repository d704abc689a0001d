/*
[INPUT]:  RunEvent stream from TaskRunner
[OUTPUT]: Styled, line-oriented progress output on the terminal
[POS]:    Presentation layer - human-facing view of a run
[UPDATE]: When adding new RunEvent variants or changing output format
*/

use std::collections::HashMap;
use std::time::Duration;

use console::{Term, style};
use scaffold_task::{EventReceiver, RunEvent};
use tokio::task::JoinHandle;

/// Turns events into printable lines. Keeps only what it needs for labels.
#[derive(Debug, Default)]
pub struct LineRenderer {
    total: usize,
    titles: HashMap<usize, String>,
}

impl LineRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, index: usize) -> String {
        format!("[{}/{}]", index + 1, self.total.max(index + 1))
    }

    fn title_for(&self, index: usize, fallback: &str) -> String {
        self.titles
            .get(&index)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn render(&mut self, event: &RunEvent) -> Vec<String> {
        match event {
            RunEvent::RunStarted { total, .. } => {
                self.total = *total;
                vec![style(format!("Running {total} task(s)")).bold().to_string()]
            }
            RunEvent::TaskStarted { index, title } => {
                self.titles.insert(*index, title.clone());
                vec![format!(
                    "{} {} {}",
                    style(self.position(*index)).dim(),
                    style("❯").cyan(),
                    title
                )]
            }
            RunEvent::Progress { message, .. } => {
                vec![format!("    {} {}", style("›").dim(), style(message).dim())]
            }
            RunEvent::TitleChanged { index, title } => {
                self.titles.insert(*index, title.clone());
                Vec::new()
            }
            RunEvent::TaskSkipped {
                index,
                title,
                reason,
            } => vec![format!(
                "{} {} {} {}",
                style(self.position(*index)).dim(),
                style("↓").yellow(),
                title,
                style(format!("[skipped: {reason}]")).yellow()
            )],
            RunEvent::TaskRetrying {
                attempt,
                delay,
                error,
                ..
            } => vec![format!(
                "    {} retry #{attempt} in {}: {error}",
                style("↺").yellow(),
                format_duration(*delay)
            )],
            RunEvent::TaskSucceeded {
                index,
                title,
                elapsed,
            } => {
                let title = self.title_for(*index, title);
                vec![format!(
                    "{} {} {} {}",
                    style(self.position(*index)).dim(),
                    style("✔").green(),
                    title,
                    style(format!("({})", format_duration(*elapsed))).dim()
                )]
            }
            RunEvent::TaskFailed {
                index,
                title,
                error,
                mitigation,
            } => vec![
                format!(
                    "{} {} {}",
                    style(self.position(*index)).dim(),
                    style("✖").red(),
                    style(title).red()
                ),
                format!("    {}", style(error).red()),
                format!("    {} {}", style("→").bold(), style(mitigation).bold()),
            ],
            RunEvent::RunFinished {
                succeeded,
                failed,
                skipped,
                cancelled,
                ..
            } => {
                let summary = format!(
                    "{succeeded} succeeded, {failed} failed, {skipped} skipped, {cancelled} cancelled"
                );
                let line = if *failed == 0 && *cancelled == 0 {
                    style(format!("Done: {summary}")).green().bold()
                } else {
                    style(format!("Stopped: {summary}")).red().bold()
                };
                vec![String::new(), line.to_string()]
            }
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// Print every event until the sender side is dropped.
pub fn spawn_renderer(mut rx: EventReceiver, term: Term) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = LineRenderer::new();
        while let Some(event) = rx.recv().await {
            for line in renderer.render(&event) {
                if let Err(err) = term.write_line(&line) {
                    tracing::warn!(error = %err, "failed to write progress line");
                }
            }
        }
    })
}
