/*
[INPUT]:  Plan path, run flags, Settings, shutdown token
[OUTPUT]: Executed plan with rendered progress and optional JSON report
[POS]:    CLI run layer - wires plan, runner and renderer together
[UPDATE]: When run flags or the report format change
*/

use anyhow::{Context, Result};
use console::{Term, style};
use dialoguer::{Confirm, theme::ColorfulTheme};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scaffold_cli::render::spawn_renderer;
use scaffold_cli::{Plan, Settings};
use scaffold_task::{InvalidTaskPolicy, RunReport, RunnerOptions, TaskRunner, event};

#[derive(Debug)]
pub struct RunArgs {
    pub plan_path: PathBuf,
    pub dry_run: bool,
    pub assume_yes: bool,
    pub continue_on_error: bool,
    pub report_path: Option<PathBuf>,
}

/// Returns whether every task succeeded (or was skipped).
pub async fn run_plan(
    args: RunArgs,
    settings: &Settings,
    shutdown: CancellationToken,
) -> Result<bool> {
    let plan = load_plan(&args.plan_path)?;
    let mut options = plan.runner_options(settings.default_task_timeout());
    options.dry_run = args.dry_run;
    options.continue_on_error |= args.continue_on_error;

    info!(
        plan = %plan.name,
        task_count = plan.tasks.len(),
        dry_run = options.dry_run,
        "plan loaded"
    );

    let (events, rx) = event::channel();
    let mut runner = TaskRunner::new(options)
        .with_events(events)
        .with_shutdown(shutdown.clone());
    runner.extend(plan.build_tasks());

    if !args.assume_yes && !args.dry_run && Term::stdout().is_term() {
        let confirmed = confirm_run(&plan, &runner)?;
        if !should_start(confirmed, &shutdown) {
            println!("{}", style("Nothing was run.").yellow());
            return Ok(!shutdown.is_cancelled());
        }
    }

    let renderer = spawn_renderer(rx, Term::stdout());
    let mut state = plan.initial_state();
    let report = runner.run(&mut state).await;

    // closes the event channel so the renderer drains and exits
    drop(runner);
    if let Err(err) = renderer.await {
        warn!(error = %err, "progress renderer stopped unexpectedly");
    }

    if let Some(path) = &args.report_path {
        write_report(path, &report)?;
    }

    Ok(report.is_success())
}

/// Print each task with its current validity.
pub fn list_plan(plan_path: &Path) -> Result<()> {
    let plan = load_plan(plan_path)?;
    let mut runner = TaskRunner::new(RunnerOptions::default());
    runner.extend(plan.build_tasks());

    println!("{} {}", style("Plan").bold(), style(&plan.name).cyan());
    for item in runner.preflight() {
        let status = if item.valid {
            style("ready".to_string()).green()
        } else {
            match plan.options.on_invalid {
                InvalidTaskPolicy::Skip => style("will be skipped".to_string()).yellow(),
                InvalidTaskPolicy::Fail => style("will fail".to_string()).red(),
            }
        };
        println!("  {:>2}. {} [{}]", item.index + 1, item.title, status);
    }
    Ok(())
}

fn load_plan(path: &Path) -> Result<Plan> {
    Plan::from_file(path).with_context(|| format!("load plan {}", path.display()))
}

fn confirm_run(plan: &Plan, runner: &TaskRunner) -> Result<bool> {
    println!("{} {}", style("Plan").bold(), style(&plan.name).cyan());
    for (index, description) in runner.descriptions().into_iter().enumerate() {
        println!("  {:>2}. {description}", index + 1);
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Run {} task(s) now?", runner.len()))
        .default(true)
        .interact()?;
    Ok(confirmed)
}

/// Ctrl-C while the prompt blocks only cancels the token, so check it here.
fn should_start(confirmed: bool, shutdown: &CancellationToken) -> bool {
    confirmed && !shutdown.is_cancelled()
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("write run report to {}", path.display()))?;
    info!(path = %path.display(), "run report written");
    Ok(())
}
