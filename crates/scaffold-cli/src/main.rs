/*
[INPUT]:  CLI arguments, settings layers, YAML plan file, OS shutdown signals
[OUTPUT]: Executed scaffolding plan with progress output and exit status
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

mod cli;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use scaffold_cli::Settings;

#[derive(Parser, Debug)]
#[command(name = "scaffold", version, about = "Run scaffolding plans step by step")]
struct Cli {
    /// Overrides the log level from settings (tracing filter syntax)
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    log_level: Option<String>,
    /// Extra settings file layered over the user settings
    #[arg(long = "settings", value_name = "PATH", global = true)]
    settings_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every task of a plan in order
    Run {
        #[arg(long = "plan", value_name = "PATH")]
        plan_path: PathBuf,
        /// Check preconditions only; nothing is executed
        #[arg(long = "dry-run")]
        dry_run: bool,
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
        #[arg(long = "continue-on-error")]
        continue_on_error: bool,
        /// Write a JSON run report here
        #[arg(long = "report", value_name = "PATH")]
        report_path: Option<PathBuf>,
    },
    /// Show the tasks of a plan and whether they can run here
    List {
        #[arg(long = "plan", value_name = "PATH")]
        plan_path: PathBuf,
    },
    /// Interactively create a new plan file
    Init {
        #[arg(long = "output", value_name = "PATH", default_value = "scaffold.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    let mut settings =
        Settings::load(args.settings_path.as_deref()).context("load settings")?;
    if let Some(level) = &args.log_level {
        settings.log_level = level.clone();
    }
    console::set_colors_enabled(settings.color && console::colors_enabled());

    let _log_guard = init_tracing(&settings)?;
    info!(log_level = %settings.log_level, "starting scaffold");

    match args.command {
        Command::Run {
            plan_path,
            dry_run,
            yes,
            continue_on_error,
            report_path,
        } => {
            let shutdown = CancellationToken::new();
            setup_signal_handlers(shutdown.clone());
            let options = cli::run::RunArgs {
                plan_path,
                dry_run,
                assume_yes: yes || settings.assume_yes,
                continue_on_error,
                report_path,
            };
            let success = cli::run::run_plan(options, &settings, shutdown).await?;
            Ok(if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::List { plan_path } => {
            cli::run::list_plan(&plan_path)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Init { output } => {
            cli::init::run_init(output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(settings: &Settings) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&settings.log_level).context("invalid log level")?;
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(settings.color);

    let (file_layer, guard) = match &settings.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "scaffold.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(guard)
}

/// Ctrl-C and SIGTERM cancel the run; the task in flight is dropped.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let on_interrupt = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupted, cancelling remaining tasks");
                on_interrupt.cancel();
            }
            Err(err) => warn!(error = %err, "could not listen for Ctrl-C"),
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    if stream.recv().await.is_some() {
                        warn!("terminated, cancelling remaining tasks");
                        shutdown.cancel();
                    }
                });
            }
            Err(err) => warn!(error = %err, "could not listen for SIGTERM"),
        }
    }
}
