/*
[INPUT]:  Program, arguments, working directory, environment, StateBag placeholders
[OUTPUT]: Child process run to completion with output streamed as progress
[POS]:    Step layer - install/build steps backed by external tools
[UPDATE]: When changing how child output is reported or failures are described
*/

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::{has_placeholder, render_path, resolve_program};
use crate::task::{Task, TaskContext};

/// Runs an external program, e.g. `gem install cocoapods`.
#[derive(Debug, Clone)]
pub struct CommandTask {
    description: String,
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    mitigation: Option<String>,
}

impl CommandTask {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            description: format!("Run {program}"),
            program,
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            mitigation: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.trim().is_empty() {
            self.description = description;
        }
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Blank hints are ignored; the default hint stays in place.
    pub fn with_mitigation(mut self, mitigation: impl Into<String>) -> Self {
        let mitigation = mitigation.into();
        if !mitigation.trim().is_empty() {
            self.mitigation = Some(mitigation);
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Task for CommandTask {
    fn description(&self) -> &str {
        &self.description
    }

    fn is_valid(&self) -> bool {
        if !has_placeholder(&self.program) && resolve_program(&self.program).is_none() {
            return false;
        }
        match &self.cwd {
            Some(cwd) if !has_placeholder(&cwd.to_string_lossy()) => cwd.is_dir(),
            _ => true,
        }
    }

    fn mitigation_on_error(&self) -> String {
        self.mitigation.clone().unwrap_or_else(|| {
            format!(
                "Make sure `{}` is installed and on your PATH, then run `{}` by hand to see the full output.",
                self.program,
                self.command_line()
            )
        })
    }

    async fn run(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let program = ctx.state().render(&self.program);
        let args: Vec<String> = self.args.iter().map(|arg| ctx.state().render(arg)).collect();

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(render_path(ctx.state(), cwd));
        }
        for (key, value) in &self.env {
            command.env(key, ctx.state().render(value));
        }

        debug!(program = %program, ?args, "spawning command");
        let mut child = command
            .spawn()
            .with_context(|| format!("spawn `{program}`"))?;

        let stdout = child.stdout.take().context("child stdout not captured")?;
        let stderr = child.stderr.take().context("child stderr not captured")?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_done, mut err_done) = (false, false);
        let mut last_stderr: Option<String> = None;

        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line.context("read stdout")? {
                    Some(line) if !line.trim().is_empty() => ctx.update(line),
                    Some(_) => {}
                    None => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line.context("read stderr")? {
                    Some(line) if !line.trim().is_empty() => {
                        ctx.update(line.clone());
                        last_stderr = Some(line);
                    }
                    Some(_) => {}
                    None => err_done = true,
                },
            }
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("wait for `{program}`"))?;
        if !status.success() {
            let code = status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            match last_stderr {
                Some(line) => bail!("`{program}` exited with {code}: {line}"),
                None => bail!("`{program}` exited with {code}"),
            }
        }

        Ok(())
    }
}
