/*
[INPUT]:  Tool name, version flag, optional StateBag key
[OUTPUT]: Reported tool version, stored for later steps
[POS]:    Step layer - environment checks before installs
[UPDATE]: When changing version detection
*/

use std::process::Stdio;

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use tokio::process::Command;

use super::{has_placeholder, resolve_program};
use crate::task::{Task, TaskContext};

const DEFAULT_VERSION_ARG: &str = "--version";

/// Confirms a tool is installed by asking it for its version.
#[derive(Debug, Clone)]
pub struct CheckToolTask {
    description: String,
    program: String,
    version_arg: String,
    store_as: Option<String>,
    mitigation: Option<String>,
}

impl CheckToolTask {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            description: format!("Check {program}"),
            program,
            version_arg: DEFAULT_VERSION_ARG.to_string(),
            store_as: None,
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

    pub fn version_arg(mut self, arg: impl Into<String>) -> Self {
        self.version_arg = arg.into();
        self
    }

    /// Store the detected version line in the state bag under `key`.
    pub fn store_as(mut self, key: impl Into<String>) -> Self {
        self.store_as = Some(key.into());
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
}

#[async_trait]
impl Task for CheckToolTask {
    fn description(&self) -> &str {
        &self.description
    }

    fn is_valid(&self) -> bool {
        has_placeholder(&self.program) || resolve_program(&self.program).is_some()
    }

    fn mitigation_on_error(&self) -> String {
        self.mitigation
            .clone()
            .unwrap_or_else(|| format!("Install `{}` and make sure it is on your PATH.", self.program))
    }

    async fn run(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let program = ctx.state().render(&self.program);
        let version_arg = ctx.state().render(&self.version_arg);
        let output = Command::new(&program)
            .arg(&version_arg)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("run `{program} {version_arg}`"))?;

        if !output.status.success() {
            bail!("`{program} {version_arg}` exited with {}", output.status);
        }

        // some tools (java) print their version on stderr
        let version = first_line(&output.stdout)
            .or_else(|| first_line(&output.stderr))
            .with_context(|| format!("`{program}` printed no version"))?;

        ctx.update(version.clone());
        ctx.handle()
            .set_title(format!("{} ({version})", self.description));

        if let Some(key) = &self.store_as {
            ctx.state_mut()
                .insert(key.clone(), &version)
                .with_context(|| format!("store version under {key}"))?;
        }

        Ok(())
    }
}

fn first_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
