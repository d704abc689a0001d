/*
[INPUT]:  Directory path (may contain StateBag placeholders)
[OUTPUT]: Existing directory tree
[POS]:    Step layer - filesystem preparation
[UPDATE]: When changing directory creation semantics
*/

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use tokio::fs;

use super::{has_placeholder, render_path};
use crate::task::{Task, TaskContext};

#[derive(Debug, Clone)]
pub struct EnsureDirTask {
    description: String,
    path: PathBuf,
}

impl EnsureDirTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            description: format!("Create {}", path.display()),
            path,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.trim().is_empty() {
            self.description = description;
        }
        self
    }
}

#[async_trait]
impl Task for EnsureDirTask {
    fn description(&self) -> &str {
        &self.description
    }

    fn is_valid(&self) -> bool {
        has_placeholder(&self.path.to_string_lossy()) || !self.path.exists() || self.path.is_dir()
    }

    fn mitigation_on_error(&self) -> String {
        format!(
            "Check that you have write permission for {} and that no file is in the way.",
            self.path.display()
        )
    }

    async fn run(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let path = render_path(ctx.state(), &self.path);
        if path.is_dir() {
            ctx.update(format!("{} already exists", path.display()));
            return Ok(());
        }
        if path.exists() {
            bail!("{} exists and is not a directory", path.display());
        }

        fs::create_dir_all(&path)
            .await
            .with_context(|| format!("create directory {}", path.display()))?;
        ctx.update(format!("created {}", path.display()));
        Ok(())
    }
}
