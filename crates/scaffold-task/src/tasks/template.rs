/*
[INPUT]:  Template directory, destination directory, StateBag placeholders
[OUTPUT]: New project tree with placeholders rendered in paths and text files
[POS]:    Step layer - project instantiation from a template
[UPDATE]: When changing which files are rendered or copied verbatim
*/

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use tokio::fs;
use walkdir::WalkDir;

use super::{has_placeholder, render_path};
use crate::state::StateBag;
use crate::task::{Task, TaskContext};

/// Copies a template tree, rendering `{{key}}` placeholders.
///
/// Text files are rendered; anything that is not valid UTF-8 is copied as is.
/// File and directory names are rendered too, so `{{project_name}}.xcodeproj`
/// becomes `MyApp.xcodeproj`.
#[derive(Debug, Clone)]
pub struct TemplateTask {
    description: String,
    source: PathBuf,
    destination: PathBuf,
}

impl TemplateTask {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let destination = destination.into();
        Self {
            description: format!("Create project in {}", destination.display()),
            source,
            destination,
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
impl Task for TemplateTask {
    fn description(&self) -> &str {
        &self.description
    }

    fn is_valid(&self) -> bool {
        if !self.source.is_dir() || nested_in(&self.source, &self.destination).is_some() {
            return false;
        }
        has_placeholder(&self.destination.to_string_lossy()) || is_empty_or_missing(&self.destination)
    }

    fn mitigation_on_error(&self) -> String {
        format!(
            "Make sure the template {} exists, and that {} is outside it and is empty or does not exist yet.",
            self.source.display(),
            self.destination.display()
        )
    }

    async fn run(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let destination = render_path(ctx.state(), &self.destination);
        if !is_empty_or_missing(&destination) {
            bail!("{} is not empty", destination.display());
        }

        let source = self.source.clone();
        let skip = nested_in(&source, &destination);
        let entries = tokio::task::spawn_blocking(move || list_template(&source, skip.as_deref()))
            .await
            .context("template walk task failed")??;

        fs::create_dir_all(&destination)
            .await
            .with_context(|| format!("create directory {}", destination.display()))?;

        let mut copied = 0_usize;
        for (relative, is_dir) in entries {
            let target = destination.join(render_relative(ctx.state(), &relative));
            if is_dir {
                fs::create_dir_all(&target)
                    .await
                    .with_context(|| format!("create directory {}", target.display()))?;
                continue;
            }

            copy_rendered(ctx.state(), &self.source.join(&relative), &target).await?;
            copied += 1;
            ctx.update(format!("created {}", target.display()));
        }

        ctx.update(format!("{copied} files created in {}", destination.display()));
        Ok(())
    }
}

/// Template entries relative to `source`, parents before children.
fn list_template(source: &Path, skip: Option<&Path>) -> anyhow::Result<Vec<(PathBuf, bool)>> {
    let walker = WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match (skip, entry.path().strip_prefix(source)) {
            (Some(skip), Ok(relative)) => relative != skip,
            _ => true,
        });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("read template directory {}", source.display()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("{} is outside the template", entry.path().display()))?
            .to_path_buf();
        entries.push((relative, entry.file_type().is_dir()));
    }
    Ok(entries)
}

/// Where `path` sits inside `root`, if it does. Neither has to exist yet.
fn nested_in(root: &Path, path: &Path) -> Option<PathBuf> {
    let root = absolute(root)?;
    let path = absolute(path)?;
    path.strip_prefix(&root).ok().map(Path::to_path_buf)
}

/// Canonical form of the longest existing ancestor, with the rest appended.
fn absolute(path: &Path) -> Option<PathBuf> {
    let path = std::path::absolute(path).ok()?;
    let mut existing = path.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return Some(rest.iter().rev().fold(canonical, |acc, part| acc.join(part)));
        }
        rest.push(existing.file_name()?.to_os_string());
        existing = existing.parent()?;
    }
}

fn is_empty_or_missing(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => !path.exists(),
    }
}

fn render_relative(state: &StateBag, relative: &Path) -> PathBuf {
    relative
        .components()
        .map(|component| state.render(&component.as_os_str().to_string_lossy()))
        .collect()
}

async fn copy_rendered(state: &StateBag, from: &Path, to: &Path) -> anyhow::Result<()> {
    let bytes = fs::read(from)
        .await
        .with_context(|| format!("read {}", from.display()))?;
    let output = match String::from_utf8(bytes) {
        Ok(text) => state.render(&text).into_bytes(),
        Err(err) => err.into_bytes(),
    };
    fs::write(to, output)
        .await
        .with_context(|| format!("write {}", to.display()))
}
