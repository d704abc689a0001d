/*
[INPUT]:  Target path, contents template, overwrite flag, StateBag
[OUTPUT]: File written atomically via temp file + rename
[POS]:    Step layer - generated configuration and source files
[UPDATE]: When changing overwrite rules or write atomicity
*/

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow, bail};
use async_trait::async_trait;
use tempfile::NamedTempFile;

use super::{has_placeholder, render_path};
use crate::task::{Task, TaskContext};

#[derive(Debug, Clone)]
pub struct WriteFileTask {
    description: String,
    path: PathBuf,
    contents: String,
    overwrite: bool,
}

impl WriteFileTask {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            description: format!("Write {}", path.display()),
            path,
            contents: contents.into(),
            overwrite: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.trim().is_empty() {
            self.description = description;
        }
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

#[async_trait]
impl Task for WriteFileTask {
    fn description(&self) -> &str {
        &self.description
    }

    fn is_valid(&self) -> bool {
        if has_placeholder(&self.path.to_string_lossy()) {
            return true;
        }
        !self.path.is_dir() && (self.overwrite || !self.path.exists())
    }

    fn mitigation_on_error(&self) -> String {
        if self.overwrite {
            format!("Check that {} is writable.", self.path.display())
        } else {
            format!(
                "Check that {} is writable. If the file already exists, remove it or set `overwrite: true`.",
                self.path.display()
            )
        }
    }

    async fn run(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let path = render_path(ctx.state(), &self.path);
        if path.is_dir() {
            bail!("{} is a directory", path.display());
        }
        if path.exists() && !self.overwrite {
            bail!("{} already exists", path.display());
        }

        let contents = ctx.state().render(&self.contents);
        let bytes = contents.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, contents.as_bytes()))
            .await
            .map_err(|err| anyhow!("write task join error: {err}"))??;

        ctx.update(format!("wrote {bytes} bytes to {}", path.display()));
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("create parent directory {}", parent.display()))?;

    let mut temp_file = NamedTempFile::new_in(&parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    temp_file.write_all(contents)?;
    temp_file.flush()?;
    temp_file
        .persist(path)
        .with_context(|| format!("persist {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventSender;
    use crate::state::StateBag;
    use crate::task::TaskHandle;

    async fn run_task(task: &WriteFileTask, state: &mut StateBag) -> anyhow::Result<()> {
        let tx = EventSender::disabled();
        let handle = TaskHandle::new(0, task.description(), tx.clone());
        let mut ctx = TaskContext::new(state, &handle, &tx);
        task.run(&mut ctx).await
    }

    #[tokio::test]
    async fn renders_contents_and_creates_parents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("{{name}}/app.json");
        let mut state = StateBag::new();
        state.insert("name", "Demo").expect("serialize");

        let task = WriteFileTask::new(&target, r#"{"name": "{{name}}"}"#);
        run_task(&task, &mut state).await.expect("write succeeds");

        let written = std::fs::read_to_string(temp.path().join("Demo/app.json")).expect("read back");
        assert_eq!(written, r#"{"name": "Demo"}"#);
    }

    #[tokio::test]
    async fn refuses_to_clobber_without_overwrite() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("Podfile");
        std::fs::write(&target, "old").expect("seed file");

        let task = WriteFileTask::new(&target, "new");
        assert!(!task.is_valid());
        assert!(task.mitigation_on_error().contains("overwrite: true"));
        assert!(run_task(&task, &mut StateBag::new()).await.is_err());

        let task = task.overwrite(true);
        assert!(task.is_valid());
        run_task(&task, &mut StateBag::new()).await.expect("overwrite");
        assert_eq!(std::fs::read_to_string(&target).expect("read"), "new");
    }
}
