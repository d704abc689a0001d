/*
[INPUT]:  YAML plan file
[OUTPUT]: Parsed Plan, built Task list, RunnerOptions and initial StateBag
[POS]:    Configuration layer - what a run does
[UPDATE]: When adding new step kinds or plan options
*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scaffold_task::{
    CheckToolTask, CommandTask, EnsureDirTask, InvalidTaskPolicy, RetryPolicy, RunnerOptions,
    StateBag, Task, TemplateTask, WriteFileTask,
};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("read plan {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse plan: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid plan: {0}")]
    Invalid(String),
}

/// A named, ordered list of steps plus the variables they share.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Plan {
    pub name: String,
    /// Seed values for the shared state bag
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub options: PlanOptions,
    pub tasks: Vec<TaskSpec>,
    /// Directory relative paths resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlanOptions {
    #[serde(default)]
    pub on_invalid: InvalidTaskPolicy,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_timeout_secs: Option<u64>,
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSpec {
    CheckTool {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        program: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version_arg: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        store_as: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mitigation: Option<String>,
    },
    Command {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        program: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mitigation: Option<String>,
    },
    EnsureDir {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        path: PathBuf,
    },
    WriteFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        path: PathBuf,
        contents: String,
        #[serde(default)]
        overwrite: bool,
    },
    Template {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        source: PathBuf,
        destination: PathBuf,
    },
}

impl TaskSpec {
    fn description(&self) -> Option<&str> {
        match self {
            TaskSpec::CheckTool { description, .. }
            | TaskSpec::Command { description, .. }
            | TaskSpec::EnsureDir { description, .. }
            | TaskSpec::WriteFile { description, .. }
            | TaskSpec::Template { description, .. } => description.as_deref(),
        }
    }

    fn mitigation(&self) -> Option<&str> {
        match self {
            TaskSpec::CheckTool { mitigation, .. } | TaskSpec::Command { mitigation, .. } => {
                mitigation.as_deref()
            }
            _ => None,
        }
    }

    fn validate(&self, index: usize) -> Result<(), PlanError> {
        let invalid = |what: &str| PlanError::Invalid(format!("task #{}: {what}", index + 1));

        if self.description().is_some_and(|d| d.trim().is_empty()) {
            return Err(invalid("description cannot be blank"));
        }
        if self.mitigation().is_some_and(|m| m.trim().is_empty()) {
            return Err(invalid("mitigation cannot be blank"));
        }
        match self {
            TaskSpec::CheckTool { program, .. } | TaskSpec::Command { program, .. }
                if program.trim().is_empty() =>
            {
                Err(invalid("program cannot be empty"))
            }
            TaskSpec::EnsureDir { path, .. } | TaskSpec::WriteFile { path, .. }
                if path.as_os_str().is_empty() =>
            {
                Err(invalid("path cannot be empty"))
            }
            TaskSpec::Template {
                source,
                destination,
                ..
            } if source.as_os_str().is_empty() || destination.as_os_str().is_empty() => {
                Err(invalid("source and destination cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl Plan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: BTreeMap::new(),
            options: PlanOptions::default(),
            tasks: Vec::new(),
            base_dir: PathBuf::new(),
        }
    }

    /// Load and validate a plan; relative paths resolve against its directory.
    pub fn from_file(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_yaml_str(&content, base_dir)
    }

    pub fn from_yaml_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self, PlanError> {
        let mut plan: Self = serde_yaml::from_str(content)?;
        plan.base_dir = base_dir.into();
        plan.validate()?;
        Ok(plan)
    }

    pub fn to_yaml(&self) -> Result<String, PlanError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.name.trim().is_empty() {
            return Err(PlanError::Invalid("plan name cannot be empty".to_string()));
        }
        if self.tasks.is_empty() {
            return Err(PlanError::Invalid(format!(
                "plan {} has no tasks",
                self.name
            )));
        }
        for (index, spec) in self.tasks.iter().enumerate() {
            spec.validate(index)?;
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Programs given as a relative path (`./gradlew`) resolve against the
    /// plan directory; bare names are left for the `PATH` lookup.
    fn resolve_program(&self, program: &str) -> String {
        let path = Path::new(program);
        if path.is_relative() && path.components().count() > 1 {
            let path = path.strip_prefix(".").unwrap_or(path);
            self.base_dir.join(path).to_string_lossy().into_owned()
        } else {
            program.to_string()
        }
    }

    /// Seed state from `vars`. The plan name is always available as `plan_name`.
    pub fn initial_state(&self) -> StateBag {
        std::iter::once((
            "plan_name".to_string(),
            serde_json::Value::String(self.name.clone()),
        ))
        .chain(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())))
        .collect()
    }

    pub fn runner_options(&self, default_timeout: Option<Duration>) -> RunnerOptions {
        RunnerOptions {
            invalid_policy: self.options.on_invalid,
            continue_on_error: self.options.continue_on_error,
            retry: RetryPolicy::with_retries(self.options.retries),
            task_timeout: self
                .options
                .task_timeout_secs
                .map(Duration::from_secs)
                .or(default_timeout),
            dry_run: false,
        }
    }

    pub fn build_tasks(&self) -> Vec<Box<dyn Task>> {
        self.tasks.iter().map(|spec| self.build_task(spec)).collect()
    }

    fn build_task(&self, spec: &TaskSpec) -> Box<dyn Task> {
        let description = spec.description().unwrap_or_default().to_string();
        match spec {
            TaskSpec::CheckTool {
                program,
                version_arg,
                store_as,
                mitigation,
                ..
            } => {
                let mut task =
                    CheckToolTask::new(self.resolve_program(program)).with_description(description);
                if let Some(arg) = version_arg {
                    task = task.version_arg(arg.clone());
                }
                if let Some(key) = store_as {
                    task = task.store_as(key.clone());
                }
                if let Some(mitigation) = mitigation {
                    task = task.with_mitigation(mitigation.clone());
                }
                Box::new(task)
            }
            TaskSpec::Command {
                program,
                args,
                cwd,
                env,
                mitigation,
                ..
            } => {
                let mut task = CommandTask::new(self.resolve_program(program))
                    .with_description(description)
                    .args(args.iter().cloned());
                if let Some(cwd) = cwd {
                    task = task.cwd(self.resolve(cwd));
                }
                for (key, value) in env {
                    task = task.env(key.clone(), value.clone());
                }
                if let Some(mitigation) = mitigation {
                    task = task.with_mitigation(mitigation.clone());
                }
                Box::new(task)
            }
            TaskSpec::EnsureDir { path, .. } => {
                Box::new(EnsureDirTask::new(self.resolve(path)).with_description(description))
            }
            TaskSpec::WriteFile {
                path,
                contents,
                overwrite,
                ..
            } => Box::new(
                WriteFileTask::new(self.resolve(path), contents.clone())
                    .with_description(description)
                    .overwrite(*overwrite),
            ),
            TaskSpec::Template {
                source,
                destination,
                ..
            } => Box::new(
                TemplateTask::new(self.resolve(source), self.resolve(destination))
                    .with_description(description),
            ),
        }
    }
}
