/*
[INPUT]:  Interactive user input via CLI
[OUTPUT]: Generated YAML plan file
[POS]:    CLI initialization layer
[UPDATE]: When TaskSpec or the step catalogue changes
*/

use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::{Input, MultiSelect, Select, theme::ColorfulTheme};
use std::collections::BTreeMap;
use std::path::PathBuf;

use scaffold_cli::plan::{Plan, TaskSpec};
use scaffold_task::InvalidTaskPolicy;

/// Steps offered by `scaffold init`, in the order they run.
fn catalogue() -> Vec<(&'static str, TaskSpec)> {
    vec![
        (
            "Check Node.js",
            TaskSpec::CheckTool {
                description: Some("Check Node.js".to_string()),
                program: "node".to_string(),
                version_arg: None,
                store_as: Some("node_version".to_string()),
                mitigation: Some("Install Node.js LTS from https://nodejs.org and re-run.".to_string()),
            },
        ),
        (
            "Check Yarn",
            TaskSpec::CheckTool {
                description: Some("Check Yarn".to_string()),
                program: "yarn".to_string(),
                version_arg: None,
                store_as: Some("yarn_version".to_string()),
                mitigation: Some("Run `npm install --global yarn` and re-run.".to_string()),
            },
        ),
        (
            "Check Java (Android builds)",
            TaskSpec::CheckTool {
                description: Some("Check Java".to_string()),
                program: "java".to_string(),
                version_arg: Some("-version".to_string()),
                store_as: Some("java_version".to_string()),
                mitigation: Some("Install OpenJDK 11 or newer and set JAVA_HOME.".to_string()),
            },
        ),
        (
            "Install CocoaPods (iOS builds)",
            TaskSpec::Command {
                description: Some("Install CocoaPods".to_string()),
                program: "gem".to_string(),
                args: vec!["install".to_string(), "cocoapods".to_string()],
                cwd: None,
                env: BTreeMap::new(),
                mitigation: Some(
                    "Run `sudo gem install cocoapods`, or install it with Homebrew: `brew install cocoapods`."
                        .to_string(),
                ),
            },
        ),
        (
            "Create project directory",
            TaskSpec::EnsureDir {
                description: Some("Create project directory".to_string()),
                path: PathBuf::from("{{project_name}}"),
            },
        ),
        (
            "Write project README",
            TaskSpec::WriteFile {
                description: Some("Write README".to_string()),
                path: PathBuf::from("{{project_name}}/README.md"),
                contents: "# {{project_name}}\n\nCreated by the {{plan_name}} plan.\n".to_string(),
                overwrite: false,
            },
        ),
    ]
}

/// Assemble a plan from the user's answers.
fn build_plan(
    name: &str,
    project_name: &str,
    on_invalid: InvalidTaskPolicy,
    selected: &[usize],
) -> Result<Plan> {
    let catalogue = catalogue();
    let mut plan = Plan::new(name);
    plan.vars.insert(
        "project_name".to_string(),
        serde_json::Value::String(project_name.to_string()),
    );
    plan.options.on_invalid = on_invalid;

    for &index in selected {
        let Some((_, spec)) = catalogue.get(index) else {
            bail!("unknown step #{index}");
        };
        plan.tasks.push(spec.clone());
    }

    plan.validate().context("generated plan is invalid")?;
    Ok(plan)
}

pub fn run_init(output: PathBuf) -> Result<()> {
    println!("{}", style("Welcome to scaffold init").bold().cyan());
    println!(
        "{}",
        style("This will guide you through creating a new plan file.").dim()
    );

    let theme = ColorfulTheme::default();

    let name: String = Input::with_theme(&theme)
        .with_prompt("Plan name")
        .default("setup-dev".to_string())
        .interact_text()?;

    let project_name: String = Input::with_theme(&theme)
        .with_prompt("Project name")
        .default("MyApp".to_string())
        .interact_text()?;

    println!("\n{}", style("--- Steps ---").bold());
    let catalogue = catalogue();
    let labels: Vec<&str> = catalogue.iter().map(|(label, _)| *label).collect();
    let defaults = vec![true; labels.len()];
    let selected = MultiSelect::with_theme(&theme)
        .with_prompt("Steps to include (space to toggle)")
        .items(&labels)
        .defaults(&defaults)
        .interact()?;
    if selected.is_empty() {
        bail!("select at least one step");
    }

    let policies = ["skip", "fail"];
    let policy = Select::with_theme(&theme)
        .with_prompt("When a step cannot run here")
        .items(&policies)
        .default(0)
        .interact()?;
    let on_invalid = if policy == 0 {
        InvalidTaskPolicy::Skip
    } else {
        InvalidTaskPolicy::Fail
    };

    let plan = build_plan(&name, &project_name, on_invalid, &selected)?;
    let yaml = plan.to_yaml().context("failed to serialize plan to YAML")?;

    std::fs::write(&output, yaml)
        .with_context(|| format!("failed to write plan to {}", output.display()))?;

    println!("\n{}", style("SUCCESS!").bold().green());
    println!("Plan written to: {}", style(output.display()).cyan());
    println!(
        "Run it with: {}",
        style(format!("scaffold run --plan {}", output.display())).cyan()
    );

    Ok(())
}
