/*
[INPUT]:  Built-in defaults, user settings file, --settings file, SCAFFOLD_* environment
[OUTPUT]: Settings for logging, prompts and default timeouts
[POS]:    Configuration layer - how the CLI behaves (plans say what it does)
[UPDATE]: When adding new settings keys
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "SCAFFOLD";
const APP_DIR: &str = "scaffold";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    /// tracing EnvFilter directive, e.g. "warn" or "scaffold_task=debug"
    pub log_level: String,
    /// Write a daily-rolling log file here when set
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    pub color: bool,
    /// 0 disables the timeout
    pub default_task_timeout_secs: u64,
    /// Skip the confirmation prompt before a run
    pub assume_yes: bool,
}

impl Settings {
    /// Layered load: defaults, user config dir, explicit file, environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(user_settings_base(), explicit, ENV_PREFIX)
    }

    fn load_with(
        user_base: Option<PathBuf>,
        explicit: Option<&Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("log_level", "warn")?
            .set_default("color", true)?
            .set_default("default_task_timeout_secs", 0_i64)?
            .set_default("assume_yes", false)?;

        if let Some(base) = user_base {
            builder = builder.add_source(File::with_name(&base.to_string_lossy()).required(false));
        }
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix(env_prefix).try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn default_task_timeout(&self) -> Option<Duration> {
        (self.default_task_timeout_secs > 0).then(|| Duration::from_secs(self.default_task_timeout_secs))
    }
}

/// `<config dir>/scaffold/settings` without extension; any supported format matches.
fn user_settings_base() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("settings"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_apply_without_sources() {
        let settings = Settings::load_with(None, None, "SCAFFOLD_TEST_DEFAULTS").expect("load");
        assert_eq!(settings.log_level, "warn");
        assert!(settings.color);
        assert!(!settings.assume_yes);
        assert_eq!(settings.log_dir, None);
        assert_eq!(settings.default_task_timeout(), None);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            "log_level: debug\ndefault_task_timeout_secs: 120\nlog_dir: /tmp/scaffold-logs"
        )
        .expect("write settings");

        let settings =
            Settings::load_with(None, Some(file.path()), "SCAFFOLD_TEST_FILE").expect("load");
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.default_task_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(settings.log_dir, Some(PathBuf::from("/tmp/scaffold-logs")));
    }

    #[test]
    fn environment_wins_over_files() {
        // unique prefix keeps parallel tests apart
        unsafe {
            std::env::set_var("SCAFFOLD_TEST_ENV_ASSUME_YES", "true");
            std::env::set_var("SCAFFOLD_TEST_ENV_LOG_LEVEL", "error");
        }
        let settings = Settings::load_with(None, None, "SCAFFOLD_TEST_ENV").expect("load");
        assert!(settings.assume_yes);
        assert_eq!(settings.log_level, "error");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = Settings::load_with(
            None,
            Some(Path::new("/definitely/not/settings.yaml")),
            "SCAFFOLD_TEST_MISSING",
        );
        assert!(result.is_err());
    }
}
