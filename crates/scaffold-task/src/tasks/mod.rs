/*
[INPUT]:  Individual scaffolding steps
[OUTPUT]: Built-in Task implementations and shared helpers
[POS]:    Step layer - concrete units of work run by the CLI
[UPDATE]: When adding a new built-in step
*/

mod check_tool;
mod command;
mod ensure_dir;
mod template;
mod write_file;

use std::path::{Path, PathBuf};

use crate::state::StateBag;

pub use check_tool::CheckToolTask;
pub use command::CommandTask;
pub use ensure_dir::EnsureDirTask;
pub use template::TemplateTask;
pub use write_file::WriteFileTask;

/// Locate an executable `program` the way a shell would.
///
/// Names containing a path separator are checked directly; bare names are
/// searched on `PATH` (and `PATHEXT` on windows).
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.trim().is_empty() {
        return None;
    }
    which::which(program).ok()
}

pub(crate) fn has_placeholder(text: &str) -> bool {
    text.contains("{{")
}

pub(crate) fn render_path(state: &StateBag, path: &Path) -> PathBuf {
    PathBuf::from(state.render(&path.to_string_lossy()))
}
