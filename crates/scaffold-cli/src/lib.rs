/*
[INPUT]:  Public API exports for scaffold-cli crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod plan;
pub mod render;
pub mod settings;

// Re-export main types for convenience
pub use plan::{Plan, PlanError, PlanOptions, TaskSpec};
pub use render::LineRenderer;
pub use settings::Settings;
