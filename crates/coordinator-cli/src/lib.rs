//! Demo front end for the team coordination engine
//!
//! Built-in template workers, `coordinator.toml` loading and result
//! rendering used by the `coordinator` binary.

pub mod config;
pub mod render;
pub mod workers;

pub use config::{CliConfig, WorkerSpec};
pub use render::render_summary;
pub use workers::{build_registry, TemplateWorker};
