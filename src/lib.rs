// src/lib.rs
pub mod config;
pub mod utils;
pub mod pipelines;
pub mod gateway;
pub mod cli;
pub use cli::Arguments;
pub use config::defs::{PipelineError, RunContext, ToolPaths};
pub use config::params::{RunParameters, ValidatedParameters};
pub use pipelines::metagenome_assembly::{AssemblyPipeline, PipelineResult};
