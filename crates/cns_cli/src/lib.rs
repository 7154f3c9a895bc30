pub mod config;
pub mod logging;
pub mod pipeline;

pub use config::{Cli, HumanDuration, PipelineConfig};
pub use pipeline::{exit_code, Pipeline, RunFailure, RunReport, RunState};
