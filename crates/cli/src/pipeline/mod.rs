//! Pipeline orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig, SourceSelection};
pub use stats::PipelineStats;
