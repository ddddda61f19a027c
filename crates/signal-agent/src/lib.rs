pub mod config;
pub mod pipeline;

pub use config::AgentConfig;
pub use pipeline::{CycleOutcome, PipelineError, SignalPipeline};
