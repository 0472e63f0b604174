pub mod pipeline;

pub use pipeline::{DimensionSummary, PipelineService, RunReport};
