pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{IngestError, Result};
pub use pipeline::{Pipeline, PipelineReport, PipelineState};
