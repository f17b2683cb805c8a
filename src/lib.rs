pub mod batch;
pub mod config;
pub mod data_loading;
pub mod error;
pub mod output;
pub mod phase_analysis;
pub mod pipeline;
pub mod preprocessing;
pub mod variability;

pub use config::{EpochAlignment, StagingConfig, ThresholdSet};
pub use error::{Result, StagingError};
pub use phase_analysis::{SleepStage, SleepWindow};
pub use pipeline::{analyze_recording, NightAnalysis, StagingResult};
