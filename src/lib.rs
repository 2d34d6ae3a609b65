pub mod aggregate;
pub mod analysis;
pub mod calibration;
pub mod config;
pub mod cycles;
pub mod data_loading;
pub mod error;
pub mod moving;
pub mod normalize;
pub mod output;
pub mod stats;
pub mod summary;

pub use analysis::{run_analysis, AnalysisReport};
pub use config::ExperimentConfig;
pub use cycles::{CycleLabel, ExperimentSeries, LightCycle};
pub use error::{AnalysisError, Result};
pub use normalize::{RawReading, Reading, SecondsOfDay};
