//! Runtime orchestration
//!
//! - `ingestion` - concurrent acquisition: adapters → normalizer → emitter → raw sink
//! - `engine` - batch model build: raw batches → star schema → exported tables
//! - `config` - model-build settings

pub mod config;
pub mod engine;
pub mod ingestion;

pub use config::ModelConfig;
pub use engine::{build_from_batches, load_raw_batches, run_build, BuildReport, PipelineError};
pub use ingestion::{adapters_from_config, make_sink, run_acquisition, AcquisitionReport, ChainOutcome};
