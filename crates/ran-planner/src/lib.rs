//! RAN Planner
//!
//! Drives a planning run over a network snapshot directory:
//!
//! ```text
//! scenario.toml ─generate─► snapshot/ ─derive─► snapshot/ ─┬─sweep────► sweep.json
//!                                                          └─allocate─► snapshot/ + allocation.json
//! ```
//!
//! Stage parameters come from a [`PlannerConfig`] TOML file; every command
//! returns a serializable report stamped with its generation time.

use thiserror::Error;

pub mod config;
pub mod report;
pub mod run;

pub use config::{DeriveConfig, PlannerConfig};
pub use report::{AllocationSummary, LinearizationReport, Report, SweepOutcome};
pub use run::{allocate, derive, generate, linearize, sweep, Conversion};

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Network(#[from] ran_network::NetworkError),
    #[error(transparent)]
    Sampler(#[from] interference_sampler::SamplerError),
    #[error(transparent)]
    Alloc(#[from] alloc_model::AllocError),
    #[error(transparent)]
    Approx(#[from] pwl_approx::ApproxError),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
