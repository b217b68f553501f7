//! Resource Allocation Model
//!
//! Builds the mixed-integer linear model that assigns bandwidth, MCS level,
//! signal power and primary/backup traffic to every eligible connection,
//! hands it to a [`Solver`], and writes a verified solution back into the
//! network model.
//!
//! ```text
//! NetworkModel ─► AllocationModel::build ─► LinearModel ─► Solver::solve
//!                                                             │
//!        NetworkModel ◄── AllocationModel::apply ◄── Solution ┘
//! ```
//!
//! Nothing is written back unless every connection of the solution has
//! exactly one active MCS indicator.

use ran_network::{ConnKey, NetworkError, UeId};
use thiserror::Error;

pub mod builder;
pub mod linear;
pub mod solver;
pub mod stage;

pub use builder::{allocation_cost, AllocationModel, AllocationParams, ConnectionVars, EnergyCost, Protection};
pub use linear::{Constraint, LinearExpr, LinearModel, ObjectiveSense, Sense, Solution, VarDomain, VarId, Variable};
#[cfg(feature = "microlp")]
pub use solver::MicroLpSolver;
pub use solver::Solver;
pub use stage::Allocate;

#[derive(Error, Debug)]
pub enum AllocError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Linearization failed: {0}")]
    Approx(#[from] pwl_approx::ApproxError),
    #[error("Invalid parameter {name}={value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error("Infeasible: {ue} demands {demand} but has no eligible connection")]
    UnservedUe { ue: UeId, demand: f64 },
    #[error("Solver reported the model infeasible")]
    Infeasible,
    #[error("Solver reported the model unbounded")]
    Unbounded,
    #[error("Solver failure: {0}")]
    Solver(String),
    #[error("Solution has {found} values for a model with {expected} variables")]
    SolutionSize { expected: usize, found: usize },
    #[error("Inconsistent solution: {active} MCS levels active for connection {connection}")]
    Inconsistent { connection: ConnKey, active: usize },
}

pub type Result<T> = std::result::Result<T, AllocError>;
