//! Interference Importance Sampling
//!
//! Approximates the aggregate uplink interference seen by a connection
//! `(b, u)` from every other UE transmitting toward `b`, using a small
//! distance-ordered subset of interferers whose weights are calibrated to
//! reproduce the nominal total exactly.
//!
//! - [`approx`]: interferer tables, index selection and weight calibration
//! - [`sweep`]: Monte-Carlo error sweep over power-scale magnitudes
//! - [`bound`]: worst-case cross-cell interference bound

use ran_network::{BsAttr, Column, ConnAttr, NetworkError, UeAttr};
use thiserror::Error;

pub mod approx;
pub mod bound;
pub mod sweep;

pub use approx::{InterferenceApprox, InterferenceSampler, Interferer, SamplerConfig};
pub use bound::{max_interference, InterferenceBound};
pub use sweep::{run_sweep, ErrorMatrix, Summary, SweepConfig, SweepReport};

/// Default spacing between sampled positions beyond the first five.
pub const DEFAULT_DELTA: usize = 10;

/// Columns read when computing interferer powers.
pub const REQUIRED_COLUMNS: [Column; 5] = [
    Column::Conn(ConnAttr::Distance),
    Column::Conn(ConnAttr::Pathloss),
    Column::Ue(UeAttr::MaxPower),
    Column::Ue(UeAttr::Gain),
    Column::Bs(BsAttr::Gain),
];

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Sampling step must be at least 1, got {0}")]
    InvalidDelta(usize),
    #[error("Invalid magnitude {0}: must be finite and non-negative")]
    InvalidMagnitude(f64),
    #[error("A sweep needs at least one trial per magnitude")]
    InvalidTrials,
    #[error("Scale vector has {found} entries, connection {connection} has {expected} interferers")]
    ScaleLength {
        connection: ran_network::ConnKey,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, SamplerError>;

/// `10^(db/10)`
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

/// `10·log10(linear)`
pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}
