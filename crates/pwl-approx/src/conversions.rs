//! dB ↔ linear conversions as solver-ready linearizations.

use crate::{approximate, approximate_adaptive, Curvature, Linearization, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_10;

/// Width of the sub-bounds used by relative-error dB→linear approximation.
pub const DECADE_DB: f64 = 10.0;

/// Error budget for an approximation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Tolerance {
    /// Fixed pointwise error over the whole domain.
    Absolute(f64),
    /// Error proportional to the function value at each sub-bound start.
    Relative(f64),
}

fn lin2db(x: f64) -> f64 {
    10.0 * x.log10()
}

fn lin2db_deriv(x: f64) -> f64 {
    10.0 / (x * LN_10)
}

fn db2lin(x: f64) -> f64 {
    10f64.powf(x / 10.0)
}

fn db2lin_deriv(x: f64) -> f64 {
    LN_10 * 10f64.powf(x / 10.0 - 1.0)
}

/// Linearize `10·log10(x)` (mW → dBm, Hz → dB) on `[a, b]`.
pub fn lin_to_db(a: f64, b: f64, err: f64) -> Result<Linearization> {
    let breakpoints = approximate(lin2db, lin2db_deriv, a, b, err, Curvature::Concave)?;
    Ok(Linearization {
        slope_before: lin2db_deriv(a),
        breakpoints,
        slope_after: lin2db_deriv(b),
    })
}

/// Linearize `10^(x/10)` (dBm → mW) on `[a, b]`.
///
/// A relative tolerance splits the domain at every multiple of 10 dB so the
/// absolute budget grows with the function over a wide dynamic range.
pub fn db_to_lin(a: f64, b: f64, tolerance: Tolerance) -> Result<Linearization> {
    let breakpoints = match tolerance {
        Tolerance::Absolute(err) => approximate(db2lin, db2lin_deriv, a, b, err, Curvature::Convex)?,
        Tolerance::Relative(errp) => {
            approximate_adaptive(db2lin, db2lin_deriv, &decade_bounds(a, b), errp, Curvature::Convex)?
        }
    };
    Ok(Linearization {
        slope_before: db2lin_deriv(a),
        breakpoints,
        slope_after: db2lin_deriv(b),
    })
}

/// `a`, every multiple of [`DECADE_DB`] inside `[a, b]`, then `b`.
pub fn decade_bounds(a: f64, b: f64) -> Vec<f64> {
    let first = (a / DECADE_DB).ceil() * DECADE_DB;
    let last = (b / DECADE_DB).floor() * DECADE_DB;

    let mut bounds = Vec::new();
    if first != a {
        bounds.push(a);
    }
    let mut v = first;
    while v <= last {
        bounds.push(v);
        v += DECADE_DB;
    }
    if last != b {
        bounds.push(b);
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decade_bounds() {
        assert_eq!(decade_bounds(-40.0, 40.0), vec![-40.0, -30.0, -20.0, -10.0, 0.0, 10.0, 20.0, 30.0, 40.0]);
        assert_eq!(decade_bounds(-35.0, 12.5), vec![-35.0, -30.0, -20.0, -10.0, 0.0, 10.0, 12.5]);
        assert_eq!(decade_bounds(1.0, 5.0), vec![1.0, 5.0]);
    }

    #[test]
    fn test_db_to_lin_end_slopes() {
        let lin = db_to_lin(-10.0, 10.0, Tolerance::Absolute(0.05)).unwrap();
        assert!((lin.slope_before - LN_10 / 100.0).abs() < 1e-12);
        assert!((lin.slope_after - LN_10).abs() < 1e-12);
    }

    #[test]
    fn test_relative_tolerance_uses_fewer_points_at_high_power() {
        let absolute = db_to_lin(-40.0, 40.0, Tolerance::Absolute(0.05)).unwrap();
        let relative = db_to_lin(-40.0, 40.0, Tolerance::Relative(0.05)).unwrap();
        assert!(relative.len() < absolute.len());
    }

    #[test]
    fn test_lin_to_db_hz_range() {
        let lin = lin_to_db(0.1, 100.0, 0.5).unwrap();
        let dev = lin.max_deviation(lin2db, 10_000);
        assert!(dev <= 0.5 + 1e-9);
        assert_eq!(lin.breakpoints.last().unwrap().y, lin2db(100.0));
    }
}
