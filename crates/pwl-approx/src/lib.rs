//! Piecewise-Linear Approximation
//!
//! Linearizes monotone convex or concave functions so they can be embedded
//! in a linear model. The segment search walks the domain from the left:
//!
//! ```text
//! G(x) = f'(x)·(x − a) + f(a) − f(x) − 2ε      tangent gap seen from a
//! L(x) = f'(r)·x + f(r) − f'(r)·r + ε           tangent at root r of G, lifted by ε
//! H(x) = f(x) − L(x) − ε                        where L leaves the ε band
//! ```
//!
//! Each root of `H` becomes the next left endpoint and a breakpoint
//! `(a, f(a) − ε)`. Concave functions are handled by negating `f` and `f'`
//! and negating the breakpoint ordinates back, so breakpoints sit at
//! `f(a) + ε` instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod bisect;
pub mod conversions;

pub use conversions::{db_to_lin, lin_to_db, Tolerance};

/// Upper bound on segments per call; reaching it means the search stalled.
pub const MAX_SEGMENTS: usize = 1_000_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApproxError {
    #[error("Invalid domain [{0}, {1}]: bounds must be finite with a < b")]
    InvalidDomain(f64, f64),
    #[error("Error bound must be positive and finite, got {0}")]
    InvalidErrorBound(f64),
    #[error("Sub-bounds must be finite, strictly increasing and hold at least two points")]
    InvalidBounds,
    #[error("No root of {function} in [{lo}, {hi}] (g(lo)={g_lo}, g(hi)={g_hi}); function is not monotone/convex as assumed")]
    NoRoot {
        function: &'static str,
        lo: f64,
        hi: f64,
        g_lo: f64,
        g_hi: f64,
    },
    #[error("Bisection of {function} did not converge on [{lo}, {hi}] after {iterations} iterations")]
    NotConverged {
        function: &'static str,
        lo: f64,
        hi: f64,
        iterations: usize,
    },
    #[error("Segment search made no progress at x={0}")]
    NoProgress(f64),
}

pub type Result<T> = std::result::Result<T, ApproxError>;

/// Curvature of the approximated function over the whole domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curvature {
    Convex,
    Concave,
}

impl Curvature {
    fn sign(self) -> f64 {
        match self {
            Curvature::Convex => 1.0,
            Curvature::Concave => -1.0,
        }
    }
}

/// A vertex of the piecewise-linear approximation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub x: f64,
    pub y: f64,
}

impl Breakpoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One linear piece between two consecutive breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub slope: f64,
    pub intercept: f64,
}

impl Segment {
    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Breakpoints plus the end slopes used for extrapolation outside the domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linearization {
    pub slope_before: f64,
    pub breakpoints: Vec<Breakpoint>,
    pub slope_after: f64,
}

impl Linearization {
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Evaluate the approximation, extrapolating with the end slopes.
    pub fn eval(&self, x: f64) -> f64 {
        let (Some(first), Some(last)) = (self.breakpoints.first(), self.breakpoints.last()) else {
            return f64::NAN;
        };
        if x < first.x {
            return first.y + self.slope_before * (x - first.x);
        }
        if x > last.x {
            return last.y + self.slope_after * (x - last.x);
        }
        interpolate(&self.breakpoints, x)
    }

    /// Linear pieces between consecutive breakpoints, skipping zero-width ones.
    pub fn segments(&self) -> Vec<Segment> {
        self.breakpoints
            .windows(2)
            .filter(|w| w[1].x > w[0].x)
            .map(|w| {
                let slope = (w[1].y - w[0].y) / (w[1].x - w[0].x);
                Segment {
                    start: w[0].x,
                    end: w[1].x,
                    slope,
                    intercept: w[0].y - slope * w[0].x,
                }
            })
            .collect()
    }

    /// Largest absolute deviation from `f` over `samples` evenly spaced points.
    pub fn max_deviation<F>(&self, f: F, samples: usize) -> f64
    where
        F: Fn(f64) -> f64,
    {
        max_deviation(&self.breakpoints, f, samples)
    }
}

/// Linear interpolation through `points` (sorted by x). Values outside the
/// covered range are clamped to the end ordinates.
pub fn interpolate(points: &[Breakpoint], x: f64) -> f64 {
    let Some(last) = points.last() else {
        return f64::NAN;
    };
    let idx = points.partition_point(|p| p.x <= x);
    if idx == 0 {
        return points[0].y;
    }
    if idx == points.len() {
        return last.y;
    }
    let (p, q) = (points[idx - 1], points[idx]);
    if q.x == p.x {
        return q.y;
    }
    p.y + (q.y - p.y) * (x - p.x) / (q.x - p.x)
}

/// Largest absolute deviation between the interpolation and `f`.
pub fn max_deviation<F>(points: &[Breakpoint], f: F, samples: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return f64::NAN;
    };
    let n = samples.max(2);
    let step = (last.x - first.x) / (n - 1) as f64;
    (0..n)
        .map(|i| {
            let x = if i == n - 1 { last.x } else { first.x + step * i as f64 };
            (interpolate(points, x) - f(x)).abs()
        })
        .fold(0.0, f64::max)
}

fn validate_domain(a: f64, b: f64) -> Result<()> {
    if a.is_finite() && b.is_finite() && a < b {
        Ok(())
    } else {
        Err(ApproxError::InvalidDomain(a, b))
    }
}

fn validate_error(err: f64) -> Result<()> {
    if err.is_finite() && err > 0.0 {
        Ok(())
    } else {
        Err(ApproxError::InvalidErrorBound(err))
    }
}

/// Approximate `f` on `[a, b]` within absolute error `err`.
///
/// The first breakpoint is `(a, f(a) ∓ err)` and the last is exactly
/// `(b, f(b))`. When the tangent-lifted line reaches `b` without leaving the
/// error band, the closing segment is only kept if the tangent gap from the
/// current endpoint certifies it; otherwise a breakpoint is placed at the
/// tangent point and the search continues from there.
pub fn approximate<F, D>(
    f: F,
    df: D,
    a: f64,
    b: f64,
    err: f64,
    curvature: Curvature,
) -> Result<Vec<Breakpoint>>
where
    F: Fn(f64) -> f64,
    D: Fn(f64) -> f64,
{
    validate_domain(a, b)?;
    validate_error(err)?;

    let sign = curvature.sign();
    let fun = |x: f64| sign * f(x);
    let der = |x: f64| sign * df(x);

    let mut left = a;
    let mut points = vec![Breakpoint::new(left, sign * (fun(left) - err))];

    while left < b {
        let f_left = fun(left);
        let gap = |x: f64| der(x) * (x - left) + f_left - fun(x) - 2.0 * err;
        if gap(b) < 0.0 {
            break;
        }

        let root = bisect::bisect("tangent gap", gap, left, b)?;
        let slope = der(root);
        let intercept = fun(root) - slope * root + err;
        let excess = |x: f64| fun(x) - slope * x - intercept - err;

        let next = if excess(b) < 0.0 {
            root
        } else {
            bisect::bisect("line excess", excess, root, b)?
        };

        if next <= left || points.len() >= MAX_SEGMENTS {
            return Err(ApproxError::NoProgress(left));
        }
        if next >= b {
            break;
        }

        left = next;
        points.push(Breakpoint::new(left, sign * (fun(left) - err)));
    }

    points.push(Breakpoint::new(b, sign * fun(b)));

    debug!(
        "Approximated [{}, {}] with {} breakpoints (err={})",
        a,
        b,
        points.len(),
        err
    );

    Ok(points)
}

/// Approximate `f` over consecutive sub-bounds with a relative error budget.
///
/// Each sub-bound `[lo, hi]` is approximated with `err = errp·|f(lo)|`; all
/// but the last breakpoint of every sub-result are kept and the run closes
/// with `(bounds[last], f(bounds[last]))`.
pub fn approximate_adaptive<F, D>(
    f: F,
    df: D,
    bounds: &[f64],
    errp: f64,
    curvature: Curvature,
) -> Result<Vec<Breakpoint>>
where
    F: Fn(f64) -> f64,
    D: Fn(f64) -> f64,
{
    let increasing = bounds.windows(2).all(|w| w[0] < w[1]);
    let finite = bounds.iter().all(|v| v.is_finite());
    if bounds.len() < 2 || !increasing || !finite {
        return Err(ApproxError::InvalidBounds);
    }
    validate_error(errp)?;

    let mut points = Vec::new();
    for pair in bounds.windows(2) {
        let err = errp * f(pair[0]).abs();
        let mut piece = approximate(&f, &df, pair[0], pair[1], err, curvature)?;
        piece.pop();
        points.extend(piece);
    }

    let end = bounds[bounds.len() - 1];
    points.push(Breakpoint::new(end, f(end)));

    Ok(points)
}
