//! Bracketing root finder used by the segment search.

use crate::{ApproxError, Result};

/// Absolute tolerance on the bracket width.
pub const XTOL: f64 = 2e-12;

/// Relative tolerance on the bracket width.
pub const RTOL: f64 = 4.0 * f64::EPSILON;

/// Iteration cap before the search is reported as diverged.
pub const MAX_ITER: usize = 100;

/// Find a root of `g` in `[lo, hi]` by bisection.
///
/// `g(lo)` and `g(hi)` must be finite and of opposite sign (or one of them
/// exactly zero). Anything else means the caller's monotonicity assumption
/// does not hold and is reported as [`ApproxError::NoRoot`].
pub fn bisect<G>(function: &'static str, g: G, lo: f64, hi: f64) -> Result<f64>
where
    G: Fn(f64) -> f64,
{
    let g_lo = g(lo);
    let g_hi = g(hi);

    let same_sign = (g_lo > 0.0 && g_hi > 0.0) || (g_lo < 0.0 && g_hi < 0.0);
    if !g_lo.is_finite() || !g_hi.is_finite() || same_sign {
        return Err(ApproxError::NoRoot {
            function,
            lo,
            hi,
            g_lo,
            g_hi,
        });
    }
    if g_lo == 0.0 {
        return Ok(lo);
    }
    if g_hi == 0.0 {
        return Ok(hi);
    }

    let (mut lo, mut hi, mut g_lo) = (lo, hi, g_lo);
    for _ in 0..MAX_ITER {
        let mid = 0.5 * (lo + hi);
        let g_mid = g(mid);
        if !g_mid.is_finite() {
            return Err(ApproxError::NoRoot {
                function,
                lo: mid,
                hi,
                g_lo: g_mid,
                g_hi,
            });
        }
        if g_mid == 0.0 {
            return Ok(mid);
        }
        if (g_mid < 0.0) == (g_lo < 0.0) {
            lo = mid;
            g_lo = g_mid;
        } else {
            hi = mid;
        }
        if hi - lo < XTOL + RTOL * mid.abs() {
            return Ok(0.5 * (lo + hi));
        }
    }

    Err(ApproxError::NotConverged {
        function,
        lo,
        hi,
        iterations: MAX_ITER,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bisect_square_root_of_two() {
        let root = bisect("x^2-2", |x| x * x - 2.0, 0.0, 2.0).unwrap();
        assert!((root - 2f64.sqrt()).abs() < 1e-11);
    }

    #[test]
    fn test_bisect_exact_endpoint() {
        assert_eq!(bisect("x", |x| x, 0.0, 1.0).unwrap(), 0.0);
        assert_eq!(bisect("x-1", |x| x - 1.0, 0.0, 1.0).unwrap(), 1.0);
    }

    #[test]
    fn test_bisect_rejects_same_sign() {
        let err = bisect("x^2+1", |x| x * x + 1.0, -1.0, 1.0).unwrap_err();
        assert!(matches!(err, ApproxError::NoRoot { function: "x^2+1", .. }));
    }

    #[test]
    fn test_bisect_rejects_nan() {
        let err = bisect("log", |x: f64| x.ln(), -1.0, 2.0).unwrap_err();
        assert!(matches!(err, ApproxError::NoRoot { .. }));
    }
}
