//! Position generators parsed from layout strings (`grid:RxC`, `scatter:D`).

use crate::model::Position;
use crate::{NetworkError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Layout {
    /// Cell centres of an evenly divided area.
    Grid { rows: usize, cols: usize },
    /// `floor(density · w · h)` points uniform over the area.
    Scatter { density: f64 },
}

impl Layout {
    /// Generate positions inside `area = (width, height)`.
    pub fn positions<R: Rng>(&self, area: (f64, f64), rng: &mut R) -> Vec<Position> {
        let (w, h) = area;
        match *self {
            Layout::Grid { rows, cols } => {
                let xs = cell_centres(w, cols);
                let ys = cell_centres(h, rows);
                // x repeats each column centre per row, y tiles the row centres
                xs.iter()
                    .flat_map(|x| std::iter::repeat(*x).take(rows))
                    .zip(ys.iter().cycle())
                    .map(|(x, y)| Position::new(x, *y))
                    .collect()
            }
            Layout::Scatter { density } => {
                let count = (density * w * h).floor().max(0.0) as usize;
                let xs: Vec<f64> = (0..count).map(|_| rng.gen::<f64>() * w).collect();
                let ys: Vec<f64> = (0..count).map(|_| rng.gen::<f64>() * h).collect();
                xs.into_iter().zip(ys).map(|(x, y)| Position::new(x, y)).collect()
            }
        }
    }

    /// Number of positions generated for `area`.
    pub fn count(&self, area: (f64, f64)) -> usize {
        match *self {
            Layout::Grid { rows, cols } => rows * cols,
            Layout::Scatter { density } => (density * area.0 * area.1).floor().max(0.0) as usize,
        }
    }
}

/// `linspace(extent / 2n, extent − extent / 2n, n)`
fn cell_centres(extent: f64, n: usize) -> Vec<f64> {
    let step = extent / n as f64;
    (0..n).map(|i| step / 2.0 + step * i as f64).collect()
}

impl FromStr for Layout {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| NetworkError::InvalidLayout {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let (kind, args) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected <kind>:<args>"))?;

        match kind.trim() {
            "grid" => {
                let (rows, cols) = args
                    .split_once('x')
                    .ok_or_else(|| invalid("grid expects RxC"))?;
                let rows: usize = rows.trim().parse().map_err(|_| invalid("rows is not an integer"))?;
                let cols: usize = cols.trim().parse().map_err(|_| invalid("cols is not an integer"))?;
                if rows == 0 || cols == 0 {
                    return Err(invalid("grid dimensions must be positive"));
                }
                Ok(Layout::Grid { rows, cols })
            }
            "scatter" => {
                let density: f64 = args.trim().parse().map_err(|_| invalid("density is not a number"))?;
                if !density.is_finite() || density < 0.0 {
                    return Err(invalid("density must be a non-negative number"));
                }
                Ok(Layout::Scatter { density })
            }
            other => Err(invalid(&format!("unknown layout kind {other:?}"))),
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Grid { rows, cols } => write!(f, "grid:{rows}x{cols}"),
            Layout::Scatter { density } => write!(f, "scatter:{density}"),
        }
    }
}

impl TryFrom<String> for Layout {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Layout> for String {
    fn from(layout: Layout) -> Self {
        layout.to_string()
    }
}
