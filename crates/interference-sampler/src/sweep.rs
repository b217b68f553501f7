//! Monte-Carlo error sweep.
//!
//! For every eligible connection and trial a uniform draw `u ∈ [0,1)^n` is
//! made once and scaled to `v = 1 + u·magnitude` for each magnitude, so all
//! magnitudes of a trial share the same random numbers. Each connection
//! draws from its own RNG stream derived from the sweep seed, which keeps
//! results independent of how rayon schedules the work.

use crate::approx::{InterferenceApprox, InterferenceSampler, SamplerConfig};
use crate::{Result, SamplerError, REQUIRED_COLUMNS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ran_network::{ConnKey, ConnectionFilter, NetworkModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Golden-ratio increment separating per-connection seeds.
const STREAM_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Upper bound of the per-interferer power variation (fraction).
    pub magnitudes: Vec<f64>,
    pub trials: usize,
    pub seed: u64,
    /// Interferer selection used for every connection
    pub sampler: SamplerConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            magnitudes: linspace(0.1, 1.0, 10),
            trials: 1,
            seed: 0,
            sampler: SamplerConfig::default(),
        }
    }
}

impl SweepConfig {
    fn validate(&self) -> Result<()> {
        if let Some(bad) = self.magnitudes.iter().find(|m| !m.is_finite() || **m < 0.0) {
            return Err(SamplerError::InvalidMagnitude(*bad));
        }
        if self.trials == 0 {
            return Err(SamplerError::InvalidTrials);
        }
        if self.sampler.delta == 0 {
            return Err(SamplerError::InvalidDelta(self.sampler.delta));
        }
        Ok(())
    }
}

pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Relative errors indexed by (magnitude, connection, trial).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMatrix {
    pub magnitudes: Vec<f64>,
    pub connections: Vec<ConnKey>,
    pub trials: usize,
    values: Vec<f64>,
}

impl ErrorMatrix {
    pub fn get(&self, magnitude: usize, connection: usize, trial: usize) -> f64 {
        self.values[(magnitude * self.connections.len() + connection) * self.trials + trial]
    }

    /// Every error recorded at one magnitude.
    pub fn at_magnitude(&self, magnitude: usize) -> &[f64] {
        let width = self.connections.len() * self.trials;
        &self.values[magnitude * width..(magnitude + 1) * width]
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.magnitudes.len(), self.connections.len(), self.trials)
    }
}

/// Five-number summary plus mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub magnitude: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

impl Summary {
    pub fn from_samples(magnitude: f64, samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            magnitude,
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
        })
    }
}

/// Linear interpolation between closest ranks of sorted data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub config: SweepConfig,
    pub errors: ErrorMatrix,
    pub summaries: Vec<Summary>,
    /// Eligible connections without any interferer
    pub skipped: Vec<ConnKey>,
}

fn stream_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_add((index as u64).wrapping_add(1).wrapping_mul(STREAM_STRIDE))
}

fn connection_errors(approx: &InterferenceApprox, config: &SweepConfig, rng: &mut StdRng) -> Result<Vec<f64>> {
    let n = approx.interferer_count();
    let mut errors = vec![0.0; config.magnitudes.len() * config.trials];
    let mut v = vec![0.0; n];
    for trial in 0..config.trials {
        let u: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        for (m, magnitude) in config.magnitudes.iter().enumerate() {
            for (vi, ui) in v.iter_mut().zip(&u) {
                *vi = 1.0 + ui * magnitude;
            }
            errors[m * config.trials + trial] = approx.error_for(&v)?;
        }
    }
    Ok(errors)
}

/// Run the error sweep over every eligible connection.
pub fn run_sweep(net: &NetworkModel, config: &SweepConfig) -> Result<SweepReport> {
    config.validate()?;
    net.require("InterferenceSweep", &REQUIRED_COLUMNS)?;

    let sampler = InterferenceSampler::new(config.sampler);
    let keys: Vec<ConnKey> = ConnectionFilter::new(net).iter().collect();
    let started = Instant::now();
    info!(
        "Sweeping {} connections x {} magnitudes x {} trials",
        keys.len(),
        config.magnitudes.len(),
        config.trials
    );

    let per_connection: Vec<(ConnKey, Option<Vec<f64>>)> = keys
        .par_iter()
        .enumerate()
        .map(|(i, &key)| -> Result<(ConnKey, Option<Vec<f64>>)> {
            let mut rng = StdRng::seed_from_u64(stream_seed(config.seed, i));
            let approx = sampler.approximate(net, key, &mut rng)?;
            if approx.interferer_count() == 0 {
                return Ok((key, None));
            }
            Ok((key, Some(connection_errors(&approx, config, &mut rng)?)))
        })
        .collect::<Result<_>>()?;

    let mut connections = Vec::new();
    let mut skipped = Vec::new();
    let mut rows = Vec::new();
    for (key, errors) in per_connection {
        match errors {
            Some(errors) => {
                connections.push(key);
                rows.push(errors);
            }
            None => skipped.push(key),
        }
    }

    let trials = config.trials;
    let mut values = Vec::with_capacity(config.magnitudes.len() * rows.len() * trials);
    for m in 0..config.magnitudes.len() {
        for row in &rows {
            values.extend_from_slice(&row[m * trials..(m + 1) * trials]);
        }
    }
    let errors = ErrorMatrix {
        magnitudes: config.magnitudes.clone(),
        connections,
        trials,
        values,
    };

    let summaries: Vec<Summary> = config
        .magnitudes
        .iter()
        .enumerate()
        .filter_map(|(m, magnitude)| Summary::from_samples(*magnitude, errors.at_magnitude(m)))
        .collect();

    for s in &summaries {
        info!(
            "magnitude {:>5.1}%: median {:.3}% (q1 {:.3}%, q3 {:.3}%, max {:.3}%)",
            s.magnitude * 100.0,
            s.median * 100.0,
            s.q1 * 100.0,
            s.q3 * 100.0,
            s.max * 100.0
        );
    }
    info!(
        "Sweep finished in {:.2} s ({} skipped without interferers)",
        started.elapsed().as_secs_f64(),
        skipped.len()
    );

    Ok(SweepReport {
        config: config.clone(),
        errors,
        summaries,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn config(trials: usize, seed: u64) -> SweepConfig {
        SweepConfig {
            trials,
            seed,
            ..SweepConfig::default()
        }
    }

    #[test]
    fn test_default_magnitudes() {
        let m = SweepConfig::default().magnitudes;
        assert_eq!(m.len(), 10);
        assert!((m[0] - 0.1).abs() < 1e-12);
        assert!((m[9] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_quantiles() {
        let s = Summary::from_samples(0.5, &[4.0, 1.0, 3.0, 2.0, 5.0]).unwrap();
        assert_eq!((s.min, s.q1, s.median, s.q3, s.max, s.mean), (1.0, 2.0, 3.0, 4.0, 5.0, 3.0));
        let s = Summary::from_samples(0.5, &[1.0, 2.0]).unwrap();
        assert_eq!(s.median, 1.5);
        assert_eq!(s.q1, 1.25);
        assert!(Summary::from_samples(0.5, &[]).is_none());
    }

    #[test]
    fn test_matrix_shape() {
        let net = testutil::network(30);
        let report = run_sweep(&net, &config(3, 1)).unwrap();
        let eligible = ConnectionFilter::new(&net).len();
        assert_eq!(report.errors.shape(), (10, eligible, 3));
        assert_eq!(report.summaries.len(), 10);
        assert!(report.skipped.is_empty());
        assert!(report.errors.at_magnitude(4).iter().all(|e| (0.0..=1.0).contains(e)));
    }

    #[test]
    fn test_median_error_grows_with_magnitude() {
        let net = testutil::network(120);
        let report = run_sweep(&net, &config(50, 11)).unwrap();
        let medians: Vec<f64> = report.summaries.iter().map(|s| s.median).collect();
        assert!(medians.windows(2).all(|w| w[0] <= w[1]), "{medians:?}");
        assert!(medians[9] > medians[0]);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let net = testutil::network(40);
        let a = run_sweep(&net, &config(4, 99)).unwrap();
        let b = run_sweep(&net, &config(4, 99)).unwrap();
        assert_eq!(a, b);

        let c = run_sweep(&net, &config(4, 100)).unwrap();
        assert_ne!(a.errors, c.errors);
    }

    #[test]
    fn test_single_ue_is_skipped() {
        let net = testutil::network(1);
        let report = run_sweep(&net, &config(2, 0)).unwrap();
        assert_eq!(report.errors.shape().1, 0);
        assert!(report.summaries.is_empty());
        assert_eq!(report.skipped.len(), ConnectionFilter::new(&net).len());
    }

    #[test]
    fn test_invalid_config() {
        let net = testutil::network(5);
        let mut bad = config(1, 0);
        bad.magnitudes = vec![0.1, f64::NAN];
        assert!(matches!(run_sweep(&net, &bad), Err(SamplerError::InvalidMagnitude(_))));
        assert!(matches!(run_sweep(&net, &config(0, 0)), Err(SamplerError::InvalidTrials)));

        let mut zero_delta = config(1, 0);
        zero_delta.sampler.delta = 0;
        assert!(matches!(run_sweep(&net, &zero_delta), Err(SamplerError::InvalidDelta(0))));
    }

    #[test]
    fn test_sampler_step_controls_selection() {
        // A step past the interferer count leaves only the five leading
        // positions, the last one standing for everything behind it.
        let net = testutil::network(60);
        let mut coarse = config(5, 3);
        coarse.sampler.delta = 1000;

        let coarse = run_sweep(&net, &coarse).unwrap();
        let default = run_sweep(&net, &config(5, 3)).unwrap();
        assert!(coarse.errors.at_magnitude(9).iter().any(|e| *e > 1e-6));
        assert_ne!(coarse.errors, default.errors);
        assert_eq!(coarse.config.sampler.delta, 1000);
    }
}
