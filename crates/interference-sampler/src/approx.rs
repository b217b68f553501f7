//! Sparse interferer selection with calibrated weights.

use crate::{db_to_linear, linear_to_db, Result, SamplerError, DEFAULT_DELTA, REQUIRED_COLUMNS};
use ran_network::{ConnKey, NetworkModel, UeId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of leading sorted positions that are always selected.
const DENSE_PREFIX: usize = 4;
/// Selections from this index onward are jittered.
const FIRST_JITTERED: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Spacing between sampled sorted positions after the dense prefix.
    pub delta: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { delta: DEFAULT_DELTA }
    }
}

/// One UE transmitting toward the connection's base station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interferer {
    pub ue: UeId,
    /// Distance to the base station
    pub distance: f64,
    /// Received power at the base station (linear)
    pub power: f64,
}

/// Sampled interference model for one connection.
///
/// Interferers are held in ascending distance order; scale vectors passed
/// to [`error_for`](Self::error_for) use the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct InterferenceApprox {
    connection: ConnKey,
    interferers: Vec<Interferer>,
    /// Selected sorted positions, strictly increasing, starting at 0
    selected: Vec<usize>,
    weights: Vec<f64>,
}

impl InterferenceApprox {
    /// Build from interferers in any order.
    pub fn new<R: Rng>(connection: ConnKey, mut interferers: Vec<Interferer>, delta: usize, rng: &mut R) -> Result<Self> {
        if delta == 0 {
            return Err(SamplerError::InvalidDelta(delta));
        }
        interferers.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let n = interferers.len();
        let selected = select_positions(n, delta, rng);

        // prefix[i] = total power of sorted positions [0, i)
        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(0.0);
        for i in &interferers {
            prefix.push(prefix[prefix.len() - 1] + i.power);
        }

        // Each selection stands for its bucket up to the next selection
        let weights = selected
            .iter()
            .enumerate()
            .map(|(k, &p)| {
                let next = selected.get(k + 1).copied().unwrap_or(n);
                (prefix[next] - prefix[p]) / interferers[p].power
            })
            .collect();

        Ok(Self {
            connection,
            interferers,
            selected,
            weights,
        })
    }

    pub fn connection(&self) -> ConnKey {
        self.connection
    }

    pub fn interferers(&self) -> &[Interferer] {
        &self.interferers
    }

    pub fn interferer_count(&self) -> usize {
        self.interferers.len()
    }

    pub fn selection_count(&self) -> usize {
        self.selected.len()
    }

    /// Sorted positions of the selected interferers.
    pub fn selected_positions(&self) -> &[usize] {
        &self.selected
    }

    /// UEs of the selected interferers, in selection order.
    pub fn selected_ues(&self) -> Vec<UeId> {
        self.selected.iter().map(|&p| self.interferers[p].ue).collect()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Nominal total interference (linear).
    pub fn nominal_total(&self) -> f64 {
        self.interferers.iter().map(|i| i.power).sum()
    }

    /// Exact total under the per-interferer scale vector `v`.
    pub fn total(&self, v: &[f64]) -> Result<f64> {
        self.check_len(v)?;
        Ok(self.interferers.iter().zip(v).map(|(i, s)| i.power * s).sum())
    }

    /// Sampled estimate under `v`.
    pub fn estimate(&self, v: &[f64]) -> Result<f64> {
        self.check_len(v)?;
        Ok(self
            .selected
            .iter()
            .zip(&self.weights)
            .map(|(&p, w)| self.interferers[p].power * v[p] * w)
            .sum())
    }

    /// Relative error of the estimate under `v`; 0 without interferers.
    pub fn error_for(&self, v: &[f64]) -> Result<f64> {
        let total = self.total(v)?;
        if self.interferers.is_empty() || total == 0.0 {
            return Ok(0.0);
        }
        let estimate = self.estimate(v)?;
        Ok((total - estimate).abs() / total)
    }

    fn check_len(&self, v: &[f64]) -> Result<()> {
        if v.len() != self.interferers.len() {
            return Err(SamplerError::ScaleLength {
                connection: self.connection,
                expected: self.interferers.len(),
                found: v.len(),
            });
        }
        Ok(())
    }
}

/// Positions 0..4, then every `delta`-th position from 4. Selections from
/// the sixth onward move by a uniform offset in `[-⌈Δ/2⌉, ⌊Δ/2⌋)`.
fn select_positions<R: Rng>(n: usize, delta: usize, rng: &mut R) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let mut positions: Vec<usize> = (0..DENSE_PREFIX.min(n))
        .chain((DENSE_PREFIX..n).step_by(delta))
        .collect();

    let lo = -(delta.div_ceil(2) as i64);
    let hi = (delta / 2) as i64;
    for p in positions.iter_mut().skip(FIRST_JITTERED) {
        let offset = if lo < hi { rng.gen_range(lo..hi) } else { 0 };
        *p = (*p as i64 + offset).clamp(0, n as i64 - 1) as usize;
    }
    positions.sort_unstable();
    positions.dedup();
    positions
}

/// Builds [`InterferenceApprox`] values from a derived network.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterferenceSampler {
    config: SamplerConfig,
}

impl InterferenceSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// Every UE other than `key.ue`, as seen from `key.bs`.
    pub fn interferers(net: &NetworkModel, key: ConnKey) -> Result<Vec<Interferer>> {
        let bs_gain = net
            .base_station(key.bs)
            .ok_or(ran_network::NetworkError::UnknownConnection(key))?
            .gain;
        net.ues()
            .iter()
            .filter(|ue| ue.id != key.ue)
            .map(|ue| -> Result<Interferer> {
                let conn = net.connection(ConnKey { bs: key.bs, ue: ue.id })?;
                let db = ue.max_power - conn.pathloss + ue.gain + bs_gain;
                Ok(Interferer {
                    ue: ue.id,
                    distance: conn.distance,
                    power: db_to_linear(db),
                })
            })
            .collect()
    }

    pub fn approximate<R: Rng>(&self, net: &NetworkModel, key: ConnKey, rng: &mut R) -> Result<InterferenceApprox> {
        net.require("InterferenceSampler", &REQUIRED_COLUMNS)?;
        let interferers = Self::interferers(net, key)?;
        let approx = InterferenceApprox::new(key, interferers, self.config.delta, rng)?;
        if approx.interferer_count() > 0 {
            debug!(
                "{}: {} of {} interferers selected, nominal {:.2} dB",
                key,
                approx.selection_count(),
                approx.interferer_count(),
                linear_to_db(approx.nominal_total())
            );
        }
        Ok(approx)
    }
}
