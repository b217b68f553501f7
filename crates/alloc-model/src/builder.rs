//! Allocation model over eligible connections and MCS levels.
//!
//! Per connection `e` and level `m`:
//!
//! | variable        | domain        |
//! |-----------------|---------------|
//! | `bwl[e,m]`      | `[0, BW]`     |
//! | `sel[e,m]`      | binary        |
//! | `bw[e]`         | `[0, BW]`     |
//! | `sp[e]` (dBm)   | `[0, ∞)`      |
//! | `x[e]`, `y[e]`  | `[0, ∞)`      |
//! | `pmw[e]` (mW)   | `[0, ∞)`, only with [`EnergyCost::Linear`] |

use crate::linear::{LinearExpr, LinearModel, ObjectiveSense, Sense, Solution, VarId};
use crate::{AllocError, Result};
use pwl_approx::{db_to_lin, Linearization, Tolerance};
use ran_network::{
    Allocation, BsAttr, Column, ConnAttr, ConnKey, ConnectionFilter, McsLevel, NetworkModel, UeAttr,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const DEFAULT_ALPHA: f64 = 0.1;
pub const DEFAULT_RHO: f64 = 1.0;
/// Indicator values at or above this count as selected.
pub const SELECTION_THRESHOLD: f64 = 0.5;

/// Columns the builder reads.
pub const REQUIRED_COLUMNS: [Column; 6] = [
    Column::Conn(ConnAttr::Pathloss),
    Column::Conn(ConnAttr::Weight),
    Column::Ue(UeAttr::Demand),
    Column::Ue(UeAttr::Gain),
    Column::Ue(UeAttr::MaxPower),
    Column::Bs(BsAttr::Gain),
];

/// How transmit power enters the objective.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnergyCost {
    /// `ρ·sp[e]` on the dBm value.
    #[default]
    Decibel,
    /// `ρ·pmw[e]` with `pmw[e]` bounded below by a linearized dBm→mW curve
    /// whose relative error is `errp`.
    Linear { errp: f64 },
}

/// Backup-capacity requirement per UE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protection {
    None,
    /// Any one link of a UE may fail.
    Single,
    /// Any two links of a UE may fail.
    #[default]
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationParams {
    /// Cost of backup traffic relative to primary traffic
    pub alpha: f64,
    /// Energy cost weight
    pub rho: f64,
    pub energy: EnergyCost,
    pub protection: Protection,
}

impl Default for AllocationParams {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            rho: DEFAULT_RHO,
            energy: EnergyCost::default(),
            protection: Protection::default(),
        }
    }
}

impl AllocationParams {
    fn validate(&self) -> Result<()> {
        let check = |name: &'static str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(AllocError::InvalidParameter {
                    name,
                    value,
                    reason: "must be finite and non-negative",
                })
            }
        };
        check("alpha", self.alpha)?;
        check("rho", self.rho)?;
        if let EnergyCost::Linear { errp } = self.energy {
            if !(errp.is_finite() && errp > 0.0) {
                return Err(AllocError::InvalidParameter {
                    name: "errp",
                    value: errp,
                    reason: "must be positive",
                });
            }
        }
        Ok(())
    }
}

/// Variables of one eligible connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionVars {
    pub key: ConnKey,
    pub bandwidth_at_level: Vec<VarId>,
    pub level_selected: Vec<VarId>,
    pub bandwidth: VarId,
    pub signal_power: VarId,
    pub power_mw: Option<VarId>,
    pub x: VarId,
    pub y: VarId,
}

/// A built model plus the variable map needed to read a solution back.
#[derive(Debug, Clone)]
pub struct AllocationModel {
    model: LinearModel,
    connections: Vec<ConnectionVars>,
    levels: Vec<McsLevel>,
    power_curve: Option<Linearization>,
}

/// dBm→mW linearization over `[0, max maxPower]` for [`EnergyCost::Linear`].
fn power_curve(net: &NetworkModel, energy: EnergyCost) -> Result<Option<Linearization>> {
    let EnergyCost::Linear { errp } = energy else {
        return Ok(None);
    };
    let max_power = net.ues().iter().map(|u| u.max_power).fold(f64::NEG_INFINITY, f64::max);
    let curve = db_to_lin(0.0, max_power, Tolerance::Relative(errp))?;
    debug!("dBm->mW curve over [0, {}]: {} breakpoints", max_power, curve.len());
    Ok(Some(curve))
}

/// Objective value of the allocation written to `net`, priced with `params`.
///
/// Matches the solver's objective for a solution applied by
/// [`AllocationModel::apply`]: at the optimum the mW variable sits on the
/// convex curve, so it is recovered by evaluating the curve at the signal
/// power.
pub fn allocation_cost(net: &NetworkModel, params: &AllocationParams) -> Result<f64> {
    let allocation: Vec<Column> = ConnAttr::ALLOCATION.iter().map(|a| Column::Conn(*a)).collect();
    net.require("AllocationCost", &REQUIRED_COLUMNS)?;
    net.require("AllocationCost", &allocation)?;
    params.validate()?;
    let curve = power_curve(net, params.energy)?;

    Ok(net
        .connections()
        .iter()
        .filter_map(|(_, conn)| conn.allocation.map(|a| (conn.weight, a)))
        .map(|(weight, a)| {
            let energy = match &curve {
                Some(curve) => curve.eval(a.signal_power),
                None => a.signal_power,
            };
            weight * (a.x_traffic + params.alpha * a.y_traffic) + params.rho * energy
        })
        .sum())
}

fn tag(key: ConnKey) -> String {
    format!("b{}_u{}", key.bs.0, key.ue.0)
}

impl AllocationModel {
    pub fn build(net: &NetworkModel, params: &AllocationParams) -> Result<Self> {
        net.require("Allocate", &REQUIRED_COLUMNS)?;
        params.validate()?;

        let bw = net.channel().bandwidth_span();
        if !(bw.is_finite() && bw > 0.0) {
            return Err(AllocError::InvalidParameter {
                name: "bandwidth",
                value: bw,
                reason: "channel bandwidth span must be positive",
            });
        }
        let levels: Vec<McsLevel> = net.mcs().iter().collect();
        if levels.is_empty() {
            return Err(AllocError::InvalidParameter {
                name: "levels",
                value: 0.0,
                reason: "MCS table is empty",
            });
        }

        let filter = ConnectionFilter::new(net);
        for ue in net.ues() {
            if ue.demand > 0.0 && filter.of_ue(ue.id).next().is_none() {
                return Err(AllocError::UnservedUe {
                    ue: ue.id,
                    demand: ue.demand,
                });
            }
        }

        let power_curve = power_curve(net, params.energy)?;

        let mut model = LinearModel::new("ran_allocation");
        let mut connections = Vec::with_capacity(filter.len());

        for key in filter.iter() {
            let t = tag(key);
            let bandwidth_at_level = levels
                .iter()
                .map(|l| model.continuous(format!("bwl_{t}_m{}", l.index), 0.0, bw))
                .collect();
            let level_selected = levels
                .iter()
                .map(|l| model.binary(format!("sel_{t}_m{}", l.index)))
                .collect();
            let vars = ConnectionVars {
                key,
                bandwidth_at_level,
                level_selected,
                bandwidth: model.continuous(format!("bw_{t}"), 0.0, bw),
                signal_power: model.continuous(format!("sp_{t}"), 0.0, f64::INFINITY),
                power_mw: power_curve
                    .as_ref()
                    .map(|_| model.continuous(format!("pmw_{t}"), 0.0, f64::INFINITY)),
                x: model.continuous(format!("x_{t}"), 0.0, f64::INFINITY),
                y: model.continuous(format!("y_{t}"), 0.0, f64::INFINITY),
            };
            connections.push(vars);
        }

        let mut built = Self {
            model,
            connections,
            levels,
            power_curve,
        };
        built.add_connection_constraints(net, bw)?;
        built.add_node_constraints(net, bw);
        built.add_protection(params.protection);
        built.set_objective(net, params)?;

        info!(
            "Allocation model: {} connections, {} levels, {} variables, {} constraints",
            built.connections.len(),
            built.levels.len(),
            built.model.variables().len(),
            built.model.constraints().len()
        );
        Ok(built)
    }

    fn add_connection_constraints(&mut self, net: &NetworkModel, bw: f64) -> Result<()> {
        let noise = net.channel().noise;
        for vars in &self.connections {
            let t = tag(vars.key);
            let conn = net.connection(vars.key)?;
            let ue = &net.ues()[vars.key.ue.0];
            let bs = &net.base_stations()[vars.key.bs.0];

            let mut bw_def = LinearExpr::term(vars.bandwidth, 1.0);
            for bwl in &vars.bandwidth_at_level {
                bw_def.add_term(*bwl, -1.0);
            }
            self.model.constrain(format!("bw_def_{t}"), bw_def, Sense::Eq, 0.0);

            // sp ≥ Σ sel·snr + noise + pathloss − gains
            let mut snr = LinearExpr::term(vars.signal_power, 1.0);
            for (level, sel) in self.levels.iter().zip(&vars.level_selected) {
                snr.add_term(*sel, -level.snr);
            }
            self.model.constrain(
                format!("snr_{t}"),
                snr,
                Sense::Ge,
                noise + conn.pathloss - ue.gain - bs.gain,
            );
            self.model.constrain(
                format!("pmax_{t}"),
                LinearExpr::term(vars.signal_power, 1.0),
                Sense::Le,
                ue.max_power,
            );

            self.model.constrain(
                format!("one_level_{t}"),
                LinearExpr::sum(vars.level_selected.iter().copied()),
                Sense::Eq,
                1.0,
            );
            for (level, (bwl, sel)) in self.levels.iter().zip(vars.bandwidth_at_level.iter().zip(&vars.level_selected)) {
                self.model.constrain(
                    format!("level_bw_{t}_m{}", level.index),
                    LinearExpr::term(*bwl, 1.0).with_term(*sel, -bw),
                    Sense::Le,
                    0.0,
                );
            }

            let mut capacity = LinearExpr::term(vars.x, 1.0).with_term(vars.y, 1.0);
            for (level, bwl) in self.levels.iter().zip(&vars.bandwidth_at_level) {
                capacity.add_term(*bwl, -level.efficiency);
            }
            self.model.constrain(format!("cap_{t}"), capacity, Sense::Le, 0.0);

            if let (Some(curve), Some(pmw)) = (&self.power_curve, vars.power_mw) {
                for (i, segment) in curve.segments().iter().enumerate() {
                    self.model.constrain(
                        format!("pmw_{t}_s{i}"),
                        LinearExpr::term(pmw, 1.0).with_term(vars.signal_power, -segment.slope),
                        Sense::Ge,
                        segment.intercept,
                    );
                }
            }
        }
        Ok(())
    }

    fn add_node_constraints(&mut self, net: &NetworkModel, bw: f64) {
        for ue in net.ues() {
            let incident: Vec<&ConnectionVars> = self.connections.iter().filter(|c| c.key.ue == ue.id).collect();
            self.model.constrain(
                format!("ue_bw_u{}", ue.id.0),
                LinearExpr::sum(incident.iter().map(|c| c.bandwidth)),
                Sense::Le,
                bw,
            );
            self.model.constrain(
                format!("demand_u{}", ue.id.0),
                LinearExpr::sum(incident.iter().map(|c| c.x)),
                Sense::Ge,
                ue.demand,
            );
        }
        for bs in net.base_stations() {
            self.model.constrain(
                format!("bs_bw_b{}", bs.id.0),
                LinearExpr::sum(self.connections.iter().filter(|c| c.key.bs == bs.id).map(|c| c.bandwidth)),
                Sense::Le,
                bw,
            );
        }
    }

    /// Backup traffic on the surviving links covers the primary traffic of
    /// the failed ones.
    fn add_protection(&mut self, protection: Protection) {
        let mut by_ue: BTreeMap<usize, Vec<(VarId, VarId, ConnKey)>> = BTreeMap::new();
        for c in &self.connections {
            by_ue.entry(c.key.ue.0).or_default().push((c.x, c.y, c.key));
        }

        for (ue, links) in by_ue {
            match protection {
                Protection::None => {}
                Protection::Single => {
                    for (i, (x1, _, k1)) in links.iter().enumerate() {
                        let mut expr = LinearExpr::term(*x1, -1.0);
                        for (j, (_, y, _)) in links.iter().enumerate() {
                            if j != i {
                                expr.add_term(*y, 1.0);
                            }
                        }
                        self.model
                            .constrain(format!("prot1_u{ue}_b{}", k1.bs.0), expr, Sense::Ge, 0.0);
                    }
                }
                Protection::Double => {
                    for i in 0..links.len() {
                        for j in i + 1..links.len() {
                            let mut expr = LinearExpr::term(links[i].0, -1.0).with_term(links[j].0, -1.0);
                            for (k, (_, y, _)) in links.iter().enumerate() {
                                if k != i && k != j {
                                    expr.add_term(*y, 1.0);
                                }
                            }
                            self.model.constrain(
                                format!("prot2_u{ue}_b{}_b{}", links[i].2.bs.0, links[j].2.bs.0),
                                expr,
                                Sense::Ge,
                                0.0,
                            );
                        }
                    }
                }
            }
        }
    }

    fn set_objective(&mut self, net: &NetworkModel, params: &AllocationParams) -> Result<()> {
        let mut objective = LinearExpr::new();
        for vars in &self.connections {
            let weight = net.connection(vars.key)?.weight;
            objective.add_term(vars.x, weight);
            objective.add_term(vars.y, weight * params.alpha);
            objective.add_term(vars.power_mw.unwrap_or(vars.signal_power), params.rho);
        }
        self.model.set_objective(ObjectiveSense::Minimize, objective);
        Ok(())
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    pub fn connections(&self) -> &[ConnectionVars] {
        &self.connections
    }

    pub fn levels(&self) -> &[McsLevel] {
        &self.levels
    }

    pub fn power_curve(&self) -> Option<&Linearization> {
        self.power_curve.as_ref()
    }

    pub fn to_lp_string(&self) -> String {
        self.model.to_lp_string()
    }

    /// Decode per-connection allocations, rejecting any connection without
    /// exactly one active MCS indicator.
    pub fn decode(&self, solution: &Solution) -> Result<Vec<(ConnKey, Allocation)>> {
        let expected = self.model.variables().len();
        if solution.values.len() != expected {
            return Err(AllocError::SolutionSize {
                expected,
                found: solution.values.len(),
            });
        }

        self.connections
            .iter()
            .map(|vars| {
                let active: Vec<usize> = vars
                    .level_selected
                    .iter()
                    .enumerate()
                    .filter(|(_, sel)| solution.value(**sel) >= SELECTION_THRESHOLD)
                    .map(|(m, _)| m)
                    .collect();
                let [level] = active.as_slice() else {
                    return Err(AllocError::Inconsistent {
                        connection: vars.key,
                        active: active.len(),
                    });
                };
                Ok((
                    vars.key,
                    Allocation {
                        bandwidth: solution.value(vars.bandwidth),
                        signal_power: solution.value(vars.signal_power),
                        x_traffic: solution.value(vars.x),
                        y_traffic: solution.value(vars.y),
                        mcs_index: self.levels[*level].index,
                    },
                ))
            })
            .collect()
    }

    /// Write a verified solution into the connection table. Nothing is
    /// written when decoding fails.
    pub fn apply(&self, net: &mut NetworkModel, solution: &Solution) -> Result<()> {
        let allocations = self.decode(solution)?;

        for (_, conn) in net.connections_mut().iter_mut() {
            conn.allocation = None;
        }
        for (key, allocation) in &allocations {
            if let Some(conn) = net.connections_mut().get_mut(*key) {
                conn.allocation = Some(*allocation);
            }
        }
        let columns: Vec<Column> = ConnAttr::ALLOCATION.iter().map(|a| Column::Conn(*a)).collect();
        net.mark_produced(&columns);

        info!(
            "Applied allocation to {} connections (objective {:.4})",
            allocations.len(),
            solution.objective
        );
        Ok(())
    }
}
