//! Planner commands over a snapshot directory.

use crate::config::PlannerConfig;
use crate::report::{AllocationSummary, LinearizationReport, SweepOutcome};
use crate::Result;
use alloc_model::{allocation_cost, Allocate, MicroLpSolver};
use interference_sampler::{max_interference, run_sweep};
use pwl_approx::{db_to_lin, lin_to_db, Tolerance};
use ran_network::scenario::Generate;
use ran_network::snapshot::{self, LoadSnapshot, SaveSnapshot};
use ran_network::{NetworkModel, ScenarioConfig, StageSequence};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Conversions the allocation model linearizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Conversion {
    /// `10·log10(x)`, absolute error
    LinToDb,
    /// `10^(x/10)`, absolute error
    DbToLin,
    /// `10^(x/10)`, error relative to the value at each decade start
    DbToLinRelative,
}

impl Conversion {
    fn exact(self, x: f64) -> f64 {
        match self {
            Conversion::LinToDb => 10.0 * x.log10(),
            Conversion::DbToLin | Conversion::DbToLinRelative => 10f64.powf(x / 10.0),
        }
    }
}

/// Build a network from a scenario file and save it as a snapshot.
pub fn generate(scenario: &Path, out: &Path) -> Result<NetworkModel> {
    let config = ScenarioConfig::from_path(scenario)?;
    let mut net = NetworkModel::default();
    StageSequence::new("generate")
        .then(Generate::new(config))
        .then(SaveSnapshot::new(out))
        .run(&mut net)?;
    info!(
        "Generated {} UEs and {} base stations into {:?}",
        net.ues().len(),
        net.base_stations().len(),
        out
    );
    Ok(net)
}

/// Run the derivation stages on a snapshot in place.
pub fn derive(dir: &Path, config: &PlannerConfig) -> Result<NetworkModel> {
    let mut pipeline = StageSequence::new("derive-snapshot").then(LoadSnapshot::new(dir));
    pipeline.append(config.derivation_pipeline());
    pipeline.push(SaveSnapshot::new(dir));

    let mut net = NetworkModel::default();
    pipeline.run(&mut net)?;
    Ok(net)
}

pub fn sweep(dir: &Path, config: &PlannerConfig) -> Result<SweepOutcome> {
    let net = snapshot::load(dir)?;
    let sweep = run_sweep(&net, &config.sweep)?;
    let bound = max_interference(&net)?;
    Ok(SweepOutcome { sweep, bound })
}

/// Build, solve and write back the allocation. Optionally dumps the model in
/// LP format before solving. The snapshot is only rewritten on success.
pub fn allocate(dir: &Path, config: &PlannerConfig, lp: Option<&Path>) -> Result<AllocationSummary> {
    let mut stage = Allocate::new(config.allocation, MicroLpSolver);
    if let Some(path) = lp {
        stage = stage.with_lp_path(path);
    }

    let mut net = NetworkModel::default();
    StageSequence::new("allocate")
        .then(LoadSnapshot::new(dir))
        .then(stage)
        .then(SaveSnapshot::new(dir))
        .run(&mut net)?;

    let objective = allocation_cost(&net, &config.allocation)?;
    Ok(AllocationSummary::from_network(&net, objective))
}

pub fn linearize(conversion: Conversion, lower: f64, upper: f64, tolerance: f64) -> Result<LinearizationReport> {
    let linearization = match conversion {
        Conversion::LinToDb => lin_to_db(lower, upper, tolerance)?,
        Conversion::DbToLin => db_to_lin(lower, upper, Tolerance::Absolute(tolerance))?,
        Conversion::DbToLinRelative => db_to_lin(lower, upper, Tolerance::Relative(tolerance))?,
    };
    let max_deviation = linearization.max_deviation(|x| conversion.exact(x), 10_000);
    info!(
        "{:?} on [{}, {}]: {} breakpoints, max deviation {:.4}",
        conversion,
        lower,
        upper,
        linearization.len(),
        max_deviation
    );

    Ok(LinearizationReport {
        conversion: format!("{conversion:?}"),
        lower,
        upper,
        tolerance,
        slope_before: linearization.slope_before,
        slope_after: linearization.slope_after,
        breakpoints: linearization.breakpoints,
        max_deviation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlannerError;
    use ran_network::{Column, ConnAttr, ConnectionFilter, NetworkError};

    const SCENARIO: &str = r#"
seed = 3

[channel]
noise = -100.0
area = [100.0, 100.0]
bandwidth = [0.0, 10.0]

[mcs_table]
levels = 1

[ues]
pos = "scatter:0.0005"
gain = 0.0
demand = 0.1
max_power = 20.0

[gnbs]
pos = "grid:1x3"
gain = 0.0
"#;

    fn generated(scenario: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let scenario_path = dir.path().join("scenario.toml");
        std::fs::write(&scenario_path, scenario).unwrap();
        let snapshot_dir = dir.path().join("net");
        generate(&scenario_path, &snapshot_dir).unwrap();
        (dir, snapshot_dir)
    }

    #[test]
    fn test_full_run() {
        let (dir, net_dir) = generated(SCENARIO);
        let config = PlannerConfig::default();

        let net = derive(&net_dir, &config).unwrap();
        assert_eq!(net.ues().len(), 5);
        assert_eq!(ConnectionFilter::new(&net).len(), 15);

        let outcome = sweep(&net_dir, &config).unwrap();
        assert_eq!(outcome.sweep.errors.shape(), (10, 15, 1));
        assert!(outcome.bound.pairs > 0);

        let lp = dir.path().join("model.lp");
        let summary = allocate(&net_dir, &config, Some(&lp)).unwrap();
        assert_eq!(summary.allocated_connections, 15);
        assert!(summary.objective > 0.0);
        assert!(summary.total_x_traffic >= 5.0 * 0.1 - 1e-6);
        assert!(std::fs::read_to_string(&lp).unwrap().contains("prot2_u0_b0_b1"));

        let reloaded = snapshot::load(&net_dir).unwrap();
        assert!(reloaded.has_column(Column::Conn(ConnAttr::McsIndex)));
        assert_eq!(reloaded.connections().iter().filter(|(_, c)| c.allocation.is_some()).count(), 15);
    }

    #[test]
    fn test_missing_ue_gain_stops_derivation() {
        let without_gain = SCENARIO.replacen("gain = 0.0\n", "", 1);
        let (_dir, net_dir) = generated(&without_gain);
        let err = derive(&net_dir, &PlannerConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Network(NetworkError::MissingDependency { ref stage, .. }) if stage == "CalcMaxSnr"
        ));
    }

    #[test]
    fn test_allocate_before_derive_leaves_snapshot_untouched() {
        let (_dir, net_dir) = generated(SCENARIO);
        let before = snapshot::load(&net_dir).unwrap();
        let err = allocate(&net_dir, &PlannerConfig::default(), None).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Network(NetworkError::MissingDependency { ref stage, .. }) if stage == "Allocate"
        ));
        assert_eq!(snapshot::load(&net_dir).unwrap(), before);
    }

    #[test]
    fn test_linearize_reports_bound() {
        let report = linearize(Conversion::LinToDb, 0.1, 10_000.0, 0.5).unwrap();
        assert!(report.breakpoints.len() > 2);
        assert!(report.max_deviation <= 0.5 + 1e-6);
        assert_eq!(report.breakpoints.last().unwrap().x, 10_000.0);

        let relative = linearize(Conversion::DbToLinRelative, -40.0, 40.0, 0.5).unwrap();
        assert_eq!(relative.breakpoints.first().unwrap().x, -40.0);
    }
}
