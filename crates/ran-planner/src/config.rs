use crate::Result;
use alloc_model::AllocationParams;
use interference_sampler::SweepConfig;
use ran_network::stages::DEFAULT_DISTANCE_CLIP;
use ran_network::{CalcMaxSnr, DistanceCalc, DistanceWeight, FreeSpacePathloss, MinSnrFilter, StageSequence};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the connection derivation stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveConfig {
    /// Distances below this are clipped before computing pathloss
    pub pathloss_clip: f64,
    /// Added to distance to form the objective weight
    pub weight_constant: f64,
}

impl Default for DeriveConfig {
    fn default() -> Self {
        Self {
            pathloss_clip: DEFAULT_DISTANCE_CLIP,
            weight_constant: 0.0,
        }
    }
}

/// Planner TOML file:
///
/// ```toml
/// [derive]
/// pathloss_clip = 0.1
/// weight_constant = 1.0
///
/// [sweep]
/// trials = 20
/// seed = 7
///
/// [sweep.sampler]
/// delta = 10
///
/// [allocation]
/// alpha = 0.1
/// energy = { kind = "linear", errp = 0.05 }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub derive: DeriveConfig,
    pub sweep: SweepConfig,
    pub allocation: AllocationParams,
}

impl PlannerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Distance, pathloss, weight, max SNR, then the eligibility filter.
    pub fn derivation_pipeline(&self) -> StageSequence {
        StageSequence::new("derive")
            .then(DistanceCalc)
            .then(FreeSpacePathloss {
                clip: self.derive.pathloss_clip,
            })
            .then(DistanceWeight {
                constant: self.derive.weight_constant,
            })
            .then(CalcMaxSnr)
            .then(MinSnrFilter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc_model::{EnergyCost, Protection};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PlannerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlannerConfig::default());
        assert_eq!(config.allocation.alpha, 0.1);
        assert_eq!(config.sweep.magnitudes.len(), 10);
    }

    #[test]
    fn test_partial_tables() {
        let config = PlannerConfig::from_toml_str(
            r#"
[derive]
weight_constant = 2.5

[sweep]
trials = 20
seed = 7
magnitudes = [0.5, 1.0]

[sweep.sampler]
delta = 4

[allocation]
rho = 0.5
protection = "single"
energy = { kind = "linear", errp = 0.05 }
"#,
        )
        .unwrap();
        assert_eq!(config.derive.pathloss_clip, DEFAULT_DISTANCE_CLIP);
        assert_eq!(config.derive.weight_constant, 2.5);
        assert_eq!(config.sweep.trials, 20);
        assert_eq!(config.sweep.sampler.delta, 4);
        assert_eq!(config.allocation.alpha, 0.1);
        assert_eq!(config.allocation.rho, 0.5);
        assert_eq!(config.allocation.protection, Protection::Single);
        assert_eq!(config.allocation.energy, EnergyCost::Linear { errp: 0.05 });
    }

    #[test]
    fn test_unknown_energy_kind_is_rejected() {
        let err = PlannerConfig::from_toml_str("[allocation]\nenergy = { kind = \"cubic\" }\n").unwrap_err();
        assert!(matches!(err, crate::PlannerError::Config(_)));
    }

    #[test]
    fn test_pipeline_order() {
        let pipeline = PlannerConfig::default().derivation_pipeline();
        let names = pipeline.names();
        assert_eq!(
            names,
            vec!["DistanceCalc", "FreeSpacePathloss", "DistanceWeight", "CalcMaxSnr", "MinSnrFilter"]
        );
    }
}
