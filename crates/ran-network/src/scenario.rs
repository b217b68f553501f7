//! Scenario files: channel, MCS table and entity layouts in TOML.
//!
//! ```toml
//! seed = 42
//!
//! [channel]
//! noise = -100.0
//! area = [100.0, 100.0]
//! bandwidth = [0.0, 1.0]
//!
//! [mcs_table]
//! levels = 8
//!
//! [ues]
//! pos = "scatter:0.005"
//! gain = 0.0
//! demand = 0.1
//! max_power = 20.0
//!
//! [gnbs]
//! pos = "grid:2x2"
//! gain = 5.0
//! ```

use crate::layout::Layout;
use crate::model::{BaseStation, Channel, McsTable, NetworkModel, Ue};
use crate::pipeline::Stage;
use crate::schema::{BsAttr, UeAttr};
use crate::{NetworkError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UeSpec {
    pub pos: Layout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demand: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_power: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GnbSpec {
    pub pos: Layout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub mcs_table: McsTable,
    pub ues: UeSpec,
    pub gnbs: GnbSpec,
}

impl ScenarioConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<()> {
        let (w, h) = self.channel.area;
        if !(w > 0.0 && h > 0.0) {
            return Err(NetworkError::InvalidScenario(format!("area {w}x{h} must be positive")));
        }
        if self.channel.bandwidth.1 <= self.channel.bandwidth.0 {
            return Err(NetworkError::InvalidScenario(format!(
                "bandwidth {}-{} is empty",
                self.channel.bandwidth.0, self.channel.bandwidth.1
            )));
        }
        if self.mcs_table.levels == 0 {
            return Err(NetworkError::InvalidScenario("MCS table needs at least one level".into()));
        }
        Ok(())
    }

    /// Generate a fresh network. UE positions are drawn before base-station
    /// positions from one RNG seeded with `seed`.
    pub fn build(&self) -> Result<NetworkModel> {
        self.validate()?;
        let mut net = NetworkModel::new(self.channel.clone(), self.mcs_table.clone());
        self.populate(&mut net)?;
        Ok(net)
    }

    fn populate(&self, net: &mut NetworkModel) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let area = self.channel.area;

        let ue_spec = &self.ues;
        let ues: Vec<Ue> = ue_spec
            .pos
            .positions(area, &mut rng)
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                Ue::new(i, p.x, p.y)
                    .with_gain(ue_spec.gain.unwrap_or_default())
                    .with_demand(ue_spec.demand.unwrap_or_default())
                    .with_max_power(ue_spec.max_power.unwrap_or_default())
            })
            .collect();
        let ue_attrs: Vec<UeAttr> = [
            (UeAttr::Gain, ue_spec.gain.is_some()),
            (UeAttr::Demand, ue_spec.demand.is_some()),
            (UeAttr::MaxPower, ue_spec.max_power.is_some()),
        ]
        .into_iter()
        .filter_map(|(attr, present)| present.then_some(attr))
        .collect();

        let gnbs: Vec<BaseStation> = self
            .gnbs
            .pos
            .positions(area, &mut rng)
            .into_iter()
            .enumerate()
            .map(|(i, p)| BaseStation::new(i, p.x, p.y).with_gain(self.gnbs.gain.unwrap_or_default()))
            .collect();
        let gnb_attrs: Vec<BsAttr> = self.gnbs.gain.map(|_| BsAttr::Gain).into_iter().collect();

        info!(
            "Generated {} UEs ({}) and {} base stations ({})",
            ues.len(),
            ue_spec.pos,
            gnbs.len(),
            self.gnbs.pos
        );
        net.set_ues(ues, &ue_attrs)?;
        net.set_base_stations(gnbs, &gnb_attrs)?;
        Ok(())
    }
}

/// Replace the model's channel, MCS table and entities with a freshly
/// generated scenario.
#[derive(Debug, Clone)]
pub struct Generate {
    pub scenario: ScenarioConfig,
}

impl Generate {
    pub fn new(scenario: ScenarioConfig) -> Self {
        Self { scenario }
    }
}

impl Stage for Generate {
    fn name(&self) -> &str {
        "Generate"
    }

    fn execute(&self, net: &mut NetworkModel) -> Result<()> {
        *net = self.scenario.build()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageSequence;
    use crate::schema::Column;
    use crate::stages::{CalcMaxSnr, DistanceCalc, FreeSpacePathloss};

    const SCENARIO: &str = r#"
seed = 42

[channel]
noise = -90.0
area = [100.0, 100.0]
bandwidth = [0.0, 2.0]

[mcs_table]
levels = 4

[ues]
pos = "scatter:0.01"
demand = 0.1
max_power = 20.0

[gnbs]
pos = "grid:1x2"
gain = 5.0
"#;

    #[test]
    fn test_parse_scenario() {
        let config = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.channel.noise, -90.0);
        assert_eq!(config.mcs_table.levels, 4);
        assert_eq!(config.mcs_table.min_snr, -5.0);
        assert_eq!(config.ues.pos, Layout::Scatter { density: 0.01 });
        assert_eq!(config.ues.gain, None);
        assert_eq!(config.gnbs.pos, Layout::Grid { rows: 1, cols: 2 });
    }

    #[test]
    fn test_build_marks_only_given_properties() {
        let net = ScenarioConfig::from_toml_str(SCENARIO).unwrap().build().unwrap();
        assert_eq!(net.ues().len(), 100);
        assert_eq!(net.base_stations().len(), 2);
        assert_eq!(net.connections().len(), 200);
        assert_eq!(net.base_stations()[1].position.x, 75.0);

        assert!(net.has_column(Column::Ue(UeAttr::Demand)));
        assert!(net.has_column(Column::Ue(UeAttr::MaxPower)));
        assert!(!net.has_column(Column::Ue(UeAttr::Gain)));
        assert!(net.has_column(Column::Bs(BsAttr::Gain)));
    }

    #[test]
    fn test_omitted_gain_is_a_missing_dependency() {
        let seq = StageSequence::new("derive")
            .then(Generate::new(ScenarioConfig::from_toml_str(SCENARIO).unwrap()))
            .then(DistanceCalc)
            .then(FreeSpacePathloss::default())
            .then(CalcMaxSnr);
        let err = seq.run(&mut NetworkModel::default()).unwrap_err();
        assert!(matches!(err, NetworkError::MissingDependency { attribute: "gain", .. }));
    }

    #[test]
    fn test_same_seed_same_network() {
        let config = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
        assert_eq!(config.build().unwrap(), config.build().unwrap());

        let mut other = config.clone();
        other.seed = 43;
        assert_ne!(config.build().unwrap().ues(), other.build().unwrap().ues());
    }

    #[test]
    fn test_toml_roundtrip_and_file() {
        let config = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(ScenarioConfig::from_toml_str(&text).unwrap(), config);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.toml");
        std::fs::write(&path, text).unwrap();
        assert_eq!(ScenarioConfig::from_path(&path).unwrap(), config);
    }

    #[test]
    fn test_rejects_empty_bandwidth() {
        let text = SCENARIO.replace("bandwidth = [0.0, 2.0]", "bandwidth = [1.0, 1.0]");
        assert!(matches!(
            ScenarioConfig::from_toml_str(&text),
            Err(NetworkError::InvalidScenario(_))
        ));
    }
}
