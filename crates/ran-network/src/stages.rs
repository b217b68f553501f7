//! Connection derivation stages.
//!
//! Each stage writes exactly one connection column and holds only the
//! parameters it needs.

use crate::model::NetworkModel;
use crate::pipeline::Stage;
use crate::schema::{BsAttr, Column, ConnAttr, UeAttr};
use crate::{NetworkError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Carrier frequencies in the channel are expressed in units of 10 GHz.
pub const FREQUENCY_SCALE: f64 = 10e9;
pub const SPEED_OF_LIGHT: f64 = 3e8;
pub const DEFAULT_DISTANCE_CLIP: f64 = 0.1;

/// Euclidean distance for every (base station, UE) pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceCalc;

impl Stage for DistanceCalc {
    fn name(&self) -> &str {
        "DistanceCalc"
    }

    fn requires(&self) -> Vec<Column> {
        vec![
            Column::Ue(UeAttr::X),
            Column::Ue(UeAttr::Y),
            Column::Bs(BsAttr::X),
            Column::Bs(BsAttr::Y),
        ]
    }

    fn produces(&self) -> Vec<Column> {
        vec![Column::Conn(ConnAttr::Distance)]
    }

    fn execute(&self, net: &mut NetworkModel) -> Result<()> {
        let bs_positions: Vec<_> = net.base_stations().iter().map(|b| b.position).collect();
        let ue_positions: Vec<_> = net.ues().iter().map(|u| u.position).collect();
        for (key, conn) in net.connections_mut().iter_mut() {
            conn.distance = bs_positions[key.bs.0].distance_to(&ue_positions[key.ue.0]);
        }
        Ok(())
    }
}

/// Free-space pathloss in dB at the channel's centre frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreeSpacePathloss {
    /// Distances below this are clipped to avoid log10(0).
    pub clip: f64,
}

impl Default for FreeSpacePathloss {
    fn default() -> Self {
        Self {
            clip: DEFAULT_DISTANCE_CLIP,
        }
    }
}

impl FreeSpacePathloss {
    pub fn pathloss(&self, distance: f64, frequency: f64) -> f64 {
        let d = distance.max(self.clip);
        20.0 * (d.log10() + (frequency * FREQUENCY_SCALE).log10() + (4.0 * PI / SPEED_OF_LIGHT).log10())
    }
}

impl Stage for FreeSpacePathloss {
    fn name(&self) -> &str {
        "FreeSpacePathloss"
    }

    fn requires(&self) -> Vec<Column> {
        vec![Column::Conn(ConnAttr::Distance)]
    }

    fn produces(&self) -> Vec<Column> {
        vec![Column::Conn(ConnAttr::Pathloss)]
    }

    fn execute(&self, net: &mut NetworkModel) -> Result<()> {
        let frequency = net.channel().center_frequency();
        if !(frequency > 0.0) {
            return Err(NetworkError::InvalidChannel(format!(
                "centre frequency {frequency} must be positive"
            )));
        }
        debug!("Pathloss at centre frequency {} (x{:e} Hz)", frequency, FREQUENCY_SCALE);
        for (_, conn) in net.connections_mut().iter_mut() {
            conn.pathloss = self.pathloss(conn.distance, frequency);
        }
        Ok(())
    }
}

/// Objective weight growing linearly with distance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceWeight {
    pub constant: f64,
}

impl Stage for DistanceWeight {
    fn name(&self) -> &str {
        "DistanceWeight"
    }

    fn requires(&self) -> Vec<Column> {
        vec![Column::Conn(ConnAttr::Distance)]
    }

    fn produces(&self) -> Vec<Column> {
        vec![Column::Conn(ConnAttr::Weight)]
    }

    fn execute(&self, net: &mut NetworkModel) -> Result<()> {
        for (_, conn) in net.connections_mut().iter_mut() {
            conn.weight = conn.distance + self.constant;
        }
        Ok(())
    }
}

/// SNR at full UE transmit power.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalcMaxSnr;

impl Stage for CalcMaxSnr {
    fn name(&self) -> &str {
        "CalcMaxSnr"
    }

    fn requires(&self) -> Vec<Column> {
        vec![
            Column::Ue(UeAttr::MaxPower),
            Column::Ue(UeAttr::Gain),
            Column::Bs(BsAttr::Gain),
            Column::Conn(ConnAttr::Pathloss),
        ]
    }

    fn produces(&self) -> Vec<Column> {
        vec![Column::Conn(ConnAttr::MaxSnr)]
    }

    fn execute(&self, net: &mut NetworkModel) -> Result<()> {
        let noise = net.channel().noise;
        let ues: Vec<_> = net.ues().iter().map(|u| (u.max_power, u.gain)).collect();
        let bs_gains: Vec<_> = net.base_stations().iter().map(|b| b.gain).collect();
        for (key, conn) in net.connections_mut().iter_mut() {
            let (max_power, ue_gain) = ues[key.ue.0];
            conn.max_snr = max_power - conn.pathloss + ue_gain + bs_gains[key.bs.0] - noise;
        }
        Ok(())
    }
}

/// Marks a connection eligible when its max SNR clears the lowest MCS level.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinSnrFilter;

impl Stage for MinSnrFilter {
    fn name(&self) -> &str {
        "MinSnrFilter"
    }

    fn requires(&self) -> Vec<Column> {
        vec![Column::Conn(ConnAttr::MaxSnr)]
    }

    fn produces(&self) -> Vec<Column> {
        vec![Column::Conn(ConnAttr::Filter)]
    }

    fn execute(&self, net: &mut NetworkModel) -> Result<()> {
        let threshold = net.mcs().level(0)?.snr;
        let mut eligible = 0usize;
        for (_, conn) in net.connections_mut().iter_mut() {
            conn.eligible = conn.max_snr > threshold;
            eligible += usize::from(conn.eligible);
        }
        debug!(
            "{} of {} connections above {} dB",
            eligible,
            net.connections().len(),
            threshold
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ConnectionFilter;
    use crate::model::{BaseStation, Channel, ConnKey, McsTable, Ue};
    use crate::pipeline::StageSequence;

    fn network() -> NetworkModel {
        let mut net = NetworkModel::new(Channel::default(), McsTable::default());
        net.set_base_stations(vec![BaseStation::new(0, 0.0, 0.0).with_gain(3.0)], &[BsAttr::Gain])
            .unwrap();
        net.set_ues(
            vec![
                Ue::new(0, 3.0, 4.0).with_max_power(20.0).with_gain(1.0),
                Ue::new(1, 0.0, 0.0).with_max_power(20.0).with_gain(1.0),
                Ue::new(2, 3000.0, 4000.0).with_max_power(-30.0).with_gain(1.0),
            ],
            &[UeAttr::Gain, UeAttr::MaxPower],
        )
        .unwrap();
        net
    }

    fn derivation() -> StageSequence {
        StageSequence::new("derive")
            .then(DistanceCalc)
            .then(FreeSpacePathloss::default())
            .then(DistanceWeight { constant: 1.0 })
            .then(CalcMaxSnr)
            .then(MinSnrFilter)
    }

    #[test]
    fn test_distance_and_weight() {
        let mut net = network();
        derivation().run(&mut net).unwrap();
        let conn = net.connection(ConnKey::new(0, 0)).unwrap();
        assert_eq!(conn.distance, 5.0);
        assert_eq!(conn.weight, 6.0);
    }

    #[test]
    fn test_pathloss_formula_and_clip() {
        let fspl = FreeSpacePathloss::default();
        let expected = 20.0 * (5.0f64.log10() + 5e9f64.log10() + (4.0 * PI / 3e8).log10());
        assert!((fspl.pathloss(5.0, 0.5) - expected).abs() < 1e-9);
        assert_eq!(fspl.pathloss(0.0, 0.5), fspl.pathloss(0.1, 0.5));
    }

    #[test]
    fn test_max_snr_and_filter() {
        let mut net = network();
        derivation().run(&mut net).unwrap();

        let conn = net.connection(ConnKey::new(0, 0)).unwrap();
        let expected = 20.0 - conn.pathloss + 1.0 + 3.0 + 100.0;
        assert!((conn.max_snr - expected).abs() < 1e-9);
        assert!(conn.eligible);

        // 5 km away at -30 dBm is far below -5 dB
        assert!(!net.connection(ConnKey::new(0, 2)).unwrap().eligible);
        assert_eq!(ConnectionFilter::new(&net).len(), 2);
    }

    #[test]
    fn test_max_snr_requires_ue_power() {
        let mut net = NetworkModel::default();
        net.set_base_stations(vec![BaseStation::new(0, 0.0, 0.0)], &[BsAttr::Gain])
            .unwrap();
        net.set_ues(vec![Ue::new(0, 1.0, 1.0)], &[UeAttr::Gain]).unwrap();

        let err = derivation().run(&mut net).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::MissingDependency { attribute: "max_power", ref stage, .. } if stage == "CalcMaxSnr"
        ));
        // Stages before the failure keep their output
        assert!(net.has_column(Column::Conn(ConnAttr::Pathloss)));
        assert!(!net.has_column(Column::Conn(ConnAttr::MaxSnr)));
    }
}
