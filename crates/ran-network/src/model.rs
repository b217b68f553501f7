//! Network entities and the keyed connection table.

use crate::schema::{BsAttr, Column, ConnAttr, Table, UeAttr};
use crate::{NetworkError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Index of a UE; equals its position in the UE table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UeId(pub usize);

/// Index of a base station; equals its position in the base-station table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BsId(pub usize);

impl fmt::Display for UeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ue{}", self.0)
    }
}

impl fmt::Display for BsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bs{}", self.0)
    }
}

/// Connection identity: the ordered (base station, UE) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnKey {
    pub bs: BsId,
    pub ue: UeId,
}

impl ConnKey {
    pub fn new(bs: usize, ue: usize) -> Self {
        Self {
            bs: BsId(bs),
            ue: UeId(ue),
        }
    }
}

impl fmt::Display for ConnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.bs, self.ue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// User equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ue {
    pub id: UeId,
    pub position: Position,
    /// Antenna gain (dB)
    pub gain: f64,
    /// Maximum transmit power (dBm)
    pub max_power: f64,
    /// Traffic demand (rate units)
    pub demand: f64,
}

impl Ue {
    pub fn new(id: usize, x: f64, y: f64) -> Self {
        Self {
            id: UeId(id),
            position: Position::new(x, y),
            gain: 0.0,
            max_power: 0.0,
            demand: 0.0,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_max_power(mut self, max_power: f64) -> Self {
        self.max_power = max_power;
        self
    }

    pub fn with_demand(mut self, demand: f64) -> Self {
        self.demand = demand;
        self
    }
}

/// Base station (gNB).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseStation {
    pub id: BsId,
    pub position: Position,
    /// Antenna gain (dB)
    pub gain: f64,
}

impl BaseStation {
    pub fn new(id: usize, x: f64, y: f64) -> Self {
        Self {
            id: BsId(id),
            position: Position::new(x, y),
            gain: 0.0,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }
}

/// Global channel parameters, read-only during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channel {
    /// Noise floor (dB)
    pub noise: f64,
    /// Simulated area (width, height)
    pub area: (f64, f64),
    /// Usable band (low, high)
    pub bandwidth: (f64, f64),
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            noise: -100.0,
            area: (100.0, 100.0),
            bandwidth: (0.0, 1.0),
        }
    }
}

impl Channel {
    /// Width of the usable band, the per-node bandwidth budget.
    pub fn bandwidth_span(&self) -> f64 {
        self.bandwidth.1 - self.bandwidth.0
    }

    pub fn center_frequency(&self) -> f64 {
        (self.bandwidth.0 + self.bandwidth.1) / 2.0
    }
}

/// One modulation/coding level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct McsLevel {
    pub index: usize,
    /// SNR threshold (dB)
    pub snr: f64,
    /// Spectral efficiency (rate per bandwidth unit)
    pub efficiency: f64,
}

/// Fixed-size MCS table: `snr(m) = min_snr + m·spacing`,
/// `eff(m) = η·log2(1 + 10^(snr(m)/10))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McsTable {
    pub levels: usize,
    pub min_snr: f64,
    pub spacing: f64,
    pub efficiency: f64,
}

impl Default for McsTable {
    fn default() -> Self {
        Self {
            levels: 8,
            min_snr: -5.0,
            spacing: 2.0,
            efficiency: 0.9,
        }
    }
}

impl McsTable {
    /// Level by index; negative indices count from the top (`-1` is highest).
    pub fn level(&self, index: isize) -> Result<McsLevel> {
        let levels = self.levels as isize;
        if index < -levels || index >= levels {
            return Err(NetworkError::McsLevelOutOfRange {
                level: index,
                levels: self.levels,
            });
        }
        let m = if index < 0 { levels + index } else { index } as usize;
        let snr = self.min_snr + self.spacing * m as f64;
        let efficiency = self.efficiency * (1.0 + 10f64.powf(snr / 10.0)).log2();
        Ok(McsLevel {
            index: m,
            snr,
            efficiency,
        })
    }

    /// All levels in increasing SNR order.
    pub fn iter(&self) -> impl Iterator<Item = McsLevel> + '_ {
        (0..self.levels).filter_map(move |m| self.level(m as isize).ok())
    }
}

/// Allocation results written back for an eligible connection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Allocation {
    pub bandwidth: f64,
    pub signal_power: f64,
    pub x_traffic: f64,
    pub y_traffic: f64,
    pub mcs_index: usize,
}

/// Derived attributes of one (base station, UE) pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Connection {
    pub distance: f64,
    /// Pathloss (dB)
    pub pathloss: f64,
    pub weight: f64,
    /// Maximum achievable SNR (dB)
    pub max_snr: f64,
    pub eligible: bool,
    pub allocation: Option<Allocation>,
}

/// Dense base-station × UE connection table keyed by [`ConnKey`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionTable {
    entries: BTreeMap<ConnKey, Connection>,
    bs_count: usize,
    ue_count: usize,
}

impl ConnectionTable {
    /// Full cross product with default records.
    pub fn new(bs_count: usize, ue_count: usize) -> Self {
        let entries = (0..bs_count)
            .flat_map(|b| (0..ue_count).map(move |u| (ConnKey::new(b, u), Connection::default())))
            .collect();
        Self {
            entries,
            bs_count,
            ue_count,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.bs_count, self.ue_count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: ConnKey) -> Option<&Connection> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: ConnKey) -> Option<&mut Connection> {
        self.entries.get_mut(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnKey, &Connection)> {
        self.entries.iter().map(|(k, c)| (*k, c))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ConnKey, &mut Connection)> {
        self.entries.iter_mut().map(|(k, c)| (*k, c))
    }

    pub fn keys(&self) -> impl Iterator<Item = ConnKey> + '_ {
        self.entries.keys().copied()
    }

    /// Attribute as a base-station-major matrix.
    pub fn matrix<F>(&self, value: F) -> Vec<Vec<f64>>
    where
        F: Fn(&Connection) -> f64,
    {
        let mut rows = vec![Vec::with_capacity(self.ue_count); self.bs_count];
        for (key, conn) in &self.entries {
            rows[key.bs.0].push(value(conn));
        }
        rows
    }
}

/// Exclusive owner of every entity table for the duration of a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetworkModel {
    channel: Channel,
    mcs: McsTable,
    ues: Vec<Ue>,
    base_stations: Vec<BaseStation>,
    connections: ConnectionTable,
    columns: BTreeSet<Column>,
}

impl NetworkModel {
    pub fn new(channel: Channel, mcs: McsTable) -> Self {
        Self {
            channel,
            mcs,
            ..Self::default()
        }
    }

    /// Replace the UE table. Positions are always present; `present` lists
    /// the optional attributes that carry real values.
    pub fn set_ues(&mut self, ues: Vec<Ue>, present: &[UeAttr]) -> Result<()> {
        check_ids(Table::Ues, ues.iter().map(|u| u.id.0))?;
        self.ues = ues;
        self.columns.retain(|c| c.table() != Table::Ues);
        self.columns.insert(Column::Ue(UeAttr::X));
        self.columns.insert(Column::Ue(UeAttr::Y));
        self.columns.extend(present.iter().map(|a| Column::Ue(*a)));
        self.reset_connections();
        Ok(())
    }

    /// Replace the base-station table.
    pub fn set_base_stations(&mut self, base_stations: Vec<BaseStation>, present: &[BsAttr]) -> Result<()> {
        check_ids(Table::BaseStations, base_stations.iter().map(|b| b.id.0))?;
        self.base_stations = base_stations;
        self.columns.retain(|c| c.table() != Table::BaseStations);
        self.columns.insert(Column::Bs(BsAttr::X));
        self.columns.insert(Column::Bs(BsAttr::Y));
        self.columns.extend(present.iter().map(|a| Column::Bs(*a)));
        self.reset_connections();
        Ok(())
    }

    fn reset_connections(&mut self) {
        self.connections = ConnectionTable::new(self.base_stations.len(), self.ues.len());
        self.columns.retain(|c| c.table() != Table::Connections);
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn mcs(&self) -> &McsTable {
        &self.mcs
    }

    pub fn ues(&self) -> &[Ue] {
        &self.ues
    }

    pub fn base_stations(&self) -> &[BaseStation] {
        &self.base_stations
    }

    pub fn ue(&self, id: UeId) -> Option<&Ue> {
        self.ues.get(id.0)
    }

    pub fn base_station(&self, id: BsId) -> Option<&BaseStation> {
        self.base_stations.get(id.0)
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionTable {
        &mut self.connections
    }

    pub fn connection(&self, key: ConnKey) -> Result<&Connection> {
        self.connections
            .get(key)
            .ok_or(NetworkError::UnknownConnection(key))
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    pub fn columns(&self) -> impl Iterator<Item = Column> + '_ {
        self.columns.iter().copied()
    }

    /// Present connection attributes, in schema order.
    pub fn connection_columns(&self) -> Vec<ConnAttr> {
        ConnAttr::ALL
            .into_iter()
            .filter(|a| self.has_column(Column::Conn(*a)))
            .collect()
    }

    /// Fail with [`NetworkError::MissingDependency`] on the first absent column.
    pub fn require(&self, stage: &str, dependencies: &[Column]) -> Result<()> {
        match dependencies.iter().find(|c| !self.has_column(**c)) {
            Some(missing) => Err(NetworkError::MissingDependency {
                table: missing.table(),
                attribute: missing.attribute(),
                stage: stage.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn mark_produced(&mut self, columns: &[Column]) {
        self.columns.extend(columns.iter().copied());
    }
}

fn check_ids(table: Table, ids: impl Iterator<Item = usize>) -> Result<()> {
    for (position, found) in ids.enumerate() {
        if position != found {
            return Err(NetworkError::InvalidIds {
                table,
                position,
                found,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcs_levels() {
        let mcs = McsTable::default();
        let first = mcs.level(0).unwrap();
        assert_eq!(first.snr, -5.0);
        assert!((first.efficiency - 0.9 * (1.0 + 10f64.powf(-0.5)).log2()).abs() < 1e-12);

        let top = mcs.level(-1).unwrap();
        assert_eq!(top.index, 7);
        assert_eq!(top.snr, 9.0);
        assert_eq!(mcs.level(7).unwrap(), top);

        let levels: Vec<_> = mcs.iter().collect();
        assert_eq!(levels.len(), 8);
        assert!(levels.windows(2).all(|w| w[0].snr < w[1].snr && w[0].efficiency < w[1].efficiency));
    }

    #[test]
    fn test_mcs_out_of_range() {
        let mcs = McsTable::default();
        assert!(matches!(
            mcs.level(8),
            Err(NetworkError::McsLevelOutOfRange { level: 8, levels: 8 })
        ));
        assert!(mcs.level(-9).is_err());
    }

    #[test]
    fn test_connection_table_cross_product() {
        let mut net = NetworkModel::new(Channel::default(), McsTable::default());
        net.set_base_stations(vec![BaseStation::new(0, 0.0, 0.0), BaseStation::new(1, 5.0, 5.0)], &[])
            .unwrap();
        net.set_ues((0..3).map(|i| Ue::new(i, i as f64, 0.0)).collect(), &[UeAttr::Gain])
            .unwrap();

        assert_eq!(net.connections().len(), 6);
        assert_eq!(net.connections().shape(), (2, 3));
        assert!(net.connection(ConnKey::new(1, 2)).is_ok());
        assert!(matches!(
            net.connection(ConnKey::new(2, 0)),
            Err(NetworkError::UnknownConnection(_))
        ));
        assert!(net.has_column(Column::Ue(UeAttr::Gain)));
        assert!(!net.has_column(Column::Ue(UeAttr::Demand)));

        let matrix = net.connections().matrix(|c| c.distance);
        assert_eq!(matrix.len(), 2);
        assert!(matrix.iter().all(|row| row.len() == 3));
    }

    #[test]
    fn test_ids_must_match_positions() {
        let mut net = NetworkModel::default();
        let err = net
            .set_ues(vec![Ue::new(0, 0.0, 0.0), Ue::new(2, 0.0, 0.0)], &[])
            .unwrap_err();
        assert!(matches!(
            err,
            NetworkError::InvalidIds { table: Table::Ues, position: 1, found: 2 }
        ));
    }

    #[test]
    fn test_replacing_entities_clears_connection_columns() {
        let mut net = NetworkModel::default();
        net.set_ues(vec![Ue::new(0, 0.0, 0.0)], &[]).unwrap();
        net.mark_produced(&[Column::Conn(ConnAttr::Distance)]);
        assert!(net.has_column(Column::Conn(ConnAttr::Distance)));

        net.set_base_stations(vec![BaseStation::new(0, 1.0, 1.0)], &[]).unwrap();
        assert!(!net.has_column(Column::Conn(ConnAttr::Distance)));
    }

    #[test]
    fn test_require_names_missing_column() {
        let net = NetworkModel::default();
        let err = net
            .require("CalcMaxSnr", &[Column::Conn(ConnAttr::Pathloss)])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Table \"conns\" has no column \"pathloss\", but stage \"CalcMaxSnr\" requires it"
        );
    }
}
