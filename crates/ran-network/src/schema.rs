//! Typed column schema.
//!
//! Every attribute a stage may read or write is an enum variant, so a
//! dependency on a misspelled column cannot be expressed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity tables of the network model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Table {
    Ues,
    BaseStations,
    Connections,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Ues => "ues",
            Table::BaseStations => "gnbs",
            Table::Connections => "conns",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UeAttr {
    X,
    Y,
    Gain,
    MaxPower,
    Demand,
}

impl UeAttr {
    pub const ALL: [UeAttr; 5] = [UeAttr::X, UeAttr::Y, UeAttr::Gain, UeAttr::MaxPower, UeAttr::Demand];

    pub fn name(&self) -> &'static str {
        match self {
            UeAttr::X => "x",
            UeAttr::Y => "y",
            UeAttr::Gain => "gain",
            UeAttr::MaxPower => "max_power",
            UeAttr::Demand => "demand",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BsAttr {
    X,
    Y,
    Gain,
}

impl BsAttr {
    pub const ALL: [BsAttr; 3] = [BsAttr::X, BsAttr::Y, BsAttr::Gain];

    pub fn name(&self) -> &'static str {
        match self {
            BsAttr::X => "x",
            BsAttr::Y => "y",
            BsAttr::Gain => "gain",
        }
    }
}

/// Derived per-connection attributes, each written by exactly one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConnAttr {
    Distance,
    Pathloss,
    Weight,
    MaxSnr,
    Filter,
    Bandwidth,
    SignalPower,
    XTraffic,
    YTraffic,
    McsIndex,
}

impl ConnAttr {
    pub const ALL: [ConnAttr; 10] = [
        ConnAttr::Distance,
        ConnAttr::Pathloss,
        ConnAttr::Weight,
        ConnAttr::MaxSnr,
        ConnAttr::Filter,
        ConnAttr::Bandwidth,
        ConnAttr::SignalPower,
        ConnAttr::XTraffic,
        ConnAttr::YTraffic,
        ConnAttr::McsIndex,
    ];

    /// Attributes written back by resource allocation.
    pub const ALLOCATION: [ConnAttr; 5] = [
        ConnAttr::Bandwidth,
        ConnAttr::SignalPower,
        ConnAttr::XTraffic,
        ConnAttr::YTraffic,
        ConnAttr::McsIndex,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConnAttr::Distance => "distance",
            ConnAttr::Pathloss => "pathloss",
            ConnAttr::Weight => "weight",
            ConnAttr::MaxSnr => "max_snr",
            ConnAttr::Filter => "filter",
            ConnAttr::Bandwidth => "bandwidth",
            ConnAttr::SignalPower => "signal_power",
            ConnAttr::XTraffic => "x_traffic",
            ConnAttr::YTraffic => "y_traffic",
            ConnAttr::McsIndex => "mcs_idx",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }
}

/// A (table, attribute) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Column {
    Ue(UeAttr),
    Bs(BsAttr),
    Conn(ConnAttr),
}

impl Column {
    pub fn table(&self) -> Table {
        match self {
            Column::Ue(_) => Table::Ues,
            Column::Bs(_) => Table::BaseStations,
            Column::Conn(_) => Table::Connections,
        }
    }

    pub fn attribute(&self) -> &'static str {
        match self {
            Column::Ue(a) => a.name(),
            Column::Bs(a) => a.name(),
            Column::Conn(a) => a.name(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table(), self.attribute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conn_attr_names_roundtrip() {
        for attr in ConnAttr::ALL {
            assert_eq!(ConnAttr::from_name(attr.name()), Some(attr));
        }
        assert_eq!(ConnAttr::from_name("nonsense"), None);
    }

    #[test]
    fn test_column_display() {
        assert_eq!(Column::Ue(UeAttr::MaxPower).to_string(), "ues.max_power");
        assert_eq!(Column::Bs(BsAttr::Gain).to_string(), "gnbs.gain");
        assert_eq!(Column::Conn(ConnAttr::McsIndex).to_string(), "conns.mcs_idx");
    }
}
