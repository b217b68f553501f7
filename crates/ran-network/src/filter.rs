use crate::model::{BsId, ConnKey, NetworkModel, UeId};
use crate::schema::{Column, ConnAttr};

/// Snapshot of the eligible connection keys.
///
/// When the filter column is absent every (base station, UE) pair is
/// eligible. Keys are in table order (base-station major).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFilter {
    keys: Vec<ConnKey>,
}

impl ConnectionFilter {
    pub fn new(net: &NetworkModel) -> Self {
        let filtered = net.has_column(Column::Conn(ConnAttr::Filter));
        let keys = net
            .connections()
            .iter()
            .filter(|(_, c)| !filtered || c.eligible)
            .map(|(k, _)| k)
            .collect();
        Self { keys }
    }

    pub fn iter(&self) -> impl Iterator<Item = ConnKey> + '_ {
        self.keys.iter().copied()
    }

    pub fn keys(&self) -> &[ConnKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: ConnKey) -> bool {
        self.keys.binary_search(&key).is_ok()
    }

    pub fn of_ue(&self, ue: UeId) -> impl Iterator<Item = ConnKey> + '_ {
        self.iter().filter(move |k| k.ue == ue)
    }

    pub fn of_bs(&self, bs: BsId) -> impl Iterator<Item = ConnKey> + '_ {
        self.iter().filter(move |k| k.bs == bs)
    }
}
