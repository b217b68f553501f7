use crate::{db_to_linear, Result, REQUIRED_COLUMNS};
use ran_network::{ConnKey, ConnectionFilter, NetworkModel};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Worst-case cross-cell interference over eligible connections.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterferenceBound {
    /// Strongest single interferer (dB); `-inf` when no pair qualified
    pub strongest_db: f64,
    /// Largest per-connection total (linear)
    pub largest_total: f64,
    /// Connection receiving `largest_total`
    pub worst_connection: Option<ConnKey>,
    /// Interfering pairs evaluated
    pub pairs: usize,
}

/// For each eligible `(b, u)`, sum the power of every eligible `(b', u')`
/// with `u' ≠ u` and `b' ≠ b`, received at `b` through the `(b, u')` path.
pub fn max_interference(net: &NetworkModel) -> Result<InterferenceBound> {
    net.require("MaxInterference", &REQUIRED_COLUMNS)?;
    let started = Instant::now();
    let eligible = ConnectionFilter::new(net);

    let mut bound = InterferenceBound {
        strongest_db: f64::NEG_INFINITY,
        largest_total: 0.0,
        worst_connection: None,
        pairs: 0,
    };

    for e in eligible.iter() {
        let bs_gain = net.base_stations()[e.bs.0].gain;
        let mut total = 0.0;
        for other in eligible.iter() {
            if other.ue == e.ue || other.bs == e.bs {
                continue;
            }
            let ue = &net.ues()[other.ue.0];
            let path = net.connection(ConnKey { bs: e.bs, ue: other.ue })?;
            let db = ue.max_power - path.pathloss + ue.gain + bs_gain;
            bound.pairs += 1;
            bound.strongest_db = bound.strongest_db.max(db);
            total += db_to_linear(db);
        }
        if total > bound.largest_total {
            bound.largest_total = total;
            bound.worst_connection = Some(e);
        }
    }

    info!(
        "Max interference over {} connections: strongest {:.2} dB, largest total {:.3e} ({} pairs, {:.2} s)",
        eligible.len(),
        bound.strongest_db,
        bound.largest_total,
        bound.pairs,
        started.elapsed().as_secs_f64()
    );
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use ran_network::{BaseStation, BsAttr, Channel, Column, ConnAttr, McsTable, Ue, UeAttr};

    #[test]
    fn test_hand_computed_bound() {
        let mut net = NetworkModel::new(Channel::default(), McsTable::default());
        net.set_base_stations(vec![BaseStation::new(0, 0.0, 0.0), BaseStation::new(1, 10.0, 0.0)], &[BsAttr::Gain])
            .unwrap();
        net.set_ues(
            vec![
                Ue::new(0, 1.0, 0.0).with_max_power(10.0),
                Ue::new(1, 9.0, 0.0).with_max_power(20.0),
            ],
            &[UeAttr::Gain, UeAttr::MaxPower],
        )
        .unwrap();
        // Pathloss picked by hand, all pairs eligible
        for (key, conn) in net.connections_mut().iter_mut() {
            conn.distance = 1.0;
            conn.pathloss = if key.bs.0 == key.ue.0 { 40.0 } else { 60.0 };
        }
        net.mark_produced(&[Column::Conn(ConnAttr::Distance), Column::Conn(ConnAttr::Pathloss)]);

        let bound = max_interference(&net).unwrap();
        // (0,0) hears UE 1 via (0,1): 20 - 60 = -40 dB
        // (1,1) hears UE 0 via (1,0): 10 - 60 = -50 dB
        // (0,1) hears UE 0 via (0,0): 10 - 40 = -30 dB
        // (1,0) hears UE 1 via (1,1): 20 - 40 = -20 dB
        assert_eq!(bound.pairs, 4);
        assert_eq!(bound.strongest_db, -20.0);
        assert!((bound.largest_total - 1e-2).abs() < 1e-15);
        assert_eq!(bound.worst_connection, Some(ConnKey::new(1, 0)));
    }

    #[test]
    fn test_single_cell_has_no_cross_cell_pairs() {
        let mut net = testutil::network(10);
        net.set_base_stations(vec![net.base_stations()[0].clone()], &[BsAttr::Gain])
            .unwrap();
        let mut seq = ran_network::StageSequence::new("derive");
        seq.push(ran_network::DistanceCalc);
        seq.push(ran_network::FreeSpacePathloss::default());
        seq.run(&mut net).unwrap();

        let bound = max_interference(&net).unwrap();
        assert_eq!(bound.pairs, 0);
        assert_eq!(bound.largest_total, 0.0);
        assert!(bound.worst_connection.is_none());
    }
}
