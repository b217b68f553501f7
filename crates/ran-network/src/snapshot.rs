//! Snapshot directories.
//!
//! ```text
//! <dir>/ues.csv            id,x,y[,gain][,max_power][,demand]
//! <dir>/gnbs.csv           id,x,y[,gain]
//! <dir>/channel.toml       [channel] + [mcs_table]
//! <dir>/conns/<attr>.txt   base-station × UE matrix, one row per base station
//! ```
//!
//! Only present columns are written, and a decoded snapshot marks exactly
//! the columns found on disk as present.

use crate::filter::ConnectionFilter;
use crate::model::{Allocation, BaseStation, Channel, ConnKey, Connection, McsTable, NetworkModel, Ue};
use crate::pipeline::Stage;
use crate::schema::{BsAttr, Column, ConnAttr, UeAttr};
use crate::{NetworkError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const UES_FILE: &str = "ues.csv";
const GNBS_FILE: &str = "gnbs.csv";
const CHANNEL_FILE: &str = "channel.toml";
const CONNS_DIR: &str = "conns";

#[derive(Debug, Serialize, Deserialize)]
struct ChannelFile {
    channel: Channel,
    mcs_table: McsTable,
}

#[derive(Debug, Deserialize)]
struct UeRecord {
    id: usize,
    x: f64,
    y: f64,
    #[serde(default)]
    gain: Option<f64>,
    #[serde(default)]
    max_power: Option<f64>,
    #[serde(default)]
    demand: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GnbRecord {
    id: usize,
    x: f64,
    y: f64,
    #[serde(default)]
    gain: Option<f64>,
}

/// Write every present table and column of `net` under `dir`.
pub fn save(net: &NetworkModel, dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir.join(CONNS_DIR))?;

    write_ues(net, &dir.join(UES_FILE))?;
    write_gnbs(net, &dir.join(GNBS_FILE))?;

    let channel = ChannelFile {
        channel: net.channel().clone(),
        mcs_table: net.mcs().clone(),
    };
    fs::write(dir.join(CHANNEL_FILE), toml::to_string_pretty(&channel)?)?;

    let attrs = net.connection_columns();
    remove_stale_matrices(&dir.join(CONNS_DIR), &attrs)?;
    for attr in &attrs {
        let path = dir.join(CONNS_DIR).join(format!("{}.txt", attr.name()));
        fs::write(path, render_matrix(net, *attr))?;
    }

    info!(
        "Saved snapshot to {} ({} UEs, {} base stations, {} connection columns)",
        dir.display(),
        net.ues().len(),
        net.base_stations().len(),
        attrs.len()
    );
    Ok(())
}

/// Delete matrices of connection columns that are no longer present, so a
/// reload cannot resurrect them.
fn remove_stale_matrices(dir: &Path, present: &[ConnAttr]) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let stale = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(ConnAttr::from_name)
            .is_some_and(|attr| !present.contains(&attr));
        if stale {
            debug!("Removing stale {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Read a snapshot written by [`save`].
pub fn load(dir: impl AsRef<Path>) -> Result<NetworkModel> {
    let dir = dir.as_ref();

    let channel: ChannelFile = toml::from_str(&fs::read_to_string(dir.join(CHANNEL_FILE))?)?;
    let mut net = NetworkModel::new(channel.channel, channel.mcs_table);

    let (ues, ue_attrs) = read_ues(&dir.join(UES_FILE))?;
    let (gnbs, gnb_attrs) = read_gnbs(&dir.join(GNBS_FILE))?;
    net.set_ues(ues, &ue_attrs)?;
    net.set_base_stations(gnbs, &gnb_attrs)?;

    let matrices = read_matrices(&dir.join(CONNS_DIR), net.connections().shape())?;
    apply_matrices(&mut net, &matrices);

    info!(
        "Loaded snapshot from {} ({} UEs, {} base stations, {} connection columns)",
        dir.display(),
        net.ues().len(),
        net.base_stations().len(),
        matrices.len()
    );
    Ok(net)
}

fn write_ues(net: &NetworkModel, path: &Path) -> Result<()> {
    let optional: Vec<UeAttr> = [UeAttr::Gain, UeAttr::MaxPower, UeAttr::Demand]
        .into_iter()
        .filter(|a| net.has_column(Column::Ue(*a)))
        .collect();

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["id", "x", "y"];
    header.extend(optional.iter().map(|a| a.name()));
    writer.write_record(&header)?;

    for ue in net.ues() {
        let mut row = vec![ue.id.0.to_string(), ue.position.x.to_string(), ue.position.y.to_string()];
        row.extend(optional.iter().map(|a| match a {
            UeAttr::Gain => ue.gain.to_string(),
            UeAttr::MaxPower => ue.max_power.to_string(),
            UeAttr::Demand => ue.demand.to_string(),
            UeAttr::X | UeAttr::Y => String::new(),
        }));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_gnbs(net: &NetworkModel, path: &Path) -> Result<()> {
    let with_gain = net.has_column(Column::Bs(BsAttr::Gain));

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["id", "x", "y"];
    if with_gain {
        header.push(BsAttr::Gain.name());
    }
    writer.write_record(&header)?;

    for bs in net.base_stations() {
        let mut row = vec![bs.id.0.to_string(), bs.position.x.to_string(), bs.position.y.to_string()];
        if with_gain {
            row.push(bs.gain.to_string());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn connection_value(conn: &Connection, attr: ConnAttr) -> f64 {
    let alloc = conn.allocation.unwrap_or_default();
    match attr {
        ConnAttr::Distance => conn.distance,
        ConnAttr::Pathloss => conn.pathloss,
        ConnAttr::Weight => conn.weight,
        ConnAttr::MaxSnr => conn.max_snr,
        ConnAttr::Filter => f64::from(u8::from(conn.eligible)),
        ConnAttr::Bandwidth => alloc.bandwidth,
        ConnAttr::SignalPower => alloc.signal_power,
        ConnAttr::XTraffic => alloc.x_traffic,
        ConnAttr::YTraffic => alloc.y_traffic,
        ConnAttr::McsIndex => alloc.mcs_index as f64,
    }
}

fn render_matrix(net: &NetworkModel, attr: ConnAttr) -> String {
    let mut out = String::new();
    for row in net.connections().matrix(|c| connection_value(c, attr)) {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

fn has_header(headers: &csv::StringRecord, name: &str) -> bool {
    headers.iter().any(|h| h == name)
}

fn require_value(value: Option<f64>, file: &str, column: &str, id: usize) -> Result<f64> {
    value.ok_or_else(|| NetworkError::Snapshot(format!("{file}: column {column} is empty for id {id}")))
}

fn read_ues(path: &Path) -> Result<(Vec<Ue>, Vec<UeAttr>)> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let attrs: Vec<UeAttr> = [UeAttr::Gain, UeAttr::MaxPower, UeAttr::Demand]
        .into_iter()
        .filter(|a| has_header(&headers, a.name()))
        .collect();

    let mut ues = Vec::new();
    for record in reader.deserialize() {
        let r: UeRecord = record?;
        let mut ue = Ue::new(r.id, r.x, r.y);
        for attr in &attrs {
            match attr {
                UeAttr::Gain => ue.gain = require_value(r.gain, UES_FILE, attr.name(), r.id)?,
                UeAttr::MaxPower => ue.max_power = require_value(r.max_power, UES_FILE, attr.name(), r.id)?,
                UeAttr::Demand => ue.demand = require_value(r.demand, UES_FILE, attr.name(), r.id)?,
                UeAttr::X | UeAttr::Y => {}
            }
        }
        ues.push(ue);
    }
    Ok((ues, attrs))
}

fn read_gnbs(path: &Path) -> Result<(Vec<BaseStation>, Vec<BsAttr>)> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let with_gain = has_header(&headers, BsAttr::Gain.name());

    let mut gnbs = Vec::new();
    for record in reader.deserialize() {
        let r: GnbRecord = record?;
        let mut bs = BaseStation::new(r.id, r.x, r.y);
        if with_gain {
            bs.gain = require_value(r.gain, GNBS_FILE, BsAttr::Gain.name(), r.id)?;
        }
        gnbs.push(bs);
    }
    let attrs = if with_gain { vec![BsAttr::Gain] } else { Vec::new() };
    Ok((gnbs, attrs))
}

fn read_matrices(dir: &Path, shape: (usize, usize)) -> Result<BTreeMap<ConnAttr, Vec<Vec<f64>>>> {
    let mut matrices = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(matrices);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(attr) = ConnAttr::from_name(stem) else {
            warn!("Skipping unknown connection column {}", path.display());
            continue;
        };
        let matrix = parse_matrix(&fs::read_to_string(&path)?, attr, shape)?;
        debug!("Read {} ({}x{})", path.display(), shape.0, shape.1);
        matrices.insert(attr, matrix);
    }
    Ok(matrices)
}

fn parse_matrix(text: &str, attr: ConnAttr, shape: (usize, usize)) -> Result<Vec<Vec<f64>>> {
    let (bs_count, ue_count) = shape;
    if ue_count == 0 {
        return Ok(vec![Vec::new(); bs_count]);
    }

    let mut rows = Vec::with_capacity(bs_count);
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let row = line
            .split_whitespace()
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| NetworkError::Snapshot(format!("{}: invalid number {v:?}", attr.name())))
            })
            .collect::<Result<Vec<f64>>>()?;
        if row.len() != ue_count {
            return Err(NetworkError::Snapshot(format!(
                "{}: row has {} values, expected {ue_count}",
                attr.name(),
                row.len()
            )));
        }
        rows.push(row);
    }
    if rows.len() != bs_count {
        return Err(NetworkError::Snapshot(format!(
            "{}: {} rows, expected {bs_count}",
            attr.name(),
            rows.len()
        )));
    }
    Ok(rows)
}

fn apply_matrices(net: &mut NetworkModel, matrices: &BTreeMap<ConnAttr, Vec<Vec<f64>>>) {
    let value = |attr: ConnAttr, key: ConnKey| matrices.get(&attr).map(|m| m[key.bs.0][key.ue.0]);

    for (key, conn) in net.connections_mut().iter_mut() {
        if let Some(v) = value(ConnAttr::Distance, key) {
            conn.distance = v;
        }
        if let Some(v) = value(ConnAttr::Pathloss, key) {
            conn.pathloss = v;
        }
        if let Some(v) = value(ConnAttr::Weight, key) {
            conn.weight = v;
        }
        if let Some(v) = value(ConnAttr::MaxSnr, key) {
            conn.max_snr = v;
        }
        if let Some(v) = value(ConnAttr::Filter, key) {
            conn.eligible = v != 0.0;
        }
    }
    let columns: Vec<Column> = matrices.keys().map(|a| Column::Conn(*a)).collect();
    net.mark_produced(&columns);

    if !ConnAttr::ALLOCATION.iter().any(|a| matrices.contains_key(a)) {
        return;
    }
    // Allocation results only exist for eligible connections
    let eligible = ConnectionFilter::new(net);
    for key in eligible.iter() {
        let allocation = Allocation {
            bandwidth: value(ConnAttr::Bandwidth, key).unwrap_or_default(),
            signal_power: value(ConnAttr::SignalPower, key).unwrap_or_default(),
            x_traffic: value(ConnAttr::XTraffic, key).unwrap_or_default(),
            y_traffic: value(ConnAttr::YTraffic, key).unwrap_or_default(),
            mcs_index: value(ConnAttr::McsIndex, key).unwrap_or_default().round().max(0.0) as usize,
        };
        if let Some(conn) = net.connections_mut().get_mut(key) {
            conn.allocation = Some(allocation);
        }
    }
}

/// Pipeline stage writing the current model to a snapshot directory.
#[derive(Debug, Clone)]
pub struct SaveSnapshot {
    pub dir: PathBuf,
}

impl SaveSnapshot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Stage for SaveSnapshot {
    fn name(&self) -> &str {
        "SaveSnapshot"
    }

    fn execute(&self, net: &mut NetworkModel) -> Result<()> {
        save(net, &self.dir)
    }
}

/// Pipeline stage replacing the model with a snapshot read from disk.
#[derive(Debug, Clone)]
pub struct LoadSnapshot {
    pub dir: PathBuf,
}

impl LoadSnapshot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Stage for LoadSnapshot {
    fn name(&self) -> &str {
        "LoadSnapshot"
    }

    fn execute(&self, net: &mut NetworkModel) -> Result<()> {
        *net = load(&self.dir)?;
        Ok(())
    }
}
