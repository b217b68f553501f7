use crate::Result;
use chrono::{DateTime, Utc};
use interference_sampler::{InterferenceBound, SweepReport};
use pwl_approx::Breakpoint;
use ran_network::NetworkModel;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// Output of one planner command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report<T> {
    pub command: String,
    pub generated_at: DateTime<Utc>,
    pub result: T,
}

impl<T: Serialize> Report<T> {
    pub fn new(command: impl Into<String>, result: T) -> Self {
        Self {
            command: command.into(),
            generated_at: Utc::now(),
            result,
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        info!("Wrote {} report to {:?}", self.command, path);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub sweep: SweepReport,
    pub bound: InterferenceBound,
}

/// Aggregates over the allocation written back to a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub objective: f64,
    pub allocated_connections: usize,
    /// Connections carrying primary traffic
    pub active_links: usize,
    pub total_bandwidth: f64,
    pub total_x_traffic: f64,
    pub total_y_traffic: f64,
    pub mean_signal_power: f64,
    /// Allocated connections per MCS level
    pub mcs_histogram: Vec<usize>,
}

/// Traffic below this is treated as zero when counting active links.
const ACTIVE_TRAFFIC: f64 = 1e-9;

impl AllocationSummary {
    pub fn from_network(net: &NetworkModel, objective: f64) -> Self {
        let mut summary = Self {
            objective,
            allocated_connections: 0,
            active_links: 0,
            total_bandwidth: 0.0,
            total_x_traffic: 0.0,
            total_y_traffic: 0.0,
            mean_signal_power: 0.0,
            mcs_histogram: vec![0; net.mcs().levels],
        };
        let mut power = 0.0;
        for (_, conn) in net.connections().iter() {
            let Some(a) = conn.allocation else { continue };
            summary.allocated_connections += 1;
            if a.x_traffic > ACTIVE_TRAFFIC {
                summary.active_links += 1;
            }
            summary.total_bandwidth += a.bandwidth;
            summary.total_x_traffic += a.x_traffic;
            summary.total_y_traffic += a.y_traffic;
            power += a.signal_power;
            if let Some(slot) = summary.mcs_histogram.get_mut(a.mcs_index) {
                *slot += 1;
            }
        }
        if summary.allocated_connections > 0 {
            summary.mean_signal_power = power / summary.allocated_connections as f64;
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearizationReport {
    pub conversion: String,
    pub lower: f64,
    pub upper: f64,
    pub tolerance: f64,
    pub slope_before: f64,
    pub slope_after: f64,
    pub breakpoints: Vec<Breakpoint>,
    /// Largest sampled deviation from the exact conversion
    pub max_deviation: f64,
}
