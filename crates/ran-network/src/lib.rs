//! Radio-Access Network Model
//!
//! Entities (UEs, base stations, the dense base-station × UE connection
//! table, channel and MCS table), a typed column schema and the ordered
//! stage pipeline that derives per-connection metrics.
//!
//! # Data flow
//!
//! ```text
//! ScenarioConfig / snapshot ──► NetworkModel
//!     DistanceCalc ─► FreeSpacePathloss ─► DistanceWeight ─► CalcMaxSnr ─► MinSnrFilter
//!                                                                        │
//!                                             ConnectionFilter (eligible pairs)
//! ```
//!
//! Every stage declares the columns it reads and writes. The pipeline
//! checks the declared inputs before a stage body runs, so a stage never
//! touches a column no earlier stage has produced.

use thiserror::Error;

pub mod filter;
pub mod layout;
pub mod model;
pub mod pipeline;
pub mod scenario;
pub mod schema;
pub mod snapshot;
pub mod stages;

pub use filter::ConnectionFilter;
pub use layout::Layout;
pub use model::{
    Allocation, BaseStation, BsId, Channel, ConnKey, Connection, ConnectionTable, McsLevel,
    McsTable, NetworkModel, Position, Ue, UeId,
};
pub use pipeline::{Stage, StageSequence};
pub use scenario::ScenarioConfig;
pub use schema::{BsAttr, Column, ConnAttr, Table, UeAttr};
pub use stages::{CalcMaxSnr, DistanceCalc, DistanceWeight, FreeSpacePathloss, MinSnrFilter};

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Table \"{table}\" has no column \"{attribute}\", but stage \"{stage}\" requires it")]
    MissingDependency {
        table: Table,
        attribute: &'static str,
        stage: String,
    },
    #[error("MCS level {level} out of range for a {levels}-level table")]
    McsLevelOutOfRange { level: isize, levels: usize },
    #[error("Invalid {table} id at position {position}: ids must equal their index, found {found}")]
    InvalidIds {
        table: Table,
        position: usize,
        found: usize,
    },
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnKey),
    #[error("Invalid layout \"{spec}\": {reason}")]
    InvalidLayout { spec: String, reason: String },
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),
    #[error("Invalid snapshot: {0}")]
    Snapshot(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("TOML encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Stage \"{stage}\" failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl NetworkError {
    /// Wrap a failure raised by a stage body defined outside this crate.
    pub fn stage_failed(
        stage: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        NetworkError::StageFailed {
            stage: stage.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
