use crate::builder::{AllocationModel, AllocationParams, REQUIRED_COLUMNS};
use crate::solver::Solver;
use crate::AllocError;
use ran_network::{Column, ConnAttr, NetworkError, NetworkModel, Stage};
use std::path::PathBuf;
use tracing::info;

/// Pipeline stage: build, optionally export, solve, and apply.
pub struct Allocate {
    pub params: AllocationParams,
    solver: Box<dyn Solver>,
    /// Where to write the model in LP format before solving
    pub lp_path: Option<PathBuf>,
}

impl Allocate {
    pub fn new(params: AllocationParams, solver: impl Solver + 'static) -> Self {
        Self {
            params,
            solver: Box::new(solver),
            lp_path: None,
        }
    }

    pub fn with_lp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lp_path = Some(path.into());
        self
    }

    pub fn run(&self, net: &mut NetworkModel) -> crate::Result<()> {
        let model = AllocationModel::build(net, &self.params)?;
        if let Some(path) = &self.lp_path {
            std::fs::write(path, model.to_lp_string()).map_err(NetworkError::from)?;
            info!("Wrote LP model to {}", path.display());
        }
        let solution = self.solver.solve(model.model())?;
        model.apply(net, &solution)
    }
}

impl std::fmt::Debug for Allocate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocate")
            .field("params", &self.params)
            .field("solver", &self.solver.name())
            .field("lp_path", &self.lp_path)
            .finish()
    }
}

impl Stage for Allocate {
    fn name(&self) -> &str {
        "Allocate"
    }

    fn requires(&self) -> Vec<Column> {
        REQUIRED_COLUMNS.to_vec()
    }

    fn produces(&self) -> Vec<Column> {
        ConnAttr::ALLOCATION.iter().map(|a| Column::Conn(*a)).collect()
    }

    fn execute(&self, net: &mut NetworkModel) -> ran_network::Result<()> {
        self.run(net).map_err(|e| match e {
            AllocError::Network(inner) => inner,
            other => NetworkError::stage_failed("Allocate", other),
        })
    }
}
