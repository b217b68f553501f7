//! Ordered stage execution with declared column dependencies.

use crate::model::NetworkModel;
use crate::schema::Column;
use crate::Result;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// One transformation over the network model.
///
/// `requires` is checked by [`StageSequence::run`] before `execute` is
/// called; `produces` is marked present once `execute` returns `Ok`.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn requires(&self) -> Vec<Column> {
        Vec::new()
    }

    fn produces(&self) -> Vec<Column> {
        Vec::new()
    }

    fn execute(&self, net: &mut NetworkModel) -> Result<()>;
}

/// A stage sequence is itself a stage, so sequences nest.
#[derive(Default)]
pub struct StageSequence {
    name: String,
    stages: Vec<Box<dyn Stage>>,
}

impl StageSequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Builder form of [`push`](Self::push).
    pub fn then<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.push(stage);
        self
    }

    pub fn push<S: Stage + 'static>(&mut self, stage: S) {
        self.stages.push(Box::new(stage));
    }

    pub fn push_boxed(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Move every stage of `other` to the end of this sequence.
    pub fn append(&mut self, other: StageSequence) {
        self.stages.extend(other.stages);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run stages in order, stopping at the first failure. Columns produced
    /// by stages that completed before the failure stay marked.
    pub fn run(&self, net: &mut NetworkModel) -> Result<()> {
        info!("Running sequence {} ({} stages)", self.name, self.stages.len());
        for stage in &self.stages {
            run_stage(stage.as_ref(), net)?;
        }
        Ok(())
    }
}

impl Extend<Box<dyn Stage>> for StageSequence {
    fn extend<I: IntoIterator<Item = Box<dyn Stage>>>(&mut self, iter: I) {
        self.stages.extend(iter);
    }
}

impl fmt::Debug for StageSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSequence")
            .field("name", &self.name)
            .field("stages", &self.names())
            .finish()
    }
}

impl Stage for StageSequence {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, net: &mut NetworkModel) -> Result<()> {
        self.run(net)
    }
}

fn run_stage(stage: &dyn Stage, net: &mut NetworkModel) -> Result<()> {
    net.require(stage.name(), &stage.requires())?;

    info!("Running stage {}", stage.name());
    let started = Instant::now();
    stage.execute(net)?;
    net.mark_produced(&stage.produces());

    debug!(
        "Stage {} finished in {:.3} ms",
        stage.name(),
        started.elapsed().as_secs_f64() * 1e3
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ConnAttr, UeAttr};
    use crate::NetworkError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorder {
        name: &'static str,
        requires: Vec<Column>,
        produces: Vec<Column>,
        calls: Arc<AtomicUsize>,
    }

    impl Stage for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn requires(&self) -> Vec<Column> {
            self.requires.clone()
        }

        fn produces(&self) -> Vec<Column> {
            self.produces.clone()
        }

        fn execute(&self, _net: &mut NetworkModel) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn recording(name: &'static str, requires: Vec<Column>, produces: Vec<Column>, calls: &Arc<AtomicUsize>) -> Recorder {
        Recorder {
            name,
            requires,
            produces,
            calls: Arc::clone(calls),
        }
    }

    #[test]
    fn test_dependency_checked_before_execute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seq = StageSequence::new("test").then(recording(
            "NeedsPathloss",
            vec![Column::Conn(ConnAttr::Pathloss)],
            vec![],
            &calls,
        ));

        let mut net = NetworkModel::default();
        let err = seq.run(&mut net).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::MissingDependency { attribute: "pathloss", ref stage, .. } if stage == "NeedsPathloss"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_produced_columns_satisfy_later_stages() {
        let calls = Arc::new(AtomicUsize::new(0));
        let distance = Column::Conn(ConnAttr::Distance);
        let seq = StageSequence::new("chain")
            .then(recording("Produce", vec![], vec![distance], &calls))
            .then(recording("Consume", vec![distance], vec![], &calls));

        let mut net = NetworkModel::default();
        seq.run(&mut net).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(net.has_column(distance));
    }

    #[test]
    fn test_sequences_nest() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gain = Column::Ue(UeAttr::Gain);
        let inner = StageSequence::new("inner").then(recording("A", vec![], vec![gain], &calls));
        let mut outer = StageSequence::new("outer").then(inner);
        outer.push(recording("B", vec![gain], vec![], &calls));

        assert_eq!(outer.names(), vec!["inner", "B"]);
        let mut net = NetworkModel::default();
        outer.run(&mut net).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_append_and_extend() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut seq = StageSequence::new("a").then(recording("one", vec![], vec![], &calls));
        seq.append(StageSequence::new("b").then(recording("two", vec![], vec![], &calls)));
        seq.extend(vec![Box::new(recording("three", vec![], vec![], &calls)) as Box<dyn Stage>]);
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.names(), vec!["one", "two", "three"]);
    }
}
