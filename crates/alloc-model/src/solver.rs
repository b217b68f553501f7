use crate::linear::{LinearModel, Solution};
use crate::{AllocError, Result};

/// Tolerance for the post-solve feasibility check.
const CHECK_TOLERANCE: f64 = 1e-6;

/// Backend that solves a [`LinearModel`] and returns values in variable
/// order.
pub trait Solver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, model: &LinearModel) -> Result<Solution>;
}

/// Reject values that break a bound or constraint of `model` by more than
/// [`CHECK_TOLERANCE`].
#[cfg_attr(not(feature = "microlp"), allow(dead_code))]
pub(crate) fn check_feasible(solver: &str, model: &LinearModel, values: &[f64]) -> Result<()> {
    let violations = model.violations(values, CHECK_TOLERANCE);
    match violations.first() {
        None => Ok(()),
        Some(first) => Err(AllocError::Solver(format!(
            "{solver} solution violates {} constraints, first: {first}",
            violations.len()
        ))),
    }
}

#[cfg(feature = "microlp")]
pub use self::microlp_backend::MicroLpSolver;

#[cfg(feature = "microlp")]
mod microlp_backend {
    use super::{check_feasible, Solver};
    use crate::linear::{LinearExpr, LinearModel, ObjectiveSense, Sense, Solution, VarDomain};
    use crate::{AllocError, Result};
    use good_lp::solvers::microlp::microlp;
    use good_lp::{constraint, variable, Expression, ProblemVariables, ResolutionError, SolverModel, Variable};
    use std::time::Instant;
    use tracing::{debug, info};

    /// Pure-Rust branch-and-bound backend from `good_lp`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MicroLpSolver;

    fn expression(expr: &LinearExpr, vars: &[Variable]) -> Expression {
        let mut out = Expression::default();
        out += expr.constant;
        for (id, coefficient) in expr.terms() {
            out += coefficient * vars[id.0];
        }
        out
    }

    impl Solver for MicroLpSolver {
        fn name(&self) -> &str {
            "microlp"
        }

        fn solve(&self, model: &LinearModel) -> Result<Solution> {
            let started = Instant::now();
            let mut problem_vars = ProblemVariables::new();
            let vars: Vec<Variable> = model
                .variables()
                .iter()
                .map(|v| {
                    let mut def = variable().name(v.name.clone());
                    if v.domain == VarDomain::Binary {
                        def = def.binary();
                    } else {
                        if v.lower.is_finite() {
                            def = def.min(v.lower);
                        }
                        if v.upper.is_finite() {
                            def = def.max(v.upper);
                        }
                    }
                    problem_vars.add(def)
                })
                .collect();

            let objective = expression(model.objective(), &vars);
            let unsolved = match model.sense() {
                ObjectiveSense::Minimize => problem_vars.minimise(objective),
                ObjectiveSense::Maximize => problem_vars.maximise(objective),
            };
            let mut problem = unsolved.using(microlp);
            for c in model.constraints() {
                let lhs = expression(&c.expr, &vars);
                problem = match c.sense {
                    Sense::Le => problem.with(constraint!(lhs <= c.rhs)),
                    Sense::Ge => problem.with(constraint!(lhs >= c.rhs)),
                    Sense::Eq => problem.with(constraint!(lhs == c.rhs)),
                };
            }

            debug!(
                "Solving '{}' with microlp: {} variables, {} constraints",
                model.name,
                vars.len(),
                model.constraints().len()
            );
            let solved = problem.solve().map_err(|e| match e {
                ResolutionError::Infeasible => AllocError::Infeasible,
                ResolutionError::Unbounded => AllocError::Unbounded,
                other => AllocError::Solver(other.to_string()),
            })?;

            let values: Vec<f64> = vars.iter().map(|v| good_lp::Solution::value(&solved, *v)).collect();
            let objective = model.objective().evaluate(&values);

            check_feasible(self.name(), model, &values)?;
            info!(
                "Solved '{}' in {:.2} s, objective {:.6}",
                model.name,
                started.elapsed().as_secs_f64(),
                objective
            );
            Ok(Solution { values, objective })
        }
    }
}

#[cfg(all(test, feature = "microlp"))]
mod tests {
    use super::*;
    use crate::builder::tests::{derive, network};
    use crate::builder::{AllocationModel, AllocationParams};
    use crate::linear::{LinearExpr, ObjectiveSense, Sense};
    use crate::AllocError;
    use ran_network::{ConnKey, UeAttr};

    #[test]
    fn test_small_mip() {
        // min x + 2y  s.t.  x + y >= 1.5, y binary, x <= 1
        let mut m = LinearModel::new("small");
        let x = m.continuous("x", 0.0, 1.0);
        let y = m.binary("y");
        m.constrain("cover", LinearExpr::sum([x, y]), Sense::Ge, 1.5);
        m.set_objective(ObjectiveSense::Minimize, LinearExpr::term(x, 1.0).with_term(y, 2.0));

        let s = MicroLpSolver.solve(&m).unwrap();
        assert!((s.value(y) - 1.0).abs() < 1e-6);
        assert!((s.value(x) - 0.5).abs() < 1e-6);
        assert!((s.objective - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_model() {
        let mut m = LinearModel::new("infeasible");
        let x = m.continuous("x", 0.0, 1.0);
        m.constrain("too_much", LinearExpr::term(x, 1.0), Sense::Ge, 2.0);
        m.set_objective(ObjectiveSense::Minimize, LinearExpr::term(x, 1.0));
        assert!(matches!(MicroLpSolver.solve(&m), Err(AllocError::Infeasible)));
    }

    #[test]
    fn test_violating_values_are_rejected() {
        let mut m = LinearModel::new("check");
        let x = m.continuous("x", 0.0, 1.0);
        let y = m.binary("y");
        m.constrain("cover", LinearExpr::sum([x, y]), Sense::Ge, 1.5);

        assert!(check_feasible("test", &m, &[0.5, 1.0]).is_ok());
        assert!(check_feasible("test", &m, &[0.5 - 1e-7, 1.0]).is_ok());

        let err = check_feasible("test", &m, &[0.4, 1.0]).unwrap_err();
        match err {
            AllocError::Solver(msg) => {
                assert!(msg.starts_with("test solution violates 1 constraints"), "{msg}");
                assert!(msg.ends_with("cover"), "{msg}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            check_feasible("test", &m, &[1.5, 1.0]),
            Err(AllocError::Solver(msg)) if msg.contains("x = 1.5 outside [0, 1]")
        ));
    }

    #[test]
    fn test_allocation_properties() {
        let mut net = network(2, 1);
        let model = AllocationModel::build(&net, &AllocationParams::default()).unwrap();
        let solution = MicroLpSolver.solve(model.model()).unwrap();
        assert!(model.model().violations(&solution.values, 1e-5).is_empty());
        model.apply(&mut net, &solution).unwrap();

        let span = net.channel().bandwidth_span();
        let level = net.mcs().level(0).unwrap();
        let mut bs_bandwidth = 0.0;
        for ue in net.ues() {
            let key = ConnKey::new(0, ue.id.0);
            let conn = net.connection(key).unwrap();
            let a = conn.allocation.unwrap();
            assert_eq!(a.mcs_index, 0);
            assert!(a.x_traffic >= ue.demand - 1e-6);
            assert!(a.x_traffic + a.y_traffic <= level.efficiency * a.bandwidth + 1e-6);
            assert!(a.signal_power <= ue.max_power + 1e-6);
            assert!(a.signal_power >= level.snr + net.channel().noise + conn.pathloss - 1e-6);
            assert!((0.0..=span + 1e-6).contains(&a.bandwidth));
            // single link: no backup to provide, and y carries a cost
            assert!(a.y_traffic.abs() < 1e-6);
            bs_bandwidth += a.bandwidth;
        }
        assert!(bs_bandwidth <= span + 1e-6);
    }

    #[test]
    fn test_demand_beyond_capacity_is_infeasible() {
        let mut net = network(2, 1);
        let ues = net
            .ues()
            .iter()
            .cloned()
            .map(|mut u| {
                u.demand = 100.0;
                u
            })
            .collect();
        net.set_ues(ues, &[UeAttr::Gain, UeAttr::MaxPower, UeAttr::Demand]).unwrap();
        derive(&mut net);
        let model = AllocationModel::build(&net, &AllocationParams::default()).unwrap();
        assert!(matches!(MicroLpSolver.solve(model.model()), Err(AllocError::Infeasible)));
    }
}
