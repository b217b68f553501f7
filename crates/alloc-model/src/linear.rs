//! Solver-independent linear model and CPLEX LP rendering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Index of a variable in its [`LinearModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarDomain {
    Continuous,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    /// `f64::INFINITY` when unbounded above
    pub upper: f64,
    pub domain: VarDomain,
}

/// `Σ coefficient·variable + constant`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinearExpr {
    terms: BTreeMap<VarId, f64>,
    pub constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn term(var: VarId, coefficient: f64) -> Self {
        let mut e = Self::new();
        e.add_term(var, coefficient);
        e
    }

    /// Sum of variables with coefficient 1.
    pub fn sum(vars: impl IntoIterator<Item = VarId>) -> Self {
        let mut e = Self::new();
        for v in vars {
            e.add_term(v, 1.0);
        }
        e
    }

    pub fn add_term(&mut self, var: VarId, coefficient: f64) {
        if coefficient == 0.0 {
            return;
        }
        let c = self.terms.entry(var).or_insert(0.0);
        *c += coefficient;
        if *c == 0.0 {
            self.terms.remove(&var);
        }
    }

    pub fn with_term(mut self, var: VarId, coefficient: f64) -> Self {
        self.add_term(var, coefficient);
        self
    }

    pub fn add_expr(&mut self, other: &LinearExpr, scale: f64) {
        self.constant += other.constant * scale;
        for (v, c) in &other.terms {
            self.add_term(*v, c * scale);
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.terms.iter().map(|(v, c)| (*v, *c))
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms.get(&var).copied().unwrap_or(0.0)
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.constant + self.terms.iter().map(|(v, c)| c * values[v.0]).sum::<f64>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

/// `expr sense rhs`, with the expression's constant folded into `rhs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub expr: LinearExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs + tolerance,
            Sense::Ge => lhs >= self.rhs - tolerance,
            Sense::Eq => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveSense {
    #[default]
    Minimize,
    Maximize,
}

/// Variable assignment returned by a solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub values: Vec<f64>,
    pub objective: f64,
}

impl Solution {
    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.0]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinearModel {
    pub name: String,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: LinearExpr,
    sense: ObjectiveSense,
}

impl LinearModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn continuous(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.push_variable(Variable {
            name: name.into(),
            lower,
            upper,
            domain: VarDomain::Continuous,
        })
    }

    pub fn binary(&mut self, name: impl Into<String>) -> VarId {
        self.push_variable(Variable {
            name: name.into(),
            lower: 0.0,
            upper: 1.0,
            domain: VarDomain::Binary,
        })
    }

    fn push_variable(&mut self, variable: Variable) -> VarId {
        self.variables.push(variable);
        VarId(self.variables.len() - 1)
    }

    /// Add `expr sense rhs`. Returns `false` and adds nothing when `expr`
    /// has no variable terms.
    pub fn constrain(&mut self, name: impl Into<String>, expr: LinearExpr, sense: Sense, rhs: f64) -> bool {
        if expr.is_empty() {
            return false;
        }
        let rhs = rhs - expr.constant;
        let expr = LinearExpr {
            constant: 0.0,
            ..expr
        };
        self.constraints.push(Constraint {
            name: name.into(),
            expr,
            sense,
            rhs,
        });
        true
    }

    pub fn set_objective(&mut self, sense: ObjectiveSense, objective: LinearExpr) {
        self.sense = sense;
        self.objective = objective;
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    /// Names of constraints and bounds violated by `values`.
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<String> {
        let mut out: Vec<String> = self
            .variables
            .iter()
            .zip(values)
            .filter(|(v, x)| **x < v.lower - tolerance || **x > v.upper + tolerance)
            .map(|(v, x)| format!("{} = {x} outside [{}, {}]", v.name, v.lower, v.upper))
            .collect();
        out.extend(
            self.constraints
                .iter()
                .filter(|c| !c.is_satisfied(values, tolerance))
                .map(|c| c.name.clone()),
        );
        out
    }

    /// CPLEX LP file text.
    pub fn to_lp_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\\ Model {}", self.name);
        out.push_str(match self.sense {
            ObjectiveSense::Minimize => "Minimize\n",
            ObjectiveSense::Maximize => "Maximize\n",
        });
        let _ = writeln!(out, " obj: {}", self.format_expr(&self.objective, true));

        out.push_str("Subject To\n");
        for c in &self.constraints {
            let sense = match c.sense {
                Sense::Le => "<=",
                Sense::Ge => ">=",
                Sense::Eq => "=",
            };
            let _ = writeln!(out, " {}: {} {} {}", c.name, self.format_expr(&c.expr, false), sense, fmt_num(c.rhs));
        }

        out.push_str("Bounds\n");
        for v in self.variables.iter().filter(|v| v.domain == VarDomain::Continuous) {
            if v.upper.is_finite() {
                let _ = writeln!(out, " {} <= {} <= {}", fmt_num(v.lower), v.name, fmt_num(v.upper));
            } else if v.lower == f64::NEG_INFINITY {
                let _ = writeln!(out, " {} free", v.name);
            } else {
                let _ = writeln!(out, " {} >= {}", v.name, fmt_num(v.lower));
            }
        }

        let binaries: Vec<&str> = self
            .variables
            .iter()
            .filter(|v| v.domain == VarDomain::Binary)
            .map(|v| v.name.as_str())
            .collect();
        if !binaries.is_empty() {
            out.push_str("Binary\n");
            for name in binaries {
                let _ = writeln!(out, " {name}");
            }
        }
        out.push_str("End\n");
        out
    }

    fn format_expr(&self, expr: &LinearExpr, with_constant: bool) -> String {
        let mut parts: Vec<String> = expr
            .terms()
            .map(|(v, c)| {
                let name = &self.variables[v.0].name;
                if c == 1.0 {
                    format!("+ {name}")
                } else if c == -1.0 {
                    format!("- {name}")
                } else if c < 0.0 {
                    format!("- {} {name}", fmt_num(-c))
                } else {
                    format!("+ {} {name}", fmt_num(c))
                }
            })
            .collect();
        if with_constant && expr.constant != 0.0 {
            parts.push(format!("{} {}", if expr.constant < 0.0 { "-" } else { "+" }, fmt_num(expr.constant.abs())));
        }
        if parts.is_empty() {
            return "0".to_string();
        }
        let joined = parts.join(" ");
        joined.strip_prefix("+ ").map(str::to_string).unwrap_or(joined)
    }
}

fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_terms_merge() {
        let a = VarId(0);
        let b = VarId(1);
        let mut e = LinearExpr::term(a, 2.0).with_term(b, 1.0);
        e.add_term(a, -2.0);
        assert_eq!(e.terms().collect::<Vec<_>>(), vec![(b, 1.0)]);
        assert_eq!(e.coefficient(a), 0.0);

        let mut f = LinearExpr::constant(3.0);
        f.add_expr(&e, -2.0);
        assert_eq!(f.constant, 3.0);
        assert_eq!(f.coefficient(b), -2.0);
        assert_eq!(f.evaluate(&[10.0, 4.0]), -5.0);
    }

    #[test]
    fn test_constant_folded_into_rhs() {
        let mut m = LinearModel::new("t");
        let x = m.continuous("x", 0.0, 10.0);
        let mut lhs = LinearExpr::term(x, 1.0).with_term(x, 1.0);
        lhs.constant = 4.0;
        assert!(m.constrain("c", lhs, Sense::Le, 10.0));
        assert!(!m.constrain("empty", LinearExpr::constant(1.0), Sense::Ge, 0.0));
        let c = &m.constraints()[0];
        assert_eq!(c.rhs, 6.0);
        assert_eq!(c.expr.constant, 0.0);
        assert!(c.is_satisfied(&[3.0], 0.0));
        assert!(!c.is_satisfied(&[3.5], 1e-9));
    }

    #[test]
    fn test_lp_text() {
        let mut m = LinearModel::new("demo");
        let x = m.continuous("x", 0.0, f64::INFINITY);
        let y = m.continuous("y", 0.0, 2.5);
        let s = m.binary("s");
        m.constrain(
            "cap",
            LinearExpr::term(x, 1.0).with_term(y, 1.0).with_term(s, -3.0),
            Sense::Le,
            0.0,
        );
        m.constrain("dem", LinearExpr::term(x, 1.0), Sense::Ge, 1.5);
        m.set_objective(ObjectiveSense::Minimize, LinearExpr::term(x, 2.0).with_term(y, 0.1));

        let lp = m.to_lp_string();
        let expected = "\\ Model demo\n\
Minimize\n obj: 2 x + 0.1 y\n\
Subject To\n cap: x + y - 3 s <= 0\n dem: x >= 1.5\n\
Bounds\n x >= 0\n 0 <= y <= 2.5\n\
Binary\n s\n\
End\n";
        assert_eq!(lp, expected);
    }

    #[test]
    fn test_violations() {
        let mut m = LinearModel::new("v");
        let x = m.continuous("x", 0.0, 1.0);
        m.constrain("eq", LinearExpr::term(x, 1.0), Sense::Eq, 0.5);
        assert!(m.violations(&[0.5], 1e-9).is_empty());
        assert_eq!(m.violations(&[2.0], 1e-9).len(), 2);
    }
}
