//! 0/1 integer programs and the MILP-backed selection oracle.
//!
//! A [`BinaryProgram`] maximizes an integer-weighted sum of binary variables
//! subject to `Σ coef · x <= bound` rows. The built-in [`MilpSelector`]
//! splits the program into independent components (variables linked through
//! shared rows) and hands each one to `good_lp`.

use good_lp::{default_solver, variable, variables, Expression, Solution, SolverModel, Variable};
use log::debug;
use petgraph::unionfind::UnionFind;
use std::collections::HashMap;

/// One `Σ coef · x <= bound` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    /// (variable index, coefficient)
    pub terms: Vec<(usize, i64)>,
    pub bound: i64,
}

/// Maximize `Σ weights[i] · x[i]` over binary `x` subject to every constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryProgram {
    pub weights: Vec<i64>,
    pub constraints: Vec<Constraint>,
}

impl BinaryProgram {
    /// Program with one variable per weight and no constraints.
    pub fn new(weights: Vec<i64>) -> Self {
        BinaryProgram {
            weights,
            constraints: Vec::new(),
        }
    }

    /// Add a `Σ coef · x <= bound` row. Zero coefficients are dropped.
    pub fn add_constraint(&mut self, terms: Vec<(usize, i64)>, bound: i64) {
        let terms = terms.into_iter().filter(|&(_, coef)| coef != 0).collect();
        self.constraints.push(Constraint { terms, bound });
    }

    pub fn variable_count(&self) -> usize {
        self.weights.len()
    }

    /// Check every row for the given assignment.
    pub fn is_feasible(&self, values: &[bool]) -> bool {
        self.constraints.iter().all(|c| {
            let lhs: i64 = c
                .terms
                .iter()
                .filter(|&&(var, _)| values[var])
                .map(|&(_, coef)| coef)
                .sum();
            lhs <= c.bound
        })
    }

    /// Objective value of an assignment.
    pub fn objective(&self, values: &[bool]) -> i64 {
        self.weights
            .iter()
            .zip(values)
            .filter(|(_, &on)| on)
            .map(|(w, _)| w)
            .sum()
    }
}

/// Quality of a returned assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStatus {
    /// Proven optimal
    Optimal,
    /// Feasible without an optimality proof, e.g. from an oracle with a time budget
    Feasible,
}

/// A feasible 0/1 assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub values: Vec<bool>,
    pub objective: i64,
    pub status: SelectionStatus,
}

impl Assignment {
    /// Indices of the variables set to 1.
    pub fn selected(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, &on)| on)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Solves binary programs.
///
/// Returns `None` when no feasible assignment is known.
pub trait SelectionOracle {
    fn maximize(&self, program: &BinaryProgram) -> Option<Assignment>;
}

/// Exact selection through a mixed-integer solver, one model per component.
#[derive(Debug, Clone, Copy, Default)]
pub struct MilpSelector;

impl MilpSelector {
    pub fn new() -> Self {
        MilpSelector
    }

    /// Group variables that share at least one row.
    fn components(program: &BinaryProgram) -> Vec<(Vec<usize>, Vec<usize>)> {
        let n = program.variable_count();
        let mut sets = UnionFind::new(n);

        for constraint in &program.constraints {
            if let Some(&(first, _)) = constraint.terms.first() {
                for &(var, _) in &constraint.terms[1..] {
                    sets.union(first, var);
                }
            }
        }

        let labels = sets.into_labeling();
        let mut slot_of = vec![usize::MAX; n];
        let mut components: Vec<(Vec<usize>, Vec<usize>)> = Vec::new();

        for var in 0..n {
            let root = labels[var];
            if slot_of[root] == usize::MAX {
                slot_of[root] = components.len();
                components.push((Vec::new(), Vec::new()));
            }
            components[slot_of[root]].0.push(var);
        }

        for (row, constraint) in program.constraints.iter().enumerate() {
            if let Some(&(var, _)) = constraint.terms.first() {
                components[slot_of[labels[var]]].1.push(row);
            }
        }

        components
    }

    /// Solve one component; values follow the order of `vars`.
    fn solve_component(program: &BinaryProgram, vars: &[usize], rows: &[usize]) -> Option<Vec<bool>> {
        // Unconstrained variables need no solver
        if rows.is_empty() {
            return Some(vars.iter().map(|&v| program.weights[v] > 0).collect());
        }

        let mut model_vars = variables!();
        let xs: Vec<Variable> = vars
            .iter()
            .map(|&v| model_vars.add(variable().binary().name(format!("x_{v}"))))
            .collect();
        let local: HashMap<usize, usize> = vars.iter().enumerate().map(|(pos, &v)| (v, pos)).collect();

        let objective = vars
            .iter()
            .zip(&xs)
            .fold(Expression::from(0.0), |acc, (&v, &x)| acc + (program.weights[v] as f64) * x);

        let mut model = model_vars.maximise(objective).using(default_solver);

        for &row in rows {
            let constraint = &program.constraints[row];
            let lhs = constraint
                .terms
                .iter()
                .fold(Expression::from(0.0), |acc, &(var, coef)| {
                    acc + (coef as f64) * xs[local[&var]]
                });
            model.add_constraint(lhs.leq(constraint.bound as f64));
        }

        match model.solve() {
            Ok(solution) => Some(xs.iter().map(|&x| solution.value(x) >= 0.5).collect()),
            Err(e) => {
                debug!("No assignment for a component of {} variables: {}", vars.len(), e);
                None
            }
        }
    }
}

impl SelectionOracle for MilpSelector {
    fn maximize(&self, program: &BinaryProgram) -> Option<Assignment> {
        if program
            .constraints
            .iter()
            .any(|c| c.terms.is_empty() && c.bound < 0)
        {
            debug!("Binary program has an unsatisfiable empty row");
            return None;
        }

        let mut values = vec![false; program.variable_count()];

        for (vars, rows) in Self::components(program) {
            let chosen = Self::solve_component(program, &vars, &rows)?;
            for (&var, on) in vars.iter().zip(chosen) {
                values[var] = on;
            }
        }

        // Drop selected variables that add nothing while every row stays satisfied
        for var in 0..values.len() {
            if values[var] && program.weights[var] <= 0 {
                values[var] = false;
                if !program.is_feasible(&values) {
                    values[var] = true;
                }
            }
        }

        Some(Assignment {
            objective: program.objective(&values),
            values,
            status: SelectionStatus::Optimal,
        })
    }
}
