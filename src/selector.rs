//! Selection of a vehicle-disjoint subset of exchange actions.

use crate::exchange::Action;
use crate::problem::FleetIndex;
use crate::program::{BinaryProgram, SelectionOracle, SelectionStatus};
use crate::solution::{AllocationState, Route};
use log::{debug, warn};

/// Result of one selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Indices into the action list, ascending
    pub chosen: Vec<usize>,
    /// `None` when the oracle returned no assignment
    pub status: Option<SelectionStatus>,
    /// Sum of the chosen actions' integer weights
    pub objective: i64,
}

impl Selection {
    fn empty(status: Option<SelectionStatus>) -> Self {
        Selection {
            chosen: Vec::new(),
            status,
            objective: 0,
        }
    }
}

/// Turns candidate actions into a binary program and applies the chosen subset.
pub struct ActionSelector<'a> {
    oracle: &'a dyn SelectionOracle,
    individual_rationality: bool,
    weight_scale: f64,
}

impl<'a> ActionSelector<'a> {
    pub fn new(oracle: &'a dyn SelectionOracle, individual_rationality: bool, weight_scale: f64) -> Self {
        ActionSelector {
            oracle,
            individual_rationality,
            weight_scale,
        }
    }

    /// Integer objective weight of an action.
    pub fn weight(&self, action: &Action) -> i64 {
        (action.improvement * self.weight_scale).round() as i64
    }

    /// Build the program: one variable per action, at most one action per vehicle,
    /// and with individual rationality a non-positive net delta per company.
    ///
    /// Actions whose rounded weight is not positive are fixed to 0.
    pub fn formulate(&self, actions: &[Action], fleet: &FleetIndex) -> BinaryProgram {
        let weights: Vec<i64> = actions.iter().map(|a| self.weight(a)).collect();
        let mut program = BinaryProgram::new(weights.clone());

        for (index, &weight) in weights.iter().enumerate() {
            if weight <= 0 {
                program.add_constraint(vec![(index, 1)], 0);
            }
        }

        for vehicle in 0..fleet.vehicle_count() {
            let terms: Vec<(usize, i64)> = actions
                .iter()
                .enumerate()
                .filter(|(_, a)| a.touches(vehicle))
                .map(|(i, _)| (i, 1))
                .collect();
            if terms.len() > 1 {
                program.add_constraint(terms, 1);
            }
        }

        if self.individual_rationality {
            for company in 0..fleet.company_count() {
                let terms: Vec<(usize, i64)> = actions
                    .iter()
                    .enumerate()
                    .filter_map(|(i, a)| {
                        let delta = a.company_deltas.as_ref()?.get(company).copied()?;
                        Some((i, (delta * self.weight_scale - 1e-9).ceil() as i64))
                    })
                    .filter(|&(_, coef)| coef != 0)
                    .collect();
                if !terms.is_empty() {
                    program.add_constraint(terms, 0);
                }
            }
        }

        program
    }

    /// Choose the best vehicle-disjoint subset of `actions`.
    pub fn select(&self, actions: &[Action], fleet: &FleetIndex) -> Selection {
        if actions.is_empty() {
            return Selection::empty(Some(SelectionStatus::Optimal));
        }

        let program = self.formulate(actions, fleet);
        let Some(assignment) = self.oracle.maximize(&program) else {
            warn!(
                "No assignment for {} candidate actions, keeping current routes",
                actions.len()
            );
            return Selection::empty(None);
        };

        let chosen = assignment.selected();
        debug!(
            "Selected {} of {} actions, objective {} ({:?})",
            chosen.len(),
            actions.len(),
            assignment.objective,
            assignment.status
        );

        Selection {
            chosen,
            status: Some(assignment.status),
            objective: assignment.objective,
        }
    }

    /// Route replacements of the chosen actions.
    pub fn replacements(actions: &[Action], selection: &Selection) -> Vec<(usize, Route)> {
        selection
            .chosen
            .iter()
            .flat_map(|&i| {
                let action = &actions[i];
                [
                    (action.vehicles.0, action.routes.0.clone()),
                    (action.vehicles.1, action.routes.1.clone()),
                ]
            })
            .collect()
    }

    /// New state with the chosen actions' routes swapped in.
    pub fn apply(state: &AllocationState, actions: &[Action], selection: &Selection) -> AllocationState {
        state.with_replacements(Self::replacements(actions, selection))
    }
}
