//! Pairwise exchange generation: candidate route replacements for vehicle pairs.
//!
//! For every unordered pair of vehicles in scope, the two routes are pooled
//! into a two-vehicle sub-instance and handed to the routing oracle with the
//! current routes as warm start. An improving answer becomes an action, and so
//! does its body swap (customer sequences exchanged, depots kept).

use crate::problem::{FleetIndex, Problem};
use crate::routing::{RoutingOracle, RoutingRequest, SearchContext};
use crate::solution::{AllocationState, Route};
use itertools::Itertools;
use log::{debug, trace};
use std::collections::BTreeSet;

/// Cost differences below this are treated as no change.
pub const IMPROVEMENT_EPSILON: f64 = 1e-9;

/// How an action's routes were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// The oracle's joint plan for the two vehicles
    Reoptimized,
    /// The oracle's plan with the two customer sequences exchanged between vehicles
    BodySwap,
}

/// A candidate replacement of two vehicles' routes.
#[derive(Debug, Clone)]
pub struct Action {
    pub vehicles: (usize, usize),
    pub kind: ActionKind,
    pub routes: (Route, Route),
    pub old_cost: f64,
    pub new_cost: f64,
    pub improvement: f64,
    /// New minus old cost per company, present for cross-company scopes
    pub company_deltas: Option<Vec<f64>>,
}

impl Action {
    /// Check if the action replaces the given vehicle's route.
    pub fn touches(&self, vehicle: usize) -> bool {
        self.vehicles.0 == vehicle || self.vehicles.1 == vehicle
    }
}

/// Which vehicles may exchange work with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only the vehicles of one company
    Company(usize),
    /// Every vehicle of every company
    Fleet,
}

impl Scope {
    /// Vehicle slots covered by the scope.
    pub fn vehicles(&self, fleet: &FleetIndex) -> Vec<usize> {
        match self {
            Scope::Company(company) => fleet.vehicles_of(*company).collect(),
            Scope::Fleet => (0..fleet.vehicle_count()).collect(),
        }
    }

    pub fn is_cross_company(&self) -> bool {
        matches!(self, Scope::Fleet)
    }
}

/// Counters of one generation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    pub pairs_examined: usize,
    pub idle_pairs: usize,
    pub no_solution: usize,
    pub infeasible_swaps: usize,
}

/// Builds candidate actions for all vehicle pairs of a scope.
pub struct ExchangeGenerator<'a> {
    problem: &'a Problem,
    fleet: &'a FleetIndex,
    oracle: &'a dyn RoutingOracle,
}

impl<'a> ExchangeGenerator<'a> {
    pub fn new(problem: &'a Problem, fleet: &'a FleetIndex, oracle: &'a dyn RoutingOracle) -> Self {
        ExchangeGenerator {
            problem,
            fleet,
            oracle,
        }
    }

    /// Collect every improving action for the vehicle pairs of `scope`.
    pub fn generate(&self, state: &AllocationState, scope: Scope) -> (Vec<Action>, ExchangeStats) {
        let mut actions = Vec::new();
        let mut stats = ExchangeStats::default();
        let costs: Vec<f64> = state.routes.iter().map(|r| r.cost(self.problem)).collect();

        for (i, j) in scope.vehicles(self.fleet).into_iter().tuple_combinations() {
            let (first, second) = (&state.routes[i], &state.routes[j]);

            if first.is_empty() && second.is_empty() {
                stats.idle_pairs += 1;
                continue;
            }
            stats.pairs_examined += 1;

            let request = self.sub_instance(state, i, j);
            let Some(solved) = self.oracle.solve(self.problem, &request) else {
                debug!("Vehicles {} and {}: no solution", i, j);
                stats.no_solution += 1;
                continue;
            };
            if solved.len() != 2 {
                stats.no_solution += 1;
                continue;
            }

            let old_cost = costs[i] + costs[j];
            let reoptimized = (solved[0].clone(), solved[1].clone());

            let swapped = self.body_swap(&request, state, i, j, &reoptimized);
            if swapped.is_none() {
                stats.infeasible_swaps += 1;
            }

            let candidates = std::iter::once((ActionKind::Reoptimized, reoptimized))
                .chain(swapped.map(|routes| (ActionKind::BodySwap, routes)));

            for (kind, routes) in candidates {
                let new_cost = routes.0.cost(self.problem) + routes.1.cost(self.problem);
                if new_cost >= old_cost - IMPROVEMENT_EPSILON {
                    continue;
                }

                let company_deltas = scope
                    .is_cross_company()
                    .then(|| self.company_deltas(i, j, &routes, &costs));

                trace!(
                    "Vehicles {} and {}: {:?} improves {:.2} -> {:.2}",
                    i,
                    j,
                    kind,
                    old_cost,
                    new_cost
                );

                actions.push(Action {
                    vehicles: (i, j),
                    kind,
                    routes,
                    old_cost,
                    new_cost,
                    improvement: old_cost - new_cost,
                    company_deltas,
                });
            }
        }

        (actions, stats)
    }

    /// The two-vehicle routing request for vehicles `i` and `j`.
    ///
    /// Pools both routes' nodes and depots and every pair touching either route;
    /// the current customer sequences serve as warm start.
    pub fn sub_instance(&self, state: &AllocationState, i: usize, j: usize) -> RoutingRequest {
        let depot_i = self.depot_of(i);
        let depot_j = self.depot_of(j);
        let (first, second) = (&state.routes[i], &state.routes[j]);

        let nodes: BTreeSet<usize> = first
            .nodes
            .iter()
            .chain(second.nodes.iter())
            .copied()
            .chain([depot_i, depot_j])
            .collect();

        let pairs = self
            .problem
            .pairs
            .iter()
            .filter(|p| self.problem.is_valid_pair(p))
            .filter(|p| {
                first.contains(p.pickup)
                    || first.contains(p.delivery)
                    || second.contains(p.pickup)
                    || second.contains(p.delivery)
            })
            .copied()
            .collect();

        RoutingRequest::new(
            nodes.into_iter().collect(),
            pairs,
            vec![self.capacity_of(i), self.capacity_of(j)],
            vec![depot_i, depot_j],
        )
        .with_warm_start(vec![first.customers().to_vec(), second.customers().to_vec()])
    }

    /// Exchange the customer sequences of two routes, each keeping its vehicle's depot.
    ///
    /// Returns `None` when a swapped route breaks a constraint of its new vehicle.
    pub fn body_swap(
        &self,
        request: &RoutingRequest,
        state: &AllocationState,
        i: usize,
        j: usize,
        routes: &(Route, Route),
    ) -> Option<(Route, Route)> {
        let depot_i = state.routes[i].depot().unwrap_or_else(|| self.depot_of(i));
        let depot_j = state.routes[j].depot().unwrap_or_else(|| self.depot_of(j));

        let swapped = (
            Route::from_customers(depot_i, routes.1.customers()),
            Route::from_customers(depot_j, routes.0.customers()),
        );

        let context = SearchContext::new(self.problem, request)?;
        let feasible =
            context.is_feasible(0, &swapped.0.nodes) && context.is_feasible(1, &swapped.1.nodes);

        feasible.then_some(swapped)
    }

    fn company_deltas(&self, i: usize, j: usize, routes: &(Route, Route), costs: &[f64]) -> Vec<f64> {
        let mut deltas = vec![0.0; self.fleet.company_count()];
        deltas[self.fleet.company_of(i)] += routes.0.cost(self.problem) - costs[i];
        deltas[self.fleet.company_of(j)] += routes.1.cost(self.problem) - costs[j];
        deltas
    }

    fn depot_of(&self, vehicle: usize) -> usize {
        self.problem.companies[self.fleet.company_of(vehicle)].depot
    }

    fn capacity_of(&self, vehicle: usize) -> f64 {
        self.problem.companies[self.fleet.company_of(vehicle)].capacity
    }
}
