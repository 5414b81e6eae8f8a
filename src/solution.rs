//! Routes, the allocation state threaded through every round, and cost evaluation.

use crate::error::{Error, Result};
use crate::problem::{FleetIndex, Problem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A vehicle route: node ids starting and ending at the vehicle's depot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub nodes: Vec<usize>,
}

impl Route {
    /// Create a route from a full node sequence (depots included).
    pub fn new(nodes: Vec<usize>) -> Self {
        Route { nodes }
    }

    /// A route that never leaves the depot.
    pub fn depot_only(depot: usize) -> Self {
        Route {
            nodes: vec![depot, depot],
        }
    }

    /// Wrap a customer sequence with the depot at both ends.
    pub fn from_customers(depot: usize, customers: &[usize]) -> Self {
        let mut nodes = Vec::with_capacity(customers.len() + 2);
        nodes.push(depot);
        nodes.extend_from_slice(customers);
        nodes.push(depot);
        Route { nodes }
    }

    /// The depot this route starts from.
    pub fn depot(&self) -> Option<usize> {
        self.nodes.first().copied()
    }

    /// The visited nodes between the two depot stops.
    pub fn customers(&self) -> &[usize] {
        if self.nodes.len() <= 2 {
            &[]
        } else {
            &self.nodes[1..self.nodes.len() - 1]
        }
    }

    /// Check if the route serves no task.
    pub fn is_empty(&self) -> bool {
        self.customers().is_empty()
    }

    pub fn contains(&self, node: usize) -> bool {
        self.nodes.contains(&node)
    }

    /// Cumulative Euclidean distance over the node sequence.
    pub fn cost(&self, problem: &Problem) -> f64 {
        self.nodes
            .windows(2)
            .map(|w| problem.distance(w[0], w[1]))
            .sum()
    }

    /// Highest load carried at any point of the route.
    pub fn peak_load(&self, problem: &Problem) -> f64 {
        let mut load = 0.0;
        let mut peak: f64 = 0.0;

        for &node in self.customers() {
            if let Some(n) = problem.node(node) {
                load += n.demand;
                peak = peak.max(load);
            }
        }

        peak
    }
}

/// Per-vehicle routes of the whole fleet at one point of the negotiation.
///
/// Rounds never mutate a state they were given; they return a new one.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationState {
    pub routes: Vec<Route>,
}

impl AllocationState {
    pub fn new(routes: Vec<Route>) -> Self {
        AllocationState { routes }
    }

    /// Sum of all route costs.
    pub fn total_cost(&self, problem: &Problem) -> f64 {
        self.routes.iter().map(|r| r.cost(problem)).sum()
    }

    /// Route costs aggregated per company.
    pub fn company_costs(&self, problem: &Problem, fleet: &FleetIndex) -> Vec<f64> {
        (0..fleet.company_count())
            .map(|c| self.company_cost(problem, fleet, c))
            .collect()
    }

    /// Total route cost of one company's vehicles.
    pub fn company_cost(&self, problem: &Problem, fleet: &FleetIndex, company: usize) -> f64 {
        fleet
            .vehicles_of(company)
            .map(|v| self.routes[v].cost(problem))
            .sum()
    }

    /// Vehicle currently visiting a node.
    pub fn vehicle_serving(&self, node: usize) -> Option<usize> {
        self.routes
            .iter()
            .position(|r| r.customers().contains(&node))
    }

    /// Copy of this state with some vehicles' routes replaced.
    pub fn with_replacements<I>(&self, replacements: I) -> AllocationState
    where
        I: IntoIterator<Item = (usize, Route)>,
    {
        let mut routes = self.routes.clone();
        for (vehicle, route) in replacements {
            routes[vehicle] = route;
        }
        AllocationState { routes }
    }

    /// Indices of valid pairs not served by any vehicle.
    pub fn unserved_pairs(&self, problem: &Problem) -> Vec<usize> {
        let served: HashMap<usize, usize> = self.node_to_vehicle();

        problem
            .pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| problem.is_valid_pair(p))
            .filter(|(_, p)| !served.contains_key(&p.pickup) || !served.contains_key(&p.delivery))
            .map(|(i, _)| i)
            .collect()
    }

    fn node_to_vehicle(&self) -> HashMap<usize, usize> {
        let mut served = HashMap::new();
        for (vehicle, route) in self.routes.iter().enumerate() {
            for &node in route.customers() {
                served.insert(node, vehicle);
            }
        }
        served
    }

    /// Check the allocation invariants against the problem.
    ///
    /// Every vehicle starts and ends at its company depot, every node is visited
    /// at most once, pickup and delivery share a vehicle with the pickup first,
    /// and the carried load never exceeds the company capacity. Unserved pairs
    /// are only accepted when listed in `tolerated_unserved`.
    pub fn verify(
        &self,
        problem: &Problem,
        fleet: &FleetIndex,
        tolerated_unserved: &[usize],
    ) -> Result<()> {
        if self.routes.len() != fleet.vehicle_count() {
            return Err(Error::Invariant(format!(
                "{} routes for {} vehicles",
                self.routes.len(),
                fleet.vehicle_count()
            )));
        }

        let mut seen: HashMap<usize, (usize, usize)> = HashMap::new();

        for (vehicle, route) in self.routes.iter().enumerate() {
            let company = &problem.companies[fleet.company_of(vehicle)];

            if route.nodes.len() < 2
                || route.nodes[0] != company.depot
                || route.nodes[route.nodes.len() - 1] != company.depot
            {
                return Err(Error::Invariant(format!(
                    "vehicle {vehicle} does not start and end at depot {}",
                    company.depot
                )));
            }

            for (pos, &node) in route.customers().iter().enumerate() {
                if problem.pair_of(node).is_none() {
                    return Err(Error::Invariant(format!(
                        "vehicle {vehicle} visits node {node} outside any pickup-delivery pair"
                    )));
                }
                if seen.insert(node, (vehicle, pos)).is_some() {
                    return Err(Error::Invariant(format!("node {node} is visited twice")));
                }
            }

            if route.peak_load(problem) > company.capacity + 1e-9 {
                return Err(Error::Invariant(format!(
                    "vehicle {vehicle} exceeds capacity {}",
                    company.capacity
                )));
            }
        }

        for (index, pair) in problem.pairs.iter().enumerate() {
            if !problem.is_valid_pair(pair) {
                continue;
            }

            match (seen.get(&pair.pickup), seen.get(&pair.delivery)) {
                (Some(&(vp, pp)), Some(&(vd, pd))) => {
                    if vp != vd {
                        return Err(Error::Invariant(format!(
                            "pair {index} split between vehicles {vp} and {vd}"
                        )));
                    }
                    if pp >= pd {
                        return Err(Error::Invariant(format!(
                            "pair {index}: delivery {} precedes pickup {}",
                            pair.delivery, pair.pickup
                        )));
                    }
                }
                (None, None) if tolerated_unserved.contains(&index) => {}
                _ => {
                    return Err(Error::Invariant(format!("pair {index} is not served")));
                }
            }
        }

        Ok(())
    }
}

impl fmt::Debug for AllocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "AllocationState:")?;
        writeln!(f, "  Vehicles: {}", self.routes.len())?;

        for (i, route) in self.routes.iter().enumerate() {
            writeln!(f, "  Vehicle {}: {:?}", i, route.nodes)?;
        }

        Ok(())
    }
}
