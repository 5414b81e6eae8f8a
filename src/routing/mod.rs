//! Routing oracle interface and the built-in pickup-and-delivery solver.
//!
//! The negotiation protocol only talks to [`RoutingOracle`]. The bundled
//! [`PairInsertionOracle`] builds routes by regret insertion of whole
//! pickup-delivery pairs and improves them by relocating pairs, honouring
//! capacity, time windows and pickup-before-delivery precedence.

pub mod insertion;
pub mod relocate;
pub mod utils;

use crate::config::OracleConfig;
use crate::problem::{PickupDelivery, Problem};
use crate::solution::Route;
use log::{trace, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};

/// Which side constraints the oracle must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    pub capacity: bool,
    pub time_windows: bool,
    pub pickup_delivery: bool,
}

impl Constraints {
    /// All constraints enabled.
    pub fn all() -> Self {
        Constraints {
            capacity: true,
            time_windows: true,
            pickup_delivery: true,
        }
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints::all()
    }
}

/// A routing sub-problem handed to the oracle.
#[derive(Debug, Clone)]
pub struct RoutingRequest {
    /// Node ids available to this request (depots included)
    pub nodes: Vec<usize>,
    /// Tasks that must all be served
    pub pairs: Vec<PickupDelivery>,
    pub vehicle_count: usize,
    /// Capacity of each vehicle
    pub capacities: Vec<f64>,
    pub start_depots: Vec<usize>,
    pub end_depots: Vec<usize>,
    pub constraints: Constraints,
    /// Optional customer sequences (depots stripped), one per vehicle
    pub warm_start: Option<Vec<Vec<usize>>>,
}

impl RoutingRequest {
    /// Request with one vehicle per entry of `depots`, each returning to its start depot.
    pub fn new(
        nodes: Vec<usize>,
        pairs: Vec<PickupDelivery>,
        capacities: Vec<f64>,
        depots: Vec<usize>,
    ) -> Self {
        RoutingRequest {
            nodes,
            pairs,
            vehicle_count: depots.len(),
            capacities,
            start_depots: depots.clone(),
            end_depots: depots,
            constraints: Constraints::all(),
            warm_start: None,
        }
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_warm_start(mut self, routes: Vec<Vec<usize>>) -> Self {
        self.warm_start = Some(routes);
        self
    }
}

/// Solves a multi-vehicle pickup-and-delivery problem.
///
/// Returns one route per vehicle, each from its start depot to its end depot,
/// or `None` when no feasible plan was found. Implementations must return
/// complete plans only: every pair of the request served by a single vehicle,
/// pickup first.
pub trait RoutingOracle {
    fn solve(&self, problem: &Problem, request: &RoutingRequest) -> Option<Vec<Route>>;
}

/// Regret insertion followed by pair relocation.
#[derive(Debug, Clone)]
pub struct PairInsertionOracle {
    pub seed: u64,
    pub max_passes: usize,
}

impl PairInsertionOracle {
    /// Create an oracle from its configuration.
    pub fn new(config: &OracleConfig) -> Self {
        PairInsertionOracle {
            seed: config.seed,
            max_passes: config.max_passes,
        }
    }
}

impl Default for PairInsertionOracle {
    fn default() -> Self {
        PairInsertionOracle::new(&OracleConfig::default())
    }
}

impl RoutingOracle for PairInsertionOracle {
    fn solve(&self, problem: &Problem, request: &RoutingRequest) -> Option<Vec<Route>> {
        let context = SearchContext::new(problem, request)?;

        // Construction, warm-started when a hint is present
        let mut routes = context.construct()?;

        // Improvement passes until no pair can be relocated profitably
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        for _ in 0..self.max_passes {
            if !context.relocate_neighborhood(&mut routes, &mut rng) {
                break;
            }
        }

        Some(routes.into_iter().map(Route::new).collect())
    }
}

/// Per-call view of a request: validated pairs and lookups used by the neighbourhoods.
pub struct SearchContext<'a> {
    pub problem: &'a Problem,
    pub request: &'a RoutingRequest,
    /// Pairs whose both endpoints are part of the request
    pub pairs: Vec<PickupDelivery>,
    /// Node id -> index into `pairs`
    pub pair_of: HashMap<usize, usize>,
}

impl<'a> SearchContext<'a> {
    /// Validate the request shape and index its pairs.
    pub fn new(problem: &'a Problem, request: &'a RoutingRequest) -> Option<Self> {
        let vehicles = request.vehicle_count;
        if request.start_depots.len() != vehicles
            || request.end_depots.len() != vehicles
            || request.capacities.len() != vehicles
        {
            warn!(
                "Malformed routing request: {} vehicles, {} starts, {} ends, {} capacities",
                vehicles,
                request.start_depots.len(),
                request.end_depots.len(),
                request.capacities.len()
            );
            return None;
        }

        let available: HashSet<usize> = request.nodes.iter().copied().collect();
        let mut pairs = Vec::with_capacity(request.pairs.len());
        let mut pair_of = HashMap::new();

        for pair in &request.pairs {
            let known = problem.is_valid_pair(pair)
                && available.contains(&pair.pickup)
                && available.contains(&pair.delivery);
            if !known {
                warn!("Invalid pickup-delivery pair ({}, {})", pair.pickup, pair.delivery);
                continue;
            }
            if pair_of.contains_key(&pair.pickup) {
                trace!("Duplicate pair ({}, {}) ignored", pair.pickup, pair.delivery);
                continue;
            }
            pair_of.insert(pair.pickup, pairs.len());
            pair_of.insert(pair.delivery, pairs.len());
            pairs.push(*pair);
        }

        Some(SearchContext {
            problem,
            request,
            pairs,
            pair_of,
        })
    }

    /// Check capacity, time windows and precedence of a full route for a vehicle.
    pub fn is_feasible(&self, vehicle: usize, route: &[usize]) -> bool {
        let constraints = self.request.constraints;

        if constraints.capacity && !self.respects_capacity(vehicle, route) {
            return false;
        }
        if constraints.time_windows && !self.respects_time_windows(route) {
            return false;
        }
        if constraints.pickup_delivery && !self.respects_precedence(route) {
            return false;
        }

        true
    }

    fn respects_capacity(&self, vehicle: usize, route: &[usize]) -> bool {
        let capacity = self.request.capacities[vehicle];
        let mut load = 0.0;

        for &node in route.iter().skip(1).take(route.len().saturating_sub(2)) {
            if let Some(n) = self.problem.node(node) {
                load += n.demand;
                if load > capacity + 1e-9 {
                    return false;
                }
            }
        }

        true
    }

    fn respects_time_windows(&self, route: &[usize]) -> bool {
        let Some(&start) = route.first() else {
            return true;
        };

        let mut time = self
            .problem
            .node(start)
            .and_then(|n| n.time_window)
            .map_or(0.0, |tw| tw.ready);
        let mut previous = start;

        for &node in route.iter().skip(1) {
            time += self.problem.distance(previous, node);

            if let Some(n) = self.problem.node(node) {
                if let Some(tw) = n.time_window {
                    if time > tw.due + 1e-9 {
                        return false;
                    }
                    time = time.max(tw.ready);
                }
                time += n.service;
            }

            previous = node;
        }

        true
    }

    fn respects_precedence(&self, route: &[usize]) -> bool {
        let mut open: HashSet<usize> = HashSet::new();

        for &node in route {
            let Some(&index) = self.pair_of.get(&node) else {
                continue;
            };
            let pair = &self.pairs[index];

            if node == pair.pickup {
                open.insert(index);
            } else if !open.remove(&index) {
                return false;
            }
        }

        open.is_empty()
    }
}
