//! Task ownership: Voronoi allocation of pickup-delivery pairs to companies and
//! the per-company routing solves built on top of it.

use crate::error::{Error, Result};
use crate::problem::{FleetIndex, Problem};
use crate::routing::{RoutingOracle, RoutingRequest};
use crate::solution::{AllocationState, Route};
use log::{info, warn};
use std::collections::{HashMap, HashSet};

/// The node and task subset one company routes on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct SubInstance {
    pub company: usize,
    pub depot: usize,
    /// Depot first, then the pickup and delivery nodes of `pairs`
    pub nodes: Vec<usize>,
    /// Indices into `Problem::pairs`
    pub pairs: Vec<usize>,
}

/// Which company owns each pickup-delivery pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Owner per pair index, `None` for skipped pairs
    pub owners: Vec<Option<usize>>,
    /// Pairs referencing unknown node ids
    pub skipped: Vec<usize>,
}

impl Allocation {
    /// Allocation where every pair stays with the company it originates from.
    pub fn by_origin(problem: &Problem) -> Result<Self> {
        Self::assign(problem, |pair_index| {
            let origin = problem.pairs[pair_index].origin;
            if origin < problem.companies.len() {
                Ok(origin)
            } else {
                Err(Error::InvalidCompany {
                    index: origin,
                    reason: format!("pair {pair_index} originates from an unknown company"),
                })
            }
        })
    }

    /// Ownership as currently served by the fleet.
    ///
    /// Pairs not served by any vehicle keep their owner from `fallback`.
    pub fn from_state(
        problem: &Problem,
        fleet: &FleetIndex,
        state: &AllocationState,
        fallback: &Allocation,
    ) -> Self {
        let owners = problem
            .pairs
            .iter()
            .enumerate()
            .map(|(index, pair)| {
                state
                    .vehicle_serving(pair.pickup)
                    .map(|v| fleet.company_of(v))
                    .or_else(|| fallback.owner(index))
            })
            .collect();

        Allocation {
            owners,
            skipped: fallback.skipped.clone(),
        }
    }

    /// Run a per-pair assignment rule, skipping invalid pairs and rejecting orphans.
    ///
    /// Known endpoints of a skipped pair count as covered.
    fn assign<F>(problem: &Problem, mut owner_of: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<usize>,
    {
        let mut owners = vec![None; problem.pairs.len()];
        let mut skipped = Vec::new();
        let mut membership: HashMap<usize, usize> = HashMap::new();
        let mut covered: HashSet<usize> = HashSet::new();

        for (index, pair) in problem.pairs.iter().enumerate() {
            if !problem.is_valid_pair(pair) {
                warn!(
                    "Invalid pickup-delivery pair ({}, {}) skipped",
                    pair.pickup, pair.delivery
                );
                covered.extend(
                    [pair.pickup, pair.delivery]
                        .into_iter()
                        .filter(|&id| problem.contains(id)),
                );
                skipped.push(index);
                continue;
            }

            for node in [pair.pickup, pair.delivery] {
                *membership.entry(node).or_insert(0) += 1;
            }

            owners[index] = Some(owner_of(index)?);
        }

        if let Some((&node, _)) = membership.iter().find(|&(_, &count)| count > 1) {
            return Err(Error::SharedNode(node));
        }

        let depots: HashSet<usize> = problem.depot_ids().into_iter().collect();
        let mut orphans: Vec<usize> = problem
            .nodes
            .iter()
            .map(|n| n.id)
            .filter(|id| !depots.contains(id) && !membership.contains_key(id) && !covered.contains(id))
            .collect();

        if !orphans.is_empty() {
            orphans.sort_unstable();
            return Err(Error::OrphanNodes { ids: orphans });
        }

        Ok(Allocation { owners, skipped })
    }

    /// Owner of a pair.
    pub fn owner(&self, pair: usize) -> Option<usize> {
        self.owners.get(pair).copied().flatten()
    }

    /// Pair indices owned by a company.
    pub fn pairs_of(&self, company: usize) -> Vec<usize> {
        self.owners
            .iter()
            .enumerate()
            .filter(|(_, owner)| **owner == Some(company))
            .map(|(i, _)| i)
            .collect()
    }

    /// Move a pair to another company.
    pub fn transfer(&mut self, pair: usize, to: usize) {
        if let Some(owner) = self.owners.get_mut(pair) {
            *owner = Some(to);
        }
    }

    /// Nodes and pairs one company has to serve.
    pub fn sub_instance(&self, problem: &Problem, company: usize) -> SubInstance {
        let depot = problem.companies[company].depot;
        let pairs = self.pairs_of(company);
        let mut nodes = Vec::with_capacity(2 * pairs.len() + 1);
        nodes.push(depot);

        for &index in &pairs {
            let pair = &problem.pairs[index];
            nodes.push(pair.pickup);
            nodes.push(pair.delivery);
        }

        SubInstance {
            company,
            depot,
            nodes,
            pairs,
        }
    }
}

/// Nearest-depot allocation of pairs, using each pair's midpoint as its position.
pub struct VoronoiAllocator;

impl VoronoiAllocator {
    /// Assign every valid pair to the company whose depot is nearest its midpoint.
    ///
    /// Ties go to the lowest company index. Fails if a node is neither a depot
    /// nor part of an assigned pair.
    pub fn allocate(problem: &Problem) -> Result<Allocation> {
        let allocation = Allocation::assign(problem, |pair_index| {
            let midpoint = problem.midpoint(&problem.pairs[pair_index]);
            Self::ranked_depots(problem, midpoint)
                .first()
                .map(|&(company, _)| company)
                .ok_or_else(|| Error::InvalidCompany {
                    index: 0,
                    reason: "no company to allocate tasks to".to_string(),
                })
        })?;

        for company in 0..problem.companies.len() {
            info!(
                "Voronoi allocation: company {} receives {} pairs",
                company + 1,
                allocation.pairs_of(company).len()
            );
        }

        Ok(allocation)
    }

    /// Companies sorted by the distance from their depot to a point, nearest first.
    ///
    /// The sort is stable, so equidistant depots keep company index order.
    pub fn ranked_depots(problem: &Problem, point: (f64, f64)) -> Vec<(usize, f64)> {
        let mut ranked: Vec<(usize, f64)> = problem
            .companies
            .iter()
            .enumerate()
            .map(|(company, c)| {
                let (x, y) = problem.coordinates(c.depot);
                (company, (point.0 - x).hypot(point.1 - y))
            })
            .collect();

        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked
    }
}

/// Routes for the whole fleet obtained from independent per-company solves.
#[derive(Debug, Clone)]
pub struct SolvedAllocation {
    pub state: AllocationState,
    /// Companies whose solve failed and fell back to depot-only routes
    pub failed_companies: Vec<usize>,
    /// Pairs left unserved by those fallbacks
    pub unserved: Vec<usize>,
}

/// Solve every company's sub-instance from scratch and concatenate the routes.
pub fn solve_allocation(
    problem: &Problem,
    fleet: &FleetIndex,
    allocation: &Allocation,
    oracle: &dyn RoutingOracle,
) -> SolvedAllocation {
    let mut routes = Vec::with_capacity(fleet.vehicle_count());
    let mut failed_companies = Vec::new();
    let mut unserved = Vec::new();

    for (index, company) in problem.companies.iter().enumerate() {
        let sub = allocation.sub_instance(problem, index);
        let pairs = sub.pairs.iter().map(|&i| problem.pairs[i]).collect();
        let request = RoutingRequest::new(
            sub.nodes.clone(),
            pairs,
            vec![company.capacity; company.vehicles],
            vec![company.depot; company.vehicles],
        );

        match oracle.solve(problem, &request) {
            Some(solved) if solved.len() == company.vehicles => routes.extend(solved),
            _ => {
                warn!(
                    "Company {}: no routing solution for {} pairs, falling back to empty routes",
                    index + 1,
                    sub.pairs.len()
                );
                routes.extend((0..company.vehicles).map(|_| Route::depot_only(company.depot)));
                failed_companies.push(index);
                unserved.extend(sub.pairs);
            }
        }
    }

    SolvedAllocation {
        state: AllocationState::new(routes),
        failed_companies,
        unserved,
    }
}
