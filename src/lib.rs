//! # LSP Exchange
//!
//! Route exchange negotiation between logistics service providers (LSPs) that
//! share a pool of pickup-and-delivery tasks.
//!
//! Each company owns one depot and a fleet of vehicles. Tasks are first split
//! between companies by nearest depot (Voronoi allocation) and routed per
//! company. Companies then repeatedly propose pairwise route exchanges between
//! their vehicles and accept a vehicle-disjoint subset of them chosen by a 0/1
//! program, until no company improves any more. Optional stages extend the
//! exchanges to the whole fleet under individual rationality and migrate
//! contested tasks across company boundaries.
//!
//! Vehicle routing and 0/1 selection are behind the [`routing::RoutingOracle`]
//! and [`program::SelectionOracle`] traits; a built-in implementation of each
//! is provided.

pub mod allocator;
pub mod config;
pub mod error;
pub mod exchange;
pub mod export;
pub mod negotiation;
pub mod problem;
pub mod program;
pub mod reallocation;
pub mod routing;
pub mod selector;
pub mod solution;
pub mod utils;

use crate::allocator::{solve_allocation, Allocation, VoronoiAllocator};
use crate::config::Config;
use crate::error::Result;
use crate::export::{write_index, RoundObserver, SnapshotRecorder, StateExporter};
use crate::negotiation::{CompanyStatus, Negotiation};
use crate::problem::Problem;
use crate::program::{MilpSelector, SelectionOracle};
use crate::reallocation::{Reallocation, ReallocationOutcome};
use crate::routing::{PairInsertionOracle, RoutingOracle};
use crate::solution::AllocationState;

use log::{info, warn};
use std::time::{Duration, Instant};

/// Everything a negotiation run produced.
#[derive(Debug, Clone)]
pub struct NegotiationReport {
    /// Company costs with every task at its company of origin
    pub baseline_costs: Vec<f64>,
    /// Company costs right after the Voronoi allocation
    pub allocated_costs: Vec<f64>,
    pub final_costs: Vec<f64>,
    pub state: AllocationState,
    /// Ownership after the last stage
    pub allocation: Allocation,
    pub negotiation_rounds: u32,
    pub hit_round_cap: bool,
    pub reallocation: Option<ReallocationOutcome>,
    /// Pairs no vehicle serves because a company solve failed
    pub unserved: Vec<usize>,
    /// Pairs ignored for referencing unknown nodes
    pub skipped: Vec<usize>,
    pub run_time: Duration,
}

impl NegotiationReport {
    pub fn baseline_cost(&self) -> f64 {
        self.baseline_costs.iter().sum()
    }

    pub fn allocated_cost(&self) -> f64 {
        self.allocated_costs.iter().sum()
    }

    pub fn final_cost(&self) -> f64 {
        self.final_costs.iter().sum()
    }
}

/// Runs the full pipeline: baseline, Voronoi allocation, per-company
/// negotiation and the optional fleet-wide and reallocation stages.
pub struct Negotiator {
    pub problem: Problem,
    pub config: Config,
    routing: Box<dyn RoutingOracle>,
    selection: Box<dyn SelectionOracle>,
}

impl Negotiator {
    /// Create a negotiator with the built-in oracles.
    pub fn new(problem: Problem, config: Config) -> Self {
        let routing = Box::new(PairInsertionOracle::new(&config.oracle));
        let selection = Box::new(MilpSelector::new());
        Negotiator {
            problem,
            config,
            routing,
            selection,
        }
    }

    /// Replace the routing and selection oracles.
    pub fn with_oracles(
        mut self,
        routing: Box<dyn RoutingOracle>,
        selection: Box<dyn SelectionOracle>,
    ) -> Self {
        self.routing = routing;
        self.selection = selection;
        self
    }

    /// Run every enabled stage and verify the final routes.
    pub fn run(&self) -> Result<NegotiationReport> {
        let start_time = Instant::now();
        let problem = &self.problem;
        let fleet = problem.fleet();

        let mut observer: Box<dyn RoundObserver> = match &self.config.export {
            Some(export) => Box::new(SnapshotRecorder::new(StateExporter::new(
                export.root.clone(),
                &export.instance_name,
            ))),
            None => Box::new(()),
        };

        let negotiation = Negotiation::new(
            problem,
            &fleet,
            self.routing.as_ref(),
            self.selection.as_ref(),
            &self.config,
        );

        // Baseline: every company routes its own tasks
        let origin = Allocation::by_origin(problem)?;
        let baseline = solve_allocation(problem, &fleet, &origin, self.routing.as_ref());
        let baseline_costs = baseline.state.company_costs(problem, &fleet);
        observer.observe(problem, &baseline.state);
        info!("Baseline cost: {:.2}", baseline_costs.iter().sum::<f64>());

        let allocation = VoronoiAllocator::allocate(problem)?;
        let allocated = solve_allocation(problem, &fleet, &allocation, self.routing.as_ref());
        let allocated_costs = allocated.state.company_costs(problem, &fleet);
        observer.observe(problem, &allocated.state);
        info!(
            "Cost after Voronoi allocation: {:.2}",
            allocated_costs.iter().sum::<f64>()
        );

        let statuses = vec![CompanyStatus::Active; fleet.company_count()];
        let companies = negotiation.run_companies(allocated.state, statuses, observer.as_mut());
        let mut state = companies.state;
        let mut negotiation_rounds = companies.rounds;
        let mut hit_round_cap = companies.hit_round_cap;
        let mut unserved = allocated.unserved;

        if self.config.cross_company_exchange {
            let fleet_outcome = negotiation.run_fleet(state, observer.as_mut());
            state = fleet_outcome.state;
            negotiation_rounds += fleet_outcome.rounds;
            hit_round_cap |= fleet_outcome.hit_round_cap;
        }

        let mut final_allocation = Allocation::from_state(problem, &fleet, &state, &allocation);
        let reallocation = if self.config.reallocation {
            let outcome = Reallocation::new(&negotiation).run(
                state.clone(),
                &final_allocation,
                &baseline_costs,
                observer.as_mut(),
            );
            info!(
                "Reallocation finished after {} rounds: {:?}",
                outcome.rounds, outcome.termination
            );
            state = outcome.state.clone();
            final_allocation = outcome.allocation.clone();
            unserved = outcome.unserved.clone();
            Some(outcome)
        } else {
            None
        };

        if !unserved.is_empty() {
            warn!("{} pairs remain unserved", unserved.len());
        }
        state.verify(problem, &fleet, &unserved)?;

        if let Some(export) = &self.config.export {
            write_index(&export.root)?;
        }

        Ok(NegotiationReport {
            baseline_costs,
            allocated_costs,
            final_costs: state.company_costs(problem, &fleet),
            state,
            allocation: final_allocation,
            negotiation_rounds,
            hit_round_cap,
            reallocation,
            unserved,
            skipped: allocation.skipped,
            run_time: start_time.elapsed(),
        })
    }
}
