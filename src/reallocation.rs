//! Migration of contested pickup-delivery pairs between companies.
//!
//! A pair is contested when its midpoint lies close to the bisector between its
//! nearest and second-nearest depots. Each round moves the most contested pair
//! owned by an improving company to its second-nearest company, re-solves the
//! fleet and negotiates again, until every company is on the same side of its
//! baseline or a company that was improving falls behind it.

use crate::allocator::{solve_allocation, Allocation, VoronoiAllocator};
use crate::export::RoundObserver;
use crate::negotiation::{CompanyStatus, Negotiation};
use crate::problem::Problem;
use crate::solution::AllocationState;
use log::{info, warn};
use std::collections::HashSet;

/// Why the reallocation loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every company is below its baseline cost
    AllImproved,
    /// Every company is above its baseline cost
    AllWorsened,
    /// A company improving in the previous round is now above its baseline;
    /// the previous round's state was restored
    Regressed { company: usize },
    /// No pair is eligible for migration
    NoCandidate,
    RoundCap,
}

/// A pair moved from one company to another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Migration {
    pub pair: usize,
    pub from: usize,
    pub to: usize,
    /// Distance from the pair's midpoint to the bisector of its two nearest depots
    pub boundary_distance: f64,
}

#[derive(Debug, Clone)]
pub struct ReallocationOutcome {
    pub state: AllocationState,
    pub allocation: Allocation,
    pub migrations: Vec<Migration>,
    pub termination: Termination,
    pub rounds: u32,
    /// Improvement over the baseline per company, in percent
    pub percentages: Vec<f64>,
    /// Pairs left unserved by a failed company solve
    pub unserved: Vec<usize>,
}

/// Per-company improvement over `baseline` in percent (0 for a zero baseline).
pub fn improvement_percentages(baseline: &[f64], current: &[f64]) -> Vec<f64> {
    baseline
        .iter()
        .zip(current)
        .map(|(&before, &after)| crate::utils::improvement_pct(before, after))
        .collect()
}

/// Cap at zero the improvement of every company owning an unserved pair.
///
/// Depot-only fallback routes cost nothing, which is not a gain.
pub fn discount_unserved(percentages: &mut [f64], allocation: &Allocation, unserved: &[usize]) {
    for &pair in unserved {
        if let Some(pct) = allocation.owner(pair).and_then(|c| percentages.get_mut(c)) {
            *pct = pct.min(0.0);
        }
    }
}

/// Check the stop conditions for the current percentages.
///
/// A company flipping from positive to negative takes precedence over the
/// all-positive and all-negative cases.
pub fn check_termination(previous: Option<&[f64]>, current: &[f64]) -> Option<Termination> {
    if let Some(previous) = previous {
        let flipped = previous
            .iter()
            .zip(current)
            .position(|(&before, &now)| before > 0.0 && now < 0.0);
        if let Some(company) = flipped {
            return Some(Termination::Regressed { company });
        }
    }

    if current.is_empty() {
        return None;
    }
    if current.iter().all(|&p| p > 0.0) {
        return Some(Termination::AllImproved);
    }
    if current.iter().all(|&p| p < 0.0) {
        return Some(Termination::AllWorsened);
    }

    None
}

/// Distance from `point` to the perpendicular bisector of `a` and `b`.
///
/// Zero when the two points coincide.
pub fn boundary_distance(point: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let separation = (a.0 - b.0).hypot(a.1 - b.1);
    if separation == 0.0 {
        return 0.0;
    }

    let da = (point.0 - a.0).powi(2) + (point.1 - a.1).powi(2);
    let db = (point.0 - b.0).powi(2) + (point.1 - b.1).powi(2);
    (da - db).abs() / (2.0 * separation)
}

/// Migration candidates, most contested first.
///
/// Only pairs owned by companies with positive improvement and not migrated
/// before qualify; a pair whose second-nearest depot belongs to its owner is skipped.
pub fn rank_candidates(
    problem: &Problem,
    allocation: &Allocation,
    percentages: &[f64],
    migrated: &HashSet<usize>,
) -> Vec<Migration> {
    let mut candidates: Vec<Migration> = allocation
        .owners
        .iter()
        .enumerate()
        .filter_map(|(pair, owner)| {
            let from = (*owner)?;
            if migrated.contains(&pair) || percentages.get(from).map_or(true, |&p| p <= 0.0) {
                return None;
            }

            let midpoint = problem.midpoint(&problem.pairs[pair]);
            let ranked = VoronoiAllocator::ranked_depots(problem, midpoint);
            let (nearest, second) = (ranked.first()?.0, ranked.get(1)?.0);
            if second == from {
                return None;
            }

            Some(Migration {
                pair,
                from,
                to: second,
                boundary_distance: boundary_distance(
                    midpoint,
                    problem.coordinates(problem.companies[nearest].depot),
                    problem.coordinates(problem.companies[second].depot),
                ),
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.boundary_distance
            .total_cmp(&b.boundary_distance)
            .then(a.pair.cmp(&b.pair))
    });
    candidates
}

/// The reallocation loop on top of a negotiation.
pub struct Reallocation<'a> {
    negotiation: &'a Negotiation<'a>,
}

impl<'a> Reallocation<'a> {
    pub fn new(negotiation: &'a Negotiation<'a>) -> Self {
        Reallocation { negotiation }
    }

    /// Migrate pairs until a stop condition holds.
    ///
    /// `baseline` holds each company's cost before any allocation, `allocation`
    /// the ownership that produced `state`.
    pub fn run<O: RoundObserver + ?Sized>(
        &self,
        state: AllocationState,
        allocation: &Allocation,
        baseline: &[f64],
        observer: &mut O,
    ) -> ReallocationOutcome {
        let negotiation = self.negotiation;
        let (problem, fleet) = (negotiation.problem, negotiation.fleet);
        let max_rounds = negotiation.config.max_reallocation_rounds;

        let mut state = state;
        let mut allocation = Allocation::from_state(problem, fleet, &state, allocation);
        let mut unserved = state.unserved_pairs(problem);
        let mut migrations: Vec<Migration> = Vec::new();
        let mut migrated: HashSet<usize> = HashSet::new();
        let mut previous: Option<(Vec<f64>, AllocationState, Allocation, Vec<usize>)> = None;
        let mut rounds = 0;

        let termination = loop {
            let costs = state.company_costs(problem, fleet);
            let mut percentages = improvement_percentages(baseline, &costs);
            discount_unserved(&mut percentages, &allocation, &unserved);
            for (company, pct) in percentages.iter().enumerate() {
                info!(
                    "Reallocation round {}: company {} cost {:.2} ({:+.2}% vs baseline)",
                    rounds,
                    company + 1,
                    costs[company],
                    pct
                );
            }

            let previous_pct = previous.as_ref().map(|p| p.0.as_slice());
            if let Some(termination) = check_termination(previous_pct, &percentages) {
                if let Termination::Regressed { company } = termination {
                    if let Some((_, prev_state, prev_allocation, prev_unserved)) = previous.take() {
                        warn!(
                            "Company {} fell behind its baseline, undoing the last migration",
                            company + 1
                        );
                        state = prev_state;
                        allocation = prev_allocation;
                        unserved = prev_unserved;
                        migrations.pop();
                    }
                }
                break termination;
            }

            if rounds >= max_rounds {
                warn!("Reallocation stopped at the round cap of {}", max_rounds);
                break Termination::RoundCap;
            }

            let Some(migration) = rank_candidates(problem, &allocation, &percentages, &migrated)
                .into_iter()
                .next()
            else {
                info!("No pair left to migrate");
                break Termination::NoCandidate;
            };
            rounds += 1;

            info!(
                "Migrating pair {} from company {} to company {} (boundary distance {:.2})",
                migration.pair,
                migration.from + 1,
                migration.to + 1,
                migration.boundary_distance
            );

            previous = Some((percentages, state.clone(), allocation.clone(), unserved.clone()));
            allocation.transfer(migration.pair, migration.to);
            migrated.insert(migration.pair);
            migrations.push(migration);

            let solved = solve_allocation(problem, fleet, &allocation, negotiation.routing);
            let statuses = vec![CompanyStatus::Active; fleet.company_count()];
            let negotiated = negotiation.run_companies(solved.state, statuses, observer);

            state = negotiated.state;
            unserved = solved.unserved;
        };

        let mut percentages = improvement_percentages(baseline, &state.company_costs(problem, fleet));
        discount_unserved(&mut percentages, &allocation, &unserved);

        ReallocationOutcome {
            state,
            allocation,
            migrations,
            termination,
            rounds,
            percentages,
            unserved,
        }
    }
}
