//! Exchange-and-select rounds repeated until the fleet stops improving.

use crate::config::Config;
use crate::exchange::{ExchangeGenerator, Scope};
use crate::export::RoundObserver;
use crate::problem::{FleetIndex, Problem};
use crate::program::SelectionOracle;
use crate::routing::RoutingOracle;
use crate::selector::ActionSelector;
use crate::solution::{AllocationState, Route};
use crate::utils::{improvement_pct, round_to};
use log::{debug, info, warn};

/// Negotiation state of one company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyStatus {
    Active,
    Converged,
}

/// Result of a negotiation loop.
#[derive(Debug, Clone)]
pub struct NegotiationOutcome {
    pub state: AllocationState,
    pub rounds: u32,
    pub statuses: Vec<CompanyStatus>,
    /// The round cap stopped the loop before every company converged
    pub hit_round_cap: bool,
}

impl NegotiationOutcome {
    pub fn converged(&self) -> bool {
        self.statuses.iter().all(|s| *s == CompanyStatus::Converged)
    }
}

/// Runs exchange rounds over a fixed problem with a pair of oracles.
pub struct Negotiation<'a> {
    pub problem: &'a Problem,
    pub fleet: &'a FleetIndex,
    pub routing: &'a dyn RoutingOracle,
    pub selection: &'a dyn SelectionOracle,
    pub config: &'a Config,
}

impl<'a> Negotiation<'a> {
    pub fn new(
        problem: &'a Problem,
        fleet: &'a FleetIndex,
        routing: &'a dyn RoutingOracle,
        selection: &'a dyn SelectionOracle,
        config: &'a Config,
    ) -> Self {
        Negotiation {
            problem,
            fleet,
            routing,
            selection,
            config,
        }
    }

    /// Generate and select the actions of one scope against `state`.
    ///
    /// Returns the route replacements of the chosen actions; `state` is untouched.
    pub fn exchange_round(&self, state: &AllocationState, scope: Scope) -> Vec<(usize, Route)> {
        let generator = ExchangeGenerator::new(self.problem, self.fleet, self.routing);
        let (actions, stats) = generator.generate(state, scope);
        debug!("{:?}: {} candidate actions, {:?}", scope, actions.len(), stats);

        let individual_rationality = scope.is_cross_company() && self.config.individual_rationality;
        let selector = ActionSelector::new(self.selection, individual_rationality, self.config.weight_scale);
        let selection = selector.select(&actions, self.fleet);

        ActionSelector::replacements(&actions, &selection)
    }

    /// Per-company negotiation until every company has converged.
    ///
    /// Each round generates the candidates of all active companies from the same
    /// state and applies all selections at once. A company converges when its
    /// round improvement rounds to zero at the configured precision.
    pub fn run_companies<O: RoundObserver + ?Sized>(
        &self,
        state: AllocationState,
        mut statuses: Vec<CompanyStatus>,
        observer: &mut O,
    ) -> NegotiationOutcome {
        let mut state = state;
        let mut rounds = 0;
        let mut hit_round_cap = false;

        while statuses.iter().any(|s| *s == CompanyStatus::Active) {
            if rounds >= self.config.max_negotiation_rounds {
                warn!(
                    "Negotiation stopped at the round cap of {} with {} active companies",
                    self.config.max_negotiation_rounds,
                    statuses.iter().filter(|s| **s == CompanyStatus::Active).count()
                );
                hit_round_cap = true;
                break;
            }
            rounds += 1;

            let active: Vec<usize> = (0..statuses.len())
                .filter(|&c| statuses[c] == CompanyStatus::Active)
                .collect();
            let before = state.company_costs(self.problem, self.fleet);

            let replacements: Vec<(usize, Route)> = active
                .iter()
                .flat_map(|&company| self.exchange_round(&state, Scope::Company(company)))
                .collect();
            let next = state.with_replacements(replacements);
            let after = next.company_costs(self.problem, self.fleet);

            for &company in &active {
                let pct = improvement_pct(before[company], after[company]);
                info!(
                    "Round {}: company {} cost {:.2} ({:+.2}%)",
                    rounds,
                    company + 1,
                    after[company],
                    pct
                );
                if round_to(pct, self.config.convergence_precision) <= 0.0 {
                    statuses[company] = CompanyStatus::Converged;
                    debug!("Company {} converged", company + 1);
                }
            }

            state = next;
            observer.observe(self.problem, &state);
        }

        NegotiationOutcome {
            state,
            rounds,
            statuses,
            hit_round_cap,
        }
    }

    /// Fleet-wide negotiation with cross-company actions.
    ///
    /// With individual rationality enabled no company's cost rises in any round.
    pub fn run_fleet<O: RoundObserver + ?Sized>(
        &self,
        state: AllocationState,
        observer: &mut O,
    ) -> NegotiationOutcome {
        let mut state = state;
        let mut rounds = 0;
        let mut converged = false;

        while rounds < self.config.max_negotiation_rounds {
            rounds += 1;

            let before = state.total_cost(self.problem);
            let next = state.with_replacements(self.exchange_round(&state, Scope::Fleet));
            let after = next.total_cost(self.problem);
            let pct = improvement_pct(before, after);

            info!("Fleet round {}: cost {:.2} ({:+.2}%)", rounds, after, pct);

            state = next;
            observer.observe(self.problem, &state);

            if round_to(pct, self.config.convergence_precision) <= 0.0 {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "Fleet negotiation stopped at the round cap of {}",
                self.config.max_negotiation_rounds
            );
        }

        let status = if converged {
            CompanyStatus::Converged
        } else {
            CompanyStatus::Active
        };

        NegotiationOutcome {
            state,
            rounds,
            statuses: vec![status; self.fleet.company_count()],
            hit_round_cap: !converged,
        }
    }
}
