//! Tests for contested-pair ranking and the reallocation loop.

use lsp_exchange::allocator::{solve_allocation, Allocation, VoronoiAllocator};
use lsp_exchange::config::Config;
use lsp_exchange::negotiation::Negotiation;
use lsp_exchange::problem::{Company, Node, PickupDelivery, Problem};
use lsp_exchange::program::MilpSelector;
use lsp_exchange::reallocation::{
    boundary_distance, check_termination, discount_unserved, improvement_percentages,
    rank_candidates, Reallocation, Termination,
};
use lsp_exchange::routing::{PairInsertionOracle, RoutingOracle, RoutingRequest};
use lsp_exchange::solution::Route;
use std::collections::HashSet;

/// Depots at (0,0) and (0,30): one pair on the bisector, one near each depot.
fn create_test_problem() -> Problem {
    let nodes = vec![
        Node::new(0, 0.0, 0.0, 0.0),
        Node::new(1, 0.0, 30.0, 0.0),
        Node::new(2, -5.0, 15.0, 2.0),
        Node::new(3, 5.0, 15.0, -2.0),
        Node::new(4, -2.0, 2.0, 2.0),
        Node::new(5, 2.0, 4.0, -2.0),
        Node::new(6, -2.0, 26.0, 2.0),
        Node::new(7, 2.0, 28.0, -2.0),
    ];
    let pairs = vec![
        PickupDelivery::new(2, 3, 0),
        PickupDelivery::new(4, 5, 0),
        PickupDelivery::new(6, 7, 1),
    ];
    let companies = vec![Company::new(0, 2, 10.0), Company::new(1, 2, 10.0)];

    Problem::new("ReallocationTest".to_string(), nodes, pairs, companies).unwrap()
}

/// Adds a third company far away from the first two, with its own pair.
fn create_three_company_problem() -> Problem {
    let nodes = vec![
        Node::new(0, 0.0, 0.0, 0.0),
        Node::new(1, 0.0, 30.0, 0.0),
        Node::new(2, 100.0, 100.0, 0.0),
        Node::new(3, -5.0, 15.0, 2.0),
        Node::new(4, 5.0, 15.0, -2.0),
        Node::new(5, -2.0, 2.0, 2.0),
        Node::new(6, 2.0, 4.0, -2.0),
        Node::new(7, -2.0, 26.0, 2.0),
        Node::new(8, 2.0, 28.0, -2.0),
        Node::new(9, 98.0, 98.0, 2.0),
        Node::new(10, 102.0, 96.0, -2.0),
    ];
    let pairs = vec![
        PickupDelivery::new(3, 4, 0),
        PickupDelivery::new(5, 6, 0),
        PickupDelivery::new(7, 8, 1),
        PickupDelivery::new(9, 10, 2),
    ];
    let companies = vec![
        Company::new(0, 2, 10.0),
        Company::new(1, 2, 10.0),
        Company::new(2, 2, 10.0),
    ];

    Problem::new("ThreeCompanies".to_string(), nodes, pairs, companies).unwrap()
}

/// Routes every company normally except the one based at depot 1, which never gets a plan.
struct FailsAtDepotOne(PairInsertionOracle);

impl RoutingOracle for FailsAtDepotOne {
    fn solve(&self, problem: &Problem, request: &RoutingRequest) -> Option<Vec<Route>> {
        if request.start_depots.contains(&1) {
            None
        } else {
            self.0.solve(problem, request)
        }
    }
}

#[test]
fn test_boundary_distance() {
    let a = (0.0, 0.0);
    let b = (0.0, 30.0);

    assert_eq!(boundary_distance((0.0, 15.0), a, b), 0.0);
    assert!((boundary_distance((0.0, 3.0), a, b) - 12.0).abs() < 1e-9);
    assert!((boundary_distance((7.0, 27.0), a, b) - 12.0).abs() < 1e-9);
    assert_eq!(boundary_distance((4.0, 4.0), a, a), 0.0);
}

#[test]
fn test_improvement_percentages() {
    let percentages = improvement_percentages(&[100.0, 0.0, 50.0], &[90.0, 5.0, 60.0]);

    assert!((percentages[0] - 10.0).abs() < 1e-9);
    assert_eq!(percentages[1], 0.0);
    assert!((percentages[2] + 20.0).abs() < 1e-9);
}

#[test]
fn test_unserved_owner_is_not_improving() {
    let problem = create_test_problem();
    let allocation = VoronoiAllocator::allocate(&problem).unwrap();
    let mut percentages = vec![40.0, 100.0];

    discount_unserved(&mut percentages, &allocation, &[2]);
    assert_eq!(percentages, vec![40.0, 0.0]);

    let mut percentages = vec![-5.0, 10.0];
    discount_unserved(&mut percentages, &Allocation { owners: vec![Some(0), None, None], skipped: vec![] }, &[0, 1]);
    assert_eq!(percentages, vec![-5.0, 10.0]);
}

#[test]
fn test_termination_conditions() {
    assert_eq!(check_termination(None, &[1.0, 2.0]), Some(Termination::AllImproved));
    assert_eq!(check_termination(None, &[-1.0, -2.0]), Some(Termination::AllWorsened));
    assert_eq!(check_termination(None, &[1.0, -2.0]), None);
    assert_eq!(check_termination(None, &[1.0, 0.0]), None);
    assert_eq!(check_termination(Some(&[0.0, 1.0][..]), &[1.0, 0.5]), Some(Termination::AllImproved));
}

#[test]
fn test_flip_takes_precedence() {
    // Company 0 was improving and now is not; all negative would also hold
    assert_eq!(
        check_termination(Some(&[1.0, -1.0][..]), &[-0.5, -2.0]),
        Some(Termination::Regressed { company: 0 })
    );
    // Company 1 was never positive, so its drop is not a flip
    assert_eq!(check_termination(Some(&[1.0, 0.0][..]), &[2.0, -1.0]), None);
}

#[test]
fn test_candidates_ranked_by_boundary_distance() {
    let problem = create_test_problem();
    let allocation = VoronoiAllocator::allocate(&problem).unwrap();

    let candidates = rank_candidates(&problem, &allocation, &[5.0, -1.0], &HashSet::new());

    let pairs: Vec<usize> = candidates.iter().map(|c| c.pair).collect();
    assert_eq!(pairs, vec![0, 1]);
    assert!(candidates.iter().all(|c| c.from == 0 && c.to == 1));
    assert_eq!(candidates[0].boundary_distance, 0.0);
    assert!((candidates[1].boundary_distance - 12.0).abs() < 1e-9);
}

#[test]
fn test_candidates_need_an_improving_owner() {
    let problem = create_test_problem();
    let allocation = VoronoiAllocator::allocate(&problem).unwrap();

    assert!(rank_candidates(&problem, &allocation, &[0.0, -1.0], &HashSet::new()).is_empty());

    let candidates = rank_candidates(&problem, &allocation, &[0.0, 5.0], &HashSet::new());
    assert_eq!(candidates.len(), 1);
    assert_eq!((candidates[0].pair, candidates[0].from, candidates[0].to), (2, 1, 0));
}

#[test]
fn test_migrated_pairs_are_not_candidates() {
    let problem = create_test_problem();
    let allocation = VoronoiAllocator::allocate(&problem).unwrap();
    let migrated: HashSet<usize> = [0].into_iter().collect();

    let candidates = rank_candidates(&problem, &allocation, &[5.0, -1.0], &migrated);

    assert_eq!(candidates.iter().map(|c| c.pair).collect::<Vec<_>>(), vec![1]);
}

#[test]
fn test_pair_already_at_second_nearest_is_skipped() {
    let problem = create_test_problem();
    let mut allocation = VoronoiAllocator::allocate(&problem).unwrap();
    // Pair 1 is nearest to company 0; owned by company 1 its target would be its owner
    allocation.transfer(1, 1);

    let candidates = rank_candidates(&problem, &allocation, &[-1.0, 5.0], &HashSet::new());

    assert_eq!(candidates.iter().map(|c| c.pair).collect::<Vec<_>>(), vec![2]);
}

#[test]
fn test_all_improved_stops_immediately() {
    let problem = create_test_problem();
    let fleet = problem.fleet();
    let routing = PairInsertionOracle::default();
    let selection = MilpSelector::new();
    let config = Config::new().with_reallocation(true);
    let negotiation = Negotiation::new(&problem, &fleet, &routing, &selection, &config);
    let allocation = VoronoiAllocator::allocate(&problem).unwrap();
    let solved = solve_allocation(&problem, &fleet, &allocation, &routing);
    let baseline: Vec<f64> = solved
        .state
        .company_costs(&problem, &fleet)
        .iter()
        .map(|c| c + 10.0)
        .collect();

    let outcome = Reallocation::new(&negotiation).run(solved.state.clone(), &allocation, &baseline, &mut ());

    assert_eq!(outcome.termination, Termination::AllImproved);
    assert_eq!(outcome.rounds, 0);
    assert!(outcome.migrations.is_empty());
    assert_eq!(outcome.state, solved.state);
}

#[test]
fn test_round_cap_stops_reallocation() {
    let problem = create_test_problem();
    let fleet = problem.fleet();
    let routing = PairInsertionOracle::default();
    let selection = MilpSelector::new();
    let config = Config::new().with_max_reallocation_rounds(0);
    let negotiation = Negotiation::new(&problem, &fleet, &routing, &selection, &config);
    let allocation = VoronoiAllocator::allocate(&problem).unwrap();
    let solved = solve_allocation(&problem, &fleet, &allocation, &routing);
    let costs = solved.state.company_costs(&problem, &fleet);
    let baseline = vec![costs[0] + 10.0, costs[1]];

    let outcome = Reallocation::new(&negotiation).run(solved.state, &allocation, &baseline, &mut ());

    assert_eq!(outcome.termination, Termination::RoundCap);
    assert!(outcome.migrations.is_empty());
}

#[test]
fn test_single_company_has_no_candidate() {
    let nodes = vec![
        Node::new(0, 0.0, 0.0, 0.0),
        Node::new(1, 1.0, 0.0, 1.0),
        Node::new(2, 2.0, 0.0, -1.0),
    ];
    let pairs = vec![PickupDelivery::new(1, 2, 0)];
    let problem = Problem::new("Single".to_string(), nodes, pairs, vec![Company::new(0, 1, 10.0)]).unwrap();
    let fleet = problem.fleet();
    let routing = PairInsertionOracle::default();
    let selection = MilpSelector::new();
    let config = Config::new();
    let negotiation = Negotiation::new(&problem, &fleet, &routing, &selection, &config);
    let allocation = VoronoiAllocator::allocate(&problem).unwrap();
    let solved = solve_allocation(&problem, &fleet, &allocation, &routing);
    let baseline = solved.state.company_costs(&problem, &fleet);

    let outcome = Reallocation::new(&negotiation).run(solved.state, &allocation, &baseline, &mut ());

    assert_eq!(outcome.termination, Termination::NoCandidate);
}

#[test]
fn test_contested_pairs_migrate_first() {
    let problem = create_test_problem();
    let fleet = problem.fleet();
    let routing = PairInsertionOracle::default();
    let selection = MilpSelector::new();
    let config = Config::new().with_reallocation(true);
    let negotiation = Negotiation::new(&problem, &fleet, &routing, &selection, &config);
    let allocation = VoronoiAllocator::allocate(&problem).unwrap();
    let solved = solve_allocation(&problem, &fleet, &allocation, &routing);
    let costs = solved.state.company_costs(&problem, &fleet);
    // Company 0 is ahead of its baseline, company 1 exactly on it
    let baseline = vec![costs[0] + 10.0, costs[1]];

    let outcome = Reallocation::new(&negotiation).run(solved.state, &allocation, &baseline, &mut ());

    assert!(!outcome.migrations.is_empty());
    let first = outcome.migrations[0];
    assert_eq!((first.pair, first.from, first.to), (0, 0, 1));

    // No pair moves twice and every move leaves its owner
    let moved: HashSet<usize> = outcome.migrations.iter().map(|m| m.pair).collect();
    assert_eq!(moved.len(), outcome.migrations.len());
    assert!(outcome.migrations.iter().all(|m| m.from != m.to));

    for migration in &outcome.migrations {
        assert_eq!(outcome.allocation.owner(migration.pair), Some(migration.to));
    }
    assert!(outcome.unserved.is_empty());
    outcome.state.verify(&problem, &fleet, &[]).unwrap();
}

#[test]
fn test_regression_restores_previous_round() {
    let problem = create_three_company_problem();
    let fleet = problem.fleet();
    let routing = PairInsertionOracle::default();
    let selection = MilpSelector::new();
    let config = Config::new().with_reallocation(true);
    let negotiation = Negotiation::new(&problem, &fleet, &routing, &selection, &config);
    let allocation = VoronoiAllocator::allocate(&problem).unwrap();
    let solved = solve_allocation(&problem, &fleet, &allocation, &routing);
    let costs = solved.state.company_costs(&problem, &fleet);
    // Companies 0 and 1 start ahead, company 2 behind; company 1 has almost no slack
    let baseline = vec![costs[0] + 10.0, costs[1] + 1.0, costs[2] - 10.0];

    let outcome = Reallocation::new(&negotiation).run(solved.state.clone(), &allocation, &baseline, &mut ());

    // Taking over the bisector pair pushes company 1 past its baseline
    assert_eq!(outcome.termination, Termination::Regressed { company: 1 });
    assert_eq!(outcome.rounds, 1);
    assert!(outcome.migrations.is_empty());
    assert_eq!(outcome.state, solved.state);
    assert_eq!(outcome.allocation, allocation);
    assert!(outcome.unserved.is_empty());
    assert!(outcome.percentages[1] > 0.0);
}

#[test]
fn test_failed_company_never_counts_as_improved() {
    let problem = create_test_problem();
    let fleet = problem.fleet();
    let routing = FailsAtDepotOne(PairInsertionOracle::default());
    let selection = MilpSelector::new();
    let config = Config::new().with_reallocation(true);
    let negotiation = Negotiation::new(&problem, &fleet, &routing, &selection, &config);
    let allocation = VoronoiAllocator::allocate(&problem).unwrap();
    let served = solve_allocation(&problem, &fleet, &allocation, &PairInsertionOracle::default());
    let costs = served.state.company_costs(&problem, &fleet);
    let baseline = vec![costs[0] + 10.0, costs[1]];
    let solved = solve_allocation(&problem, &fleet, &allocation, &routing);
    assert_eq!(solved.unserved, vec![2]);

    let outcome = Reallocation::new(&negotiation).run(solved.state, &allocation, &baseline, &mut ());

    // Company 1 routes nothing at zero cost, which must not end the loop as a win
    assert_eq!(outcome.termination, Termination::NoCandidate);
    let moved: Vec<(usize, usize, usize)> = outcome.migrations.iter().map(|m| (m.pair, m.from, m.to)).collect();
    assert_eq!(moved, vec![(0, 0, 1), (1, 0, 1)]);
    assert_eq!(outcome.percentages[1], 0.0);

    let mut unserved = outcome.unserved.clone();
    unserved.sort_unstable();
    assert_eq!(unserved, vec![0, 1, 2]);
}
