//! Utility functions for pair insertion and removal.

use crate::problem::{PickupDelivery, Problem};

/// Best position to insert a pair into a route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Insertion {
    pub vehicle: usize,
    /// The pickup is inserted before `route[pickup_pos]`
    pub pickup_pos: usize,
    /// The delivery is inserted before `route[delivery_pos]` of the original route
    pub delivery_pos: usize,
    /// Cost increase of the route
    pub delta: f64,
}

/// Calculate the cost increase of inserting a pair at the given positions.
///
/// Positions refer to the route before insertion and satisfy
/// `1 <= pickup_pos <= delivery_pos <= route.len() - 1`.
pub fn calculate_insertion_cost(
    route: &[usize],
    pair: &PickupDelivery,
    pickup_pos: usize,
    delivery_pos: usize,
    problem: &Problem,
) -> f64 {
    let d = |a: usize, b: usize| problem.distance(a, b);
    let before_pickup = route[pickup_pos - 1];
    let after_pickup = route[pickup_pos];

    if pickup_pos == delivery_pos {
        return d(before_pickup, pair.pickup) + d(pair.pickup, pair.delivery)
            + d(pair.delivery, after_pickup)
            - d(before_pickup, after_pickup);
    }

    let before_delivery = route[delivery_pos - 1];
    let after_delivery = route[delivery_pos];

    d(before_pickup, pair.pickup) + d(pair.pickup, after_pickup) - d(before_pickup, after_pickup)
        + d(before_delivery, pair.delivery)
        + d(pair.delivery, after_delivery)
        - d(before_delivery, after_delivery)
}

/// Build the route obtained by inserting a pair at the given positions.
pub fn insert_pair(
    route: &[usize],
    pair: &PickupDelivery,
    pickup_pos: usize,
    delivery_pos: usize,
) -> Vec<usize> {
    let mut result = Vec::with_capacity(route.len() + 2);
    result.extend_from_slice(&route[..pickup_pos]);
    result.push(pair.pickup);
    result.extend_from_slice(&route[pickup_pos..delivery_pos]);
    result.push(pair.delivery);
    result.extend_from_slice(&route[delivery_pos..]);
    result
}

/// Build the route without the two nodes of a pair.
pub fn remove_pair(route: &[usize], pair: &PickupDelivery) -> Vec<usize> {
    route
        .iter()
        .copied()
        .filter(|&n| n != pair.pickup && n != pair.delivery)
        .collect()
}

/// Cumulative distance of a node sequence.
pub fn sequence_cost(route: &[usize], problem: &Problem) -> f64 {
    route
        .windows(2)
        .map(|w| problem.distance(w[0], w[1]))
        .sum()
}

/// Find which route contains a specific node.
pub fn find_route_for_node(routes: &[Vec<usize>], node: usize) -> Option<usize> {
    routes.iter().position(|r| {
        r.len() > 2 && r[1..r.len() - 1].contains(&node)
    })
}
