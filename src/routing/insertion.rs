//! Route construction by regret insertion of pickup-delivery pairs.

use crate::problem::PickupDelivery;
use log::debug;
use std::collections::HashSet;

use super::utils::{calculate_insertion_cost, insert_pair, Insertion};
use super::SearchContext;

impl<'a> SearchContext<'a> {
    /// Cheapest feasible insertion of a pair into one vehicle's route.
    pub fn best_insertion(
        &self,
        vehicle: usize,
        route: &[usize],
        pair: &PickupDelivery,
    ) -> Option<Insertion> {
        let mut best: Option<Insertion> = None;

        for pickup_pos in 1..route.len() {
            for delivery_pos in pickup_pos..route.len() {
                let delta =
                    calculate_insertion_cost(route, pair, pickup_pos, delivery_pos, self.problem);

                if best.map_or(false, |b| delta >= b.delta) {
                    continue;
                }

                let candidate = insert_pair(route, pair, pickup_pos, delivery_pos);
                if self.is_feasible(vehicle, &candidate) {
                    best = Some(Insertion {
                        vehicle,
                        pickup_pos,
                        delivery_pos,
                        delta,
                    });
                }
            }
        }

        best
    }

    /// Build a complete plan, or `None` if some pair fits nowhere.
    pub fn construct(&self) -> Option<Vec<Vec<usize>>> {
        let (mut routes, mut unassigned) = self.seed_routes();

        while !unassigned.is_empty() {
            // Regret-2: insert first the pair that loses most if its best vehicle is taken
            let mut chosen: Option<(usize, Insertion, f64)> = None;

            for (slot, &pair_index) in unassigned.iter().enumerate() {
                let pair = &self.pairs[pair_index];
                let mut options: Vec<Insertion> = routes
                    .iter()
                    .enumerate()
                    .filter_map(|(v, r)| self.best_insertion(v, r, pair))
                    .collect();

                if options.is_empty() {
                    debug!(
                        "No feasible insertion for pair ({}, {})",
                        pair.pickup, pair.delivery
                    );
                    return None;
                }

                options.sort_by(|a, b| a.delta.total_cmp(&b.delta));
                let regret = options.get(1).map_or(f64::INFINITY, |o| o.delta - options[0].delta);

                let better = match &chosen {
                    None => true,
                    Some((_, best, best_regret)) => {
                        regret > *best_regret
                            || (regret == *best_regret && options[0].delta < best.delta)
                    }
                };

                if better {
                    chosen = Some((slot, options[0], regret));
                }
            }

            let (slot, insertion, _) = chosen?;
            let pair = self.pairs[unassigned.swap_remove(slot)];
            let updated = insert_pair(
                &routes[insertion.vehicle],
                &pair,
                insertion.pickup_pos,
                insertion.delivery_pos,
            );
            routes[insertion.vehicle] = updated;
        }

        Some(routes)
    }

    /// Empty routes, or the warm-start hint for every vehicle whose hint is usable.
    ///
    /// A hint route is kept only if it is feasible on its own and holds complete
    /// pairs that no earlier hint route already claimed. Returns the routes and the
    /// indices of the pairs still to insert.
    fn seed_routes(&self) -> (Vec<Vec<usize>>, Vec<usize>) {
        let request = self.request;
        let mut routes: Vec<Vec<usize>> = (0..request.vehicle_count)
            .map(|v| vec![request.start_depots[v], request.end_depots[v]])
            .collect();
        let mut claimed: HashSet<usize> = HashSet::new();

        if let Some(hints) = &request.warm_start {
            for (vehicle, hint) in hints.iter().enumerate().take(request.vehicle_count) {
                let customers: Vec<usize> = hint
                    .iter()
                    .copied()
                    .filter(|n| self.pair_of.contains_key(n))
                    .collect();

                let pair_indices: HashSet<usize> =
                    customers.iter().map(|n| self.pair_of[n]).collect();
                let complete = pair_indices.iter().all(|&i| {
                    let pair = &self.pairs[i];
                    customers.contains(&pair.pickup) && customers.contains(&pair.delivery)
                });
                let disjoint = pair_indices.iter().all(|i| !claimed.contains(i));
                let unique = customers.len() == 2 * pair_indices.len();

                let mut route = Vec::with_capacity(customers.len() + 2);
                route.push(request.start_depots[vehicle]);
                route.extend_from_slice(&customers);
                route.push(request.end_depots[vehicle]);

                if complete && disjoint && unique && self.is_feasible(vehicle, &route) {
                    claimed.extend(pair_indices);
                    routes[vehicle] = route;
                } else {
                    debug!("Warm start of vehicle {} rejected", vehicle);
                }
            }
        }

        let unassigned = (0..self.pairs.len())
            .filter(|i| !claimed.contains(i))
            .collect();

        (routes, unassigned)
    }
}
