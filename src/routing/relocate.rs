//! Pair relocation neighbourhood.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use super::utils::{find_route_for_node, insert_pair, remove_pair, sequence_cost};
use super::SearchContext;

impl<'a> SearchContext<'a> {
    /// Move one pickup-delivery pair to its best position in any route.
    ///
    /// Applies the first improving relocation found and reports whether one was made.
    pub fn relocate_neighborhood(&self, routes: &mut [Vec<usize>], rng: &mut ChaCha8Rng) -> bool {
        let mut pair_indices: Vec<usize> = (0..self.pairs.len()).collect();
        pair_indices.shuffle(rng);

        for &pair_index in &pair_indices {
            let pair = self.pairs[pair_index];

            let Some(r1_idx) = find_route_for_node(routes, pair.pickup) else {
                continue;
            };

            let reduced = remove_pair(&routes[r1_idx], &pair);
            if !self.is_feasible(r1_idx, &reduced) {
                continue;
            }
            let removal_gain =
                sequence_cost(&routes[r1_idx], self.problem) - sequence_cost(&reduced, self.problem);

            let mut best: Option<(usize, Vec<usize>, f64)> = None;

            for r2_idx in 0..routes.len() {
                let target = if r2_idx == r1_idx {
                    &reduced
                } else {
                    &routes[r2_idx]
                };

                if let Some(insertion) = self.best_insertion(r2_idx, target, &pair) {
                    if best.as_ref().map_or(true, |b| insertion.delta < b.2) {
                        let updated = insert_pair(
                            target,
                            &pair,
                            insertion.pickup_pos,
                            insertion.delivery_pos,
                        );
                        best = Some((r2_idx, updated, insertion.delta));
                    }
                }
            }

            if let Some((r2_idx, updated, delta)) = best {
                if delta < removal_gain - 1e-6 {
                    if r2_idx != r1_idx {
                        routes[r1_idx] = reduced;
                    }
                    routes[r2_idx] = updated;
                    return true;
                }
            }
        }

        false
    }
}
