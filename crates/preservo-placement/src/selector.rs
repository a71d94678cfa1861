//! Cheapest location subset selection
//!
//! Picks the subset of a tenant's storage locations with the lowest total
//! price whose total quality reaches a replication target. This is the
//! "minimum cost to reach at least a target weight" variant of 0/1 knapsack,
//! solved with a dynamic program over total quality.

use preservo_common::StorageLocation;
use serde::Serialize;

/// How a selection relates to its quality target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SelectionOutcome {
    /// The target was zero; no copies are required
    NotRequired,
    /// The chosen locations reach the target
    Satisfied {
        /// Total quality of the chosen locations
        quality: u64,
        /// Total price of the chosen locations
        price: u64,
    },
    /// No subset of the candidates reaches the target
    Unreachable {
        /// Requested minimum quality
        required: u32,
        /// Quality of all candidates combined
        available: u64,
    },
}

/// Result of a location selection
#[derive(Clone, Debug, Serialize)]
pub struct Selection {
    /// Chosen locations, in candidate order
    pub locations: Vec<StorageLocation>,
    /// Whether the target was met
    pub outcome: SelectionOutcome,
}

impl Selection {
    /// True unless the target was unreachable
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        !matches!(self.outcome, SelectionOutcome::Unreachable { .. })
    }

    fn empty(outcome: SelectionOutcome) -> Self {
        Self {
            locations: Vec::new(),
            outcome,
        }
    }
}

/// Select the cheapest subset of `candidates` whose quality sum is at least
/// `min_quality`.
///
/// Among subsets reaching the target, one with minimal total price is
/// returned. Quality beyond the target counts for nothing, so each
/// candidate's quality is capped at `min_quality` while searching; ties on
/// price go to the smallest capped quality sum, then to the traversal order
/// of the table. The returned locations keep their relative candidate order
/// and the outcome reports their real quality sum.
///
/// Runs in O(N·T) time and memory, where T is below twice the target.
#[must_use]
pub fn select_cheapest(candidates: &[StorageLocation], min_quality: u32) -> Selection {
    let available: u64 = candidates.iter().map(|c| u64::from(c.quality)).sum();

    if min_quality == 0 {
        return Selection::empty(SelectionOutcome::NotRequired);
    }
    if u64::from(min_quality) > available {
        return Selection::empty(SelectionOutcome::Unreachable {
            required: min_quality,
            available,
        });
    }

    let target = min_quality as usize;
    let weights: Vec<usize> = candidates
        .iter()
        .map(|c| c.quality.min(min_quality) as usize)
        .collect();

    // Some optimal subset loses the target when any member is dropped, so its
    // sum stays below target + heaviest weight.
    let heaviest = weights.iter().copied().max().unwrap_or(0);
    let limit = weights
        .iter()
        .sum::<usize>()
        .min((target + heaviest).saturating_sub(1));
    let table = CostTable::build(candidates, &weights, limit);

    let Some((best, price)) = table.cheapest_at_least(target) else {
        return Selection::empty(SelectionOutcome::Unreachable {
            required: min_quality,
            available,
        });
    };

    let locations: Vec<StorageLocation> = table
        .reconstruct(&weights, best)
        .into_iter()
        .map(|i| candidates[i].clone())
        .collect();
    let quality = locations.iter().map(|l| u64::from(l.quality)).sum();

    Selection {
        locations,
        outcome: SelectionOutcome::Satisfied { quality, price },
    }
}

/// Rolling minimum-cost table plus one decision bit per (candidate, level) cell
struct CostTable {
    cost: Vec<Option<u64>>,
    /// `taken[i][j]`: candidate `i` improved `cost[j]` during its pass
    taken: Vec<Vec<bool>>,
}

impl CostTable {
    fn build(candidates: &[StorageLocation], weights: &[usize], limit: usize) -> Self {
        let mut cost: Vec<Option<u64>> = vec![None; limit + 1];
        cost[0] = Some(0);
        let mut taken = Vec::with_capacity(candidates.len());

        for (candidate, &weight) in candidates.iter().zip(weights) {
            let mut row = vec![false; limit + 1];

            // Downward so each candidate is used at most once per pass.
            for j in (weight..=limit).rev() {
                let Some(base) = cost[j - weight] else {
                    continue;
                };
                let Some(with) = base.checked_add(candidate.price) else {
                    continue;
                };
                if cost[j].is_none_or(|current| with < current) {
                    cost[j] = Some(with);
                    row[j] = true;
                }
            }

            taken.push(row);
        }

        Self { cost, taken }
    }

    /// Cheapest reachable level at or above `min`; the lowest level wins ties.
    fn cheapest_at_least(&self, min: usize) -> Option<(usize, u64)> {
        let mut best: Option<(usize, u64)> = None;
        for (j, cost) in self.cost.iter().enumerate().skip(min) {
            if let Some(cost) = *cost {
                if best.is_none_or(|(_, seen)| cost < seen) {
                    best = Some((j, cost));
                }
            }
        }
        best
    }

    /// Walk the decision bits backwards from `level`, returning candidate
    /// indices in order.
    fn reconstruct(&self, weights: &[usize], mut level: usize) -> Vec<usize> {
        let mut chosen = Vec::new();
        for i in (0..weights.len()).rev() {
            if self.taken[i][level] {
                chosen.push(i);
                level -= weights[i];
            }
        }
        chosen.reverse();
        chosen
    }
}
