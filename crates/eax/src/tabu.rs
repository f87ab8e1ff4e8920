//! Tabu-edge bookkeeping per individual.
//!
//! A tabu individual remembers, over a sliding window of `tabu_range`
//! generations, edges its recent replacements touched. The tabu-aware
//! crossover refuses AB-cycles that would reinstate one of those edges,
//! keeping the search from oscillating around the same substructures.

use crate::delta::CrossoverDelta;
use crate::individual::Tour;
use crate::{Error, GaRng};
use rand::Rng;

/// Each modification names an undirected edge twice (once per endpoint),
/// so sampling either mention with `1 − √½` keeps the per-edge inclusion
/// probability at exactly ½.
fn tabu_sample_probability() -> f64 {
    1.0 - 0.5f64.sqrt()
}

pub struct TabuIndividual {
    tour: Tour,
    pending: Option<CrossoverDelta>,
    tabu_range: usize,
    tabu_edges: Vec<Vec<(usize, usize)>>,
    current: usize,
}

impl TabuIndividual {
    pub const DEFAULT_TABU_RANGE: usize = 5;

    pub fn new(tour: Tour, tabu_range: usize) -> Self {
        TabuIndividual {
            tour,
            pending: None,
            tabu_range,
            tabu_edges: vec![Vec::new(); tabu_range],
            current: 0,
        }
    }

    pub fn tour(&self) -> &Tour {
        &self.tour
    }

    /// Edges the next crossover must not insert.
    pub fn current_tabu_edges(&self) -> &[(usize, usize)] {
        &self.tabu_edges[self.current]
    }

    pub fn set_pending(&mut self, delta: CrossoverDelta) {
        self.pending = Some(delta);
    }

    /// Applies the pending delta (if any), rotates the tabu window and
    /// samples the delta's edges into every live tabu list. Returns the
    /// applied delta for histogram updates.
    pub fn apply_pending(&mut self, rng: &mut GaRng) -> Result<Option<CrossoverDelta>, Error> {
        let delta = match self.pending.take() {
            Some(delta) => delta,
            None => return Ok(None),
        };
        delta.apply_to(&mut self.tour)?;

        self.tabu_edges[self.current].clear();
        self.current = (self.current + 1) % self.tabu_range;

        let probability = tabu_sample_probability();
        for list in &mut self.tabu_edges {
            for m in delta.modifications() {
                if rng.gen_bool(probability) {
                    list.push((m.vertex, m.old));
                }
                if rng.gen_bool(probability) {
                    list.push((m.vertex, m.new));
                }
            }
        }

        Ok(Some(delta))
    }
}
