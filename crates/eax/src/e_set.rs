//! E-set assembly policies.
//!
//! An E-set is the subset of AB-cycles that gets symmetric-differenced into
//! parent A to form one child. Every policy yields E-sets one at a time
//! through the same surface: [`EsetAssembler::has_next`] /
//! [`EsetAssembler::next`].

use rand::seq::SliceRandom;
use rand::Rng;

use crate::ab_cycle::AbCycle;
use crate::individual::Tour;
use crate::GaRng;

pub trait EsetAssembler {
    fn has_next(&self) -> bool;

    /// Indices into the AB-cycle list forming the next E-set.
    fn next(&mut self, rng: &mut GaRng) -> Vec<usize>;
}

/// Every AB-cycle joins the E-set independently with probability ½.
pub struct RandAssembler {
    cycle_count: usize,
}

impl RandAssembler {
    pub fn new(cycle_count: usize) -> Self {
        RandAssembler { cycle_count }
    }
}

impl EsetAssembler for RandAssembler {
    fn has_next(&self) -> bool {
        self.cycle_count > 0
    }

    fn next(&mut self, rng: &mut GaRng) -> Vec<usize> {
        (0..self.cycle_count)
            .filter(|_| rng.gen_range(0..2) == 0)
            .collect()
    }
}

/// Shuffles the AB-cycle indices once and deals consecutive groups of `n`.
/// When the pool runs low and a different grouping is still possible, it is
/// reshuffled and dealing continues.
pub struct NAbAssembler {
    cycle_count: usize,
    n: usize,
    remaining: Vec<usize>,
}

impl NAbAssembler {
    pub fn new(cycle_count: usize, n: usize, rng: &mut GaRng) -> Self {
        let mut remaining: Vec<usize> = (0..cycle_count).collect();
        remaining.shuffle(rng);
        NAbAssembler {
            cycle_count,
            n,
            remaining,
        }
    }
}

impl EsetAssembler for NAbAssembler {
    fn has_next(&self) -> bool {
        if self.n == 1 || self.cycle_count <= self.n {
            // reshuffling could only reproduce the same groups
            !self.remaining.is_empty()
        } else {
            true
        }
    }

    fn next(&mut self, rng: &mut GaRng) -> Vec<usize> {
        if self.remaining.len() < self.n && self.cycle_count > self.n && self.n > 1 {
            self.remaining.clear();
            self.remaining.extend(0..self.cycle_count);
            self.remaining.shuffle(rng);
        }

        let take = self.n.min(self.remaining.len());
        let mut e_set = Vec::with_capacity(take);
        for _ in 0..take {
            match self.remaining.pop() {
                Some(index) => e_set.push(index),
                None => break,
            }
        }
        e_set
    }
}

/// Shuffles and takes a uniformly random prefix: `[1, |AB|]` cycles, or
/// `[1, ⌈|AB|/2⌉]` for the half-uniform flavour.
pub struct UniformAssembler {
    indices: Vec<usize>,
    max_take: usize,
}

impl UniformAssembler {
    pub fn new(cycle_count: usize, half: bool) -> Self {
        let max_take = if half {
            (cycle_count + 1) / 2
        } else {
            cycle_count
        };
        UniformAssembler {
            indices: (0..cycle_count).collect(),
            max_take,
        }
    }
}

impl EsetAssembler for UniformAssembler {
    fn has_next(&self) -> bool {
        !self.indices.is_empty()
    }

    fn next(&mut self, rng: &mut GaRng) -> Vec<usize> {
        self.indices.shuffle(rng);
        let take = rng.gen_range(1..=self.max_take);
        self.indices[..take].to_vec()
    }
}

const NULL_CYCLE: usize = usize::MAX;

/// Heuristic E-set construction centred on each AB-cycle in turn.
///
/// Preprocessing records, per vertex, the one or two AB-cycles traversing
/// it (invalid cycles, i.e. runs of edges shared by both parents, are joined
/// into the valid cycle they hang off). From that it derives each cycle's
/// C-vertex count (vertices whose two incident cycles differ) and the
/// pairwise shared-vertex counts. Each E-set is then refined by tabu local
/// search minimising the E-set's total C-vertex count.
pub struct Block2Assembler {
    cycle_count: usize,
    cycle_sizes: Vec<usize>,
    c_vertex_count: Vec<usize>,
    shared_vertex_count: Vec<Vec<usize>>,
    next_center: usize,
}

impl Block2Assembler {
    /// `cycles` must already be sorted by length, longest first.
    pub fn new(parent_a: &Tour, parent_b: &Tour, cycles: &[AbCycle]) -> Self {
        let n = parent_a.len();
        let cycle_count = cycles.len();

        let mut belongs1 = vec![NULL_CYCLE; n];
        let mut belongs2 = vec![NULL_CYCLE; n];
        for (index, cycle) in cycles.iter().enumerate() {
            for &city in cycle {
                if belongs1[city] == NULL_CYCLE {
                    belongs1[city] = index;
                } else {
                    debug_assert_eq!(belongs2[city], NULL_CYCLE);
                    belongs2[city] = index;
                }
            }
        }

        // A city recorded once sits on the boundary of an invalid cycle (a
        // run of edges the parents agree on). Walk that run along shared
        // edges and fold every city on it into the valid cycle.
        for city in 0..n {
            if belongs1[city] == NULL_CYCLE || belongs2[city] != NULL_CYCLE {
                continue;
            }
            let cycle_index = belongs1[city];
            let mut v1 = city;

            // the neighbour reached through a differing edge lies on the
            // valid cycle; the other neighbour starts the shared run
            let [n0, n1] = parent_a.neighbors(v1);
            let mut on_valid_cycle = if !parent_b.has_edge(v1, n0) {
                n0
            } else {
                debug_assert!(!parent_b.has_edge(v1, n1));
                n1
            };

            loop {
                belongs2[v1] = cycle_index;
                let [m0, m1] = parent_a.neighbors(v1);
                let next_v1 = if m0 == on_valid_cycle { m1 } else { m0 };

                if belongs1[next_v1] == NULL_CYCLE {
                    belongs1[next_v1] = cycle_index;
                } else {
                    debug_assert_eq!(belongs2[next_v1], NULL_CYCLE);
                    belongs2[next_v1] = cycle_index;
                    break; // reached the far end of the shared run
                }

                on_valid_cycle = v1;
                v1 = next_v1;
            }
        }

        let mut c_vertex_count = vec![0usize; cycle_count];
        let mut shared_vertex_count = vec![vec![0usize; cycle_count]; cycle_count];
        for city in 0..n {
            let (c1, c2) = (belongs1[city], belongs2[city]);
            if c1 == c2 {
                continue;
            }
            if c1 != NULL_CYCLE {
                c_vertex_count[c1] += 1;
            }
            if c2 != NULL_CYCLE {
                c_vertex_count[c2] += 1;
            }
            if c1 != NULL_CYCLE && c2 != NULL_CYCLE {
                shared_vertex_count[c1][c2] += 1;
                shared_vertex_count[c2][c1] += 1;
            }
        }

        Block2Assembler {
            cycle_count,
            cycle_sizes: cycles.iter().map(|c| c.len()).collect(),
            c_vertex_count,
            shared_vertex_count,
            next_center: 0,
        }
    }

    /// Center plus a coin-flip inclusion of every strictly smaller cycle
    /// sharing vertices with it.
    fn initial_e_set(&self, center: usize, rng: &mut GaRng) -> Vec<usize> {
        let mut e_set = Vec::with_capacity(self.cycle_count);
        e_set.push(center);
        for i in 0..self.cycle_count {
            if self.shared_vertex_count[center][i] > 0
                && self.cycle_sizes[i] < self.cycle_sizes[center]
                && rng.gen_range(0..2) == 0
            {
                e_set.push(i);
            }
        }
        e_set
    }

    /// Adds or removes one cycle, keeping the E-set's C-vertex total and
    /// the per-cycle shared counts in step. Sums stay in order so the
    /// unsigned arithmetic never dips below zero.
    fn apply_move(
        &self,
        index: usize,
        add: bool,
        shared_with_e_set: &mut [usize],
        included: &mut [bool],
        current_num_c: &mut usize,
    ) {
        if add {
            *current_num_c =
                *current_num_c + self.c_vertex_count[index] - 2 * shared_with_e_set[index];
            included[index] = true;
            for i in 0..self.cycle_count {
                shared_with_e_set[i] += self.shared_vertex_count[index][i];
            }
        } else {
            *current_num_c =
                *current_num_c + 2 * shared_with_e_set[index] - self.c_vertex_count[index];
            included[index] = false;
            for i in 0..self.cycle_count {
                shared_with_e_set[i] -= self.shared_vertex_count[index][i];
            }
        }
    }

    fn tabu_search(&self, center: usize, rng: &mut GaRng) -> Vec<usize> {
        let mut best_e_set = self.initial_e_set(center, rng);

        let mut shared_with_e_set = vec![0usize; self.cycle_count];
        let mut included = vec![false; self.cycle_count];
        let mut tabu_until = vec![0usize; self.cycle_count];
        let mut current_num_c = 0usize;

        for i in 0..best_e_set.len() {
            self.apply_move(
                best_e_set[i],
                true,
                &mut shared_with_e_set,
                &mut included,
                &mut current_num_c,
            );
        }
        let mut best_num_c = current_num_c;

        let mut iteration = 0usize;
        let mut last_improvement = 0usize;
        loop {
            iteration += 1;

            // best admissible move: add a cycle touching the E-set, or drop
            // a non-center member; tabu moves pass only on aspiration
            let mut min_num_c = usize::MAX;
            let mut selected = 0;
            let mut is_add = false;
            let mut found = false;
            for i in 0..self.cycle_count {
                let is_tabu = tabu_until[i] >= iteration;
                if !included[i] && shared_with_e_set[i] > 0 {
                    let num_c =
                        current_num_c + self.c_vertex_count[i] - 2 * shared_with_e_set[i];
                    if (num_c < best_num_c || !is_tabu) && num_c < min_num_c {
                        min_num_c = num_c;
                        selected = i;
                        is_add = true;
                        found = true;
                    }
                } else if included[i] && i != center {
                    let num_c =
                        current_num_c + 2 * shared_with_e_set[i] - self.c_vertex_count[i];
                    if (num_c < best_num_c || !is_tabu) && num_c < min_num_c {
                        min_num_c = num_c;
                        selected = i;
                        is_add = false;
                        found = true;
                    }
                }
            }

            if found {
                self.apply_move(
                    selected,
                    is_add,
                    &mut shared_with_e_set,
                    &mut included,
                    &mut current_num_c,
                );
                tabu_until[selected] = iteration + rng.gen_range(1..=10);

                if current_num_c < best_num_c {
                    best_num_c = current_num_c;
                    last_improvement = iteration;
                    best_e_set.clear();
                    best_e_set.extend((0..self.cycle_count).filter(|&i| included[i]));
                }
            }

            if iteration - last_improvement >= 20 {
                break;
            }
        }

        best_e_set
    }
}

impl EsetAssembler for Block2Assembler {
    fn has_next(&self) -> bool {
        self.next_center < self.cycle_count
    }

    fn next(&mut self, rng: &mut GaRng) -> Vec<usize> {
        let center = self.next_center;
        self.next_center += 1;
        self.tabu_search(center, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ab_cycle::find_ab_cycles;
    use crate::pools::ObjectPools;
    use rand::SeedableRng;
    use tsp_instance::{DistanceType, Tsp};

    fn rng(seed: u64) -> GaRng {
        GaRng::seed_from_u64(seed)
    }

    #[test]
    fn rand_assembler_selects_subsets() {
        let mut assembler = RandAssembler::new(8);
        assert!(assembler.has_next());
        let mut rng = rng(11);
        for _ in 0..10 {
            let e_set = assembler.next(&mut rng);
            assert!(e_set.len() <= 8);
            assert!(e_set.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn rand_assembler_with_no_cycles_is_exhausted() {
        let assembler = RandAssembler::new(0);
        assert!(!assembler.has_next());
    }

    #[test]
    fn n_ab_deals_disjoint_groups_until_exhausted() {
        let mut rng = rng(5);
        let mut assembler = NAbAssembler::new(6, 2, &mut rng);
        let mut seen = Vec::new();
        for _ in 0..3 {
            assert!(assembler.has_next());
            let group = assembler.next(&mut rng);
            assert_eq!(group.len(), 2);
            seen.extend(group);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        // more groupings exist, so dealing restarts from a fresh shuffle
        assert!(assembler.has_next());
        assert_eq!(assembler.next(&mut rng).len(), 2);
    }

    #[test]
    fn one_ab_runs_dry_after_each_cycle_once() {
        let mut rng = rng(6);
        let mut assembler = NAbAssembler::new(3, 1, &mut rng);
        let mut dealt = Vec::new();
        while assembler.has_next() {
            let group = assembler.next(&mut rng);
            assert_eq!(group.len(), 1);
            dealt.extend(group);
        }
        dealt.sort_unstable();
        assert_eq!(dealt, vec![0, 1, 2]);
    }

    #[test]
    fn uniform_assembler_respects_the_prefix_bounds() {
        let mut rng = rng(7);
        let mut full = UniformAssembler::new(9, false);
        let mut half = UniformAssembler::new(9, true);
        for _ in 0..20 {
            let take = full.next(&mut rng).len();
            assert!((1..=9).contains(&take));
            let take = half.next(&mut rng).len();
            assert!((1..=5).contains(&take));
        }
    }

    fn circle_parents() -> (Tsp, Tour, Tour) {
        let coords: Vec<(f64, f64)> = (0..12)
            .map(|i| {
                let t = i as f64 / 12.0 * std::f64::consts::TAU;
                (100.0 * t.cos(), 100.0 * t.sin())
            })
            .collect();
        let tsp = Tsp::from_coords("circle12", DistanceType::Euc2d, &coords);
        let a = Tour::new(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11], &tsp);
        let b = Tour::new(&[0, 2, 1, 3, 5, 4, 6, 8, 7, 9, 11, 10], &tsp);
        (tsp, a, b)
    }

    #[test]
    fn block2_always_contains_its_center() {
        let (_tsp, a, b) = circle_parents();
        let pools = ObjectPools::new(12);
        let mut r = rng(9);
        let mut cycles = find_ab_cycles(usize::MAX, &a, &b, &mut r, &pools);
        cycles.sort_by(|x, y| y.len().cmp(&x.len()));

        let mut assembler = Block2Assembler::new(&a, &b, &cycles);
        let mut center = 0;
        while assembler.has_next() {
            let e_set = assembler.next(&mut r);
            assert!(e_set.contains(&center), "center {center} missing");
            assert!(!e_set.is_empty());
            center += 1;
        }
        assert_eq!(center, cycles.len());
    }

    #[test]
    fn block2_search_terminates_from_a_full_e_set() {
        // the tabu search is bounded by 20 iterations past the last
        // improvement no matter where it starts
        let (_tsp, a, b) = circle_parents();
        let pools = ObjectPools::new(12);
        let mut r = rng(10);
        let mut cycles = find_ab_cycles(usize::MAX, &a, &b, &mut r, &pools);
        cycles.sort_by(|x, y| y.len().cmp(&x.len()));

        let assembler = Block2Assembler::new(&a, &b, &cycles);
        for center in 0..cycles.len() {
            let e_set = assembler.tabu_search(center, &mut r);
            assert!(e_set.iter().all(|&i| i < cycles.len()));
        }
    }
}
