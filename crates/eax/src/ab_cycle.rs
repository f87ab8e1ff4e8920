//! AB-cycle discovery.
//!
//! The union multigraph of two parent tours decomposes into elementary
//! cycles that alternate between parent-A and parent-B edges. The finder
//! grows two traces from a random live city, one consuming A-edges and one
//! consuming B-edges, always extending the shorter, and emits a cycle each
//! time the freshly extended trace revisits one of its own cities.
//!
//! A cycle is stored as an even-length city list `c[0..2k]` in which
//! `(c[2i], c[2i+1])` is a parent-A edge and `(c[2i+1], c[2i+2 mod 2k])` a
//! parent-B edge.

use rand::Rng;

use crate::individual::Tour;
use crate::pools::ObjectPools;
use crate::GaRng;

pub type AbCycle = Vec<usize>;

/// Marks a consumed adjacency slot.
const CONSUMED: usize = usize::MAX;

/// Decomposes the symmetric difference of `parent_a` and `parent_b` into
/// AB-cycles, stopping early once `max_cycles` have been emitted.
///
/// Cities stay in the live set while they have unconsumed parent-A
/// adjacencies; the starting city of each trace pair is drawn uniformly
/// from the live set, and each step draws the adjacency slot to follow.
/// Cycles of two edges (edges shared by both parents) are discarded.
pub fn find_ab_cycles(
    max_cycles: usize,
    parent_a: &Tour,
    parent_b: &Tour,
    rng: &mut GaRng,
    pools: &ObjectPools,
) -> Vec<AbCycle> {
    let n = parent_a.len();
    debug_assert_eq!(n, parent_b.len());

    let mut cycles = Vec::new();
    if max_cycles == 0 {
        return cycles;
    }

    let mut adj_a = pools.adjacency_copies.acquire();
    let mut adj_b = pools.adjacency_copies.acquire();
    for v in 0..n {
        adj_a[v] = parent_a.neighbors(v);
        adj_b[v] = parent_b.neighbors(v);
    }

    let mut live = pools.live_sets.acquire();
    live.fill_universal(n);

    let mut trace_a = pools.scratch_vecs.acquire();
    let mut trace_b = pools.scratch_vecs.acquire();

    let mut remaining_a_edges = n;

    while remaining_a_edges > 0 {
        let start = live.get(rng.gen_range(0..live.len()));
        trace_a.clear();
        trace_b.clear();
        trace_b.push(start);
        let mut current = start;

        loop {
            if trace_a.len() < trace_b.len() {
                // consume a parent-A edge out of `current`
                let mut slot = rng.gen_range(0..2usize);
                if adj_a[current][slot] == CONSUMED {
                    slot = 1 - slot;
                }
                let prev = current;
                current = adj_a[prev][slot];
                trace_a.push(current);
                adj_a[prev][slot] = CONSUMED;
                remove_reverse_link(&mut adj_a, current, prev);
                remaining_a_edges -= 1;

                if adj_a[current][0] == CONSUMED && adj_a[current][1] == CONSUMED {
                    live.remove(current);
                }
                if adj_a[prev][0] == CONSUMED && adj_a[prev][1] == CONSUMED {
                    live.remove(prev);
                }

                if let Some(found) = first_occurrence(&trace_a, current) {
                    // the sub-path from `found` closes an alternating cycle
                    let last = trace_a.len() - 1;
                    let mut cycle = Vec::with_capacity((last - found) * 2);
                    for i in found + 1..=last {
                        cycle.push(trace_b[i]);
                        cycle.push(trace_a[i]);
                    }
                    trace_a.truncate(found + 1);
                    trace_b.truncate(found + 1);
                    if cycle.len() >= 4 {
                        cycles.push(cycle);
                        if cycles.len() == max_cycles {
                            return cycles;
                        }
                    }
                }
            } else {
                // consume a parent-B edge out of `current`
                let mut slot = rng.gen_range(0..2usize);
                if adj_b[current][slot] == CONSUMED {
                    slot = 1 - slot;
                }
                let prev = current;
                current = adj_b[prev][slot];
                trace_b.push(current);
                adj_b[prev][slot] = CONSUMED;
                remove_reverse_link(&mut adj_b, current, prev);

                if let Some(found) = first_occurrence(&trace_b, current) {
                    let last = trace_b.len() - 1;
                    let mut cycle = Vec::with_capacity((last - found) * 2);
                    for i in found..last {
                        cycle.push(trace_b[i]);
                        cycle.push(trace_a[i]);
                    }
                    trace_a.truncate(found);
                    trace_b.truncate(found + 1);
                    if cycle.len() >= 4 {
                        cycles.push(cycle);
                        if cycles.len() == max_cycles {
                            return cycles;
                        }
                    }
                }
            }

            if trace_a.is_empty() {
                break;
            }
        }
    }

    cycles
}

fn remove_reverse_link(adj: &mut [[usize; 2]], city: usize, prev: usize) {
    if adj[city][0] == prev {
        adj[city][0] = CONSUMED;
    } else {
        adj[city][1] = CONSUMED;
    }
}

/// Index of `city` among all but the last element of `trace`.
fn first_occurrence(trace: &[usize], city: usize) -> Option<usize> {
    trace[..trace.len() - 1].iter().position(|&c| c == city)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use tsp_instance::{DistanceType, Tsp};

    fn square() -> Tsp {
        let coords = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)];
        Tsp::from_coords("square", DistanceType::Euc2d, &coords)
    }

    fn rng(seed: u64) -> GaRng {
        GaRng::seed_from_u64(seed)
    }

    /// Checks the alternation contract of one cycle against its parents.
    fn assert_alternating(cycle: &AbCycle, a: &Tour, b: &Tour) {
        assert!(cycle.len() >= 4 && cycle.len() % 2 == 0);
        let k = cycle.len();
        for i in (0..k).step_by(2) {
            assert!(a.has_edge(cycle[i], cycle[i + 1]), "expected A-edge");
            assert!(b.has_edge(cycle[i + 1], cycle[(i + 2) % k]), "expected B-edge");
        }
    }

    #[test]
    fn identical_parents_yield_no_cycles() {
        let tsp = square();
        let a = Tour::new(&[0, 1, 2, 3], &tsp);
        let b = Tour::new(&[0, 1, 2, 3], &tsp);
        let pools = ObjectPools::new(4);

        let cycles = find_ab_cycles(usize::MAX, &a, &b, &mut rng(1), &pools);
        assert!(cycles.is_empty());
    }

    #[test]
    fn two_city_instance_yields_no_cycles() {
        let tsp = Tsp::from_matrix("pair", 2, vec![0, 1, 1, 0]);
        let a = Tour::new(&[0, 1], &tsp);
        let b = Tour::new(&[1, 0], &tsp);
        let pools = ObjectPools::new(2);

        let cycles = find_ab_cycles(usize::MAX, &a, &b, &mut rng(3), &pools);
        assert!(cycles.is_empty());
    }

    #[test]
    fn square_parents_yield_one_cycle_of_length_four() {
        let tsp = square();
        let a = Tour::new(&[0, 1, 2, 3], &tsp);
        let b = Tour::new(&[0, 2, 1, 3], &tsp);
        let pools = ObjectPools::new(4);

        for seed in 0..20 {
            let cycles = find_ab_cycles(usize::MAX, &a, &b, &mut rng(seed), &pools);
            assert_eq!(cycles.len(), 1, "seed {seed}");
            assert_eq!(cycles[0].len(), 4);
            assert_alternating(&cycles[0], &a, &b);
        }
    }

    #[test]
    fn cycles_cover_the_symmetric_difference() {
        // 8 cities on a circle; two tours differing in several edges.
        let coords: Vec<(f64, f64)> = (0..8)
            .map(|i| {
                let t = i as f64 / 8.0 * std::f64::consts::TAU;
                (100.0 * t.cos(), 100.0 * t.sin())
            })
            .collect();
        let tsp = Tsp::from_coords("circle8", DistanceType::Euc2d, &coords);
        let a = Tour::new(&[0, 1, 2, 3, 4, 5, 6, 7], &tsp);
        let b = Tour::new(&[0, 2, 1, 3, 4, 6, 5, 7], &tsp);
        let pools = ObjectPools::new(8);

        for seed in 0..20 {
            let cycles = find_ab_cycles(usize::MAX, &a, &b, &mut rng(seed), &pools);
            assert!(!cycles.is_empty());
            let mut a_edges = 0;
            for cycle in &cycles {
                assert_alternating(cycle, &a, &b);
                a_edges += cycle.len() / 2;
            }
            // A-edges of emitted cycles never exceed the A-side of the
            // symmetric difference, and each edge appears at most once
            assert!(a_edges <= 8);
        }
    }

    #[test]
    fn max_cycles_stops_early() {
        let coords: Vec<(f64, f64)> = (0..12)
            .map(|i| {
                let t = i as f64 / 12.0 * std::f64::consts::TAU;
                (100.0 * t.cos(), 100.0 * t.sin())
            })
            .collect();
        let tsp = Tsp::from_coords("circle12", DistanceType::Euc2d, &coords);
        let a = Tour::new(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11], &tsp);
        let b = Tour::new(&[0, 2, 1, 3, 5, 4, 6, 8, 7, 9, 11, 10], &tsp);
        let pools = ObjectPools::new(12);

        for seed in 0..10 {
            let capped = find_ab_cycles(1, &a, &b, &mut rng(seed), &pools);
            assert!(capped.len() <= 1);
        }
    }
}
