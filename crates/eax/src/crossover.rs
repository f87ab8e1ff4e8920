//! The crossover driver: AB-cycles → E-sets → intermediate → repair.

use std::fmt;
use std::str::FromStr;

use tsp_instance::Tsp;

use crate::ab_cycle::{find_ab_cycles, AbCycle};
use crate::delta::CrossoverDelta;
use crate::e_set::{Block2Assembler, EsetAssembler, NAbAssembler, RandAssembler, UniformAssembler};
use crate::individual::Tour;
use crate::merger::SubtourMerger;
use crate::pools::ObjectPools;
use crate::GaRng;

/// EAX flavour: how E-sets are assembled from the AB-cycle list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EaxVariant {
    Rand,
    NAb(usize),
    Uniform,
    HalfUniform,
    Block2,
}

impl fmt::Display for EaxVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EaxVariant::Rand => write!(f, "EAX_Rand"),
            EaxVariant::NAb(n) => write!(f, "EAX_{n}_AB"),
            EaxVariant::Uniform => write!(f, "EAX_Uniform"),
            EaxVariant::HalfUniform => write!(f, "EAX_HalfUniform"),
            EaxVariant::Block2 => write!(f, "Block2"),
        }
    }
}

impl FromStr for EaxVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "EAX_Rand" => return Ok(EaxVariant::Rand),
            "Block2" => return Ok(EaxVariant::Block2),
            "EAX_Uniform" => return Ok(EaxVariant::Uniform),
            "EAX_HalfUniform" => return Ok(EaxVariant::HalfUniform),
            _ => {}
        }
        if let Some(n) = s
            .strip_prefix("EAX_")
            .and_then(|rest| rest.strip_suffix("_AB"))
            .and_then(|n| n.parse::<usize>().ok())
        {
            if n > 0 {
                return Ok(EaxVariant::NAb(n));
            }
        }
        Err(format!(
            "unknown EAX type '{s}'; expected EAX_Rand, Block2 or EAX_<N>_AB"
        ))
    }
}

/// Owns the scratch pools and runs one crossover at a time.
pub struct CrossoverDriver {
    pools: ObjectPools,
}

impl CrossoverDriver {
    pub fn new(city_count: usize) -> Self {
        CrossoverDriver {
            pools: ObjectPools::new(city_count),
        }
    }

    pub fn pools(&self) -> &ObjectPools {
        &self.pools
    }

    /// Produces up to `n_children` child deltas of `parent_a` × `parent_b`.
    /// An empty vector means the pair produced nothing (identical parents,
    /// or every E-set was filtered).
    pub fn cross(
        &self,
        parent_a: &Tour,
        parent_b: &Tour,
        n_children: usize,
        variant: EaxVariant,
        tsp: &Tsp,
        rng: &mut GaRng,
    ) -> Vec<CrossoverDelta> {
        let cap = match variant {
            EaxVariant::NAb(n) => n * n_children,
            _ => usize::MAX,
        };
        let cycles = find_ab_cycles(cap, parent_a, parent_b, rng, &self.pools);
        self.assemble_children(parent_a, parent_b, cycles, n_children, variant, tsp, rng)
    }

    /// Tabu-aware crossover: AB-cycles traversing a tabu edge of
    /// `parent_a` are dropped before any E-set is assembled.
    pub fn cross_tabu(
        &self,
        parent_a: &Tour,
        parent_b: &Tour,
        n_children: usize,
        variant: EaxVariant,
        tabu_edges: &[(usize, usize)],
        tsp: &Tsp,
        rng: &mut GaRng,
    ) -> Vec<CrossoverDelta> {
        let mut cycles = find_ab_cycles(usize::MAX, parent_a, parent_b, rng, &self.pools);
        self.remove_tabu_cycles(&mut cycles, tabu_edges);
        self.assemble_children(parent_a, parent_b, cycles, n_children, variant, tsp, rng)
    }

    fn assemble_children(
        &self,
        parent_a: &Tour,
        parent_b: &Tour,
        mut cycles: Vec<AbCycle>,
        n_children: usize,
        variant: EaxVariant,
        tsp: &Tsp,
        rng: &mut GaRng,
    ) -> Vec<CrossoverDelta> {
        if cycles.is_empty() {
            return Vec::new();
        }

        if variant == EaxVariant::Block2 {
            cycles.sort_by(|a, b| b.len().cmp(&a.len()));
        }

        let mut assembler: Box<dyn EsetAssembler> = match variant {
            EaxVariant::Rand => Box::new(RandAssembler::new(cycles.len())),
            EaxVariant::NAb(n) => Box::new(NAbAssembler::new(cycles.len(), n, rng)),
            EaxVariant::Uniform => Box::new(UniformAssembler::new(cycles.len(), false)),
            EaxVariant::HalfUniform => Box::new(UniformAssembler::new(cycles.len(), true)),
            EaxVariant::Block2 => Box::new(Block2Assembler::new(parent_a, parent_b, &cycles)),
        };

        // Block2 filters children that merely reproduce parent B; that
        // test needs the number of edges the parents disagree on.
        let different_edges = if variant == EaxVariant::Block2 {
            count_different_edges(parent_a, parent_b)
        } else {
            0
        };

        let mut children = Vec::new();
        let mut working = self.pools.intermediates.acquire();
        working.assign(parent_a);

        for _ in 0..n_children {
            if !assembler.has_next() {
                break;
            }
            let e_set = assembler.next(rng);
            if variant == EaxVariant::Block2 && e_set.len() == cycles.len() {
                continue;
            }

            working.apply_ab_cycles(&cycles, &e_set, &self.pools);
            SubtourMerger::merge(&mut working, tsp, &self.pools);

            if variant == EaxVariant::Block2 {
                let swapped_edges: usize =
                    e_set.iter().map(|&i| cycles[i].len() / 2).sum();
                let child_distance =
                    parent_a.distance() + working.pending_delta_distance(tsp);
                if swapped_edges * 2 >= different_edges && child_distance == parent_b.distance()
                {
                    working.discard();
                    continue;
                }
            }

            children.push(working.take_delta_and_revert(tsp, parent_a));
        }

        children
    }

    /// Drops every AB-cycle that traverses one of `tabu_edges`. A city sits
    /// on at most two cycles, so per-city membership plus the in-cycle
    /// neighbour is enough to test edge containment.
    fn remove_tabu_cycles(&self, cycles: &mut Vec<AbCycle>, tabu_edges: &[(usize, usize)]) {
        if cycles.is_empty() || tabu_edges.is_empty() {
            return;
        }
        let null_cycle = cycles.len();

        let mut in_cycle1 = self.pools.city_vecs.acquire();
        let mut connected1 = self.pools.city_vecs.acquire();
        let mut in_cycle2 = self.pools.city_vecs.acquire();
        let mut connected2 = self.pools.city_vecs.acquire();
        in_cycle1.iter_mut().for_each(|c| *c = null_cycle);
        in_cycle2.iter_mut().for_each(|c| *c = null_cycle);

        for (index, cycle) in cycles.iter().enumerate() {
            for (j, &city) in cycle.iter().enumerate() {
                let connected_city = cycle[(j + 1) % cycle.len()];
                if in_cycle1[city] == null_cycle {
                    in_cycle1[city] = index;
                    connected1[city] = connected_city;
                } else {
                    in_cycle2[city] = index;
                    connected2[city] = connected_city;
                }
            }
        }

        let mut drop = vec![false; cycles.len()];
        for &(v1, v2) in tabu_edges {
            for (cycle_of_v1, connected_of_v1) in
                [(in_cycle1[v1], connected1[v1]), (in_cycle2[v1], connected2[v1])]
            {
                if cycle_of_v1 == null_cycle {
                    continue;
                }
                let forward = connected_of_v1 == v2;
                let backward = (in_cycle1[v2] == cycle_of_v1 && connected1[v2] == v1)
                    || (in_cycle2[v2] == cycle_of_v1 && connected2[v2] == v1);
                if forward || backward {
                    drop[cycle_of_v1] = true;
                }
            }
        }

        for i in (0..cycles.len()).rev() {
            if drop[i] {
                cycles.swap_remove(i);
            }
        }
    }
}

/// Edges of `a` absent from `b`, counted over `a`'s linear order.
fn count_different_edges(a: &Tour, b: &Tour) -> usize {
    let mut count = 0;
    let mut prev = 0;
    let mut current = 0;
    for _ in 0..a.len() {
        let mut next = a.neighbors(current)[0];
        if next == prev {
            next = a.neighbors(current)[1];
        }
        if !b.has_edge(current, next) {
            count += 1;
        }
        prev = current;
        current = next;
    }
    count
}
