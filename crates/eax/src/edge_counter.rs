//! Population edge-frequency histogram.
//!
//! Maps each directed city pair `(v1, v2)` to the number of tours in the
//! population whose adjacency list records `v2` as a neighbour of `v1`.
//! Two representations share one behavioural contract: a dense n×n matrix
//! (O(1) mutation, O(n²) entropy) and a compact per-vertex list (amortised
//! O(1) mutation on the small degrees TSP geometry produces, entropy linear
//! in the number of distinct edges). The representation is picked once at
//! context construction; nothing downstream may depend on the choice.

use crate::delta::CrossoverDelta;
use crate::individual::Tour;
use crate::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CounterPolicy {
    Dense,
    Compact,
}

pub enum EdgeCounter {
    Dense(DenseEdgeCounter),
    Compact(CompactEdgeCounter),
}

impl EdgeCounter {
    pub fn new(num_vertices: usize, population_size: usize, policy: CounterPolicy) -> Self {
        match policy {
            CounterPolicy::Dense => {
                EdgeCounter::Dense(DenseEdgeCounter::new(num_vertices, population_size))
            }
            CounterPolicy::Compact => {
                EdgeCounter::Compact(CompactEdgeCounter::new(num_vertices, population_size))
            }
        }
    }

    /// Counts every adjacency of every tour in `population`.
    pub fn from_population(population: &[Tour], policy: CounterPolicy) -> Self {
        let n = population[0].len();
        let mut counter = EdgeCounter::new(n, population.len(), policy);
        for tour in population {
            for v in 0..n {
                let [a, b] = tour.neighbors(v);
                counter.increment(v, a);
                counter.increment(v, b);
            }
        }
        counter
    }

    pub fn population_size(&self) -> usize {
        match self {
            EdgeCounter::Dense(c) => c.population_size,
            EdgeCounter::Compact(c) => c.population_size,
        }
    }

    pub fn increment(&mut self, v1: usize, v2: usize) {
        match self {
            EdgeCounter::Dense(c) => c.increment(v1, v2),
            EdgeCounter::Compact(c) => c.increment(v1, v2),
        }
    }

    pub fn decrement(&mut self, v1: usize, v2: usize) -> Result<(), Error> {
        match self {
            EdgeCounter::Dense(c) => c.decrement(v1, v2),
            EdgeCounter::Compact(c) => c.decrement(v1, v2),
        }
    }

    pub fn get(&self, v1: usize, v2: usize) -> usize {
        match self {
            EdgeCounter::Dense(c) => c.get(v1, v2),
            EdgeCounter::Compact(c) => c.get(v1, v2),
        }
    }

    /// Applies a child's modifications: each one retires a directed edge and
    /// introduces another.
    pub fn apply_delta(&mut self, delta: &CrossoverDelta) -> Result<(), Error> {
        for m in delta.modifications() {
            self.decrement(m.vertex, m.old)?;
            self.increment(m.vertex, m.new);
        }
        Ok(())
    }

    /// Exactly undoes [`apply_delta`](Self::apply_delta).
    pub fn revert_delta(&mut self, delta: &CrossoverDelta) -> Result<(), Error> {
        for m in delta.modifications().iter().rev() {
            self.decrement(m.vertex, m.new)?;
            self.increment(m.vertex, m.old);
        }
        Ok(())
    }

    /// Directed pairs with a non-zero count.
    pub fn unique_directed_edge_count(&self) -> usize {
        match self {
            EdgeCounter::Dense(c) => c.unique_directed,
            EdgeCounter::Compact(c) => c.unique_directed,
        }
    }

    /// `(a, b)` and `(b, a)` counted once.
    pub fn unique_undirected_edge_count(&self) -> usize {
        self.unique_directed_edge_count() / 2
    }

    /// Shannon entropy in bits over all non-zero directed edges, each count
    /// normalised by the population size.
    pub fn entropy(&self) -> f64 {
        match self {
            EdgeCounter::Dense(c) => c.entropy(),
            EdgeCounter::Compact(c) => c.entropy(),
        }
    }

    /// The currently connected neighbours of `v`, in unspecified order.
    pub fn connected_of(&self, v: usize) -> Vec<usize> {
        match self {
            EdgeCounter::Dense(c) => c.connected_of(v),
            EdgeCounter::Compact(c) => c.neighbors[v].clone(),
        }
    }
}

fn entropy_term(count: usize, population_size: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let p = count as f64 / population_size as f64;
    -p * p.log2()
}

pub struct DenseEdgeCounter {
    counts: Vec<usize>,
    num_vertices: usize,
    population_size: usize,
    unique_directed: usize,
}

impl DenseEdgeCounter {
    fn new(num_vertices: usize, population_size: usize) -> Self {
        DenseEdgeCounter {
            counts: vec![0; num_vertices * num_vertices],
            num_vertices,
            population_size,
            unique_directed: 0,
        }
    }

    fn increment(&mut self, v1: usize, v2: usize) {
        let slot = &mut self.counts[v1 * self.num_vertices + v2];
        if *slot == 0 {
            self.unique_directed += 1;
        }
        *slot += 1;
    }

    fn decrement(&mut self, v1: usize, v2: usize) -> Result<(), Error> {
        let slot = &mut self.counts[v1 * self.num_vertices + v2];
        if *slot == 0 {
            return Err(Error::CounterUnderflow { v1, v2 });
        }
        *slot -= 1;
        if *slot == 0 {
            self.unique_directed -= 1;
        }
        Ok(())
    }

    fn get(&self, v1: usize, v2: usize) -> usize {
        self.counts[v1 * self.num_vertices + v2]
    }

    fn entropy(&self) -> f64 {
        self.counts
            .iter()
            .map(|&c| entropy_term(c, self.population_size))
            .sum()
    }

    fn connected_of(&self, v: usize) -> Vec<usize> {
        let row = &self.counts[v * self.num_vertices..(v + 1) * self.num_vertices];
        row.iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(j, _)| j)
            .collect()
    }
}

/// Per-vertex parallel vectors of `(neighbour, count)`. Increment searches
/// linearly and appends on a miss; a count reaching zero is swap-removed.
pub struct CompactEdgeCounter {
    neighbors: Vec<Vec<usize>>,
    counts: Vec<Vec<usize>>,
    population_size: usize,
    unique_directed: usize,
}

impl CompactEdgeCounter {
    fn new(num_vertices: usize, population_size: usize) -> Self {
        CompactEdgeCounter {
            neighbors: vec![Vec::new(); num_vertices],
            counts: vec![Vec::new(); num_vertices],
            population_size,
            unique_directed: 0,
        }
    }

    fn increment(&mut self, v1: usize, v2: usize) {
        let row = &mut self.neighbors[v1];
        match row.iter().position(|&w| w == v2) {
            Some(i) => self.counts[v1][i] += 1,
            None => {
                row.push(v2);
                self.counts[v1].push(1);
                self.unique_directed += 1;
            }
        }
    }

    fn decrement(&mut self, v1: usize, v2: usize) -> Result<(), Error> {
        let row = &mut self.neighbors[v1];
        let i = row
            .iter()
            .position(|&w| w == v2)
            .ok_or(Error::CounterUnderflow { v1, v2 })?;
        self.counts[v1][i] -= 1;
        if self.counts[v1][i] == 0 {
            row.swap_remove(i);
            self.counts[v1].swap_remove(i);
            self.unique_directed -= 1;
        }
        Ok(())
    }

    fn get(&self, v1: usize, v2: usize) -> usize {
        self.neighbors[v1]
            .iter()
            .position(|&w| w == v2)
            .map_or(0, |i| self.counts[v1][i])
    }

    fn entropy(&self) -> f64 {
        self.counts
            .iter()
            .flatten()
            .map(|&c| entropy_term(c, self.population_size))
            .sum()
    }
}
