//! Tour representation.
//!
//! A tour is a doubly-linked adjacency list: `links[v]` names the two
//! cities adjacent to `v` in the Hamiltonian cycle, with no orientation.
//! Each tour carries a 64-bit checksum that identifies "this tour object in
//! this state"; deltas record the checksum of their base tour and refuse to
//! apply anywhere else.

use std::sync::atomic::{AtomicU64, Ordering};

use tsp_instance::Tsp;

static CHECKSUM_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Issues a fresh checksum from a process-wide monotone counter pushed
/// through an LCG mix, so concurrently running trials never collide.
pub(crate) fn next_checksum() -> u64 {
    const A: u64 = 6364136223846793005;
    const C: u64 = 1442695040888963407;
    let seed = CHECKSUM_COUNTER.fetch_add(1, Ordering::Relaxed);
    seed.wrapping_mul(A).wrapping_add(C)
}

#[derive(Clone)]
pub struct Tour {
    links: Vec<[usize; 2]>,
    distance: i64,
    checksum: u64,
}

impl Tour {
    /// Builds a tour from a city order, accumulating the cycle length from
    /// the weight matrix.
    pub fn new(path: &[usize], tsp: &Tsp) -> Self {
        let n = path.len();
        assert!(n >= 2, "a tour needs at least two cities");

        let mut links = vec![[0usize; 2]; n];
        let mut distance = 0;
        for i in 0..n {
            let prev = path[(i + n - 1) % n];
            let current = path[i];
            let next = path[(i + 1) % n];
            links[current] = [prev, next];
            distance += tsp.weight(current, prev);
        }

        Tour {
            links,
            distance,
            checksum: next_checksum(),
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The two neighbours of `v`.
    #[inline]
    pub fn neighbors(&self, v: usize) -> [usize; 2] {
        self.links[v]
    }

    pub fn distance(&self) -> i64 {
        self.distance
    }

    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    /// Whether `a` and `b` are adjacent in this tour.
    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.links[a][0] == b || self.links[a][1] == b
    }

    /// Reconstructs a canonical linear order: start at city 0 and keep
    /// walking without going back.
    pub fn to_path(&self) -> Vec<usize> {
        let n = self.len();
        let mut path = Vec::with_capacity(n);
        let mut prev = 0;
        let mut current = 0;
        for _ in 0..n {
            path.push(current);
            let mut next = self.links[current][0];
            if next == prev {
                next = self.links[current][1];
            }
            prev = current;
            current = next;
        }
        path
    }

    /// In `v`'s adjacency, replaces `old` with `new`. Returns false when
    /// neither slot holds `old`.
    pub(crate) fn replace_neighbor(&mut self, v: usize, old: usize, new: usize) -> bool {
        if self.links[v][0] == old {
            self.links[v][0] = new;
            true
        } else if self.links[v][1] == old {
            self.links[v][1] = new;
            true
        } else {
            false
        }
    }

    pub(crate) fn add_distance(&mut self, delta: i64) {
        self.distance += delta;
    }

    pub(crate) fn set_checksum(&mut self, checksum: u64) {
        self.checksum = checksum;
    }

    /// Adjacency-level equality, ignoring checksum and cached distance.
    pub fn same_edges(&self, other: &Tour) -> bool {
        self.len() == other.len()
            && (0..self.len()).all(|v| {
                let [a, b] = self.links[v];
                let [c, d] = other.links[v];
                (a == c && b == d) || (a == d && b == c)
            })
    }

    /// Debug check: every city appears as a neighbour of exactly two others
    /// and the adjacencies close into one cycle over all cities.
    pub fn is_hamiltonian(&self) -> bool {
        let n = self.len();
        let mut degree = vec![0usize; n];
        for v in 0..n {
            for &w in &self.links[v] {
                if w >= n {
                    return false;
                }
                degree[w] += 1;
            }
        }
        if degree.iter().any(|&d| d != 2) {
            return false;
        }

        let mut visited = 1;
        let mut prev = 0;
        let mut current = self.links[0][1];
        while current != 0 {
            if visited > n {
                return false;
            }
            visited += 1;
            let mut next = self.links[current][0];
            if next == prev {
                next = self.links[current][1];
            }
            prev = current;
            current = next;
        }
        visited == n
    }
}
