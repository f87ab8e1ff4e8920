//! Neighbour-list 2-opt used to seed GA populations.

use crate::Tsp;

/// First-improvement 2-opt restricted to a window of each city's nearest
/// neighbours. Because the neighbour rows are sorted by weight, the scan for
/// a city can stop as soon as the candidate edge is already longer than the
/// edge it would replace.
pub struct TwoOpt {
    near_range: usize,
}

impl Default for TwoOpt {
    fn default() -> Self {
        Self::new(50)
    }
}

impl TwoOpt {
    pub fn new(near_range: usize) -> Self {
        TwoOpt { near_range }
    }

    /// Improves `path` in place until a full pass finds no improving
    /// exchange.
    pub fn improve(&self, path: &mut [usize], tsp: &Tsp) {
        let n = path.len();
        if n < 4 {
            return;
        }

        let mut pos = vec![0usize; n];
        for (i, &city) in path.iter().enumerate() {
            pos[city] = i;
        }

        let mut improved = true;
        while improved {
            improved = false;
            for ia in 0..n {
                let a = path[ia];
                let a_next = path[(ia + 1) % n];
                let removed = tsp.weight(a, a_next);

                let window = self.near_range.min(tsp.neighbors(a).len());
                for k in 0..window {
                    let b = tsp.nn(a, k);
                    if tsp.weight(a, b) >= removed {
                        break;
                    }
                    let ib = pos[b];
                    let b_next = path[(ib + 1) % n];
                    if b_next == a || b == a_next {
                        continue;
                    }

                    let gain = removed + tsp.weight(b, b_next)
                        - tsp.weight(a, b)
                        - tsp.weight(a_next, b_next);
                    if gain > 0 {
                        reverse_segment(path, &mut pos, (ia + 1) % n, ib);
                        improved = true;
                        break;
                    }
                }
            }
        }
    }
}

/// Reverses the path segment from position `from` to position `to`
/// inclusive, walking the cycle forwards, and keeps `pos` in sync.
fn reverse_segment(path: &mut [usize], pos: &mut [usize], from: usize, to: usize) {
    let n = path.len();
    let span = (to + n - from) % n + 1;
    let mut i = from;
    let mut j = to;
    for _ in 0..span / 2 {
        path.swap(i, j);
        pos[path[i]] = i;
        pos[path[j]] = j;
        i = (i + 1) % n;
        j = (j + n - 1) % n;
    }
}
