//! The intermediate individual: parent A with an E-set applied.
//!
//! Applying an E-set breaks parent A's cycle into disjoint sub-tours. The
//! working adjacency is edited through [`IntermediateIndividual::change_connection`]
//! so every edit lands in a modification log that can be reverted exactly or
//! drained into a [`CrossoverDelta`]. Sub-tours are tracked positionally:
//! cut positions in parent A's canonical order delimit segments, and a walk
//! over segment adjacency groups segments into sub-tours.

use tsp_instance::Tsp;

use crate::ab_cycle::AbCycle;
use crate::delta::{CrossoverDelta, Modification};
use crate::individual::Tour;
use crate::pools::ObjectPools;

const NULL_SUB_TOUR: usize = usize::MAX;

/// A maximal span of parent A's linear order with no internal cut.
#[derive(Copy, Clone, Debug)]
pub struct Segment {
    pub id: usize,
    pub begin_pos: usize,
    pub end_pos: usize,
    /// Position adjacent to `begin_pos` across the cut.
    pub begin_adjacent_pos: usize,
    /// Position adjacent to `end_pos` across the cut.
    pub end_adjacent_pos: usize,
    pub sub_tour_id: usize,
}

#[derive(Default)]
pub struct SubtourList {
    pub segments: Vec<Segment>,
    pub sub_tour_sizes: Vec<usize>,
}

impl SubtourList {
    pub fn clear(&mut self) {
        self.segments.clear();
        self.sub_tour_sizes.clear();
    }

    pub fn sub_tour_count(&self) -> usize {
        self.sub_tour_sizes.len()
    }

    /// `(id, size)` of the smallest sub-tour; ties go to the lowest id.
    pub fn find_min_size_sub_tour(&self) -> (usize, usize) {
        let mut min_id = 0;
        let mut min_size = usize::MAX;
        for (id, &size) in self.sub_tour_sizes.iter().enumerate() {
            if size < min_size {
                min_size = size;
                min_id = id;
            }
        }
        (min_id, min_size)
    }

    pub fn find_sub_tour_containing(&self, pos: usize) -> usize {
        for segment in &self.segments {
            if segment.begin_pos <= pos && pos <= segment.end_pos {
                return segment.sub_tour_id;
            }
        }
        unreachable!("every position belongs to a segment");
    }

    /// Position of some city of the given sub-tour.
    pub fn first_pos_of_sub_tour(&self, sub_tour_id: usize) -> usize {
        for segment in &self.segments {
            if segment.sub_tour_id == sub_tour_id {
                return segment.begin_pos;
            }
        }
        unreachable!("sub-tour ids are dense");
    }

    /// Folds `absorbed` into `kept`, swapping the last id down so ids stay
    /// dense.
    pub fn merge_sub_tour(&mut self, kept: usize, absorbed: usize) {
        for segment in &mut self.segments {
            if segment.sub_tour_id == absorbed {
                segment.sub_tour_id = kept;
            }
        }
        self.sub_tour_sizes[kept] += self.sub_tour_sizes[absorbed];

        let last = self.sub_tour_sizes.len() - 1;
        if absorbed < last {
            for segment in &mut self.segments {
                if segment.sub_tour_id == last {
                    segment.sub_tour_id = absorbed;
                }
            }
            self.sub_tour_sizes[absorbed] = self.sub_tour_sizes[last];
        }
        self.sub_tour_sizes.pop();
    }
}

pub struct IntermediateIndividual {
    links: Vec<[usize; 2]>,
    modifications: Vec<Modification>,
    path: Vec<usize>,
    pos: Vec<usize>,
    subtours: SubtourList,
}

impl IntermediateIndividual {
    pub fn new(city_count: usize) -> Self {
        IntermediateIndividual {
            links: vec![[0, 0]; city_count],
            modifications: Vec::new(),
            path: (0..city_count).collect(),
            pos: (0..city_count).collect(),
            subtours: SubtourList::default(),
        }
    }

    /// Becomes a working copy of `parent`, recording its canonical linear
    /// order and the inverse position map.
    pub fn assign(&mut self, parent: &Tour) {
        let n = parent.len();
        self.links.resize(n, [0, 0]);
        self.path.resize(n, 0);
        self.pos.resize(n, 0);
        self.modifications.clear();
        self.subtours.clear();

        let mut prev = 0;
        let mut current = 0;
        for i in 0..n {
            self.links[current] = parent.neighbors(current);
            self.path[i] = current;
            self.pos[current] = i;

            let mut next = parent.neighbors(current)[0];
            if next == prev {
                next = parent.neighbors(current)[1];
            }
            prev = current;
            current = next;
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    #[inline]
    pub fn neighbors(&self, v: usize) -> [usize; 2] {
        self.links[v]
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn pos(&self) -> &[usize] {
        &self.pos
    }

    pub fn sub_tours(&self) -> &SubtourList {
        &self.subtours
    }

    pub fn sub_tour_count(&self) -> usize {
        self.subtours.sub_tour_count()
    }

    pub fn merge_sub_tour(&mut self, kept: usize, absorbed: usize) {
        self.subtours.merge_sub_tour(kept, absorbed);
    }

    /// Logged adjacency edit: at `v1`, `v2` becomes `new_v2`.
    pub fn change_connection(&mut self, v1: usize, v2: usize, new_v2: usize) {
        self.modifications.push(Modification {
            vertex: v1,
            old: v2,
            new: new_v2,
        });
        if self.links[v1][0] == v2 {
            self.links[v1][0] = new_v2;
        } else {
            self.links[v1][1] = new_v2;
        }
    }

    /// Deletes edges `(v1, v2)` and `(u1, u2)`, inserts `(v1, u1)` and
    /// `(v2, u2)`.
    pub fn swap_edges(&mut self, edge1: (usize, usize), edge2: (usize, usize)) {
        let (v1, v2) = edge1;
        let (u1, u2) = edge2;
        self.change_connection(v1, v2, u1);
        self.change_connection(v2, v1, u2);
        self.change_connection(u2, u1, v2);
        self.change_connection(u1, u2, v1);
    }

    /// Applies the selected AB-cycles as edge swaps and rebuilds the
    /// sub-tour list from the resulting cut positions.
    pub fn apply_ab_cycles(&mut self, cycles: &[AbCycle], selected: &[usize], pools: &ObjectPools) {
        let n = self.len();

        let mut cut_positions = pools.cut_vecs.acquire();
        cut_positions.clear();
        let mut wrapped = false;

        for &index in selected {
            let cycle = &cycles[index];
            let len = cycle.len();
            for i in (2..len - 2).step_by(2) {
                self.cut(&mut cut_positions, &mut wrapped, cycle[i - 1], cycle[i], cycle[i + 1], cycle[i + 2]);
            }
            self.cut(&mut cut_positions, &mut wrapped, cycle[len - 1], cycle[0], cycle[1], cycle[2]);
            self.cut(&mut cut_positions, &mut wrapped, cycle[len - 3], cycle[len - 2], cycle[len - 1], cycle[0]);
        }

        if !wrapped {
            cut_positions.push((0, n - 1, 0));
            cut_positions.push((n, n - 1, 0));
        }
        cut_positions.sort_unstable();

        self.rebuild_sub_tours(&cut_positions, pools);
    }

    /// Removes the parent-A edge `(ba, ab)`, reconnecting its endpoints to
    /// their parent-B successors `b1` and `b2`, and records where parent A's
    /// linear order got cut. Each triple is (boundary position, position
    /// adjacent to the boundary, position adjacent to boundary − 1); a cut
    /// through the wrap-around edge is stored twice, at 0 and at n.
    fn cut(
        &mut self,
        cut_positions: &mut Vec<(usize, usize, usize)>,
        wrapped: &mut bool,
        b1: usize,
        ba: usize,
        ab: usize,
        b2: usize,
    ) {
        let n = self.len();
        self.change_connection(ba, ab, b1);
        self.change_connection(ab, ba, b2);
        let pos_b1 = self.pos[b1];
        let pos_ba = self.pos[ba];
        let pos_ab = self.pos[ab];
        let pos_b2 = self.pos[b2];

        if pos_ba == 0 && pos_ab == n - 1 {
            cut_positions.push((pos_ba, pos_b1, pos_b2));
            cut_positions.push((n, pos_b1, pos_b2));
            *wrapped = true;
        } else if pos_ba == n - 1 && pos_ab == 0 {
            cut_positions.push((pos_ab, pos_b2, pos_b1));
            cut_positions.push((n, pos_b2, pos_b1));
            *wrapped = true;
        } else if pos_ba < pos_ab {
            cut_positions.push((pos_ab, pos_b2, pos_b1));
        } else {
            cut_positions.push((pos_ba, pos_b1, pos_b2));
        }
    }

    fn rebuild_sub_tours(
        &mut self,
        cut_positions: &[(usize, usize, usize)],
        pools: &ObjectPools,
    ) {
        let subtours = &mut self.subtours;
        subtours.clear();

        let mut pos_to_segment = pools.city_vecs.acquire();
        pos_to_segment.resize(self.links.len(), 0);

        // Each pair of consecutive cut positions delimits one segment.
        for window in cut_positions.windows(2) {
            let (begin_pos, begin_adjacent_pos, _) = window[0];
            let (next_begin, _, end_adjacent_pos) = window[1];
            let segment = Segment {
                id: subtours.segments.len(),
                begin_pos,
                end_pos: next_begin - 1,
                begin_adjacent_pos,
                end_adjacent_pos,
                sub_tour_id: NULL_SUB_TOUR,
            };
            pos_to_segment[segment.begin_pos] = segment.id;
            pos_to_segment[segment.end_pos] = segment.id;
            subtours.segments.push(segment);
        }

        // Walk segment adjacency; every segment reached from a seed gets the
        // seed's sub-tour id.
        let mut sub_tour_count = 0;
        loop {
            let seed = match subtours
                .segments
                .iter()
                .position(|s| s.sub_tour_id == NULL_SUB_TOUR)
            {
                Some(i) => i,
                None => break,
            };

            let mut current = seed;
            loop {
                subtours.segments[current].sub_tour_id = sub_tour_count;
                let mut next = pos_to_segment[subtours.segments[current].begin_adjacent_pos];
                if subtours.segments[next].sub_tour_id != NULL_SUB_TOUR {
                    next = pos_to_segment[subtours.segments[current].end_adjacent_pos];
                    if subtours.segments[next].sub_tour_id != NULL_SUB_TOUR {
                        break; // closed the cycle
                    }
                }
                current = next;
            }
            sub_tour_count += 1;
        }

        // Sizes per sub-tour; runs of position-adjacent segments with the
        // same id collapse into one segment.
        subtours.sub_tour_sizes.resize(sub_tour_count, 0);
        let mut focused = 0;
        for i in 0..subtours.segments.len() {
            let segment = subtours.segments[i];
            let run_len = segment.end_pos - segment.begin_pos + 1;
            subtours.sub_tour_sizes[segment.sub_tour_id] += run_len;
            if segment.sub_tour_id == subtours.segments[focused].sub_tour_id {
                subtours.segments[focused].end_pos = segment.end_pos;
                subtours.segments[focused].end_adjacent_pos = segment.end_adjacent_pos;
            } else {
                focused += 1;
                subtours.segments[focused] = segment;
            }
        }
        subtours.segments.truncate(focused + 1);
    }

    /// Drains the modification log into a delta based on `base` and reverts
    /// the working adjacency back to it.
    pub fn take_delta_and_revert(&mut self, tsp: &Tsp, base: &Tour) -> CrossoverDelta {
        let delta_distance = self.pending_delta_distance(tsp);
        self.revert();
        let modifications = std::mem::take(&mut self.modifications);
        self.subtours.clear();
        CrossoverDelta::new(modifications, delta_distance, base.checksum())
    }

    /// Reverts the working adjacency and forgets the log.
    pub fn discard(&mut self) {
        self.revert();
        self.modifications.clear();
        self.subtours.clear();
    }

    /// Signed length change of the pending log. Each undirected edge change
    /// is seen from both endpoints, hence the halving.
    pub fn pending_delta_distance(&self, tsp: &Tsp) -> i64 {
        let sum: i64 = self
            .modifications
            .iter()
            .map(|m| tsp.weight(m.vertex, m.new) - tsp.weight(m.vertex, m.old))
            .sum();
        sum / 2
    }

    fn revert(&mut self) {
        for i in (0..self.modifications.len()).rev() {
            let m = self.modifications[i];
            if self.links[m.vertex][0] == m.new {
                self.links[m.vertex][0] = m.old;
            } else {
                self.links[m.vertex][1] = m.old;
            }
        }
    }

    /// Adjacency equality against a tour, for round-trip checks.
    pub fn matches(&self, tour: &Tour) -> bool {
        self.len() == tour.len()
            && (0..self.len()).all(|v| {
                let [a, b] = self.links[v];
                let [c, d] = tour.neighbors(v);
                (a == c && b == d) || (a == d && b == c)
            })
    }
}
