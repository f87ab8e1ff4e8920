//! Sub-tour repair.
//!
//! The intermediate individual is a disjoint union of cycles; the merger
//! reconnects them greedily into a single Hamiltonian cycle. Each round
//! takes the smallest sub-tour and scans its cities' nearest neighbours
//! (doubling the window until a candidate outside the sub-tour appears) for
//! the cheapest 2-opt-style reconnection; ties keep the first candidate in
//! scan order.

use tsp_instance::Tsp;

use crate::individual::Tour;
use crate::intermediate::IntermediateIndividual;
use crate::pools::ObjectPools;

pub struct SubtourMerger;

impl SubtourMerger {
    /// Merges until one sub-tour remains.
    pub fn merge(working: &mut IntermediateIndividual, tsp: &Tsp, pools: &ObjectPools) {
        merge_impl(working, tsp, pools, &[]);
    }

    /// Like [`merge`](Self::merge), but among reconnections of equal cost
    /// prefers one whose inserted edges reuse an edge of a reference
    /// parent.
    pub fn merge_with_reference(
        working: &mut IntermediateIndividual,
        tsp: &Tsp,
        pools: &ObjectPools,
        reference_parents: &[&Tour],
    ) {
        merge_impl(working, tsp, pools, reference_parents);
    }
}

fn merge_impl(
    working: &mut IntermediateIndividual,
    tsp: &Tsp,
    pools: &ObjectPools,
    reference_parents: &[&Tour],
) {
    let mut members = pools.scratch_vecs.acquire();
    let mut in_min_sub_tour = pools.flag_vecs.acquire();
    in_min_sub_tour.iter_mut().for_each(|f| *f = false);

    while working.sub_tour_count() > 1 {
        let (min_id, min_size) = working.sub_tours().find_min_size_sub_tour();
        let start_city = working.path()[working.sub_tours().first_pos_of_sub_tour(min_id)];

        // walk the smallest sub-tour; two extra entries so members[i-1] and
        // members[i+1] are the tour neighbours of members[i]
        members.clear();
        members.reserve(min_size + 2);
        let mut prev = start_city;
        let mut current = start_city;
        loop {
            members.push(current);
            in_min_sub_tour[current] = true;
            let mut next = working.neighbors(current)[0];
            if next == prev {
                next = working.neighbors(current)[1];
            }
            prev = current;
            current = next;
            if current == start_city {
                break;
            }
        }
        let first = members[0];
        let second = members[1];
        members.push(first);
        members.push(second);

        let reconnection = find_cheapest_reconnection(
            working,
            tsp,
            &members,
            min_size,
            &in_min_sub_tour,
            reference_parents,
        );
        let (e1, e2) = reconnection;

        working.swap_edges(e1, e2);
        let absorbed = working.sub_tours().find_sub_tour_containing(working.pos()[e2.0]);
        working.merge_sub_tour(min_id, absorbed);

        for &city in members.iter() {
            in_min_sub_tour[city] = false;
        }
    }
}

/// Scans a widening nearest-neighbour window for the reconnection of
/// minimal delta-length. For each member `u` and candidate `v` outside the
/// sub-tour, both incident edges on both sides combine in two shapes:
/// delete `(u, u')` and `(v, v')`, insert `(u, v)` + `(u', v')` (forward)
/// or `(u, v')` + `(u', v)` (reverse).
fn find_cheapest_reconnection(
    working: &IntermediateIndividual,
    tsp: &Tsp,
    members: &[usize],
    min_size: usize,
    in_min_sub_tour: &[bool],
    reference_parents: &[&Tour],
) -> ((usize, usize), (usize, usize)) {
    let mut best: Option<((usize, usize), (usize, usize))> = None;
    let mut best_cost = i64::MAX;
    let mut best_is_reference = false;

    let mut window = 10usize;
    let mut start = 0usize;
    while best.is_none() {
        for i in 1..=min_size {
            let u = members[i];
            let row = tsp.neighbors(u);
            let limit = (start + window).min(row.len());
            if start >= limit {
                continue;
            }
            for &v in &row[start..limit] {
                if in_min_sub_tour[v] {
                    continue;
                }

                for k in 0..2 {
                    let u_adj = members[i - 1 + 2 * k];
                    for l in 0..2 {
                        let v_adj = working.neighbors(v)[l];
                        let removed = tsp.weight(u, u_adj) + tsp.weight(v, v_adj);

                        let forward = tsp.weight(u, v) + tsp.weight(u_adj, v_adj) - removed;
                        consider(
                            forward,
                            ((u, u_adj), (v, v_adj)),
                            (u, v),
                            (u_adj, v_adj),
                            reference_parents,
                            &mut best,
                            &mut best_cost,
                            &mut best_is_reference,
                        );

                        let reverse = tsp.weight(u, v_adj) + tsp.weight(u_adj, v) - removed;
                        consider(
                            reverse,
                            ((u, u_adj), (v_adj, v)),
                            (u, v_adj),
                            (u_adj, v),
                            reference_parents,
                            &mut best,
                            &mut best_cost,
                            &mut best_is_reference,
                        );
                    }
                }
            }
        }

        start += window;
        window *= 2;
        if start >= tsp.city_count() && best.is_none() {
            // every neighbour row is exhausted; with more than one sub-tour
            // there is always a city outside, so this cannot happen
            unreachable!("no reconnection candidate found");
        }
    }

    best.unwrap_or_else(|| unreachable!())
}

#[allow(clippy::too_many_arguments)]
fn consider(
    cost: i64,
    candidate: ((usize, usize), (usize, usize)),
    inserted1: (usize, usize),
    inserted2: (usize, usize),
    reference_parents: &[&Tour],
    best: &mut Option<((usize, usize), (usize, usize))>,
    best_cost: &mut i64,
    best_is_reference: &mut bool,
) {
    if cost < *best_cost {
        *best_cost = cost;
        *best = Some(candidate);
        *best_is_reference =
            is_reference_edge(reference_parents, inserted1) || is_reference_edge(reference_parents, inserted2);
    } else if cost == *best_cost && best.is_some() && !*best_is_reference {
        let is_ref = is_reference_edge(reference_parents, inserted1)
            || is_reference_edge(reference_parents, inserted2);
        if is_ref {
            *best = Some(candidate);
            *best_is_reference = true;
        }
    }
}

fn is_reference_edge(reference_parents: &[&Tour], edge: (usize, usize)) -> bool {
    reference_parents.iter().any(|p| p.has_edge(edge.0, edge.1))
}
