//! Crossover deltas.
//!
//! A delta is an ordered list of adjacency modifications that transforms
//! one tour into another. Applying the list in order to its base tour
//! yields the child; applying the inverse list in reverse restores the
//! base. The delta also carries the base and child checksums and the signed
//! length change, so selection and histogram updates never touch the full
//! tour.

use crate::individual::Tour;
use crate::Error;

/// "At `vertex`, the neighbour `old` is replaced by `new`."
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Modification {
    pub vertex: usize,
    pub old: usize,
    pub new: usize,
}

#[derive(Clone, Debug)]
pub struct CrossoverDelta {
    modifications: Vec<Modification>,
    base_checksum: u64,
    child_checksum: u64,
    delta_distance: i64,
}

impl CrossoverDelta {
    pub fn new(modifications: Vec<Modification>, delta_distance: i64, base_checksum: u64) -> Self {
        let child_checksum = base_checksum ^ mix_modifications(&modifications);
        CrossoverDelta {
            modifications,
            base_checksum,
            child_checksum,
            delta_distance,
        }
    }

    /// The delta that leaves `base` unchanged.
    pub fn empty(base: &Tour) -> Self {
        CrossoverDelta::new(Vec::new(), 0, base.checksum())
    }

    pub fn modifications(&self) -> &[Modification] {
        &self.modifications
    }

    pub fn is_identity(&self) -> bool {
        self.modifications.is_empty()
    }

    pub fn delta_distance(&self) -> i64 {
        self.delta_distance
    }

    pub fn base_checksum(&self) -> u64 {
        self.base_checksum
    }

    pub fn child_checksum(&self) -> u64 {
        self.child_checksum
    }

    pub fn is_based_on(&self, tour: &Tour) -> bool {
        tour.checksum() == self.base_checksum
    }

    /// Applies the delta to its base tour, updating the cached distance and
    /// stamping the child checksum.
    pub fn apply_to(&self, tour: &mut Tour) -> Result<(), Error> {
        if !self.is_based_on(tour) {
            return Err(Error::BaseMismatch);
        }
        for m in &self.modifications {
            if !tour.replace_neighbor(m.vertex, m.old, m.new) {
                return Err(Error::BaseMismatch);
            }
        }
        tour.add_distance(self.delta_distance);
        tour.set_checksum(self.child_checksum);
        Ok(())
    }

    /// Undoes the delta on a tour it produced, restoring the base checksum.
    pub fn revert_on(&self, tour: &mut Tour) -> Result<(), Error> {
        if tour.checksum() != self.child_checksum {
            return Err(Error::BaseMismatch);
        }
        for m in self.modifications.iter().rev() {
            if !tour.replace_neighbor(m.vertex, m.new, m.old) {
                return Err(Error::BaseMismatch);
            }
        }
        tour.add_distance(-self.delta_distance);
        tour.set_checksum(self.base_checksum);
        Ok(())
    }
}

/// Hashes the first, middle and last modifications.
fn mix_modifications(modifications: &[Modification]) -> u64 {
    const MIX_A: u64 = 0x9e3779b97f4a7c15;
    const MIX_B: u64 = 0xbf58476d1ce4e5b9;
    const MIX_C: u64 = 0x94d049bb133111eb;

    if modifications.is_empty() {
        return 0;
    }

    let hash = |m: &Modification| {
        (m.vertex as u64).wrapping_mul(MIX_A)
            ^ (m.old as u64).wrapping_mul(MIX_B)
            ^ (m.new as u64).wrapping_mul(MIX_C)
    };

    let first = hash(&modifications[0]);
    let mid = hash(&modifications[modifications.len() / 2]);
    let last = hash(&modifications[modifications.len() - 1]);
    first ^ mid.rotate_left(19) ^ last.rotate_left(41)
}

/// A delta bundled with a reference to its base tour.
///
/// Callers that buffer deltas may try to apply one to a tour that has moved
/// on; this wrapper falls back to "copy the base, then apply" in that case.
pub struct DeltaWithIndividual<'a> {
    base: &'a Tour,
    delta: CrossoverDelta,
}

impl<'a> DeltaWithIndividual<'a> {
    pub fn new(base: &'a Tour, delta: CrossoverDelta) -> Result<Self, Error> {
        if !delta.is_based_on(base) {
            return Err(Error::BaseMismatch);
        }
        Ok(DeltaWithIndividual { base, delta })
    }

    /// Wraps a tour with the identity delta, so plain tours and buffered
    /// deltas can be handled uniformly.
    pub fn identity(base: &'a Tour) -> Self {
        DeltaWithIndividual {
            base,
            delta: CrossoverDelta::empty(base),
        }
    }

    pub fn delta(&self) -> &CrossoverDelta {
        &self.delta
    }

    pub fn apply_to(&self, target: &mut Tour) -> Result<(), Error> {
        if !self.delta.is_based_on(target) {
            *target = self.base.clone();
        }
        self.delta.apply_to(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsp_instance::{DistanceType, Tsp};

    fn square() -> Tsp {
        let coords = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)];
        Tsp::from_coords("square", DistanceType::Euc2d, &coords)
    }

    /// The four modifications replacing edges (0,1) and (2,3) with (0,2)
    /// and (1,3), turning tour 0-1-2-3 into 0-2-1-3.
    fn cross_square_delta(base: &Tour) -> CrossoverDelta {
        let mods = vec![
            Modification { vertex: 0, old: 1, new: 2 },
            Modification { vertex: 1, old: 0, new: 3 },
            Modification { vertex: 2, old: 3, new: 0 },
            Modification { vertex: 3, old: 2, new: 1 },
        ];
        CrossoverDelta::new(mods, 8, base.checksum())
    }

    #[test]
    fn apply_then_revert_is_identity() {
        let tsp = square();
        let base = Tour::new(&[0, 1, 2, 3], &tsp);
        let mut tour = base.clone();
        let delta = cross_square_delta(&base);

        delta.apply_to(&mut tour).unwrap();
        assert!(tour.is_hamiltonian());
        assert_eq!(tour.distance(), 48);
        assert_eq!(tour.checksum(), delta.child_checksum());

        delta.revert_on(&mut tour).unwrap();
        assert!(tour.same_edges(&base));
        assert_eq!(tour.distance(), base.distance());
        assert_eq!(tour.checksum(), base.checksum());
    }

    #[test]
    fn apply_to_foreign_tour_is_a_base_mismatch() {
        let tsp = square();
        let base = Tour::new(&[0, 1, 2, 3], &tsp);
        let mut other = Tour::new(&[0, 1, 2, 3], &tsp);
        let delta = cross_square_delta(&base);

        assert!(matches!(delta.apply_to(&mut other), Err(Error::BaseMismatch)));
    }

    #[test]
    fn buffered_delta_copies_on_mismatch() {
        let tsp = square();
        let base = Tour::new(&[0, 1, 2, 3], &tsp);
        let delta = cross_square_delta(&base);
        let buffered = DeltaWithIndividual::new(&base, delta).unwrap();

        // target drifted away from the base: gets overwritten, then patched
        let mut target = Tour::new(&[0, 2, 1, 3], &tsp);
        buffered.apply_to(&mut target).unwrap();
        assert_eq!(target.distance(), 48);
        assert!(target.has_edge(0, 2));
        assert!(target.has_edge(1, 3));
    }

    #[test]
    fn empty_delta_keeps_the_checksum() {
        let tsp = square();
        let base = Tour::new(&[0, 1, 2, 3], &tsp);
        let delta = CrossoverDelta::empty(&base);
        assert_eq!(delta.child_checksum(), base.checksum());

        let mut tour = base.clone();
        delta.apply_to(&mut tour).unwrap();
        assert_eq!(tour.checksum(), base.checksum());
    }
}
