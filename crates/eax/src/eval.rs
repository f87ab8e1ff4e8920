//! Delta fitness evaluators.
//!
//! Fitness is real-valued, larger is better; anything ≤ 0 means "keep the
//! parent". The entropy-based evaluators trade length improvement against
//! the population diversity the replacement would destroy.

use std::fmt;
use std::str::FromStr;

use crate::delta::CrossoverDelta;
use crate::edge_counter::EdgeCounter;
use crate::Error;

const EPSILON: f64 = 1e-9;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SelectionType {
    Greedy,
    Entropy,
    DistancePreserving,
}

impl SelectionType {
    /// The short name used on the command line and in result rows.
    pub fn cli_name(&self) -> &'static str {
        match self {
            SelectionType::Greedy => "greedy",
            SelectionType::Entropy => "ent",
            SelectionType::DistancePreserving => "distance",
        }
    }
}

/// Checkpoint spelling.
impl fmt::Display for SelectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionType::Greedy => "Greedy",
            SelectionType::Entropy => "Ent",
            SelectionType::DistancePreserving => "DistancePreserving",
        };
        f.write_str(name)
    }
}

impl FromStr for SelectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "Greedy" | "greedy" => Ok(SelectionType::Greedy),
            "Ent" | "ent" => Ok(SelectionType::Entropy),
            "DistancePreserving" | "distance" => Ok(SelectionType::DistancePreserving),
            other => Err(format!(
                "unknown selection type '{other}'; expected greedy, ent or distance"
            )),
        }
    }
}

/// Evaluates `delta` under the given selection policy.
pub fn evaluate(
    selection: SelectionType,
    delta: &CrossoverDelta,
    counter: &mut EdgeCounter,
) -> Result<f64, Error> {
    match selection {
        SelectionType::Greedy => Ok(greedy(delta)),
        SelectionType::Entropy => entropy(delta, counter),
        SelectionType::DistancePreserving => distance_preserving(delta, counter),
    }
}

fn greedy(delta: &CrossoverDelta) -> f64 {
    -(delta.delta_distance() as f64)
}

/// Length reduction per unit of diversity lost. A delta that would grow the
/// tour is rejected outright; one that gains (or keeps) entropy counts its
/// full improvement, scaled so any improvement dominates.
fn entropy(delta: &CrossoverDelta, counter: &mut EdgeCounter) -> Result<f64, Error> {
    let delta_l = delta.delta_distance() as f64;
    if delta_l > 0.0 {
        return Ok(-1.0);
    }

    let delta_h = delta_entropy(delta, counter)?;
    if delta_h >= 0.0 {
        Ok(-delta_l / EPSILON)
    } else {
        Ok(delta_l / delta_h)
    }
}

/// Entropy change the delta would cause, measured by applying it to the
/// histogram and reverting exactly.
pub fn delta_entropy(delta: &CrossoverDelta, counter: &mut EdgeCounter) -> Result<f64, Error> {
    let population_size = counter.population_size();
    let term = |count: usize| -> f64 {
        if count == 0 {
            return 0.0;
        }
        let p = count as f64 / population_size as f64;
        -p * p.log2()
    };

    let mut delta_h = 0.0;
    for m in delta.modifications() {
        counter.decrement(m.vertex, m.old)?;
        let remaining = counter.get(m.vertex, m.old);
        delta_h += term(remaining) - term(remaining + 1);

        let added = counter.get(m.vertex, m.new);
        delta_h += term(added + 1) - term(added);
        counter.increment(m.vertex, m.new);
    }

    counter.revert_delta(delta)?;
    Ok(delta_h)
}

/// Like [`entropy`], but the diversity term is the integral count change:
/// `count − 1` summed over removed edges minus `count` summed over added
/// ones, using only the delta's own modifications.
fn distance_preserving(delta: &CrossoverDelta, counter: &mut EdgeCounter) -> Result<f64, Error> {
    let delta_l = delta.delta_distance() as f64;
    if delta_l >= 0.0 {
        return Ok(-1.0);
    }

    let mut delta_h = 0.0f64;
    for m in delta.modifications() {
        counter.decrement(m.vertex, m.old)?;
        delta_h -= counter.get(m.vertex, m.old) as f64;

        delta_h += counter.get(m.vertex, m.new) as f64;
        counter.increment(m.vertex, m.new);
    }
    counter.revert_delta(delta)?;

    if delta_h >= 0.0 {
        Ok(-delta_l / EPSILON)
    } else {
        Ok(delta_l / delta_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Modification;
    use crate::edge_counter::CounterPolicy;
    use crate::individual::Tour;
    use tsp_instance::{DistanceType, Tsp};

    fn square() -> Tsp {
        let coords = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)];
        Tsp::from_coords("square", DistanceType::Euc2d, &coords)
    }

    fn cross_delta(base: &Tour, delta_distance: i64) -> CrossoverDelta {
        let mods = vec![
            Modification { vertex: 0, old: 1, new: 2 },
            Modification { vertex: 1, old: 0, new: 3 },
            Modification { vertex: 2, old: 3, new: 0 },
            Modification { vertex: 3, old: 2, new: 1 },
        ];
        CrossoverDelta::new(mods, delta_distance, base.checksum())
    }

    #[test]
    fn greedy_negates_the_length_change() {
        let tsp = square();
        let base = Tour::new(&[0, 1, 2, 3], &tsp);
        let mut counter =
            EdgeCounter::from_population(std::slice::from_ref(&base), CounterPolicy::Dense);

        let worse = cross_delta(&base, 8);
        assert_eq!(
            evaluate(SelectionType::Greedy, &worse, &mut counter).unwrap(),
            -8.0
        );
        let better = cross_delta(&base, -8);
        assert_eq!(
            evaluate(SelectionType::Greedy, &better, &mut counter).unwrap(),
            8.0
        );
    }

    #[test]
    fn entropy_rejects_longer_tours() {
        let tsp = square();
        let population: Vec<Tour> = (0..4).map(|_| Tour::new(&[0, 1, 2, 3], &tsp)).collect();
        let mut counter = EdgeCounter::from_population(&population, CounterPolicy::Compact);

        let worse = cross_delta(&population[0], 8);
        assert_eq!(
            evaluate(SelectionType::Entropy, &worse, &mut counter).unwrap(),
            -1.0
        );
    }

    #[test]
    fn entropy_leaves_the_histogram_untouched() {
        let tsp = square();
        let population: Vec<Tour> = (0..4).map(|_| Tour::new(&[0, 1, 2, 3], &tsp)).collect();

        for policy in [CounterPolicy::Dense, CounterPolicy::Compact] {
            let mut counter = EdgeCounter::from_population(&population, policy);
            let improving = cross_delta(&population[0], -8);
            evaluate(SelectionType::Entropy, &improving, &mut counter).unwrap();

            assert_eq!(counter.get(0, 1), 4);
            assert_eq!(counter.get(0, 2), 0);
            assert_eq!(counter.unique_directed_edge_count(), 8);
        }
    }

    #[test]
    fn entropy_gain_scales_improvement_by_epsilon() {
        let tsp = square();
        // diverse population: a new edge can only add entropy
        let population = vec![
            Tour::new(&[0, 1, 2, 3], &tsp),
            Tour::new(&[0, 1, 2, 3], &tsp),
            Tour::new(&[0, 1, 3, 2], &tsp),
            Tour::new(&[0, 3, 1, 2], &tsp),
        ];
        let mut counter = EdgeCounter::from_population(&population, CounterPolicy::Compact);

        let improving = cross_delta(&population[0], -8);
        let fitness = evaluate(SelectionType::Entropy, &improving, &mut counter).unwrap();
        assert!(fitness > 1e6);
    }

    #[test]
    fn distance_preserving_rejects_non_improving_tours() {
        let tsp = square();
        let population: Vec<Tour> = (0..4).map(|_| Tour::new(&[0, 1, 2, 3], &tsp)).collect();
        let mut counter = EdgeCounter::from_population(&population, CounterPolicy::Dense);

        let unchanged = cross_delta(&population[0], 0);
        assert_eq!(
            evaluate(SelectionType::DistancePreserving, &unchanged, &mut counter).unwrap(),
            -1.0
        );
    }

    #[test]
    fn distance_preserving_penalises_diversity_loss() {
        let tsp = square();
        let population: Vec<Tour> = (0..4).map(|_| Tour::new(&[0, 1, 2, 3], &tsp)).collect();
        let mut counter = EdgeCounter::from_population(&population, CounterPolicy::Dense);

        // removes edges present 4 times, adds edges nobody has: loses
        // diversity mass, so fitness is improvement per unit lost
        let improving = cross_delta(&population[0], -8);
        let fitness =
            evaluate(SelectionType::DistancePreserving, &improving, &mut counter).unwrap();
        assert!(fitness > 0.0);
        assert!(fitness < 1e6);

        // histogram restored
        assert_eq!(counter.get(0, 1), 4);
        assert_eq!(counter.unique_directed_edge_count(), 8);
    }

    #[test]
    fn selection_names_round_trip() {
        for selection in [
            SelectionType::Greedy,
            SelectionType::Entropy,
            SelectionType::DistancePreserving,
        ] {
            assert_eq!(
                selection.to_string().parse::<SelectionType>().unwrap(),
                selection
            );
            assert_eq!(
                selection.cli_name().parse::<SelectionType>().unwrap(),
                selection
            );
        }
    }
}
