//! Initial population construction.

use std::time::Instant;

use log::info;
use rand::seq::SliceRandom;
use rand::Rng;

/// Produces the initial city orders for a GA run: uniformly shuffled
/// permutations, each handed to an improvement hook (typically 2-opt)
/// before use.
pub struct PopulationInitializer {
    population_size: usize,
    city_count: usize,
}

impl PopulationInitializer {
    pub fn new(population_size: usize, city_count: usize) -> Self {
        PopulationInitializer {
            population_size,
            city_count,
        }
    }

    pub fn initialize<R, F>(&self, rng: &mut R, mut improve: F) -> Vec<Vec<usize>>
    where
        R: Rng,
        F: FnMut(&mut Vec<usize>),
    {
        let start = Instant::now();
        let mut population = Vec::with_capacity(self.population_size);
        for _ in 0..self.population_size {
            let mut cities: Vec<usize> = (0..self.city_count).collect();
            cities.shuffle(rng);
            improve(&mut cities);
            population.push(cities);
        }
        info!(
            "Initialized population of {} tours in {:?}",
            self.population_size,
            start.elapsed()
        );
        population
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn produces_permutations() {
        let mut rng = test_rng();
        let init = PopulationInitializer::new(5, 12);
        let population = init.initialize(&mut rng, |_| {});

        assert_eq!(population.len(), 5);
        for path in &population {
            let mut seen = vec![false; 12];
            for &c in path {
                assert!(!seen[c]);
                seen[c] = true;
            }
        }
    }

    #[test]
    fn improvement_hook_sees_every_tour() {
        let mut rng = test_rng();
        let init = PopulationInitializer::new(3, 6);
        let mut calls = 0;
        init.initialize(&mut rng, |_| calls += 1);
        assert_eq!(calls, 3);
    }

    fn test_rng() -> impl Rng {
        rand::rngs::StdRng::seed_from_u64(7)
    }
}
