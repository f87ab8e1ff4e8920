//! The generational engine.
//!
//! Each generation shuffles the population indices, walks parent pairs
//! round-robin, asks the crossover for up to `num_children` child deltas
//! per pair and records the best-scoring delta as the first parent's
//! pending replacement. Pending deltas are applied in a separate update
//! phase that also feeds the edge-frequency histogram. Termination is
//! checked at the generation boundary: convergence, the two-step
//! stagnation latch (which also drives the stage-1 → stage-2 variant
//! switch), and the caller's wall-clock or generation budget.

use std::time::Instant;

use log::info;
use rand::seq::SliceRandom;

use crate::context::{Context, Stage};
use crate::crossover::{CrossoverDriver, EaxVariant};
use crate::delta::CrossoverDelta;
use crate::eval::evaluate;
use crate::individual::Tour;
use crate::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    NotTerminated,
    Converged,
    Stagnation,
    TimeLimit,
}

/// External stopping conditions, both reported as [`TerminationReason::TimeLimit`].
#[derive(Copy, Clone, Debug, Default)]
pub struct RunBudget {
    pub deadline: Option<Instant>,
    pub max_generations: Option<u64>,
}

impl RunBudget {
    pub fn unlimited() -> Self {
        RunBudget::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        RunBudget {
            deadline: Some(deadline),
            max_generations: None,
        }
    }

    pub fn with_max_generations(max_generations: u64) -> Self {
        RunBudget {
            deadline: None,
            max_generations: Some(max_generations),
        }
    }

    fn exhausted(&self, generation: u64) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
            || self.max_generations.is_some_and(|m| generation >= m)
    }
}

/// Runs the GA to termination and returns the reason with the final
/// population.
pub fn execute_ga(
    mut population: Vec<Tour>,
    context: &mut Context<'_>,
    budget: &RunBudget,
) -> Result<(TerminationReason, Vec<Tour>), Error> {
    let driver = CrossoverDriver::new(context.tsp.city_count());
    let mut pending: Vec<Option<CrossoverDelta>> = Vec::new();
    pending.resize_with(population.len(), || None);

    let mut last_mark = Instant::now();
    loop {
        let (best, mean, worst) = population_stats(&population);
        info!(
            "Generation {}: Best Length = {}, Average Length = {:.2}, Worst Length = {}",
            context.current_generation, best, mean, worst
        );

        let now = Instant::now();
        context.elapsed_time += (now - last_mark).as_secs_f64();
        last_mark = now;

        let reason = check_termination(context, best, mean, budget);
        if reason != TerminationReason::NotTerminated {
            context.final_generation = context.current_generation;
            return Ok((reason, population));
        }

        generational_step(&mut population, &mut pending, context, &driver)?;

        context.current_generation += 1;
        for (index, slot) in pending.iter_mut().enumerate() {
            if let Some(delta) = slot.take() {
                delta.apply_to(&mut population[index])?;
                context.edge_counter.apply_delta(&delta)?;
            }
        }
    }
}

/// One round of parent pairing and pending replacement.
fn generational_step(
    population: &mut Vec<Tour>,
    pending: &mut [Option<CrossoverDelta>],
    context: &mut Context<'_>,
    driver: &CrossoverDriver,
) -> Result<(), Error> {
    let population_size = population.len();
    let mut indices: Vec<usize> = (0..population_size).collect();
    indices.shuffle(&mut context.rng);

    // sentinel copy of the first parent, so parent B is well-defined for
    // the last pair even after earlier pairs record replacements
    population.push(population[indices[0]].clone());

    for i in 0..population_size {
        let parent_a = indices[i];
        let parent_b = indices[(i + 1) % population_size];

        let mut children = driver.cross(
            &population[parent_a],
            &population[parent_b],
            context.params.num_children,
            context.current_variant,
            context.tsp,
            &mut context.rng,
        );
        if children.is_empty() {
            continue;
        }

        let mut best_index = 0;
        let mut best_fitness = evaluate(
            context.params.selection_type,
            &children[0],
            &mut context.edge_counter,
        )?;
        for j in 1..children.len() {
            let fitness = evaluate(
                context.params.selection_type,
                &children[j],
                &mut context.edge_counter,
            )?;
            if fitness > best_fitness {
                best_fitness = fitness;
                best_index = j;
            }
        }

        if best_fitness > 0.0 {
            pending[parent_a] = Some(children.swap_remove(best_index));
        }
    }

    population.pop();
    Ok(())
}

fn population_stats(population: &[Tour]) -> (i64, f64, i64) {
    let mut best = i64::MAX;
    let mut worst = i64::MIN;
    let mut sum = 0i64;
    for tour in population {
        let length = tour.distance();
        best = best.min(length);
        worst = worst.max(length);
        sum += length;
    }
    (best, sum as f64 / population.len() as f64, worst)
}

/// Updates the best-length and stagnation registers from this generation's
/// stats, advances the two-step latch, and decides whether to stop.
fn check_termination(
    context: &mut Context<'_>,
    best: i64,
    mean: f64,
    budget: &RunBudget,
) -> TerminationReason {
    if budget.exhausted(context.current_generation) {
        return TerminationReason::TimeLimit;
    }

    if (best as u64) < context.best_length {
        context.best_length = best as u64;
        context.generation_of_reached_best = context.current_generation;
        context.stagnation_generations = 0;
    } else {
        context.stagnation_generations += 1;
    }

    if mean - (best as f64) < 0.001 {
        return TerminationReason::Converged;
    }

    let stagnation_threshold = 1500 / context.params.num_children as u64;
    match context.stage {
        Stage::Stage1 => {
            if context.g_divided_by_10 == 0
                && context.stagnation_generations >= stagnation_threshold
            {
                context.g_divided_by_10 = context.current_generation / 10;
            } else if context.g_divided_by_10 > 0
                && context.stagnation_generations >= context.g_divided_by_10
            {
                context.stage = Stage::Stage2;
                context.current_variant = EaxVariant::Block2;
                context.stagnation_generations = 0;
                context.generation_of_transition_to_stage2 = context.current_generation;
                context.g_divided_by_10 = 0;
            }
        }
        Stage::Stage2 => {
            if context.g_divided_by_10 == 0
                && context.stagnation_generations >= stagnation_threshold
            {
                context.g_divided_by_10 = (context.current_generation
                    - context.generation_of_transition_to_stage2)
                    / 10;
            } else if context.g_divided_by_10 > 0
                && context.stagnation_generations >= context.g_divided_by_10
            {
                return TerminationReason::Stagnation;
            }
        }
    }

    TerminationReason::NotTerminated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GaParams;
    use crate::edge_counter::{CounterPolicy, EdgeCounter};
    use crate::eval::SelectionType;
    use tsp_instance::{DistanceType, Tsp};

    fn square() -> Tsp {
        let coords = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)];
        Tsp::from_coords("square4", DistanceType::Euc2d, &coords)
    }

    fn params(num_children: usize) -> GaParams {
        GaParams {
            population_size: 4,
            num_children,
            selection_type: SelectionType::Greedy,
            random_seed: 5,
            eax_variant: EaxVariant::NAb(1),
        }
    }

    #[test]
    fn converged_population_returns_immediately() {
        let tsp = square();
        let population: Vec<Tour> = (0..4).map(|_| Tour::new(&[0, 1, 2, 3], &tsp)).collect();
        let mut context = Context::new(&tsp, params(30), &population, CounterPolicy::Compact);

        let (reason, final_population) =
            execute_ga(population, &mut context, &RunBudget::unlimited()).unwrap();

        assert_eq!(reason, TerminationReason::Converged);
        assert_eq!(context.final_generation, 0);
        assert_eq!(context.best_length, 40);
        assert_eq!(final_population.len(), 4);
    }

    #[test]
    fn generation_budget_reports_time_limit() {
        let tsp = square();
        // mixed population so convergence does not fire first
        let population = vec![
            Tour::new(&[0, 1, 2, 3], &tsp),
            Tour::new(&[0, 2, 1, 3], &tsp),
            Tour::new(&[0, 1, 3, 2], &tsp),
            Tour::new(&[0, 3, 1, 2], &tsp),
        ];
        let mut context = Context::new(&tsp, params(2), &population, CounterPolicy::Compact);

        let (reason, _) =
            execute_ga(population, &mut context, &RunBudget::with_max_generations(0)).unwrap();
        assert_eq!(reason, TerminationReason::TimeLimit);
        assert_eq!(context.final_generation, 0);
    }

    /// Drives the latch directly with a population that never improves.
    fn run_latch(context: &mut Context<'_>, generations: u64) -> (TerminationReason, u64) {
        for _ in 0..generations {
            let reason = check_termination(context, 100, 150.0, &RunBudget::unlimited());
            if reason != TerminationReason::NotTerminated {
                return (reason, context.current_generation);
            }
            context.current_generation += 1;
        }
        (TerminationReason::NotTerminated, context.current_generation)
    }

    #[test]
    fn stagnation_latch_switches_stage_then_terminates() {
        let tsp = square();
        let population: Vec<Tour> = (0..4).map(|_| Tour::new(&[0, 1, 2, 3], &tsp)).collect();
        let mut context = Context::new(&tsp, params(30), &population, CounterPolicy::Compact);

        // threshold is 1500/30 = 50 stagnant generations; drive until the
        // stage flips
        let mut transition_generation = None;
        for _ in 0..10_000 {
            let reason = check_termination(&mut context, 100, 150.0, &RunBudget::unlimited());
            if context.stage == Stage::Stage2 && transition_generation.is_none() {
                transition_generation = Some(context.current_generation);
                assert_eq!(context.current_variant, EaxVariant::Block2);
                assert_eq!(context.stagnation_generations, 0);
            }
            if reason == TerminationReason::Stagnation {
                break;
            }
            assert_eq!(reason, TerminationReason::NotTerminated);
            context.current_generation += 1;
        }

        let transition = transition_generation.expect("stage 2 must be reached");
        assert_eq!(context.generation_of_transition_to_stage2, transition);

        // the first improvement resets the counter at generation 0, so
        // stagnation hits 50 at generation 50 and latches 50/10 = 5; the
        // counter already exceeds 5, so the switch lands one check later
        assert_eq!(transition, 51);

        // stage 2 repeats the two-step rule relative to the transition:
        // relatch at 50 stagnant generations, stop once the counter passes
        // the relatched value
        assert_eq!(context.final_generation, 0); // untouched by the latch test
        assert_eq!(context.current_generation, transition + 51);
    }

    #[test]
    fn improvement_resets_the_stagnation_counter() {
        let tsp = square();
        let population: Vec<Tour> = (0..4).map(|_| Tour::new(&[0, 1, 2, 3], &tsp)).collect();
        let mut context = Context::new(&tsp, params(30), &population, CounterPolicy::Compact);

        let (_, _) = run_latch(&mut context, 10);
        assert_eq!(context.stagnation_generations, 9);

        // a better tour appears
        check_termination(&mut context, 90, 150.0, &RunBudget::unlimited());
        assert_eq!(context.stagnation_generations, 0);
        assert_eq!(context.best_length, 90);
        assert_eq!(context.generation_of_reached_best, context.current_generation);
    }

    #[test]
    fn greedy_run_reaches_the_optimum_on_a_small_instance() {
        let coords: Vec<(f64, f64)> = (0..8)
            .map(|i| {
                let t = i as f64 / 8.0 * std::f64::consts::TAU;
                (100.0 * t.cos(), 100.0 * t.sin())
            })
            .collect();
        let tsp = Tsp::from_coords("circle8", DistanceType::Euc2d, &coords);
        let optimum = tsp.tour_length(&(0..8).collect::<Vec<_>>());

        let population = vec![
            Tour::new(&[0, 2, 1, 3, 4, 6, 5, 7], &tsp),
            Tour::new(&[0, 1, 3, 2, 4, 5, 7, 6], &tsp),
            Tour::new(&[0, 3, 1, 2, 5, 4, 6, 7], &tsp),
            Tour::new(&[0, 1, 2, 4, 3, 5, 6, 7], &tsp),
        ];
        let mut context = Context::new(
            &tsp,
            GaParams {
                population_size: 4,
                num_children: 10,
                selection_type: SelectionType::Greedy,
                random_seed: 11,
                eax_variant: EaxVariant::Rand,
            },
            &population,
            CounterPolicy::Compact,
        );

        let initial_best = population.iter().map(Tour::distance).min().unwrap();
        let (reason, final_population) =
            execute_ga(population, &mut context, &RunBudget::with_max_generations(200)).unwrap();

        assert_ne!(reason, TerminationReason::NotTerminated);
        let final_best = final_population.iter().map(Tour::distance).min().unwrap();
        assert!(final_best <= initial_best);
        assert!(final_best >= optimum);
        for tour in &final_population {
            assert!(tour.is_hamiltonian());
            assert_eq!(tour.distance(), tsp.tour_length(&tour.to_path()));
        }

        // the histogram tracked every accepted delta
        let recount =
            EdgeCounter::from_population(&final_population, CounterPolicy::Compact);
        for v1 in 0..8 {
            for v2 in 0..8 {
                assert_eq!(
                    context.edge_counter.get(v1, v2),
                    recount.get(v1, v2),
                    "histogram drifted at ({v1}, {v2})"
                );
            }
        }
        assert_eq!(
            context.edge_counter.unique_directed_edge_count(),
            recount.unique_directed_edge_count()
        );
    }
}
