//! Run-wide state and its checkpoint format.
//!
//! A [`Context`] is built once per run (or restored from a checkpoint) and
//! mutated only by the generational engine. The checkpoint is a
//! line-oriented, human-readable dump: run parameters, the dense population
//! edge counts, the serialised RNG state, the stage-machine registers and
//! one line per individual.

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::str::FromStr;

use rand::SeedableRng;
use tsp_instance::Tsp;

use crate::crossover::EaxVariant;
use crate::edge_counter::{CounterPolicy, EdgeCounter};
use crate::eval::SelectionType;
use crate::individual::Tour;
use crate::{Error, GaRng};

#[derive(Copy, Clone, Debug)]
pub struct GaParams {
    pub population_size: usize,
    pub num_children: usize,
    pub selection_type: SelectionType,
    pub random_seed: u64,
    pub eax_variant: EaxVariant,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Stage1,
    Stage2,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Stage1 => f.write_str("Stage1"),
            Stage::Stage2 => f.write_str("Stage2"),
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "Stage1" => Ok(Stage::Stage1),
            "Stage2" => Ok(Stage::Stage2),
            other => Err(format!("unknown GA stage '{other}'")),
        }
    }
}

pub struct Context<'t> {
    pub tsp: &'t Tsp,
    pub params: GaParams,
    /// The variant currently in use; flips to Block2 on stage transition.
    pub current_variant: EaxVariant,
    pub edge_counter: EdgeCounter,
    pub rng: GaRng,
    pub best_length: u64,
    pub generation_of_reached_best: u64,
    pub stagnation_generations: u64,
    pub generation_of_transition_to_stage2: u64,
    pub g_divided_by_10: u64,
    pub current_generation: u64,
    pub final_generation: u64,
    pub stage: Stage,
    /// Accumulated wall-clock seconds across checkpointed runs.
    pub elapsed_time: f64,
}

impl<'t> Context<'t> {
    pub fn new(
        tsp: &'t Tsp,
        params: GaParams,
        initial_population: &[Tour],
        policy: CounterPolicy,
    ) -> Self {
        Context {
            tsp,
            params,
            current_variant: params.eax_variant,
            edge_counter: EdgeCounter::from_population(initial_population, policy),
            rng: GaRng::seed_from_u64(params.random_seed),
            best_length: u64::MAX,
            generation_of_reached_best: 0,
            stagnation_generations: 0,
            generation_of_transition_to_stage2: 0,
            g_divided_by_10: 0,
            current_generation: 0,
            final_generation: 0,
            stage: Stage::Stage1,
            elapsed_time: 0.0,
        }
    }
}

/// Writes the context and population in the checkpoint layout.
pub fn write_checkpoint(
    context: &Context<'_>,
    population: &[Tour],
    out: &mut impl Write,
) -> Result<(), Error> {
    let n = context.tsp.city_count();

    writeln!(out, "# Environment")?;
    writeln!(out, "## TSP")?;
    writeln!(out, "name={}", context.tsp.name)?;
    writeln!(out, "## Other Parameters")?;
    writeln!(out, "population_size={}", context.params.population_size)?;
    writeln!(out, "num_children={}", context.params.num_children)?;
    writeln!(out, "selection_type={}", context.params.selection_type)?;
    writeln!(out, "random_seed={}", context.params.random_seed)?;
    writeln!(out, "eax_type={}", context.params.eax_variant)?;

    writeln!(out, "# GA State")?;
    writeln!(out, "## Population Edge Counts")?;
    for v1 in 0..n {
        let row: Vec<String> = (0..n)
            .map(|v2| context.edge_counter.get(v1, v2).to_string())
            .collect();
        writeln!(out, "{}", row.join(" "))?;
    }

    writeln!(out, "## Random Generator State")?;
    let rng_state = serde_json::to_string(&context.rng)
        .map_err(|e| Error::CheckpointFormat(format!("cannot serialise RNG state: {e}")))?;
    writeln!(out, "{rng_state}")?;

    writeln!(out, "## Other State Variables")?;
    writeln!(out, "best_length={}", context.best_length)?;
    writeln!(out, "generation_of_reached_best={}", context.generation_of_reached_best)?;
    writeln!(out, "stagnation_generations={}", context.stagnation_generations)?;
    writeln!(
        out,
        "generation_of_transition_to_stage2={}",
        context.generation_of_transition_to_stage2
    )?;
    writeln!(out, "G_devided_by_10={}", context.g_divided_by_10)?;
    writeln!(out, "current_generation={}", context.current_generation)?;
    writeln!(out, "final_generation={}", context.final_generation)?;
    writeln!(out, "stage={}", context.stage)?;
    writeln!(out, "elapsed_time={}", context.elapsed_time)?;

    writeln!(out, "# Population")?;
    for tour in population {
        let path: Vec<String> = tour.to_path().iter().map(|c| c.to_string()).collect();
        writeln!(out, "{}", path.join(" "))?;
    }

    Ok(())
}

/// Restores a context and population saved by [`write_checkpoint`].
///
/// The TSP instance is supplied by the caller; its `name` must match the
/// checkpoint. Lines are tolerant of trailing whitespace.
pub fn read_checkpoint<'t>(
    input: impl Read,
    tsp: &'t Tsp,
    policy: CounterPolicy,
) -> Result<(Context<'t>, Vec<Tour>), Error> {
    let mut lines = CheckpointLines::new(input);

    lines.expect("# Environment")?;
    lines.expect("## TSP")?;
    let name = lines.value("name=")?;
    if name != tsp.name {
        return Err(Error::CheckpointMismatch {
            expected: name,
            actual: tsp.name.clone(),
        });
    }

    lines.expect("## Other Parameters")?;
    let population_size: usize = lines.parse_value("population_size=")?;
    let num_children: usize = lines.parse_value("num_children=")?;
    let selection_type: SelectionType = lines
        .value("selection_type=")?
        .parse()
        .map_err(Error::CheckpointFormat)?;
    let random_seed: u64 = lines.parse_value("random_seed=")?;
    let eax_variant: EaxVariant = lines
        .value("eax_type=")?
        .parse()
        .map_err(Error::CheckpointFormat)?;

    lines.expect("# GA State")?;
    lines.expect("## Population Edge Counts")?;
    let n = tsp.city_count();
    let mut edge_counter = EdgeCounter::new(n, population_size, policy);
    for v1 in 0..n {
        let line = lines.next_line()?;
        let mut fields = line.split_whitespace();
        for v2 in 0..n {
            let count: usize = fields
                .next()
                .and_then(|f| f.parse().ok())
                .ok_or_else(|| {
                    Error::CheckpointFormat(format!("bad edge count row for city {v1}"))
                })?;
            for _ in 0..count {
                edge_counter.increment(v1, v2);
            }
        }
    }

    lines.expect("## Random Generator State")?;
    let rng: GaRng = serde_json::from_str(&lines.next_line()?)
        .map_err(|e| Error::CheckpointFormat(format!("bad RNG state: {e}")))?;

    lines.expect("## Other State Variables")?;
    let best_length = lines.parse_value("best_length=")?;
    let generation_of_reached_best = lines.parse_value("generation_of_reached_best=")?;
    let stagnation_generations = lines.parse_value("stagnation_generations=")?;
    let generation_of_transition_to_stage2 =
        lines.parse_value("generation_of_transition_to_stage2=")?;
    let g_divided_by_10 = lines.parse_value("G_devided_by_10=")?;
    let current_generation = lines.parse_value("current_generation=")?;
    let final_generation = lines.parse_value("final_generation=")?;
    let stage: Stage = lines.value("stage=")?.parse().map_err(Error::CheckpointFormat)?;
    let elapsed_time: f64 = lines.parse_value("elapsed_time=")?;

    lines.expect("# Population")?;
    let mut population = Vec::with_capacity(population_size);
    while let Some(line) = lines.maybe_next_line()? {
        if line.is_empty() {
            continue;
        }
        let path: Result<Vec<usize>, _> = line.split_whitespace().map(|f| f.parse()).collect();
        let path = path
            .map_err(|_| Error::CheckpointFormat(format!("bad population line '{line}'")))?;
        if path.len() != n {
            return Err(Error::CheckpointFormat(format!(
                "individual has {} cities, expected {n}",
                path.len()
            )));
        }
        population.push(Tour::new(&path, tsp));
    }
    if population.len() != population_size {
        return Err(Error::CheckpointFormat(format!(
            "expected {population_size} individuals, found {}",
            population.len()
        )));
    }

    let params = GaParams {
        population_size,
        num_children,
        selection_type,
        random_seed,
        eax_variant,
    };
    let current_variant = match stage {
        Stage::Stage1 => eax_variant,
        Stage::Stage2 => EaxVariant::Block2,
    };
    let context = Context {
        tsp,
        params,
        current_variant,
        edge_counter,
        rng,
        best_length,
        generation_of_reached_best,
        stagnation_generations,
        generation_of_transition_to_stage2,
        g_divided_by_10,
        current_generation,
        final_generation,
        stage,
        elapsed_time,
    };
    Ok((context, population))
}

struct CheckpointLines<R: Read> {
    reader: BufReader<R>,
    buffer: String,
}

impl<R: Read> CheckpointLines<R> {
    fn new(input: R) -> Self {
        CheckpointLines {
            reader: BufReader::new(input),
            buffer: String::new(),
        }
    }

    fn next_line(&mut self) -> Result<String, Error> {
        self.maybe_next_line()?
            .ok_or_else(|| Error::CheckpointFormat("unexpected end of checkpoint".to_string()))
    }

    fn maybe_next_line(&mut self) -> Result<Option<String>, Error> {
        self.buffer.clear();
        let read = self.reader.read_line(&mut self.buffer)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(self.buffer.trim_end().to_string()))
    }

    fn expect(&mut self, literal: &str) -> Result<(), Error> {
        let line = self.next_line()?;
        if line != literal {
            return Err(Error::CheckpointFormat(format!(
                "expected '{literal}', got '{line}'"
            )));
        }
        Ok(())
    }

    fn value(&mut self, prefix: &str) -> Result<String, Error> {
        let line = self.next_line()?;
        line.strip_prefix(prefix)
            .map(|v| v.to_string())
            .ok_or_else(|| Error::CheckpointFormat(format!("expected '{prefix}...', got '{line}'")))
    }

    fn parse_value<T: FromStr>(&mut self, prefix: &str) -> Result<T, Error> {
        let value = self.value(prefix)?;
        value
            .parse()
            .map_err(|_| Error::CheckpointFormat(format!("bad value '{value}' for '{prefix}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use tsp_instance::DistanceType;

    fn square() -> Tsp {
        let coords = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)];
        Tsp::from_coords("square4", DistanceType::Euc2d, &coords)
    }

    fn params() -> GaParams {
        GaParams {
            population_size: 3,
            num_children: 30,
            selection_type: SelectionType::Entropy,
            random_seed: 99,
            eax_variant: EaxVariant::NAb(1),
        }
    }

    #[test]
    fn checkpoint_round_trips() {
        let tsp = square();
        let population = vec![
            Tour::new(&[0, 1, 2, 3], &tsp),
            Tour::new(&[0, 2, 1, 3], &tsp),
            Tour::new(&[0, 1, 3, 2], &tsp),
        ];
        let mut context = Context::new(&tsp, params(), &population, CounterPolicy::Compact);
        context.best_length = 40;
        context.current_generation = 123;
        context.stagnation_generations = 7;
        context.elapsed_time = 1.5;
        // advance the RNG so its position is non-trivial
        for _ in 0..17 {
            let _: u64 = context.rng.gen();
        }

        let mut bytes = Vec::new();
        write_checkpoint(&context, &population, &mut bytes).unwrap();

        let (mut restored, restored_population) =
            read_checkpoint(bytes.as_slice(), &tsp, CounterPolicy::Compact).unwrap();

        assert_eq!(restored.best_length, 40);
        assert_eq!(restored.current_generation, 123);
        assert_eq!(restored.stagnation_generations, 7);
        assert_eq!(restored.stage, Stage::Stage1);
        assert_eq!(restored.current_variant, EaxVariant::NAb(1));
        assert_eq!(restored_population.len(), 3);
        for (a, b) in population.iter().zip(&restored_population) {
            assert!(a.same_edges(b));
            assert_eq!(a.distance(), b.distance());
        }
        // histogram round-trips
        for v1 in 0..4 {
            for v2 in 0..4 {
                assert_eq!(
                    context.edge_counter.get(v1, v2),
                    restored.edge_counter.get(v1, v2)
                );
            }
        }
        // the RNG continues from exactly where it stopped
        let expected: u64 = context.rng.gen();
        let actual: u64 = restored.rng.gen();
        assert_eq!(expected, actual);
    }

    #[test]
    fn checkpoint_tolerates_trailing_whitespace() {
        let tsp = square();
        let population = vec![
            Tour::new(&[0, 1, 2, 3], &tsp),
            Tour::new(&[0, 2, 1, 3], &tsp),
            Tour::new(&[0, 1, 3, 2], &tsp),
        ];
        let context = Context::new(&tsp, params(), &population, CounterPolicy::Dense);

        let mut bytes = Vec::new();
        write_checkpoint(&context, &population, &mut bytes).unwrap();
        let padded: String = String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| format!("{l}   \n"))
            .collect();

        let restored = read_checkpoint(padded.as_bytes(), &tsp, CounterPolicy::Dense);
        assert!(restored.is_ok());
    }

    #[test]
    fn name_mismatch_is_rejected() {
        let tsp = square();
        let population = vec![
            Tour::new(&[0, 1, 2, 3], &tsp),
            Tour::new(&[0, 2, 1, 3], &tsp),
            Tour::new(&[0, 1, 3, 2], &tsp),
        ];
        let context = Context::new(&tsp, params(), &population, CounterPolicy::Dense);
        let mut bytes = Vec::new();
        write_checkpoint(&context, &population, &mut bytes).unwrap();

        let other = Tsp::from_coords(
            "different",
            DistanceType::Euc2d,
            &[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)],
        );
        assert!(matches!(
            read_checkpoint(bytes.as_slice(), &other, CounterPolicy::Dense),
            Err(Error::CheckpointMismatch { .. })
        ));
    }

    #[test]
    fn stage2_restores_the_block2_variant() {
        let tsp = square();
        let population = vec![
            Tour::new(&[0, 1, 2, 3], &tsp),
            Tour::new(&[0, 2, 1, 3], &tsp),
            Tour::new(&[0, 1, 3, 2], &tsp),
        ];
        let mut context = Context::new(&tsp, params(), &population, CounterPolicy::Dense);
        context.stage = Stage::Stage2;

        let mut bytes = Vec::new();
        write_checkpoint(&context, &population, &mut bytes).unwrap();
        let (restored, _) =
            read_checkpoint(bytes.as_slice(), &tsp, CounterPolicy::Dense).unwrap();
        assert_eq!(restored.stage, Stage::Stage2);
        assert_eq!(restored.current_variant, EaxVariant::Block2);
        // the configured variant is still what the run started with
        assert_eq!(restored.params.eax_variant, EaxVariant::NAb(1));
    }
}
