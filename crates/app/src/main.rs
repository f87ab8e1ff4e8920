use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _, Result};
use clap::error::ErrorKind;
use clap::Parser;
use log::{info, warn};
use rand::Rng;
use rand::SeedableRng;

use eax::{
    execute_ga, read_checkpoint, write_checkpoint, Context, CounterPolicy, EaxVariant, GaParams,
    GaRng, RunBudget, SelectionType, TerminationReason, Tour,
};
use tsp_instance::{load_tsp, PopulationInitializer, Tsp, TwoOpt};

mod report;

/// Above this size the dense n×n edge histogram stops being reasonable.
const DENSE_COUNTER_LIMIT: usize = 1000;

const TWO_OPT_NEAR_RANGE: usize = 50;

#[derive(Debug, Parser)]
#[command(name = "eax", version, about = "EAX genetic algorithm for the symmetric TSP")]
struct Args {
    /// TSP file to load (TSPLIB format)
    #[arg(long)]
    file: PathBuf,

    /// Population size
    #[arg(long = "ps", visible_alias = "population-size")]
    population_size: Option<usize>,

    /// Children produced per crossover
    #[arg(long, default_value_t = 30)]
    children: usize,

    /// Number of independent trials
    #[arg(long, default_value_t = 1)]
    trials: usize,

    /// Seed for the master random generator
    #[arg(long, default_value_t = 5489)]
    seed: u64,

    /// Selection type: greedy, ent or distance
    #[arg(long, default_value = "ent")]
    selection: String,

    /// EAX type: EAX_Rand, Block2 or EAX_<N>_AB
    #[arg(long = "eax-type", default_value = "EAX_1_AB")]
    eax_type: String,

    /// Markdown file results are appended to
    #[arg(long, default_value = "result.md")]
    output: PathBuf,

    /// Wall-clock limit in seconds; on expiry a checkpoint is written
    #[arg(long)]
    timeout: Option<u64>,

    /// Where to save the checkpoint on timeout
    #[arg(long = "checkpoint-save", default_value = "checkpoint.dat")]
    checkpoint_save: PathBuf,

    /// Resume from a previously saved checkpoint
    #[arg(long = "checkpoint-load")]
    checkpoint_load: Option<PathBuf>,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            if matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                print!("{error}");
                std::process::exit(0);
            }
            eprintln!("{error}");
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(error) = run(args) {
        eprintln!("Error: {error:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let tsp = load_tsp(&args.file)
        .with_context(|| format!("cannot load TSP file {}", args.file.display()))?;
    info!(
        "TSP '{}': {} cities, distance type {}",
        tsp.name,
        tsp.city_count(),
        tsp.distance_type
    );

    let deadline = args
        .timeout
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));

    match args.checkpoint_load.clone() {
        Some(path) => resume_from_checkpoint(&args, &path, &tsp, deadline),
        None => execute_trials(&args, &tsp, deadline),
    }
}

fn execute_trials(args: &Args, tsp: &Tsp, deadline: Option<Instant>) -> Result<()> {
    let population_size = match args.population_size {
        Some(size) if size > 0 => size,
        _ => bail!("population size must be greater than 0; specify with --ps <size>"),
    };
    if args.children == 0 {
        bail!("--children must be greater than 0");
    }
    let selection_type: SelectionType = args.selection.parse().map_err(anyhow::Error::msg)?;
    let eax_variant: EaxVariant = args.eax_type.parse().map_err(anyhow::Error::msg)?;

    let two_opt = TwoOpt::new(TWO_OPT_NEAR_RANGE);
    let initializer = PopulationInitializer::new(population_size, tsp.city_count());
    let mut master_rng = GaRng::seed_from_u64(args.seed);

    for trial in 0..args.trials {
        info!("Trial {} of {}", trial + 1, args.trials);
        let local_seed: u64 = master_rng.gen();

        let mut init_rng = GaRng::seed_from_u64(local_seed);
        let population: Vec<Tour> = initializer
            .initialize(&mut init_rng, |path| two_opt.improve(path, tsp))
            .iter()
            .map(|path| Tour::new(path, tsp))
            .collect();

        let params = GaParams {
            population_size,
            num_children: args.children,
            selection_type,
            random_seed: local_seed,
            eax_variant,
        };
        let mut context = Context::new(tsp, params, &population, counter_policy(tsp));

        info!("Starting genetic algorithm (seed {local_seed})");
        let budget = RunBudget {
            deadline,
            max_generations: None,
        };
        let (reason, final_population) = execute_ga(population, &mut context, &budget)?;

        finish_run(args, reason, &context, &final_population)?;
        info!("Trial {} completed", trial + 1);
    }

    Ok(())
}

fn resume_from_checkpoint(
    args: &Args,
    path: &std::path::Path,
    tsp: &Tsp,
    deadline: Option<Instant>,
) -> Result<()> {
    if args.population_size.is_some() {
        warn!("--ps is ignored when --checkpoint-load is given");
    }
    if args.seed != 5489 {
        warn!("--seed is ignored when --checkpoint-load is given");
    }
    if args.children != 30 {
        warn!("--children is ignored when --checkpoint-load is given");
    }
    if args.selection != "ent" {
        warn!("--selection is ignored when --checkpoint-load is given");
    }
    if args.trials != 1 {
        warn!("--trials is ignored when --checkpoint-load is given");
    }

    let file = File::open(path)
        .with_context(|| format!("cannot open checkpoint {}", path.display()))?;
    let (mut context, population) =
        read_checkpoint(BufReader::new(file), tsp, counter_policy(tsp))?;

    info!(
        "Resuming from checkpoint at generation {}",
        context.current_generation
    );
    let budget = RunBudget {
        deadline,
        max_generations: None,
    };
    let (reason, final_population) = execute_ga(population, &mut context, &budget)?;

    finish_run(args, reason, &context, &final_population)
}

/// Timeout checkpoints the run; every other reason lands in the result file.
fn finish_run(
    args: &Args,
    reason: TerminationReason,
    context: &Context<'_>,
    population: &[Tour],
) -> Result<()> {
    if reason == TerminationReason::TimeLimit {
        let file = File::create(&args.checkpoint_save).with_context(|| {
            format!("cannot create checkpoint {}", args.checkpoint_save.display())
        })?;
        let mut writer = BufWriter::new(file);
        write_checkpoint(context, population, &mut writer)?;
        info!("Checkpoint saved to {}", args.checkpoint_save.display());
    } else {
        report::append_result(&args.output, context)?;
        info!(
            "Result saved to {} (best length {}, reason {reason:?})",
            args.output.display(),
            context.best_length
        );
    }
    Ok(())
}

fn counter_policy(tsp: &Tsp) -> CounterPolicy {
    if tsp.city_count() <= DENSE_COUNTER_LIMIT {
        CounterPolicy::Dense
    } else {
        CounterPolicy::Compact
    }
}
