//! Result rows appended to a Markdown table.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use eax::Context;

const HEADER: &str = "# EAX Genetic Algorithm Results\n\
\n\
| TSP Name | Population Size | Selection Type | Children per Crossover | Seed | Best Length | Generation Reached Best | Total Generations | Time (s) |\n\
|----------|-----------------|----------------|-----------------------|------|-------------|------------------------|-------------------|----------|\n";

/// Appends one result row; the header is written only when the file is
/// empty or absent.
pub fn append_result(path: &Path, context: &Context<'_>) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() == 0 {
        file.write_all(HEADER.as_bytes())?;
    }

    writeln!(
        file,
        "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
        context.tsp.name,
        context.params.population_size,
        context.params.selection_type.cli_name(),
        context.params.num_children,
        context.params.random_seed,
        context.best_length,
        context.generation_of_reached_best,
        context.final_generation,
        context.elapsed_time,
    )
}
