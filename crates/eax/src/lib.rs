//! A genetic algorithm for the symmetric travelling salesperson problem
//! built around the edge assembly crossover (EAX).
//!
//! The crossover decomposes the union graph of two parent tours into
//! alternating AB-cycles ([`ab_cycle`]), assembles subsets of them into
//! E-sets ([`e_set`]), applies an E-set to the first parent to obtain a set
//! of disjoint sub-tours ([`intermediate`]) and repairs those into a single
//! Hamiltonian cycle by greedy reconnection ([`merger`]). Children are
//! produced as compact modification lists ([`delta`]) so that selection,
//! replacement and the population edge-frequency histogram
//! ([`edge_counter`]) all update in time proportional to the change, not to
//! the tour length.
//!
//! [`engine::execute_ga`] runs the generational loop; [`context::Context`]
//! holds the run state and round-trips through the checkpoint format.

use thiserror::Error;

pub mod ab_cycle;
pub mod context;
pub mod crossover;
pub mod delta;
pub mod e_set;
pub mod edge_counter;
pub mod engine;
pub mod eval;
pub mod index_set;
pub mod individual;
pub mod intermediate;
pub mod merger;
pub mod pools;
pub mod tabu;

pub use crate::context::{read_checkpoint, write_checkpoint, Context, GaParams, Stage};
pub use crate::crossover::{CrossoverDriver, EaxVariant};
pub use crate::delta::{CrossoverDelta, DeltaWithIndividual, Modification};
pub use crate::edge_counter::{CounterPolicy, EdgeCounter};
pub use crate::engine::{execute_ga, RunBudget, TerminationReason};
pub use crate::eval::SelectionType;
pub use crate::individual::Tour;

/// The single PRNG stream driving one GA run.
///
/// Components take it by `&mut` in a fixed call order so that a seed fully
/// determines a run; the generator state serialises into checkpoints.
pub type GaRng = rand_pcg::Pcg64;

#[derive(Error, Debug)]
pub enum Error {
    #[error("delta applied to a tour that is not its base")]
    BaseMismatch,
    #[error("edge count underflow for directed edge ({v1}, {v2})")]
    CounterUnderflow { v1: usize, v2: usize },
    #[error("checkpoint was written for TSP '{expected}', not '{actual}'")]
    CheckpointMismatch { expected: String, actual: String },
    #[error("malformed checkpoint: {0}")]
    CheckpointFormat(String),
    #[error("error while reading or writing a checkpoint")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}
