//! # NEAT Lineage
//!
//! NeuroEvolution of Augmenting Topologies (NEAT) with lineage-aware
//! innovation tracking, speciation and a generational population loop.
//!
//! ## Features
//!
//! - **Lineage-Aware Innovation**: two genomes get the same innovation number
//!   for a new connection only if they had the same gene history when the
//!   mutation happened. Convergent mutations in unrelated lineages stay apart.
//! - **Layered Topology**: every node carries a layer and connections only run
//!   forward, so networks are acyclic by construction and evaluate in one pass.
//! - **Arena-Graph Model**: nodes live in a `SlotMap`, genes in historical order.
//! - **Speciation**: compatibility distance, fitness sharing, stale and weak
//!   species pruning with elitist champions.
//! - **Environment Seam**: anything implementing [`Environment`] can be evolved;
//!   the population ticks it, feeds its senses through the genome and reads
//!   back a fitness.
//!
//! ## Quick Start
//!
//! ```rust
//! use neat_lineage::{Genome, InnovationHistory, NeatConfig};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let config = NeatConfig::new(2, 1);
//! let mut rng = ChaCha8Rng::seed_from_u64(42);
//! let mut history = InnovationHistory::new();
//!
//! let mut genome = Genome::minimal(&config);
//! for _ in 0..3 {
//!     genome.add_connection(&mut history, &mut rng);
//! }
//! genome.mutate(&config, &mut history, &mut rng);
//! genome.generate_phenotype();
//!
//! let output = genome.feed_forward(&[0.5, -0.5]).unwrap();
//! assert_eq!(output.len(), 1);
//! ```
//!
//! ## Evolving a Population
//!
//! ```rust
//! use neat_lineage::{Environment, Population, PopulationConfig};
//!
//! #[derive(Clone)]
//! struct Target { guess: f64, done: bool }
//!
//! impl Environment for Target {
//!     fn reset(&mut self) { self.done = false; }
//!     fn sense(&self) -> Vec<f64> { vec![1.0] }
//!     fn act(&mut self, outputs: &[f64]) { self.guess = outputs[0]; }
//!     fn step(&mut self, _dt: f64) { self.done = true; }
//!     fn is_done(&self) -> bool { self.done }
//!     fn fitness(&self) -> f64 { 1.0 - (self.guess - 0.8).abs() }
//! }
//!
//! let config = PopulationConfig::new(20, 1, 1);
//! let mut population = Population::new(config, Target { guess: 0.0, done: false }).unwrap();
//! for _ in 0..5 {
//!     while !population.done() {
//!         population.update(1).unwrap();
//!     }
//!     population.natural_selection().unwrap();
//! }
//! assert_eq!(population.players().len(), 20);
//! ```
//!
//! ## Architecture
//!
//! ### Innovation History
//!
//! The [`InnovationHistory`] is owned by the population and threaded through
//! every mutation. It records each novel mutation with the gene set of the
//! genome it happened on, and reuses a number only on an exact match. Genomes
//! built with [`Genome::fully_connected`] number their bootstrap genes locally
//! from 0; the history starts at 1000 so the two ranges never meet.
//!
//! ### Phenotype
//!
//! A genome evaluates through a cached phenotype: per-node outgoing gene lists
//! and an ascending-layer node order. Structural mutations invalidate it and
//! [`Genome::feed_forward`] refuses to run until
//! [`Genome::generate_phenotype`] rebuilds it.

pub mod activation;
pub mod gene;
pub mod genome;
pub mod individual;
pub mod innovation;
pub mod population;
pub mod snapshot;
pub mod species;

// Re-exports for convenience
pub use activation::Activation;
pub use gene::{ConnectionGene, Node, NodeId};
pub use genome::{FeedForwardError, Genome, NeatConfig};
pub use individual::{Environment, Individual, MIN_FITNESS};
pub use innovation::{InnovationHistory, InnovationRecord, FIRST_INNOVATION};
pub use population::{ConfigError, Population, PopulationConfig, PopulationError};
pub use snapshot::{GeneSnapshot, GenomeSnapshot, NodeSnapshot, SnapshotError};
pub use species::{DistanceNormalizer, Species, SpeciesConfig};
