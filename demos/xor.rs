//! XOR example using a NEAT population.
//!
//! This example demonstrates evolving a neural network to solve the XOR problem,
//! a classic benchmark for neuroevolution algorithms. Each individual plays one
//! episode of four ticks, one per row of the truth table.
//!
//! Run with: `cargo run --example xor`
//! Set `RUST_LOG=debug` for per-species events.

use neat_lineage::{Environment, Genome, NeatConfig, Population, PopulationConfig};
use tracing_subscriber::EnvFilter;

const TRUTH_TABLE: [([f64; 2], f64); 4] = [
    ([0.0, 0.0], 0.0),
    ([0.0, 1.0], 1.0),
    ([1.0, 0.0], 1.0),
    ([1.0, 1.0], 0.0),
];

/// Presents the XOR rows one per tick and accumulates the squared error.
#[derive(Debug, Clone, Default)]
struct XorEnv {
    row: usize,
    error: f64,
}

impl Environment for XorEnv {
    fn reset(&mut self) {
        self.row = 0;
        self.error = 0.0;
    }

    fn sense(&self) -> Vec<f64> {
        TRUTH_TABLE[self.row].0.to_vec()
    }

    fn act(&mut self, outputs: &[f64]) {
        let expected = TRUTH_TABLE[self.row].1;
        self.error += (outputs[0] - expected).powi(2);
    }

    fn step(&mut self, _dt: f64) {
        self.row += 1;
    }

    fn is_done(&self) -> bool {
        self.row >= TRUTH_TABLE.len()
    }

    // Squared to sharpen selection pressure near a perfect score
    fn fitness(&self) -> f64 {
        (4.0 - self.error).powi(2)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("NEAT XOR Example");
    println!("================\n");

    let config = PopulationConfig {
        size: 150,
        neat: NeatConfig {
            add_connection_prob: 0.3,
            add_node_prob: 0.05,
            weight_perturbation: 0.1,
            ..NeatConfig::new(2, 1)
        },
        ..Default::default()
    };
    let generations = 100;

    println!("Population: {}", config.size);
    println!("Generations: {generations}");
    println!("Seed: {}", config.seed);
    println!();

    let mut population = match Population::new(config, XorEnv::default()) {
        Ok(population) => population,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return;
        }
    };

    let mut solution_generation = None;
    for _ in 0..generations {
        while !population.done() {
            if let Err(err) = population.update(TRUTH_TABLE.len()) {
                eprintln!("evaluation failed: {err}");
                return;
            }
        }
        if let Err(err) = population.natural_selection() {
            eprintln!("natural selection failed: {err}");
            return;
        }

        if let Some(best) = population.best_individual() {
            // 3.9² is close enough to a perfect 16
            if best.fitness() >= 15.2 && solution_generation.is_none() {
                solution_generation = Some(population.generation());
            }
        }
    }

    println!();
    println!("Evolution Complete!");
    println!("==================");

    let Some(champion) = population.best_individual() else {
        println!("No champion found");
        return;
    };
    let genome = champion.brain();
    println!("Best fitness: {:.4}", champion.fitness());
    println!("Nodes: {}", genome.node_count());
    println!("Connections: {}", genome.enabled_gene_count());
    println!("Hidden nodes: {}", genome.hidden_count());
    println!("Layers: {}", genome.layers());
    println!("Species: {}", population.species().len());
    println!("Innovations: {}", population.innovation_history().len());

    if let Some(generation) = solution_generation {
        println!("Solution found at generation: {generation}");
    }

    println!("\nChampion XOR outputs:");
    print_truth_table(&mut genome.clone());
}

fn print_truth_table(genome: &mut Genome) {
    for (inputs, expected) in &TRUTH_TABLE {
        let Ok(output) = genome.feed_forward(inputs) else {
            println!("  champion could not be evaluated");
            return;
        };
        let rounded = if output[0] > 0.5 { 1.0 } else { 0.0 };
        let status = if (rounded - expected).abs() < 0.1 {
            "✓"
        } else {
            "✗"
        };
        println!(
            "  {} XOR {} = {:.4} (expected {}) {}",
            inputs[0], inputs[1], output[0], expected, status
        );
    }
}
