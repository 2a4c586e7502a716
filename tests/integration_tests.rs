//! Integration tests for neat-lineage.

use std::collections::HashSet;

use neat_lineage::{
    Activation, Environment, Genome, InnovationHistory, NeatConfig, Population, PopulationConfig,
    SpeciesConfig,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
struct ConstantFitness {
    fitness: f64,
    done: bool,
}

impl ConstantFitness {
    fn new(fitness: f64) -> Self {
        Self {
            fitness,
            done: false,
        }
    }
}

impl Environment for ConstantFitness {
    fn reset(&mut self) {
        self.done = false;
    }
    fn sense(&self) -> Vec<f64> {
        vec![0.5, -0.5]
    }
    fn act(&mut self, _outputs: &[f64]) {}
    fn step(&mut self, _dt: f64) {
        self.done = true;
    }
    fn is_done(&self) -> bool {
        self.done
    }
    fn fitness(&self) -> f64 {
        self.fitness
    }
}

fn gene_set(genome: &Genome) -> HashSet<(u64, u32, u32, u64, bool)> {
    genome
        .genes()
        .iter()
        .map(|g| {
            (
                g.innovation(),
                genome.node(g.from()).unwrap().number(),
                genome.node(g.to()).unwrap().number(),
                g.weight().to_bits(),
                g.is_enabled(),
            )
        })
        .collect()
}

#[test]
fn test_end_to_end_scenario() {
    let config = NeatConfig::new(2, 1);
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut history = InnovationHistory::new();

    let mut genome = Genome::new(2, 1);
    for _ in 0..3 {
        genome.add_connection(&mut history, &mut rng);
    }
    genome.mutate(&config, &mut history, &mut rng);
    genome.generate_phenotype();

    assert!(genome.genes().len() >= 3);
    let innovations: HashSet<u64> = genome.innovation_numbers().into_iter().collect();
    assert_eq!(innovations.len(), genome.genes().len());

    let output = genome.feed_forward(&[0.5, -0.5]).unwrap();
    assert_eq!(output.len(), 1);
    assert!(output[0] > 0.0 && output[0] < 1.0);

    let mut population = Population::with_genome(
        PopulationConfig::new(10, 2, 1),
        &genome,
        history,
        ConstantFitness::new(1.0),
    )
    .unwrap();
    while !population.done() {
        population.update(1).unwrap();
    }
    population.natural_selection().unwrap();

    assert_eq!(population.players().len(), 10);
    assert!(population.species().iter().any(|s| s.staleness() == 0));
}

#[test]
fn test_full_evolution_cycle() {
    let config = PopulationConfig {
        neat: NeatConfig {
            add_connection_prob: 0.3,
            add_node_prob: 0.1,
            ..NeatConfig::new(2, 1)
        },
        ..PopulationConfig::new(40, 2, 1)
    };
    let mut population = Population::new(config, ConstantFitness::new(1.0)).unwrap();

    for _ in 0..10 {
        while !population.done() {
            population.update(1).unwrap();
        }
        population.natural_selection().unwrap();
    }

    assert_eq!(population.generation(), 11);
    assert_eq!(population.players().len(), 40);
    assert!(!population.innovation_history().is_empty());
    for player in population.players() {
        let genome = player.brain();
        let innovations: HashSet<u64> = genome.innovation_numbers().into_iter().collect();
        assert_eq!(innovations.len(), genome.genes().len());
        for gene in genome.genes() {
            let from = genome.node(gene.from()).unwrap().layer();
            let to = genome.node(gene.to()).unwrap().layer();
            assert!(from < to);
        }
    }
}

#[test]
fn test_shared_history_aligns_identical_mutations() {
    let config = NeatConfig::new(2, 1);
    let mut rng1 = ChaCha8Rng::seed_from_u64(100);
    let mut rng2 = ChaCha8Rng::seed_from_u64(200);
    let mut history = InnovationHistory::new();

    let mut genome1 = Genome::fully_connected(&config, &mut rng1);
    let mut genome2 = Genome::fully_connected(&config, &mut rng2);

    // Bootstrap genes share their local numbering
    assert_eq!(genome1.innovation_numbers(), genome2.innovation_numbers());

    // Split the same gene in both: the new genes must line up
    let mut split_first = |genome: &mut Genome, rng: &mut ChaCha8Rng| {
        let mut copy = genome.clone();
        loop {
            copy.add_node(&mut history, rng);
            if !copy.genes()[0].is_enabled() {
                break;
            }
            copy = genome.clone();
        }
        *genome = copy;
    };
    split_first(&mut genome1, &mut rng1);
    split_first(&mut genome2, &mut rng2);

    assert_eq!(genome1.innovation_numbers(), genome2.innovation_numbers());
}

#[test]
fn test_convergent_mutations_stay_distinct() {
    let mut history = InnovationHistory::new();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    // Two lineages with different histories
    let mut lineage_a = Genome::new(3, 1);
    let mut lineage_b = Genome::new(3, 1);
    lineage_a.add_connection(&mut history, &mut rng);
    while lineage_b.genes().is_empty()
        || lineage_b.innovation_numbers() == lineage_a.innovation_numbers()
    {
        lineage_b = Genome::new(3, 1);
        lineage_b.add_connection(&mut history, &mut rng);
    }

    // Whatever each adds next, no number is shared beyond what they already shared
    let before: HashSet<u64> = history.records().iter().map(|r| r.innovation()).collect();
    let a_new = lineage_a.add_connection(&mut history, &mut rng).unwrap();
    let b_new = lineage_b.add_connection(&mut history, &mut rng).unwrap();
    assert!(!before.contains(&a_new));
    assert!(!before.contains(&b_new));
    assert_ne!(a_new, b_new);
}

#[test]
fn test_node_split_creates_correct_topology() {
    let config = NeatConfig::new(1, 1);
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut history = InnovationHistory::new();
    let mut genome = Genome::fully_connected(&config, &mut rng);

    // Initial: input, output, bias; input->output and bias->output
    assert_eq!(genome.node_count(), 3);
    assert_eq!(genome.genes().len(), 2);

    let new_node_id = genome.add_node(&mut history, &mut rng).unwrap();

    assert_eq!(genome.node_count(), 4);
    assert_eq!(genome.hidden_count(), 1);
    assert_eq!(genome.genes().len(), 5);
    assert_eq!(genome.enabled_gene_count(), 4);
    assert_eq!(genome.layers(), 3);
    assert_eq!(genome.nodes_in_layer(1), 1);
    assert_eq!(genome.node(new_node_id).unwrap().layer(), 1);
    assert!(!genome.has_phenotype());

    genome.generate_phenotype();
    assert_eq!(genome.feed_forward(&[0.3]).unwrap().len(), 1);
}

#[test]
fn test_compatibility_distance_properties() {
    let config = NeatConfig {
        add_connection_prob: 1.0,
        add_node_prob: 0.5,
        ..NeatConfig::new(2, 1)
    };
    let species = SpeciesConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut history = InnovationHistory::new();

    let genome1 = Genome::fully_connected(&config, &mut rng);
    let genome2 = genome1.clone();
    let mut genome3 = genome1.clone();
    for _ in 0..10 {
        genome3.mutate(&config, &mut history, &mut rng);
    }

    let self_dist = species.compatibility(&genome1, &genome1);
    assert!(self_dist.abs() < 1e-6, "Self distance should be 0, got {self_dist}");

    let clone_dist = species.compatibility(&genome1, &genome2);
    assert!(clone_dist.abs() < 1e-6, "Clone distance should be 0, got {clone_dist}");

    let diff_dist = species.compatibility(&genome1, &genome3);
    assert!(diff_dist > 0.0, "Different genome distance should be > 0, got {diff_dist}");

    let dist_ba = species.compatibility(&genome3, &genome1);
    assert!(
        (diff_dist - dist_ba).abs() < 1e-6,
        "Distance should be symmetric: {diff_dist} vs {dist_ba}"
    );
}

#[test]
fn test_save_and_load_preserves_behavior() {
    let config = NeatConfig::new(4, 2);
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut history = InnovationHistory::new();
    let mut genome = Genome::fully_connected(&config, &mut rng);
    for _ in 0..8 {
        genome.mutate(
            &NeatConfig {
                add_connection_prob: 0.5,
                add_node_prob: 0.5,
                ..config.clone()
            },
            &mut history,
            &mut rng,
        );
    }
    genome.generate_phenotype();

    let save_path = std::env::temp_dir().join("neat_lineage_integration_save.json");
    genome.save(&save_path).expect("Failed to save genome");
    let loaded = Genome::load(&save_path);
    std::fs::remove_file(&save_path).ok();
    let mut loaded = loaded.expect("Failed to load genome");

    assert_eq!(gene_set(&loaded), gene_set(&genome));
    assert_eq!(loaded.layers(), genome.layers());
    assert_eq!(loaded.next_node(), genome.next_node());

    for _ in 0..10 {
        let inputs: Vec<f64> = (0..4).map(|_| rng.random_range(-1.0..1.0)).collect();
        let original = genome.feed_forward(&inputs).unwrap();
        let restored = loaded.feed_forward(&inputs).unwrap();
        for (a, b) in original.iter().zip(&restored) {
            assert_eq!(a.to_bits(), b.to_bits(), "outputs differ for {inputs:?}");
        }
    }
}

#[test]
fn test_all_activation_functions_work() {
    for activation in Activation::ALL {
        let config = NeatConfig {
            activation,
            ..NeatConfig::new(1, 1)
        };
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut genome = Genome::fully_connected(&config, &mut rng);

        let output = genome.feed_forward(&[0.5]).unwrap();
        assert!(
            output[0].is_finite(),
            "Activation {activation:?} produced non-finite output"
        );
    }
}
