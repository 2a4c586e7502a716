//! The generational loop.
//!
//! A [`Population`] alternates between two phases. While ticking, the driver
//! calls [`update`](Population::update) until every individual's episode is
//! [`done`](Population::done). Then [`natural_selection`](Population::natural_selection)
//! speciates, scores and breeds the next generation:
//!
//! 1. speciate the current individuals
//! 2. score every individual
//! 3. sort members within species and species by best fitness
//! 4. cull each species, share fitness, recompute averages
//! 5. drop empty species, then stale ones (the best two remaining are protected)
//! 6. drop species too weak to earn one offspring (the best is protected)
//! 7. repopulate: champions first, then children by fitness share
//!
//! A selection that fails leaves the population exactly as it was.
//!
//! The population owns the innovation history and a seeded RNG, so a run is
//! reproducible from its [`PopulationConfig`].

use std::ops::Range;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::genome::{FeedForwardError, Genome, NeatConfig};
use crate::individual::{Environment, Individual};
use crate::innovation::InnovationHistory;
use crate::species::{Species, SpeciesConfig};

/// Invalid population configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A population needs at least one individual.
    #[error("population size must be at least 1")]
    EmptyPopulation,
    /// A genome needs at least one output.
    #[error("genomes need at least one output")]
    NoOutputs,
    /// The compatibility threshold must be positive.
    #[error("compatibility threshold must be positive, got {0}")]
    InvalidThreshold(f64),
    /// A probability lies outside `[0, 1]`.
    #[error("{name} must lie in [0, 1], got {value}")]
    ProbabilityOutOfRange {
        /// Field name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// The weight perturbation must be a finite, non-negative standard deviation.
    #[error("weight perturbation must be finite and non-negative, got {0}")]
    InvalidPerturbation(f64),
    /// A seed genome does not have the configured shape.
    #[error("seed genome has {actual_inputs} inputs and {actual_outputs} outputs, expected {expected_inputs} and {expected_outputs}")]
    ShapeMismatch {
        /// Configured inputs.
        expected_inputs: usize,
        /// Configured outputs.
        expected_outputs: usize,
        /// Genome inputs.
        actual_inputs: usize,
        /// Genome outputs.
        actual_outputs: usize,
    },
    /// The configuration document could not be parsed.
    #[error("config json is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// An invariant of natural selection could not be upheld.
#[derive(Debug, thiserror::Error)]
pub enum PopulationError {
    /// Pruning left no species to breed from.
    #[error("no species survived pruning")]
    NoSpecies,
    /// The average fitness sum cannot be used to allocate offspring.
    #[error("average fitness sum {0} cannot allocate offspring")]
    DegenerateFitness(f64),
    /// Evaluating a genome failed while ticking.
    #[error(transparent)]
    Tick(#[from] FeedForwardError),
}

/// Configuration of a population run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Number of individuals per generation.
    pub size: usize,
    /// Individuals ticked together; 0 ticks the whole population at once.
    pub batch_size: usize,
    /// Generations without improvement after which a species is dropped.
    pub stale_limit: u32,
    /// `add_connection` calls applied to each initial genome.
    pub initial_connections: usize,
    /// Start from fully connected genomes instead of empty ones.
    pub fully_connect: bool,
    /// Time step handed to [`Environment::step`].
    pub tick_delta: f64,
    /// Seed of the population's RNG.
    pub seed: u64,
    /// Genome shape and mutation rates.
    pub neat: NeatConfig,
    /// Speciation parameters.
    pub species: SpeciesConfig,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: 150,
            batch_size: 0,
            stale_limit: 15,
            initial_connections: 10,
            fully_connect: false,
            tick_delta: 1.0 / 60.0,
            seed: 42,
            neat: NeatConfig::default(),
            species: SpeciesConfig::default(),
        }
    }
}

impl PopulationConfig {
    /// Default run of `size` individuals with the given genome shape.
    #[must_use]
    pub fn new(size: usize, num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            size,
            neat: NeatConfig::new(num_inputs, num_outputs),
            ..Default::default()
        }
    }

    /// Check the configuration for values the algorithm cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        if self.neat.num_outputs == 0 {
            return Err(ConfigError::NoOutputs);
        }
        let threshold = self.species.compatibility_threshold;
        if threshold.is_nan() || threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        for (name, value) in self.neat.probabilities() {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ProbabilityOutOfRange { name, value });
            }
        }
        let perturbation = self.neat.weight_perturbation;
        if !(perturbation.is_finite() && perturbation >= 0.0) {
            return Err(ConfigError::InvalidPerturbation(perturbation));
        }
        Ok(())
    }

    /// Parse and validate a configuration; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for unparseable input or the validation error.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// A generation of individuals, their species and the shared innovation history.
#[derive(Debug)]
pub struct Population<E> {
    config: PopulationConfig,
    players: Vec<Individual<E>>,
    species: Vec<Species<E>>,
    history: InnovationHistory,
    generation: u64,
    batch_index: usize,
    rng: ChaCha8Rng,
}

impl<E: Environment + Clone> Population<E> {
    /// Create the first generation, each individual with its own copy of `env`.
    ///
    /// Every genome starts empty (or fully connected when configured), receives
    /// `initial_connections` connection attempts and one mutation.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn new(config: PopulationConfig, env: E) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut history = InnovationHistory::new();
        let mut players = Vec::with_capacity(config.size);

        for _ in 0..config.size {
            let mut genome = if config.fully_connect {
                Genome::fully_connected(&config.neat, &mut rng)
            } else {
                Genome::minimal(&config.neat)
            };
            for _ in 0..config.initial_connections {
                genome.add_connection(&mut history, &mut rng);
            }
            genome.mutate(&config.neat, &mut history, &mut rng);
            genome.generate_phenotype();
            players.push(Self::spawn(genome, &env));
        }

        tracing::debug!(
            size = config.size,
            innovations = history.len(),
            "created initial population"
        );

        Ok(Self::from_parts(config, players, history, rng))
    }

    /// Create the first generation from copies of `genome`.
    ///
    /// `history` must be the innovation history the genome was built with so
    /// that later mutations never reuse one of its innovation numbers.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid or the genome's
    /// shape differs from the configured one.
    pub fn with_genome(
        config: PopulationConfig,
        genome: &Genome,
        history: InnovationHistory,
        env: E,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if genome.inputs() != config.neat.num_inputs || genome.outputs() != config.neat.num_outputs
        {
            return Err(ConfigError::ShapeMismatch {
                expected_inputs: config.neat.num_inputs,
                expected_outputs: config.neat.num_outputs,
                actual_inputs: genome.inputs(),
                actual_outputs: genome.outputs(),
            });
        }

        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let players = (0..config.size)
            .map(|_| Self::spawn(genome.clone(), &env))
            .collect();

        Ok(Self::from_parts(config, players, history, rng))
    }

    fn spawn(genome: Genome, env: &E) -> Individual<E> {
        let mut env = env.clone();
        env.reset();
        Individual::new(genome, env)
    }

    fn from_parts(
        config: PopulationConfig,
        players: Vec<Individual<E>>,
        history: InnovationHistory,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            config,
            players,
            species: Vec::new(),
            history,
            generation: 1,
            batch_index: 0,
            rng,
        }
    }

    /// The run configuration.
    #[must_use]
    pub const fn config(&self) -> &PopulationConfig {
        &self.config
    }

    /// Current generation number, starting at 1.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Individuals of the current generation.
    #[must_use]
    pub fn players(&self) -> &[Individual<E>] {
        &self.players
    }

    /// Species as of the last natural selection, best first.
    #[must_use]
    pub fn species(&self) -> &[Species<E>] {
        &self.species
    }

    /// The shared innovation history.
    #[must_use]
    pub const fn innovation_history(&self) -> &InnovationHistory {
        &self.history
    }

    /// Best champion found so far, if a generation has been selected.
    #[must_use]
    pub fn best_individual(&self) -> Option<&Individual<E>> {
        self.species
            .iter()
            .max_by(|a, b| a.best_fitness().total_cmp(&b.best_fitness()))
            .map(Species::champion)
    }

    /// Number of batches in a generation.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        match self.config.batch_size {
            0 => 1,
            size => self.players.len().div_ceil(size),
        }
    }

    /// Index of the batch being ticked.
    #[must_use]
    pub const fn batch_index(&self) -> usize {
        self.batch_index
    }

    fn batch_range(&self) -> Range<usize> {
        match self.config.batch_size {
            0 => 0..self.players.len(),
            size => {
                let start = (self.batch_index * size).min(self.players.len());
                start..(start + size).min(self.players.len())
            }
        }
    }

    /// Individuals of the batch being ticked.
    #[must_use]
    pub fn batch(&self) -> &[Individual<E>] {
        &self.players[self.batch_range()]
    }

    /// Whether every individual of the current batch is done.
    #[must_use]
    pub fn current_batch_done(&self) -> bool {
        self.batch().iter().all(Individual::is_done)
    }

    /// Whether every individual of the generation is done.
    #[must_use]
    pub fn done(&self) -> bool {
        self.players.iter().all(Individual::is_done)
    }

    fn advance_batch(&mut self) {
        while self.current_batch_done() && self.batch_index + 1 < self.batch_count() {
            self.batch_index += 1;
        }
    }

    /// Tick every live individual of the current batch `iterations` times.
    ///
    /// Moves on to the next batch once the current one is done.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::Tick`] if a genome cannot be evaluated.
    pub fn update(&mut self, iterations: usize) -> Result<(), PopulationError> {
        self.advance_batch();

        let dt = self.config.tick_delta;
        let range = self.batch_range();
        for player in &mut self.players[range] {
            if !player.is_done() {
                player.update(iterations, dt)?;
            }
        }

        self.advance_batch();
        Ok(())
    }

    /// Close the generation and breed the next one.
    ///
    /// On error the population is left as it was before the call, with the
    /// same individuals, species and generation number.
    ///
    /// # Errors
    ///
    /// [`PopulationError::NoSpecies`] if pruning leaves nothing to breed from and
    /// [`PopulationError::DegenerateFitness`] if offspring cannot be allocated.
    pub fn natural_selection(&mut self) -> Result<(), PopulationError> {
        for species in &mut self.species {
            species.take_players();
        }
        let checkpoint = (self.players.clone(), self.species.clone());

        if let Err(err) = self.select_survivors() {
            (self.players, self.species) = checkpoint;
            tracing::warn!(generation = self.generation, %err, "natural selection failed");
            return Err(err);
        }

        let mut children = self.repopulate();
        for child in &mut children {
            child.reset();
        }
        self.players = children;
        self.batch_index = 0;
        self.generation += 1;

        tracing::info!(
            generation = self.generation,
            species = self.species.len(),
            innovations = self.history.len(),
            best_fitness = self.species[0].best_fitness(),
            "generation complete"
        );
        Ok(())
    }

    /// Speciate, score and prune until only species worth breeding from remain.
    fn select_survivors(&mut self) -> Result<(), PopulationError> {
        self.speciate();
        for species in &mut self.species {
            species.score();
        }

        for species in &mut self.species {
            species.sort_species();
        }
        self.species.sort_by(|a, b| b.best_fitness().total_cmp(&a.best_fitness()));

        for species in &mut self.species {
            species.cull();
            species.apply_fitness_sharing();
            species.set_avg_fitness();
        }

        self.kill_stale_species();
        if self.species.is_empty() {
            return Err(PopulationError::NoSpecies);
        }
        self.kill_bad_species()
    }

    /// Champions plus offspring proportional to each species' average fitness,
    /// exactly `size` individuals.
    fn repopulate(&mut self) -> Vec<Individual<E>> {
        let avg_sum = self.avg_fitness_sum();
        let size = self.config.size;
        let mut children = Vec::with_capacity(size);
        for species in &self.species {
            children.push(species.champion().clone());

            let share = (species.avg_fitness() / avg_sum * size as f64).floor() as usize;
            for _ in 1..share {
                let child = species.get_child(&self.config.neat, &mut self.history, &mut self.rng);
                children.push(child);
            }
        }
        children.truncate(size);
        while children.len() < size {
            children.push(self.species[0].get_child(
                &self.config.neat,
                &mut self.history,
                &mut self.rng,
            ));
        }
        children
    }

    /// Move every individual into the first compatible species, founding new ones as needed.
    fn speciate(&mut self) {
        for species in &mut self.species {
            species.take_players();
        }

        let config = &self.config.species;
        for player in std::mem::take(&mut self.players) {
            match self
                .species
                .iter_mut()
                .find(|s| s.same_species(player.brain(), config))
            {
                Some(species) => species.add(player),
                None => {
                    self.species.push(Species::new(player));
                    tracing::debug!(species = self.species.len(), "founded species");
                }
            }
        }
    }

    /// Drop empty species, then those that stopped improving; the best two
    /// remaining species always survive.
    fn kill_stale_species(&mut self) {
        let limit = self.config.stale_limit;
        let before = self.species.len();
        self.species.retain(|species| !species.is_empty());
        let mut index = 0;
        self.species.retain(|species| {
            let protected = index < 2;
            index += 1;
            protected || species.staleness() < limit
        });

        let removed = before - self.species.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned stale species");
        }
    }

    /// Drop species whose fitness share earns less than one offspring; the best survives.
    fn kill_bad_species(&mut self) -> Result<(), PopulationError> {
        let avg_sum = self.avg_fitness_sum();
        if !(avg_sum.is_finite() && avg_sum > 0.0) {
            return Err(PopulationError::DegenerateFitness(avg_sum));
        }

        let size = self.config.size as f64;
        let before = self.species.len();
        let mut index = 0;
        self.species.retain(|species| {
            let protected = index == 0;
            index += 1;
            protected || species.avg_fitness() / avg_sum * size >= 1.0
        });

        let removed = before - self.species.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned weak species");
        }
        Ok(())
    }

    fn avg_fitness_sum(&self) -> f64 {
        self.species.iter().map(Species::avg_fitness).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TickEnv {
        ticks: usize,
        limit: usize,
        fitness: f64,
    }

    impl TickEnv {
        fn new(limit: usize, fitness: f64) -> Self {
            Self {
                ticks: 0,
                limit,
                fitness,
            }
        }
    }

    impl Environment for TickEnv {
        fn reset(&mut self) {
            self.ticks = 0;
        }
        fn sense(&self) -> Vec<f64> {
            vec![self.ticks as f64 / 10.0, 1.0]
        }
        fn act(&mut self, _outputs: &[f64]) {}
        fn step(&mut self, _dt: f64) {
            self.ticks += 1;
        }
        fn is_done(&self) -> bool {
            self.ticks >= self.limit
        }
        fn fitness(&self) -> f64 {
            self.fitness
        }
    }

    fn small_config(size: usize) -> PopulationConfig {
        PopulationConfig {
            initial_connections: 2,
            ..PopulationConfig::new(size, 2, 1)
        }
    }

    fn run_episode(population: &mut Population<TickEnv>) {
        while !population.done() {
            population.update(1).unwrap();
        }
    }

    fn seed_genome() -> Genome {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        Genome::fully_connected(&NeatConfig::new(2, 1), &mut rng)
    }

    fn seeded_population(config: PopulationConfig, genome: &Genome) -> Population<TickEnv> {
        Population::with_genome(config, genome, InnovationHistory::new(), TickEnv::new(1, 1.0))
            .unwrap()
    }

    fn founder(genome: &Genome, fitness: f64) -> Individual<TickEnv> {
        let mut individual = Individual::new(genome.clone(), TickEnv::new(1, fitness));
        individual.set_fitness(fitness);
        individual
    }

    fn species_with_avg(genome: &Genome, fitness: f64) -> Species<TickEnv> {
        let mut species = Species::new(founder(genome, fitness));
        species.set_avg_fitness();
        species
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        assert!(PopulationConfig::default().validate().is_ok());

        let config = PopulationConfig {
            size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyPopulation)));

        let mut config = PopulationConfig::default();
        config.neat.num_outputs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NoOutputs)));

        let mut config = PopulationConfig::default();
        config.species.compatibility_threshold = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));

        let mut config = PopulationConfig::default();
        config.neat.add_node_prob = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ProbabilityOutOfRange {
                name: "add_node_prob",
                ..
            })
        ));

        let mut config = PopulationConfig::default();
        config.neat.weight_perturbation = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPerturbation(_))
        ));
    }

    #[test]
    fn test_config_from_json_fills_defaults() {
        let config = PopulationConfig::from_json_str(
            r#"{ "size": 30, "neat": { "num_inputs": 4, "num_outputs": 2 } }"#,
        )
        .unwrap();
        assert_eq!(config.size, 30);
        assert_eq!(config.neat.num_inputs, 4);
        assert_eq!(config.stale_limit, 15);
        assert!((config.neat.add_connection_prob - 0.05).abs() < 1e-12);

        assert!(matches!(
            PopulationConfig::from_json_str(r#"{ "size": 0 }"#),
            Err(ConfigError::EmptyPopulation)
        ));
        assert!(matches!(
            PopulationConfig::from_json_str("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_initial_population() {
        let population = Population::new(small_config(20), TickEnv::new(3, 1.0)).unwrap();

        assert_eq!(population.players().len(), 20);
        assert_eq!(population.generation(), 1);
        assert!(population.species().is_empty());
        assert!(population.best_individual().is_none());
        for player in population.players() {
            assert!(!player.brain().genes().is_empty());
            assert!(player.brain().has_phenotype());
        }
    }

    #[test]
    fn test_with_genome_rejects_wrong_shape() {
        let genome = Genome::new(3, 1);
        let result = Population::with_genome(
            small_config(5),
            &genome,
            InnovationHistory::new(),
            TickEnv::new(1, 1.0),
        );
        assert!(matches!(result, Err(ConfigError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_speciation_conserves_size() {
        let mut population = Population::new(small_config(25), TickEnv::new(1, 1.0)).unwrap();
        population.speciate();

        let members: usize = population.species().iter().map(Species::len).sum();
        assert_eq!(members, 25);
        assert!(population.players().is_empty());
    }

    #[test]
    fn test_natural_selection_conserves_size() {
        let mut population = Population::new(small_config(30), TickEnv::new(2, 1.0)).unwrap();

        for generation in 2..=6 {
            run_episode(&mut population);
            population.natural_selection().unwrap();
            assert_eq!(population.players().len(), 30);
            assert_eq!(population.generation(), generation);
            assert!(!population.species().is_empty());
            assert!(!population.done(), "environments are reset");
            for player in population.players() {
                assert!(player.brain().has_phenotype());
                assert!(player.fitness().abs() < 1e-12);
            }
        }
        assert!(population.best_individual().is_some());
    }

    #[test]
    fn test_stale_species_are_pruned_but_best_survive() {
        let mut population = Population::new(
            PopulationConfig {
                stale_limit: 2,
                ..small_config(20)
            },
            TickEnv::new(1, 1.0),
        )
        .unwrap();

        // Constant fitness never improves, so every species goes stale
        for _ in 0..8 {
            run_episode(&mut population);
            population.natural_selection().unwrap();
            assert_eq!(population.players().len(), 20);
        }
        assert!(!population.species().is_empty());
        for species in population.species().iter().skip(2) {
            assert!(species.staleness() < 2);
        }
    }

    #[test]
    fn test_empty_species_do_not_shield_stale_ones() {
        let genome = seed_genome();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut history = InnovationHistory::new();
        let mut far = genome.clone();
        far.add_node(&mut history, &mut rng);
        far.add_node(&mut history, &mut rng);

        let mut population = Population::with_genome(
            PopulationConfig {
                stale_limit: 2,
                ..small_config(10)
            },
            &genome,
            history,
            TickEnv::new(1, 1.0),
        )
        .unwrap();

        // Two former leaders that nobody joins any more, then a stale species
        let mut gone_first = Species::new(founder(&far, 10.0));
        gone_first.take_players();
        let mut gone_second = Species::new(founder(&far, 9.0));
        gone_second.take_players();
        let mut stale = Species::new(founder(&genome, 1.0));
        for _ in 0..3 {
            stale.sort_species();
        }
        assert_eq!(stale.staleness(), 3);
        population.species = vec![gone_first, gone_second, stale];

        run_episode(&mut population);
        population.natural_selection().unwrap();

        assert_eq!(population.players().len(), 10);
        assert_eq!(population.species().len(), 1);
        assert_eq!(population.species()[0].staleness(), 4);
        assert_eq!(population.generation(), 2);
    }

    #[test]
    fn test_failed_selection_keeps_population() {
        let mut population =
            Population::new(small_config(12), TickEnv::new(1, f64::INFINITY)).unwrap();
        run_episode(&mut population);
        let before: Vec<Vec<u64>> = population
            .players()
            .iter()
            .map(|p| p.brain().innovation_numbers())
            .collect();

        let result = population.natural_selection();
        assert!(matches!(result, Err(PopulationError::DegenerateFitness(_))));

        assert_eq!(population.players().len(), 12);
        assert_eq!(population.generation(), 1);
        assert!(population.species().is_empty());
        let after: Vec<Vec<u64>> = population
            .players()
            .iter()
            .map(|p| p.brain().innovation_numbers())
            .collect();
        assert_eq!(after, before);
    }

    #[test]
    fn test_no_players_means_no_species() {
        let mut population = seeded_population(small_config(4), &seed_genome());
        population.players.clear();

        let result = population.natural_selection();
        assert!(matches!(result, Err(PopulationError::NoSpecies)));
        assert_eq!(population.generation(), 1);
    }

    #[test]
    fn test_weak_species_pruned_unless_best() {
        let genome = seed_genome();
        let mut population = seeded_population(small_config(10), &genome);

        population.species = vec![
            species_with_avg(&genome, 10.0),
            species_with_avg(&genome, 0.01),
        ];
        population.kill_bad_species().unwrap();
        assert_eq!(population.species().len(), 1);
        assert!((population.species()[0].avg_fitness() - 10.0).abs() < 1e-12);

        population.species = vec![
            species_with_avg(&genome, 0.01),
            species_with_avg(&genome, 10.0),
        ];
        population.kill_bad_species().unwrap();
        assert_eq!(population.species().len(), 2, "the first species is protected");
    }

    #[test]
    fn test_zero_fitness_sum_is_degenerate() {
        let genome = seed_genome();
        let mut population = seeded_population(small_config(10), &genome);
        population.species = vec![species_with_avg(&genome, 0.0)];

        assert!(matches!(
            population.kill_bad_species(),
            Err(PopulationError::DegenerateFitness(_))
        ));
    }

    #[test]
    fn test_repopulate_truncates_extra_champions() {
        let genome = seed_genome();
        let mut population = seeded_population(small_config(2), &genome);
        population.species = vec![
            species_with_avg(&genome, 0.1),
            species_with_avg(&genome, 5.0),
            species_with_avg(&genome, 5.0),
        ];

        let children = population.repopulate();
        assert_eq!(children.len(), 2);
        assert!((children[0].fitness() - 0.1).abs() < 1e-12, "champions come first");
        assert!((children[1].fitness() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_repopulate_tops_up_from_best_species() {
        let genome = seed_genome();
        let mut population = seeded_population(small_config(5), &genome);
        population.species = vec![
            species_with_avg(&genome, 1.0),
            species_with_avg(&genome, 1.0),
        ];

        // Each species earns floor(2.5) = 2 places; the fifth is topped up
        let children = population.repopulate();
        assert_eq!(children.len(), 5);
        for child in &children {
            assert!(child.brain().has_phenotype());
        }
    }

    #[test]
    fn test_batches_tick_in_order() {
        let mut population = Population::new(
            PopulationConfig {
                batch_size: 4,
                ..small_config(10)
            },
            TickEnv::new(2, 1.0),
        )
        .unwrap();

        assert_eq!(population.batch_count(), 3);
        assert_eq!(population.batch_index(), 0);
        assert_eq!(population.batch().len(), 4);

        population.update(1).unwrap();
        assert_eq!(population.batch_index(), 0);
        assert_eq!(population.players()[0].env().ticks, 1);
        assert_eq!(population.players()[4].env().ticks, 0, "later batches wait");

        population.update(1).unwrap();
        assert_eq!(population.batch_index(), 1, "finished batch advances");

        population.update(5).unwrap();
        assert_eq!(population.batch_index(), 2);
        assert_eq!(population.batch().len(), 2);

        population.update(5).unwrap();
        assert!(population.current_batch_done());
        assert!(population.done());
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = || {
            let mut population =
                Population::new(small_config(15), TickEnv::new(1, 1.0)).unwrap();
            for _ in 0..3 {
                run_episode(&mut population);
                population.natural_selection().unwrap();
            }
            population
                .players()
                .iter()
                .map(|p| p.brain().innovation_numbers())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
