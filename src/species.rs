//! Speciation: grouping individuals by genomic compatibility.
//!
//! A species shelters structural innovations from direct competition with the
//! whole population. Members share their fitness, so a big species cannot
//! crowd out small ones purely through numbers.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::genome::{Genome, NeatConfig};
use crate::individual::{Environment, Individual};
use crate::innovation::InnovationHistory;

/// Staleness assigned to a species that lost all its members.
pub const EMPTY_SPECIES_STALENESS: u32 = 200;

/// Chance that a child is a mutated clone rather than a crossover.
const ASEXUAL_REPRODUCTION_PROB: f64 = 0.25;

/// Divisor applied to the excess/disjoint gene count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceNormalizer {
    /// Use the raw count.
    #[default]
    Unit,
    /// Divide by the larger gene count once it reaches `small_genome`.
    GenomeSize {
        /// Gene count below which the raw count is used.
        small_genome: usize,
    },
}

impl DistanceNormalizer {
    /// Normalizing factor for genomes with `a` and `b` genes. Never below 1.
    #[must_use]
    pub fn factor(self, a: usize, b: usize) -> f64 {
        match self {
            Self::Unit => 1.0,
            Self::GenomeSize { small_genome } => {
                let larger = a.max(b);
                if larger < small_genome.max(1) {
                    1.0
                } else {
                    larger as f64
                }
            }
        }
    }
}

/// Compatibility coefficients and threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesConfig {
    /// Weight of the excess/disjoint gene count.
    pub excess_coeff: f64,
    /// Weight of the average weight difference.
    pub weight_diff_coeff: f64,
    /// Genomes closer than this belong to the same species.
    pub compatibility_threshold: f64,
    /// Excess/disjoint normalization.
    pub normalizer: DistanceNormalizer,
}

impl Default for SpeciesConfig {
    fn default() -> Self {
        Self {
            excess_coeff: 1.0,
            weight_diff_coeff: 0.5,
            compatibility_threshold: 3.0,
            normalizer: DistanceNormalizer::Unit,
        }
    }
}

impl SpeciesConfig {
    /// Compatibility distance between two genomes.
    #[must_use]
    pub fn compatibility(&self, a: &Genome, b: &Genome) -> f64 {
        let normalizer = self.normalizer.factor(a.genes().len(), b.genes().len());
        let excess_and_disjoint = a.excess_and_disjoint_count(b) as f64;
        let weight_difference = a.avg_weight_difference(b);
        self.excess_coeff * excess_and_disjoint / normalizer
            + self.weight_diff_coeff * weight_difference
    }
}

/// A group of compatible individuals.
#[derive(Debug, Clone)]
pub struct Species<E> {
    players: Vec<Individual<E>>,
    representative: Genome,
    champion: Individual<E>,
    best_fitness: f64,
    avg_fitness: f64,
    staleness: u32,
}

impl<E: Environment + Clone> Species<E> {
    /// Found a species with `founder` as its only member, representative and champion.
    pub fn new(founder: Individual<E>) -> Self {
        Self {
            representative: founder.brain().clone(),
            champion: founder.clone(),
            best_fitness: founder.fitness(),
            avg_fitness: 0.0,
            staleness: 0,
            players: vec![founder],
        }
    }

    /// Current members, best first once sorted.
    #[must_use]
    pub fn players(&self) -> &[Individual<E>] {
        &self.players
    }

    /// Genome new individuals are compared against.
    #[must_use]
    pub const fn representative(&self) -> &Genome {
        &self.representative
    }

    /// Best individual this species has produced.
    #[must_use]
    pub const fn champion(&self) -> &Individual<E> {
        &self.champion
    }

    /// Fitness of the champion.
    #[must_use]
    pub const fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    /// Mean shared fitness of the current members.
    #[must_use]
    pub const fn avg_fitness(&self) -> f64 {
        self.avg_fitness
    }

    /// Generations since the best fitness last improved.
    #[must_use]
    pub const fn staleness(&self) -> u32 {
        self.staleness
    }

    /// Number of current members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether the species has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Whether `genome` is compatible with this species' representative.
    #[must_use]
    pub fn same_species(&self, genome: &Genome, config: &SpeciesConfig) -> bool {
        config.compatibility(genome, &self.representative) < config.compatibility_threshold
    }

    /// Add a member without checking compatibility.
    pub fn add(&mut self, player: Individual<E>) {
        self.players.push(player);
    }

    pub(crate) fn take_players(&mut self) -> Vec<Individual<E>> {
        std::mem::take(&mut self.players)
    }

    pub(crate) fn score(&mut self) {
        for player in &mut self.players {
            player.calculate_fitness();
        }
    }

    /// Sort members by descending fitness and track improvement.
    ///
    /// A new best resets staleness and replaces representative and champion;
    /// otherwise staleness grows by one. An empty species is marked
    /// [`EMPTY_SPECIES_STALENESS`].
    pub fn sort_species(&mut self) {
        if self.players.is_empty() {
            self.staleness = EMPTY_SPECIES_STALENESS;
            return;
        }

        self.players.sort_by(|a, b| b.fitness().total_cmp(&a.fitness()));

        let best = &self.players[0];
        if best.fitness() > self.best_fitness {
            self.best_fitness = best.fitness();
            self.representative = best.brain().clone();
            self.champion = best.clone();
            self.staleness = 0;
        } else {
            self.staleness += 1;
        }
    }

    /// Drop the weaker half of a sorted species; the middle member survives on odd counts.
    pub fn cull(&mut self) {
        let n = self.players.len();
        if n > 2 {
            self.players.truncate(n - n / 2);
        }
    }

    /// Divide each member's fitness by the member count.
    pub fn apply_fitness_sharing(&mut self) {
        let size = self.players.len() as f64;
        for player in &mut self.players {
            player.set_fitness(player.fitness() / size);
        }
    }

    /// Recompute the mean member fitness; 0 for an empty species.
    pub fn set_avg_fitness(&mut self) {
        self.avg_fitness = if self.players.is_empty() {
            0.0
        } else {
            self.players.iter().map(Individual::fitness).sum::<f64>() / self.players.len() as f64
        };
    }

    /// Fitness-proportionate selection of a member.
    ///
    /// Falls back to the best member when the fitness sum is not positive, and
    /// to the champion when the species is empty.
    pub fn select_player<R: Rng>(&self, rng: &mut R) -> &Individual<E> {
        let Some(first) = self.players.first() else {
            return &self.champion;
        };

        let sum: f64 = self.players.iter().map(Individual::fitness).sum();
        if !(sum.is_finite() && sum > 0.0) {
            return first;
        }

        let draw = rng.random_range(0.0..sum);
        let mut running = 0.0;
        for player in &self.players {
            running += player.fitness();
            if running > draw {
                return player;
            }
        }
        first
    }

    /// Produce a mutated child from this species' members.
    ///
    /// A quarter of children are clones of one selected member; the rest cross
    /// the fitter of two selected members with the other.
    pub fn get_child<R: Rng>(
        &self,
        neat: &NeatConfig,
        history: &mut InnovationHistory,
        rng: &mut R,
    ) -> Individual<E> {
        let mut child = if rng.random::<f64>() < ASEXUAL_REPRODUCTION_PROB {
            let parent = self.select_player(rng);
            parent.offspring(parent.brain().clone())
        } else {
            let a = self.select_player(rng);
            let b = self.select_player(rng);
            let (fitter, weaker) = if a.fitness() < b.fitness() { (b, a) } else { (a, b) };
            fitter.crossover(weaker, rng)
        };

        child.brain_mut().mutate(neat, history, rng);
        child.brain_mut().generate_phenotype();
        child
    }
}
