//! Individuals: a genome paired with the environment it is evaluated in.
//!
//! The core never looks inside an environment. It feeds the environment's
//! sensory vector through the genome, hands the outputs back and, once the
//! episode is over, asks for a scalar fitness.

use rand::Rng;

use crate::genome::{FeedForwardError, Genome};

/// Lowest fitness an individual can report.
///
/// Keeps roulette selection and offspring allocation well-defined when an
/// environment reports zero, negative or NaN fitness.
pub const MIN_FITNESS: f64 = 1e-6;

/// The fitness collaborator of an [`Individual`].
///
/// One environment instance belongs to exactly one individual and is ticked
/// only by it. Offspring receive a clone of a parent's environment that is
/// [`reset`](Self::reset) before the next generation starts.
///
/// A typical fitness rewards both progress and efficiency. The asteroids
/// environment this crate grew up with used
/// `((high_score + 1) * 10 + lifespan) * accuracy²`, where accuracy is hits
/// over shots fired.
pub trait Environment {
    /// Return to the initial state of an episode.
    fn reset(&mut self);

    /// Sensory vector; its length must equal the genome's input count.
    fn sense(&self) -> Vec<f64>;

    /// Apply the network's outputs.
    fn act(&mut self, outputs: &[f64]);

    /// Advance the simulation by `dt`.
    fn step(&mut self, dt: f64);

    /// Whether the episode has ended.
    fn is_done(&self) -> bool;

    /// Raw fitness of the finished episode.
    fn fitness(&self) -> f64;
}

/// A genome and its environment.
#[derive(Debug, Clone)]
pub struct Individual<E> {
    brain: Genome,
    env: E,
    fitness: f64,
}

impl<E: Environment + Clone> Individual<E> {
    /// Pair `brain` with `env`. The genome's phenotype is generated if needed.
    pub fn new(mut brain: Genome, env: E) -> Self {
        if !brain.has_phenotype() {
            brain.generate_phenotype();
        }
        Self {
            brain,
            env,
            fitness: 0.0,
        }
    }

    /// The genome driving this individual.
    #[must_use]
    pub const fn brain(&self) -> &Genome {
        &self.brain
    }

    /// Mutable access to the genome.
    pub fn brain_mut(&mut self) -> &mut Genome {
        &mut self.brain
    }

    /// The environment this individual is evaluated in.
    #[must_use]
    pub const fn env(&self) -> &E {
        &self.env
    }

    /// Mutable access to the environment.
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// Fitness from the last [`calculate_fitness`](Self::calculate_fitness),
    /// possibly divided by fitness sharing.
    #[must_use]
    pub const fn fitness(&self) -> f64 {
        self.fitness
    }

    pub(crate) fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
    }

    /// Whether the environment episode is over.
    pub fn is_done(&self) -> bool {
        self.env.is_done()
    }

    /// Sense the environment and run the genome on what was sensed.
    ///
    /// # Errors
    ///
    /// Propagates the genome's [`FeedForwardError`].
    pub fn think(&mut self) -> Result<Vec<f64>, FeedForwardError> {
        let vision = self.env.sense();
        self.brain.feed_forward(&vision)
    }

    /// Run up to `ticks` sense-think-act-step cycles, stopping early once done.
    ///
    /// # Errors
    ///
    /// Propagates the genome's [`FeedForwardError`].
    pub fn update(&mut self, ticks: usize, dt: f64) -> Result<(), FeedForwardError> {
        for _ in 0..ticks {
            if self.env.is_done() {
                break;
            }
            let decision = self.think()?;
            self.env.act(&decision);
            self.env.step(dt);
        }
        Ok(())
    }

    /// Read the environment's fitness, floored at [`MIN_FITNESS`].
    pub fn calculate_fitness(&mut self) -> f64 {
        let raw = self.env.fitness();
        self.fitness = if raw.is_nan() {
            MIN_FITNESS
        } else {
            raw.max(MIN_FITNESS)
        };
        self.fitness
    }

    /// A new individual with `brain` and a fresh copy of this environment.
    #[must_use]
    pub fn offspring(&self, brain: Genome) -> Self {
        let mut env = self.env.clone();
        env.reset();
        Self::new(brain, env)
    }

    /// Cross this individual's genome with `other`'s; `self` must be the fitter.
    #[must_use]
    pub fn crossover<R: Rng>(&self, other: &Self, rng: &mut R) -> Self {
        self.offspring(self.brain.crossover(&other.brain, rng))
    }

    /// Prepare for a new generation: fresh episode, zero fitness, current phenotype.
    pub(crate) fn reset(&mut self) {
        self.env.reset();
        self.fitness = 0.0;
        self.brain.generate_phenotype();
    }
}
