//! Gene types for NEAT genomes.
//!
//! This module defines the fundamental building blocks of NEAT networks:
//! - [`Node`]: a neuron with a stable number, a layer and activation state
//! - [`ConnectionGene`]: a weighted, innovation-tagged edge between two nodes

use rand::Rng;
use rand_distr::StandardNormal;
use slotmap::new_key_type;

use crate::activation::Activation;

new_key_type! {
    /// Arena key of a node within one genome.
    ///
    /// Keys are genome-local. The node's [`number`](Node::number) is the identity
    /// shared across genomes; keys only survive copies of the same arena.
    pub struct NodeId;
}

/// Connection weights are kept inside `[-WEIGHT_BOUND, WEIGHT_BOUND]`.
pub const WEIGHT_BOUND: f64 = 1.0;

/// Draw a fresh uniform weight in `[-1, 1]`.
#[inline]
pub fn random_weight<R: Rng>(rng: &mut R) -> f64 {
    rng.random_range(-WEIGHT_BOUND..=WEIGHT_BOUND)
}

/// A single neuron of a genome.
///
/// Layer 0 holds the inputs and the bias node. The number never changes after
/// creation; the layer only ever grows as nodes are inserted in front of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    number: u32,
    layer: u32,
    input_sum: f64,
    output_value: f64,
    /// Indices into the owning genome's gene list, rebuilt with the phenotype.
    output_connections: Vec<usize>,
}

impl Node {
    pub(crate) fn new(number: u32, layer: u32) -> Self {
        Self {
            number,
            layer,
            input_sum: 0.0,
            output_value: 0.0,
            output_connections: Vec::new(),
        }
    }

    /// Stable identity of this node, shared by homologous nodes of other genomes.
    #[inline]
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    /// Topological layer (0 = inputs and bias).
    #[inline]
    #[must_use]
    pub const fn layer(&self) -> u32 {
        self.layer
    }

    /// Accumulated weighted input of the evaluation in progress.
    #[inline]
    #[must_use]
    pub const fn input_sum(&self) -> f64 {
        self.input_sum
    }

    /// Output produced by the last evaluation.
    #[inline]
    #[must_use]
    pub const fn output_value(&self) -> f64 {
        self.output_value
    }

    /// Gene indices of the connections leaving this node.
    #[must_use]
    pub fn output_connections(&self) -> &[usize] {
        &self.output_connections
    }

    /// Copy of the structural part of this node with cleared activation state.
    #[must_use]
    pub fn clone_structure(&self) -> Self {
        Self::new(self.number, self.layer)
    }

    /// Compute this node's output for the current evaluation.
    ///
    /// Nodes past layer 0 squash their input sum; inputs and the bias keep
    /// the value assigned to them. The caller propagates the returned value
    /// along [`output_connections`](Self::output_connections).
    pub(crate) fn fire(&mut self, activation: Activation) -> f64 {
        if self.layer != 0 {
            self.output_value = activation.apply(self.input_sum);
        }
        self.output_value
    }

    pub(crate) fn receive(&mut self, value: f64) {
        self.input_sum += value;
    }

    pub(crate) fn set_output(&mut self, value: f64) {
        self.output_value = value;
    }

    pub(crate) fn clear_input(&mut self) {
        self.input_sum = 0.0;
    }

    pub(crate) fn shift_layer(&mut self) {
        self.layer += 1;
    }

    pub(crate) fn set_output_connections(&mut self, connections: Vec<usize>) {
        self.output_connections = connections;
    }
}

/// A connection gene representing a weighted link between two nodes.
///
/// Genes with the same innovation number in different genomes descend from the
/// same structural mutation and are aligned during crossover and speciation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionGene {
    innovation: u64,
    from: NodeId,
    to: NodeId,
    weight: f64,
    enabled: bool,
}

impl ConnectionGene {
    /// Create a new enabled connection.
    #[must_use]
    pub fn new(innovation: u64, from: NodeId, to: NodeId, weight: f64) -> Self {
        Self {
            innovation,
            from,
            to,
            weight,
            enabled: true,
        }
    }

    /// Historical marking of this gene.
    #[inline]
    #[must_use]
    pub const fn innovation(&self) -> u64 {
        self.innovation
    }

    /// Source node.
    #[inline]
    #[must_use]
    pub const fn from(&self) -> NodeId {
        self.from
    }

    /// Target node.
    #[inline]
    #[must_use]
    pub const fn to(&self) -> NodeId {
        self.to
    }

    /// Connection weight.
    #[inline]
    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    /// Whether this connection takes part in evaluation.
    /// Disabled connections are kept for crossover and compatibility.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Mutate the weight.
    ///
    /// With probability `replace_prob` the weight is replaced by a fresh uniform
    /// value; otherwise gaussian noise with standard deviation `perturbation`
    /// is added and the result is clamped back into `[-1, 1]`.
    pub fn mutate_weight<R: Rng>(&mut self, replace_prob: f64, perturbation: f64, rng: &mut R) {
        if rng.random::<f64>() < replace_prob {
            self.weight = random_weight(rng);
        } else {
            let noise: f64 = rng.sample(StandardNormal);
            self.weight = (self.weight + noise * perturbation).clamp(-WEIGHT_BOUND, WEIGHT_BOUND);
        }
    }

    /// Copy of this gene bound to another genome's nodes.
    ///
    /// Weight, innovation number and enabled flag are preserved.
    #[must_use]
    pub fn rebound(&self, from: NodeId, to: NodeId) -> Self {
        Self {
            from,
            to,
            ..self.clone()
        }
    }
}
