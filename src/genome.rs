//! NEAT genome implementation with arena-allocated nodes and layered topology.
//!
//! A [`Genome`] stores its nodes in a `SlotMap` arena and its connection genes
//! in historical order. Every node carries a layer; connections always run from
//! a lower layer to a higher one, which keeps the network acyclic without any
//! graph search and gives the evaluation order for free.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::activation::Activation;
use crate::gene::{random_weight, ConnectionGene, Node, NodeId};
use crate::innovation::InnovationHistory;

/// Random pairs tried by `add_connection` before enumerating the eligible ones.
const MAX_PAIR_ATTEMPTS: usize = 64;

/// Chance that a matching gene disabled in either parent stays disabled in the child.
const INHERIT_DISABLED_PROB: f64 = 0.75;

/// Average weight difference reported for genomes without a single matching gene.
pub const NO_MATCH_WEIGHT_DIFFERENCE: f64 = 100.0;

/// Configuration for genome creation and mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeatConfig {
    /// Number of input nodes (excluding bias).
    pub num_inputs: usize,
    /// Number of output nodes.
    pub num_outputs: usize,
    /// Activation applied by hidden and output nodes.
    pub activation: Activation,
    /// Probability that a mutation touches the weights (all of them at once).
    pub weight_mutation_prob: f64,
    /// Probability of replacing a weight instead of perturbing it.
    pub weight_replace_prob: f64,
    /// Standard deviation of the gaussian weight perturbation.
    pub weight_perturbation: f64,
    /// Probability of adding a new connection during mutation.
    pub add_connection_prob: f64,
    /// Probability of adding a new node during mutation.
    pub add_node_prob: f64,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            num_inputs: 2,
            num_outputs: 1,
            activation: Activation::SteepenedSigmoid,
            weight_mutation_prob: 0.8,
            weight_replace_prob: 0.1,
            weight_perturbation: 0.01,
            add_connection_prob: 0.05,
            add_node_prob: 0.03,
        }
    }
}

impl NeatConfig {
    /// Default tuning for a network of the given shape.
    #[must_use]
    pub fn new(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            num_inputs,
            num_outputs,
            ..Default::default()
        }
    }

    /// Slower structural growth with a plain sigmoid.
    #[must_use]
    pub fn conservative(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            num_inputs,
            num_outputs,
            activation: Activation::Sigmoid,
            add_node_prob: 0.01,
            ..Default::default()
        }
    }

    /// The probabilities of this config paired with their field names.
    pub(crate) fn probabilities(&self) -> [(&'static str, f64); 4] {
        [
            ("weight_mutation_prob", self.weight_mutation_prob),
            ("weight_replace_prob", self.weight_replace_prob),
            ("add_connection_prob", self.add_connection_prob),
            ("add_node_prob", self.add_node_prob),
        ]
    }
}

/// Failure to evaluate a genome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedForwardError {
    /// The topology changed since the phenotype was last generated.
    #[error("phenotype is stale; call generate_phenotype() after changing the topology")]
    StalePhenotype,
    /// The input vector does not match the genome's input count.
    #[error("input length mismatch: expected {expected}, got {actual}")]
    InputLengthMismatch {
        /// Number of input nodes.
        expected: usize,
        /// Length of the supplied vector.
        actual: usize,
    },
}

/// A NEAT genome: the nodes and connection genes of one network.
#[derive(Debug)]
pub struct Genome {
    pub(crate) inputs: usize,
    pub(crate) outputs: usize,
    pub(crate) layers: u32,
    pub(crate) next_node: u32,
    pub(crate) activation: Activation,
    pub(crate) nodes: SlotMap<NodeId, Node>,
    pub(crate) input_ids: Vec<NodeId>,
    pub(crate) output_ids: Vec<NodeId>,
    pub(crate) bias_id: NodeId,
    /// Insertion order is historical order.
    pub(crate) genes: Vec<ConnectionGene>,
    /// Evaluation order by ascending layer; `None` after a topology change.
    pub(crate) phenotype: Option<Vec<NodeId>>,
}

impl Genome {
    /// Create a genome with input nodes, a bias node and output nodes, and no connections.
    ///
    /// Inputs are numbered `0..inputs`, outputs `inputs..inputs + outputs` and
    /// the bias follows them. Inputs and bias sit on layer 0, outputs on layer 1.
    #[must_use]
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self::with_activation(inputs, outputs, Activation::default())
    }

    /// Like [`new`](Self::new) with an explicit activation rule.
    #[must_use]
    pub fn with_activation(inputs: usize, outputs: usize, activation: Activation) -> Self {
        let mut nodes: SlotMap<NodeId, Node> = SlotMap::with_key();
        let mut next_node = 0u32;

        let mut input_ids = Vec::with_capacity(inputs);
        for _ in 0..inputs {
            input_ids.push(nodes.insert(Node::new(next_node, 0)));
            next_node += 1;
        }

        let mut output_ids = Vec::with_capacity(outputs);
        for _ in 0..outputs {
            output_ids.push(nodes.insert(Node::new(next_node, 1)));
            next_node += 1;
        }

        let bias_id = nodes.insert(Node::new(next_node, 0));
        next_node += 1;

        Self {
            inputs,
            outputs,
            layers: 2,
            next_node,
            activation,
            nodes,
            input_ids,
            output_ids,
            bias_id,
            genes: Vec::new(),
            phenotype: None,
        }
    }

    /// Create an unconnected genome shaped by `config`.
    #[must_use]
    pub fn minimal(config: &NeatConfig) -> Self {
        Self::with_activation(config.num_inputs, config.num_outputs, config.activation)
    }

    /// Create a genome with every input and the bias connected to every output.
    ///
    /// These bootstrap genes are numbered locally from 0 (inputs first, then
    /// the bias) without consulting any innovation history, so every genome
    /// built this way shares them.
    #[must_use]
    pub fn fully_connected<R: Rng>(config: &NeatConfig, rng: &mut R) -> Self {
        let mut genome = Self::minimal(config);
        let mut local_innovation = 0u64;

        let sources: Vec<NodeId> = genome
            .input_ids
            .iter()
            .copied()
            .chain(std::iter::once(genome.bias_id))
            .collect();

        for from in sources {
            for &to in &genome.output_ids {
                genome
                    .genes
                    .push(ConnectionGene::new(local_innovation, from, to, random_weight(rng)));
                local_innovation += 1;
            }
        }

        genome.generate_phenotype();
        genome
    }

    /// Number of inputs.
    #[must_use]
    pub const fn inputs(&self) -> usize {
        self.inputs
    }

    /// Number of outputs.
    #[must_use]
    pub const fn outputs(&self) -> usize {
        self.outputs
    }

    /// Number of distinct layers.
    #[must_use]
    pub const fn layers(&self) -> u32 {
        self.layers
    }

    /// Number the next inserted node will receive.
    #[must_use]
    pub const fn next_node(&self) -> u32 {
        self.next_node
    }

    /// Activation applied by hidden and output nodes.
    #[must_use]
    pub const fn activation(&self) -> Activation {
        self.activation
    }

    /// Number of the bias node.
    #[must_use]
    pub fn bias_node(&self) -> u32 {
        self.nodes[self.bias_id].number()
    }

    /// Arena key of the bias node.
    #[must_use]
    pub const fn bias_id(&self) -> NodeId {
        self.bias_id
    }

    /// Input node keys in input order.
    #[must_use]
    pub fn input_ids(&self) -> &[NodeId] {
        &self.input_ids
    }

    /// Output node keys in output order.
    #[must_use]
    pub fn output_ids(&self) -> &[NodeId] {
        &self.output_ids
    }

    /// Look up a node by key.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Iterate over all nodes with their keys.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes.iter()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Find a node key by its number.
    #[must_use]
    pub fn node_id(&self, number: u32) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, n)| n.number() == number)
            .map(|(id, _)| id)
    }

    /// Connection genes in historical order.
    #[must_use]
    pub fn genes(&self) -> &[ConnectionGene] {
        &self.genes
    }

    /// Innovation numbers of all genes, in gene order.
    #[must_use]
    pub fn innovation_numbers(&self) -> Vec<u64> {
        self.genes.iter().map(ConnectionGene::innovation).collect()
    }

    /// Find a gene by its innovation number.
    #[must_use]
    pub fn gene_by_innovation(&self, innovation: u64) -> Option<&ConnectionGene> {
        self.genes.iter().find(|g| g.innovation() == innovation)
    }

    /// Number of enabled genes.
    #[must_use]
    pub fn enabled_gene_count(&self) -> usize {
        self.genes.iter().filter(|g| g.is_enabled()).count()
    }

    /// Number of nodes on `layer`.
    #[must_use]
    pub fn nodes_in_layer(&self, layer: u32) -> usize {
        self.nodes.values().filter(|n| n.layer() == layer).count()
    }

    /// Number of nodes that are neither inputs, outputs nor the bias.
    #[must_use]
    pub fn hidden_count(&self) -> usize {
        self.nodes.len() - self.inputs - self.outputs - 1
    }

    /// Whether the phenotype is up to date with the topology.
    #[must_use]
    pub const fn has_phenotype(&self) -> bool {
        self.phenotype.is_some()
    }

    /// Evaluation order of the current phenotype.
    #[must_use]
    pub fn phenotype(&self) -> Option<&[NodeId]> {
        self.phenotype.as_deref()
    }

    /// Rebuild per-node outgoing connections and the ascending-layer evaluation order.
    pub fn generate_phenotype(&mut self) {
        let mut outgoing: HashMap<NodeId, Vec<usize>> = HashMap::with_capacity(self.nodes.len());
        for (index, gene) in self.genes.iter().enumerate() {
            outgoing.entry(gene.from()).or_default().push(index);
        }

        for (id, node) in &mut self.nodes {
            node.set_output_connections(outgoing.remove(&id).unwrap_or_default());
        }

        let mut order: Vec<(u32, u32, NodeId)> = self
            .nodes
            .iter()
            .map(|(id, n)| (n.layer(), n.number(), id))
            .collect();
        order.sort_unstable_by_key(|&(layer, number, _)| (layer, number));

        self.phenotype = Some(order.into_iter().map(|(_, _, id)| id).collect());
    }

    /// Run the network on `inputs` and return one value per output node.
    ///
    /// Input sums are cleared afterwards; output values persist until the
    /// next call overwrites them.
    ///
    /// # Errors
    ///
    /// [`FeedForwardError::StalePhenotype`] if the topology changed since the
    /// last [`generate_phenotype`](Self::generate_phenotype), and
    /// [`FeedForwardError::InputLengthMismatch`] for a wrongly sized input.
    pub fn feed_forward(&mut self, inputs: &[f64]) -> Result<Vec<f64>, FeedForwardError> {
        let Self {
            nodes,
            genes,
            phenotype,
            input_ids,
            output_ids,
            bias_id,
            activation,
            ..
        } = self;

        let order = phenotype.as_deref().ok_or(FeedForwardError::StalePhenotype)?;
        if inputs.len() != input_ids.len() {
            return Err(FeedForwardError::InputLengthMismatch {
                expected: input_ids.len(),
                actual: inputs.len(),
            });
        }

        for (&id, &value) in input_ids.iter().zip(inputs) {
            nodes[id].set_output(value);
        }
        nodes[*bias_id].set_output(1.0);

        for &id in order {
            let value = nodes[id].fire(*activation);
            for k in 0..nodes[id].output_connections().len() {
                let gene = &genes[nodes[id].output_connections()[k]];
                if gene.is_enabled() {
                    nodes[gene.to()].receive(gene.weight() * value);
                }
            }
        }

        let outputs = output_ids.iter().map(|&id| nodes[id].output_value()).collect();

        for node in nodes.values_mut() {
            node.clear_input();
        }

        Ok(outputs)
    }

    /// Whether a gene already joins `a` and `b` (in the direction their layers allow).
    ///
    /// Nodes on the same layer are never connected. Disabled genes count, so a
    /// pair is never wired twice.
    #[must_use]
    pub fn is_connected(&self, a: NodeId, b: NodeId) -> bool {
        let (Some(node_a), Some(node_b)) = (self.nodes.get(a), self.nodes.get(b)) else {
            return false;
        };
        if node_a.layer() == node_b.layer() {
            return false;
        }
        let (from, to) = if node_a.layer() < node_b.layer() {
            (a, b)
        } else {
            (b, a)
        };
        self.genes.iter().any(|g| g.from() == from && g.to() == to)
    }

    /// Whether every pair of nodes on different layers is already connected.
    #[must_use]
    pub fn is_fully_connected(&self) -> bool {
        let mut per_layer = vec![0usize; self.layers as usize];
        for node in self.nodes.values() {
            per_layer[node.layer() as usize] += 1;
        }

        let mut max_connections = 0;
        let mut later = self.nodes.len();
        for count in per_layer {
            later -= count;
            max_connections += count * later;
        }

        self.genes.len() >= max_connections
    }

    fn can_connect(&self, a: NodeId, b: NodeId) -> bool {
        self.nodes[a].layer() != self.nodes[b].layer() && !self.is_connected(a, b)
    }

    /// Append a gene `from -> to` numbered through `history`.
    fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        weight: f64,
        history: &mut InnovationHistory,
    ) -> u64 {
        let innovation = history.get_innovation_number(
            self.nodes[from].number(),
            self.nodes[to].number(),
            &self.innovation_numbers(),
        );
        self.genes.push(ConnectionGene::new(innovation, from, to, weight));
        self.phenotype = None;
        innovation
    }

    /// Connect two random unconnected nodes on different layers.
    ///
    /// Returns the new gene's innovation number, or `None` when the genome is
    /// already fully connected.
    pub fn add_connection<R: Rng>(
        &mut self,
        history: &mut InnovationHistory,
        rng: &mut R,
    ) -> Option<u64> {
        if self.is_fully_connected() {
            return None;
        }

        let ids: Vec<NodeId> = self.nodes.keys().collect();
        let mut pair = None;
        for _ in 0..MAX_PAIR_ATTEMPTS {
            let a = ids[rng.random_range(0..ids.len())];
            let b = ids[rng.random_range(0..ids.len())];
            if self.can_connect(a, b) {
                pair = Some((a, b));
                break;
            }
        }

        let (a, b) = match pair {
            Some(pair) => pair,
            None => {
                tracing::warn!("random pair search exhausted; enumerating eligible pairs");
                let eligible: Vec<(NodeId, NodeId)> = ids
                    .iter()
                    .flat_map(|&a| ids.iter().map(move |&b| (a, b)))
                    .filter(|&(a, b)| {
                        self.nodes[a].layer() < self.nodes[b].layer() && !self.is_connected(a, b)
                    })
                    .collect();
                if eligible.is_empty() {
                    return None;
                }
                eligible[rng.random_range(0..eligible.len())]
            }
        };

        let (from, to) = if self.nodes[a].layer() < self.nodes[b].layer() {
            (a, b)
        } else {
            (b, a)
        };

        let innovation = self.connect(from, to, random_weight(rng), history);
        tracing::trace!(innovation, "added connection");
        Some(innovation)
    }

    /// Split a random enabled connection with a new node.
    ///
    /// The split gene is disabled and replaced by `from -> new` (weight 1) and
    /// `new -> to` (original weight); the bias feeds the new node with weight 0
    /// unless the split gene already started at the bias. When the new node
    /// lands on the target's layer, that layer and everything past it move up.
    ///
    /// A genome without genes gets a connection instead and `None` is returned.
    /// Gene selection avoids the bias's edges unless that edge is the only
    /// gene; with nothing eligible the call is a no-op.
    pub fn add_node<R: Rng>(
        &mut self,
        history: &mut InnovationHistory,
        rng: &mut R,
    ) -> Option<NodeId> {
        if self.genes.is_empty() {
            self.add_connection(history, rng);
            return None;
        }

        let mut candidates: Vec<usize> = self
            .genes
            .iter()
            .enumerate()
            .filter(|(_, g)| g.is_enabled() && g.from() != self.bias_id)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() && self.genes.len() == 1 && self.genes[0].is_enabled() {
            candidates.push(0);
        }
        if candidates.is_empty() {
            tracing::trace!("no connection eligible for a node split");
            return None;
        }

        let index = candidates[rng.random_range(0..candidates.len())];
        self.genes[index].set_enabled(false);
        let split = self.genes[index].clone();

        let layer = self.nodes[split.from()].layer() + 1;
        let new_id = self.nodes.insert(Node::new(self.next_node, layer));
        self.next_node += 1;

        self.connect(split.from(), new_id, 1.0, history);
        self.connect(new_id, split.to(), split.weight(), history);
        if split.from() != self.bias_id {
            self.connect(self.bias_id, new_id, 0.0, history);
        }

        if layer == self.nodes[split.to()].layer() {
            for (id, node) in &mut self.nodes {
                if id != new_id && node.layer() >= layer {
                    node.shift_layer();
                }
            }
            self.layers += 1;
        }

        self.phenotype = None;
        tracing::trace!(node = self.next_node - 1, layer, "added node");
        Some(new_id)
    }

    /// Apply the configured mutations.
    ///
    /// A genome without genes first receives a connection. Then, as independent
    /// trials: all weights mutate, a connection is added, a node is added.
    pub fn mutate<R: Rng>(
        &mut self,
        config: &NeatConfig,
        history: &mut InnovationHistory,
        rng: &mut R,
    ) {
        if self.genes.is_empty() {
            self.add_connection(history, rng);
        }

        if rng.random::<f64>() < config.weight_mutation_prob {
            for gene in &mut self.genes {
                gene.mutate_weight(config.weight_replace_prob, config.weight_perturbation, rng);
            }
        }

        if rng.random::<f64>() < config.add_connection_prob {
            self.add_connection(history, rng);
        }

        if rng.random::<f64>() < config.add_node_prob {
            self.add_node(history, rng);
        }
    }

    /// Cross this genome with `other`; `self` must be the fitter (or equal) parent.
    ///
    /// Matching genes come from either parent with equal odds and stay disabled
    /// 75% of the time when either parent has them disabled. Disjoint and
    /// excess genes come only from `self`, and so do the child's nodes.
    /// They keep their enabled flag as is; a disabled one is never switched back on.
    #[must_use]
    pub fn crossover<R: Rng>(&self, other: &Self, rng: &mut R) -> Self {
        let mut child = self.structure_copy();
        child.genes = Vec::with_capacity(self.genes.len());

        for gene in &self.genes {
            let Some(other_gene) = other.gene_by_innovation(gene.innovation()) else {
                child.genes.push(gene.clone());
                continue;
            };

            let enabled = if !gene.is_enabled() || !other_gene.is_enabled() {
                rng.random::<f64>() >= INHERIT_DISABLED_PROB
            } else {
                true
            };

            let mut inherited = if rng.random_bool(0.5) {
                gene.clone()
            } else {
                self.rebind_from(other, other_gene)
                    .unwrap_or_else(|| gene.clone())
            };
            inherited.set_enabled(enabled);
            child.genes.push(inherited);
        }

        child.generate_phenotype();
        child
    }

    /// Bind a gene of `other` to this genome's nodes by node number.
    fn rebind_from(&self, other: &Self, gene: &ConnectionGene) -> Option<ConnectionGene> {
        let from = self.node_id(other.nodes.get(gene.from())?.number())?;
        let to = self.node_id(other.nodes.get(gene.to())?.number())?;
        Some(gene.rebound(from, to))
    }

    /// Copy of everything but the evaluation state; node keys are preserved.
    fn structure_copy(&self) -> Self {
        let mut nodes = self.nodes.clone();
        for node in nodes.values_mut() {
            *node = node.clone_structure();
        }
        Self {
            inputs: self.inputs,
            outputs: self.outputs,
            layers: self.layers,
            next_node: self.next_node,
            activation: self.activation,
            nodes,
            input_ids: self.input_ids.clone(),
            output_ids: self.output_ids.clone(),
            bias_id: self.bias_id,
            genes: self.genes.clone(),
            phenotype: None,
        }
    }

    /// Genes present in only one of the two genomes.
    #[must_use]
    pub fn excess_and_disjoint_count(&self, other: &Self) -> usize {
        let matching = self
            .genes
            .iter()
            .filter(|g| other.gene_by_innovation(g.innovation()).is_some())
            .count();
        self.genes.len() + other.genes.len() - 2 * matching
    }

    /// Mean absolute weight difference over matching genes.
    ///
    /// 0 when either genome has no genes, [`NO_MATCH_WEIGHT_DIFFERENCE`] when
    /// they share none.
    #[must_use]
    pub fn avg_weight_difference(&self, other: &Self) -> f64 {
        if self.genes.is_empty() || other.genes.is_empty() {
            return 0.0;
        }

        let other_weights: HashMap<u64, f64> = other
            .genes
            .iter()
            .map(|g| (g.innovation(), g.weight()))
            .collect();

        let mut matching = 0usize;
        let mut total = 0.0;
        for gene in &self.genes {
            if let Some(weight) = other_weights.get(&gene.innovation()) {
                matching += 1;
                total += (gene.weight() - weight).abs();
            }
        }

        if matching == 0 {
            return NO_MATCH_WEIGHT_DIFFERENCE;
        }
        total / matching as f64
    }
}

impl Clone for Genome {
    /// Deep copy with fresh evaluation state and a regenerated phenotype.
    fn clone(&self) -> Self {
        let mut copy = self.structure_copy();
        copy.generate_phenotype();
        copy
    }
}
