//! Persisted genome layout.
//!
//! Arena keys are process-local, so a saved genome refers to nodes by their
//! stable numbers. Loading validates the whole layout before building the
//! genome; a malformed file is rejected rather than partially recovered.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::activation::Activation;
use crate::gene::{ConnectionGene, Node, NodeId};
use crate::genome::Genome;

/// Failure to load or save a genome.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Reading or writing the file failed.
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not a valid snapshot document.
    #[error("snapshot json is malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// A gene references a node that does not exist.
    #[error("gene {gene} references missing node {node}")]
    DanglingNode {
        /// Innovation number of the offending gene.
        gene: u64,
        /// Node number it references.
        node: u32,
    },
    /// Two genes share an innovation number.
    #[error("innovation number {0} appears more than once")]
    DuplicateInnovation(u64),
    /// Two nodes share a number.
    #[error("node number {0} appears more than once")]
    DuplicateNode(u32),
    /// Two genes join the same pair of nodes.
    #[error("connection {from} -> {to} appears more than once")]
    DuplicateConnection {
        /// Source node number.
        from: u32,
        /// Target node number.
        to: u32,
    },
    /// An input, output or bias node is absent.
    #[error("required node {0} is missing")]
    MissingNode(u32),
    /// A node sits outside the declared layer count.
    #[error("node {node} is on layer {layer} but the genome has {layers} layers")]
    LayerOutOfRange {
        /// Node number.
        node: u32,
        /// Its layer.
        layer: u32,
        /// Declared layer count.
        layers: u32,
    },
    /// Any other structural inconsistency.
    #[error("invalid genome layout: {0}")]
    InvalidShape(String),
}

/// Persisted form of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node number.
    pub number: u32,
    /// Node layer.
    pub layer: u32,
}

/// Persisted form of a [`ConnectionGene`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneSnapshot {
    /// Source node number.
    pub from_node_number: u32,
    /// Target node number.
    pub to_node_number: u32,
    /// Connection weight.
    pub weight: f64,
    /// Innovation number.
    pub innovation_number: u64,
    /// Whether the gene is expressed.
    pub enabled: bool,
}

/// Persisted form of a [`Genome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeSnapshot {
    /// Number of inputs.
    pub inputs: usize,
    /// Number of outputs.
    pub outputs: usize,
    /// Number of layers.
    pub layers: u32,
    /// Number the next inserted node will receive.
    pub next_node: u32,
    /// Number of the bias node.
    pub bias_node: u32,
    /// Activation of hidden and output nodes.
    #[serde(default)]
    pub activation: Activation,
    /// Nodes ordered by number.
    pub nodes: Vec<NodeSnapshot>,
    /// Genes in historical order, disabled ones included.
    pub genes: Vec<GeneSnapshot>,
}

impl Genome {
    /// Capture the persistent structure of this genome.
    #[must_use]
    pub fn to_snapshot(&self) -> GenomeSnapshot {
        let mut nodes: Vec<NodeSnapshot> = self
            .nodes
            .values()
            .map(|n| NodeSnapshot {
                number: n.number(),
                layer: n.layer(),
            })
            .collect();
        nodes.sort_unstable_by_key(|n| n.number);

        let genes = self
            .genes
            .iter()
            .map(|g| GeneSnapshot {
                from_node_number: self.nodes[g.from()].number(),
                to_node_number: self.nodes[g.to()].number(),
                weight: g.weight(),
                innovation_number: g.innovation(),
                enabled: g.is_enabled(),
            })
            .collect();

        GenomeSnapshot {
            inputs: self.inputs,
            outputs: self.outputs,
            layers: self.layers,
            next_node: self.next_node,
            bias_node: self.bias_node(),
            activation: self.activation,
            nodes,
            genes,
        }
    }

    /// Rebuild a genome from a snapshot, validating it first.
    ///
    /// The returned genome has a generated phenotype.
    ///
    /// # Errors
    ///
    /// Returns a [`SnapshotError`] describing the first inconsistency found.
    pub fn from_snapshot(snapshot: &GenomeSnapshot) -> Result<Self, SnapshotError> {
        if snapshot.layers < 2 {
            return Err(SnapshotError::InvalidShape(format!(
                "a genome needs at least 2 layers, found {}",
                snapshot.layers
            )));
        }
        let io_nodes = snapshot.inputs + snapshot.outputs;
        if (snapshot.bias_node as usize) < io_nodes {
            return Err(SnapshotError::InvalidShape(format!(
                "bias node {} overlaps the input/output numbers",
                snapshot.bias_node
            )));
        }

        let mut nodes: SlotMap<NodeId, Node> = SlotMap::with_capacity_and_key(snapshot.nodes.len());
        let mut by_number: HashMap<u32, NodeId> = HashMap::with_capacity(snapshot.nodes.len());
        for node in &snapshot.nodes {
            if node.layer >= snapshot.layers {
                return Err(SnapshotError::LayerOutOfRange {
                    node: node.number,
                    layer: node.layer,
                    layers: snapshot.layers,
                });
            }
            if node.number >= snapshot.next_node {
                return Err(SnapshotError::InvalidShape(format!(
                    "node {} is not below next_node {}",
                    node.number, snapshot.next_node
                )));
            }
            if by_number.contains_key(&node.number) {
                return Err(SnapshotError::DuplicateNode(node.number));
            }
            by_number.insert(node.number, nodes.insert(Node::new(node.number, node.layer)));
        }

        let lookup_on = |number: u32, layer: u32| -> Result<NodeId, SnapshotError> {
            let id = *by_number
                .get(&number)
                .ok_or(SnapshotError::MissingNode(number))?;
            if nodes[id].layer() != layer {
                return Err(SnapshotError::InvalidShape(format!(
                    "node {number} must be on layer {layer}"
                )));
            }
            Ok(id)
        };

        let input_ids = (0..snapshot.inputs as u32)
            .map(|number| lookup_on(number, 0))
            .collect::<Result<Vec<_>, _>>()?;
        let output_ids = (snapshot.inputs as u32..io_nodes as u32)
            .map(|number| lookup_on(number, snapshot.layers - 1))
            .collect::<Result<Vec<_>, _>>()?;
        let bias_id = lookup_on(snapshot.bias_node, 0)?;

        let mut innovations = HashSet::with_capacity(snapshot.genes.len());
        let mut pairs = HashSet::with_capacity(snapshot.genes.len());
        let mut genes = Vec::with_capacity(snapshot.genes.len());
        for gene in &snapshot.genes {
            let endpoint = |number: u32| {
                by_number
                    .get(&number)
                    .copied()
                    .ok_or(SnapshotError::DanglingNode {
                        gene: gene.innovation_number,
                        node: number,
                    })
            };
            let from = endpoint(gene.from_node_number)?;
            let to = endpoint(gene.to_node_number)?;

            if nodes[from].layer() >= nodes[to].layer() {
                return Err(SnapshotError::InvalidShape(format!(
                    "gene {} does not run towards a higher layer",
                    gene.innovation_number
                )));
            }
            if !innovations.insert(gene.innovation_number) {
                return Err(SnapshotError::DuplicateInnovation(gene.innovation_number));
            }
            if !pairs.insert((gene.from_node_number, gene.to_node_number)) {
                return Err(SnapshotError::DuplicateConnection {
                    from: gene.from_node_number,
                    to: gene.to_node_number,
                });
            }

            let mut restored = ConnectionGene::new(gene.innovation_number, from, to, gene.weight);
            restored.set_enabled(gene.enabled);
            genes.push(restored);
        }

        let mut genome = Self {
            inputs: snapshot.inputs,
            outputs: snapshot.outputs,
            layers: snapshot.layers,
            next_node: snapshot.next_node,
            activation: snapshot.activation,
            nodes,
            input_ids,
            output_ids,
            bias_id,
            genes,
            phenotype: None,
        };
        genome.generate_phenotype();
        Ok(genome)
    }

    /// Serialize this genome as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(&self.to_snapshot())?)
    }

    /// Parse and validate a genome from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] for unparseable input and the matching
    /// validation error for a malformed layout.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: GenomeSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(&snapshot)
    }

    /// Save this genome to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a genome from a JSON file written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the read fails or the content is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
