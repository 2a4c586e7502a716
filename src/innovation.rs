//! Lineage-aware innovation tracking for NEAT.
//!
//! Every structural mutation that adds a connection gene asks the
//! [`InnovationHistory`] for an innovation number. The history remembers each
//! novel mutation together with the full set of gene innovations the mutating
//! genome carried at that moment. A later mutation reuses a recorded number
//! only when it connects the same node numbers *and* the mutating genome's gene
//! history is identical to the recorded one. Two lineages that independently
//! discover the same connection from different starting points therefore get
//! different numbers, and crossover never aligns genes that are not homologous.
//!
//! The history is an explicit value owned by the population and passed to
//! every mutation; independent populations (and tests) never share counters.

use serde::{Deserialize, Serialize};

/// First innovation number minted by a fresh history.
///
/// Numbers below this are reserved for the genome-local numbering used when
/// a genome is fully connected at construction time.
pub const FIRST_INNOVATION: u64 = 1000;

/// One recorded structural mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnovationRecord {
    from_number: u32,
    to_number: u32,
    innovation: u64,
    /// Sorted gene innovations of the mutating genome before the mutation.
    prior_innovations: Vec<u64>,
}

impl InnovationRecord {
    fn new(from_number: u32, to_number: u32, innovation: u64, genome_innovations: &[u64]) -> Self {
        let mut prior_innovations = genome_innovations.to_vec();
        prior_innovations.sort_unstable();
        Self {
            from_number,
            to_number,
            innovation,
            prior_innovations,
        }
    }

    /// Whether a mutation from `from_number` to `to_number` on a genome whose
    /// genes carry `genome_innovations` is the mutation this record describes.
    ///
    /// Endpoints must match, the gene count must equal the recorded count and
    /// every current gene innovation must appear in the recorded set.
    #[must_use]
    pub fn matches(&self, genome_innovations: &[u64], from_number: u32, to_number: u32) -> bool {
        if genome_innovations.len() != self.prior_innovations.len() {
            return false;
        }

        if from_number != self.from_number || to_number != self.to_number {
            return false;
        }

        genome_innovations
            .iter()
            .all(|innovation| self.prior_innovations.binary_search(innovation).is_ok())
    }

    /// Source node number of the recorded mutation.
    #[must_use]
    pub const fn from_number(&self) -> u32 {
        self.from_number
    }

    /// Target node number of the recorded mutation.
    #[must_use]
    pub const fn to_number(&self) -> u32 {
        self.to_number
    }

    /// Innovation number assigned to the mutation.
    #[must_use]
    pub const fn innovation(&self) -> u64 {
        self.innovation
    }

    /// Gene innovations of the genome the mutation first happened on.
    #[must_use]
    pub fn prior_innovations(&self) -> &[u64] {
        &self.prior_innovations
    }
}

/// Append-only log of structural mutations plus the innovation counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnovationHistory {
    next_innovation: u64,
    records: Vec<InnovationRecord>,
}

impl Default for InnovationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl InnovationHistory {
    /// Create an empty history whose first minted number is [`FIRST_INNOVATION`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_innovation: FIRST_INNOVATION,
            records: Vec::new(),
        }
    }

    /// Innovation number for a connection `from_number -> to_number` added to a
    /// genome whose genes currently carry `genome_innovations`.
    ///
    /// Returns the recorded number when the same mutation already happened on an
    /// identical gene history; otherwise records the mutation and mints a new one.
    pub fn get_innovation_number(
        &mut self,
        from_number: u32,
        to_number: u32,
        genome_innovations: &[u64],
    ) -> u64 {
        if let Some(record) = self
            .records
            .iter()
            .find(|record| record.matches(genome_innovations, from_number, to_number))
        {
            return record.innovation;
        }

        let innovation = self.next_innovation;
        self.records.push(InnovationRecord::new(
            from_number,
            to_number,
            innovation,
            genome_innovations,
        ));
        self.next_innovation += 1;

        tracing::trace!(from_number, to_number, innovation, "new innovation");
        innovation
    }

    /// The number the next novel mutation will receive.
    #[must_use]
    pub const fn next_innovation(&self) -> u64 {
        self.next_innovation
    }

    /// Recorded mutations in the order they happened.
    #[must_use]
    pub fn records(&self) -> &[InnovationRecord] {
        &self.records
    }

    /// Number of recorded mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no mutation has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
