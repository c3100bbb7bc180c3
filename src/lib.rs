// Positional de Bruijn graph contig assembler for structural variant
// breakend assembly.
//
// The input is a single-pass, position-ordered stream of compressed k-mer
// path nodes produced by an upstream graph builder; the output is a lazy
// stream of assembled breakend/breakpoint records with their supporting
// evidence. Everything in between lives in this crate: the dual graph
// index, the evidence tracker and the memoized best-path callers.

use std::path::PathBuf;

pub mod anchor;
pub mod assemble;
pub mod caller;
pub mod evidence;
pub mod export;
pub mod graph;
pub mod kmer;
pub mod node;
pub mod output;
pub mod repair;

pub use assemble::{Assembler, ContigStats};
pub use evidence::{EvidenceTracker, KmerEvidence, KmerSupportNode};
pub use node::{PathNodeInput, Subnode};
pub use output::{Anchor, AssemblyKind, AssemblyRecord, Direction};

/// Optional diagnostic side-outputs; absence never alters results.
#[derive(Clone, Debug)]
pub struct VisualisationConfig {
    pub directory: PathBuf,
    /// Dump the memoization table per called contig.
    pub contig_memoization: bool,
    /// Write the assembled subgraph in DOT format per emitted record.
    pub assembly_graph: bool,
    /// Write the full loaded graph in DOT format per emitted record.
    pub assembly_graph_full_size: bool,
}

#[derive(Clone, Debug)]
pub struct AssemblyConfig {
    /// K-mer length.
    pub k: usize,
    /// Maximum distance from the first position of a read's first k-mer to
    /// the last position of its last k-mer: read length plus the max-min
    /// concordant fragment size. This is the sliding window width.
    pub max_evidence_distance: i32,
    /// Upper bound on reference-supporting anchor bases to assemble.
    pub max_anchor_length: i32,
    /// Chromosome being assembled; tagged on every output record.
    pub reference_index: u32,
    /// Misassembly trigger: unanchored contigs longer than this multiple of
    /// the concordant fragment size are discarded.
    pub max_expected_breakend_length_multiple: f32,
    pub max_concordant_fragment_size: i32,
    /// Debug tag carried in every log line.
    pub contig_name: String,
    pub visualisation: Option<VisualisationConfig>,
    /// Make sanity-check failures fatal and verify the memoization against
    /// fresh recomputation on every pull. Expensive; tests only.
    pub sanity_checks: bool,
}

impl AssemblyConfig {
    pub fn new(k: usize, max_evidence_distance: i32, contig_name: &str) -> Self {
        AssemblyConfig {
            k,
            max_evidence_distance,
            max_anchor_length: 100,
            reference_index: 0,
            max_expected_breakend_length_multiple: 10.0,
            max_concordant_fragment_size: 300,
            contig_name: contig_name.to_string(),
            visualisation: None,
            sanity_checks: false,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (4..=kmer::MAX_K).contains(&self.k),
            "k={} is invalid: allowed range is 4..={}",
            self.k,
            kmer::MAX_K
        );
        anyhow::ensure!(
            self.max_evidence_distance > 0,
            "max_evidence_distance ({}) must be positive",
            self.max_evidence_distance
        );
        anyhow::ensure!(
            self.max_anchor_length >= 0,
            "max_anchor_length ({}) must be non-negative",
            self.max_anchor_length
        );
        anyhow::ensure!(
            self.max_expected_breakend_length_multiple > 0.0,
            "max_expected_breakend_length_multiple ({}) must be positive",
            self.max_expected_breakend_length_multiple
        );
        anyhow::ensure!(
            self.max_concordant_fragment_size > 0,
            "max_concordant_fragment_size ({}) must be positive",
            self.max_concordant_fragment_size
        );
        Ok(())
    }
}
