// Shared builders for the assembler integration tests: well-formed k-mer
// chains and read evidence whose cell weights sum exactly to the node
// weights, so the strict sanity checks can stay enabled.

use skarv::kmer::{pack, Kmer};
use skarv::{
    AssemblyConfig, AssemblyRecord, Assembler, EvidenceTracker, KmerEvidence, KmerSupportNode,
    PathNodeInput,
};

pub fn test_config(k: usize, max_evidence_distance: i32) -> AssemblyConfig {
    let mut cfg = AssemblyConfig::new(k, max_evidence_distance, "test");
    cfg.sanity_checks = true;
    cfg
}

pub fn kmer_chain(k: usize, seq: &str) -> Vec<Kmer> {
    let seq = seq.as_bytes();
    (0..=seq.len() - k)
        .map(|i| pack(&seq[i..i + k], k).expect("valid DNA in test sequence"))
        .collect()
}

pub fn path_node(
    k: usize,
    seq: &str,
    start: i32,
    end: i32,
    weight: u32,
    reference: bool,
) -> PathNodeInput {
    let kmers = kmer_chain(k, seq);
    let weights = vec![weight; kmers.len()];
    PathNodeInput {
        kmers,
        weights,
        first_start: start,
        first_end: end,
        reference,
        collapsed: Vec::new(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn read(
    k: usize,
    id: &str,
    seq: &str,
    start: i32,
    end: i32,
    weight: u32,
    breakend: (i32, i32),
    anchored: bool,
) -> KmerEvidence {
    let support = kmer_chain(k, seq)
        .into_iter()
        .enumerate()
        .map(|(i, kmer)| {
            Some(KmerSupportNode {
                kmer,
                first_start: start + i as i32,
                first_end: end + i as i32,
                weight,
            })
        })
        .collect();
    KmerEvidence {
        id: id.to_string(),
        support,
        breakend,
        quality: weight as f64,
        anchored,
    }
}

/// A tight-interval read with unit weight and no meaningful breakend.
pub fn simple_read(k: usize, id: &str, seq: &str, start: i32, anchored: bool) -> KmerEvidence {
    read(k, id, seq, start, start, 1, (0, 0), anchored)
}

pub struct RunOutcome {
    pub records: Vec<AssemblyRecord>,
    pub contigs_called: u64,
    pub emitted_weight: u64,
    pub remaining_weight: u64,
    pub registered_weight: u64,
    pub active_nodes: usize,
}

/// Drive the assembler over the full input and collect everything.
pub fn run(
    cfg: AssemblyConfig,
    mut nodes: Vec<PathNodeInput>,
    evidence: Vec<KmerEvidence>,
) -> RunOutcome {
    nodes.sort_by_key(|n| (n.first_start, n.kmers[0]));
    let mut tracker = EvidenceTracker::new();
    for ev in evidence {
        tracker.register(ev);
    }
    let mut asm = Assembler::new(cfg, tracker, nodes.into_iter()).expect("valid test config");
    let records: Vec<AssemblyRecord> = asm.by_ref().collect();
    RunOutcome {
        contigs_called: asm.tracking_contigs_called(),
        emitted_weight: asm.emitted_weight(),
        remaining_weight: asm.remaining_weight(),
        registered_weight: asm.total_registered_weight(),
        active_nodes: asm.tracking_active_nodes(),
        records,
    }
}
