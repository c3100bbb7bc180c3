// Evidence tracking.
//
// Each read (or read pair) contributes a trace of (kmer, position interval,
// weight) support cells. The tracker keeps the many-to-many association
// between evidence and cells both ways: by evidence id for registration and
// by k-mer for the support/untrack queries the assembler issues per contig.

use std::hash::BuildHasherDefault;

use ahash::RandomState;
use hashbrown::HashMap;
use rustc_hash::FxHasher;
use smallvec::SmallVec;

use crate::graph::{overlaps, Graph};
use crate::kmer::Kmer;
use crate::node::Subnode;

type FastHashMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// One (kmer, position-interval) cell contributed by a single evidence item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KmerSupportNode {
    pub kmer: Kmer,
    pub first_start: i32,
    pub first_end: i32,
    pub weight: u32,
}

impl KmerSupportNode {
    #[inline]
    pub fn last_end(&self) -> i32 {
        self.first_end
    }
}

/// A read-derived evidence item: its k-mer trace plus the breakend interval
/// and quality used by the unanchored breakend model.
#[derive(Clone, Debug)]
pub struct KmerEvidence {
    pub id: String,
    /// Per read position; None marks an unusable base.
    pub support: Vec<Option<KmerSupportNode>>,
    pub breakend: (i32, i32),
    pub quality: f64,
    /// Whether any part of the read is anchored to the reference allele.
    pub anchored: bool,
}

impl KmerEvidence {
    pub fn total_weight(&self) -> u64 {
        self.support
            .iter()
            .flatten()
            .map(|s| s.weight as u64)
            .sum()
    }

    pub fn max_last_end(&self) -> i32 {
        self.support
            .iter()
            .flatten()
            .map(|s| s.last_end())
            .max()
            .unwrap_or(i32::MIN)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct SupportRef {
    evidence: u32,
    offset: u32,
}

pub struct EvidenceTracker {
    evidence: Vec<Option<KmerEvidence>>,
    by_id: HashMap<String, u32, RandomState>,
    by_kmer: FastHashMap<Kmer, SmallVec<[SupportRef; 4]>>,
    total_registered_weight: u64,
}

impl EvidenceTracker {
    pub fn new() -> Self {
        EvidenceTracker {
            evidence: Vec::new(),
            by_id: HashMap::with_hasher(RandomState::new()),
            by_kmer: FastHashMap::default(),
            total_registered_weight: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Total support weight ever registered; the conservation check balances
    /// this against emitted plus remaining graph weight.
    pub fn total_registered_weight(&self) -> u64 {
        self.total_registered_weight
    }

    pub fn register(&mut self, ev: KmerEvidence) {
        assert!(
            !self.by_id.contains_key(&ev.id),
            "duplicate evidence registration: {}",
            ev.id
        );
        let idx = self.evidence.len() as u32;
        self.total_registered_weight += ev.total_weight();
        for (offset, cell) in ev.support.iter().enumerate() {
            if let Some(cell) = cell {
                self.by_kmer.entry(cell.kmer).or_default().push(SupportRef {
                    evidence: idx,
                    offset: offset as u32,
                });
            }
        }
        self.by_id.insert(ev.id.clone(), idx);
        self.evidence.push(Some(ev));
    }

    fn unregister_idx(&mut self, idx: u32) -> Option<KmerEvidence> {
        let ev = self.evidence.get_mut(idx as usize)?.take()?;
        self.by_id.remove(&ev.id);
        for cell in ev.support.iter().flatten() {
            if let Some(bucket) = self.by_kmer.get_mut(&cell.kmer) {
                bucket.retain(|r| r.evidence != idx);
                if bucket.is_empty() {
                    self.by_kmer.remove(&cell.kmer);
                }
            }
        }
        Some(ev)
    }

    pub fn unregister(&mut self, id: &str) -> Option<KmerEvidence> {
        let idx = *self.by_id.get(id)?;
        self.unregister_idx(idx)
    }

    /// Evidence whose support cells intersect the contig's subnodes,
    /// ordered by evidence id.
    pub fn support(&self, graph: &Graph, contig: &[Subnode]) -> Vec<&KmerEvidence> {
        let mut idxs = self.support_indices(graph, contig);
        idxs.sort_unstable();
        idxs.dedup();
        let mut out: Vec<&KmerEvidence> = idxs
            .into_iter()
            .filter_map(|i| self.evidence[i as usize].as_ref())
            .collect();
        out.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// `support` followed by unregistration of every hit.
    pub fn untrack(&mut self, graph: &Graph, contig: &[Subnode]) -> Vec<KmerEvidence> {
        let mut idxs = self.support_indices(graph, contig);
        idxs.sort_unstable();
        idxs.dedup();
        let mut out: Vec<KmerEvidence> = idxs
            .into_iter()
            .filter_map(|i| self.unregister_idx(i))
            .collect();
        out.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        out
    }

    fn support_indices(&self, graph: &Graph, contig: &[Subnode]) -> Vec<u32> {
        let mut idxs: Vec<u32> = Vec::new();
        for sn in contig {
            let Some(node) = graph.node(sn.node) else {
                continue;
            };
            for (offset, &km) in node.kmers.iter().enumerate() {
                self.collect_hits(km, sn, offset, &mut idxs);
            }
            for &(offset, km) in &node.collapsed {
                self.collect_hits(km, sn, offset as usize, &mut idxs);
            }
        }
        idxs
    }

    fn collect_hits(&self, km: Kmer, sn: &Subnode, offset: usize, out: &mut Vec<u32>) {
        let Some(bucket) = self.by_kmer.get(&km) else {
            return;
        };
        let start = sn.first_start + offset as i32;
        let end = sn.first_end + offset as i32;
        for r in bucket {
            let Some(ev) = self.evidence[r.evidence as usize].as_ref() else {
                continue;
            };
            let Some(cell) = ev.support[r.offset as usize] else {
                continue;
            };
            if overlaps(cell.first_start, cell.first_end, start, end) {
                out.push(r.evidence);
            }
        }
    }

    /// Sanity check: the tracked support summed per offset must equal the
    /// node's weights over the subnode interval.
    pub fn matches_expected(&self, graph: &Graph, sn: &Subnode) -> bool {
        let Some(node) = graph.node(sn.node) else {
            return false;
        };
        for (offset, &km) in node.kmers.iter().enumerate() {
            let mut expected = 0u64;
            if let Some(bucket) = self.by_kmer.get(&km) {
                let start = sn.first_start + offset as i32;
                let end = sn.first_end + offset as i32;
                for r in bucket {
                    let cell = self.evidence[r.evidence as usize]
                        .as_ref()
                        .and_then(|ev| ev.support[r.offset as usize]);
                    if let Some(cell) = cell {
                        if overlaps(cell.first_start, cell.first_end, start, end) {
                            expected += cell.weight as u64;
                        }
                    }
                }
            }
            for &(c_off, ck) in &node.collapsed {
                if c_off as usize != offset {
                    continue;
                }
                if let Some(bucket) = self.by_kmer.get(&ck) {
                    let start = sn.first_start + offset as i32;
                    let end = sn.first_end + offset as i32;
                    for r in bucket {
                        let cell = self.evidence[r.evidence as usize]
                            .as_ref()
                            .and_then(|ev| ev.support[r.offset as usize]);
                        if let Some(cell) = cell {
                            if overlaps(cell.first_start, cell.first_end, start, end) {
                                expected += cell.weight as u64;
                            }
                        }
                    }
                }
            }
            if expected != node.weight(offset) as u64 {
                return false;
            }
        }
        true
    }
}

impl Default for EvidenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::pack;
    use crate::node::PathNodeInput;

    fn node_input(seq: &[u8], k: usize, w: u32, start: i32, end: i32) -> PathNodeInput {
        let kmers: Vec<Kmer> = (0..=seq.len() - k)
            .map(|i| pack(&seq[i..i + k], k).unwrap())
            .collect();
        let weights = vec![w; kmers.len()];
        PathNodeInput {
            kmers,
            weights,
            first_start: start,
            first_end: end,
            reference: false,
            collapsed: Vec::new(),
        }
    }

    fn read_evidence(id: &str, seq: &[u8], k: usize, start: i32, end: i32) -> KmerEvidence {
        let support = (0..=seq.len() - k)
            .map(|i| {
                Some(KmerSupportNode {
                    kmer: pack(&seq[i..i + k], k).unwrap(),
                    first_start: start + i as i32,
                    first_end: end + i as i32,
                    weight: 1,
                })
            })
            .collect();
        KmerEvidence {
            id: id.to_string(),
            support,
            breakend: (0, 0),
            quality: 1.0,
            anchored: false,
        }
    }

    #[test]
    fn support_finds_overlapping_evidence_only() {
        let mut g = Graph::new(4);
        let id = g.insert(node_input(b"AACGT", 4, 2, 10, 12));
        let mut t = EvidenceTracker::new();
        t.register(read_evidence("r1", b"AACGT", 4, 10, 12));
        t.register(read_evidence("r2", b"AACGT", 4, 500, 502));
        let contig = vec![Subnode {
            node: id,
            first_start: 10,
            first_end: 12,
        }];
        let hits = t.support(&g, &contig);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "r1");
    }

    #[test]
    fn untrack_unregisters_and_is_idempotent() {
        let mut g = Graph::new(4);
        let id = g.insert(node_input(b"AACGT", 4, 1, 10, 12));
        let mut t = EvidenceTracker::new();
        t.register(read_evidence("r1", b"AACGT", 4, 10, 12));
        let contig = vec![Subnode {
            node: id,
            first_start: 10,
            first_end: 12,
        }];
        let taken = t.untrack(&g, &contig);
        assert_eq!(taken.len(), 1);
        assert!(t.is_empty());
        assert!(t.untrack(&g, &contig).is_empty());
    }

    #[test]
    fn matches_expected_balances_weights() {
        let mut g = Graph::new(4);
        let id = g.insert(node_input(b"AACGT", 4, 2, 10, 12));
        let mut t = EvidenceTracker::new();
        t.register(read_evidence("r1", b"AACGT", 4, 10, 12));
        t.register(read_evidence("r2", b"AACGT", 4, 10, 12));
        let sn = Subnode {
            node: id,
            first_start: 10,
            first_end: 12,
        };
        assert!(t.matches_expected(&g, &sn));
        t.unregister("r2");
        assert!(!t.matches_expected(&g, &sn));
    }

    #[test]
    fn registered_weight_accumulates() {
        let mut t = EvidenceTracker::new();
        t.register(read_evidence("r1", b"AACGT", 4, 10, 12));
        t.register(read_evidence("r2", b"AACGTG", 4, 10, 12));
        assert_eq!(t.total_registered_weight(), 2 + 3);
    }
}
