// Repeat-k-mer misassembly repair.
//
// A best path that revisits a k-mer (primary or collapsed) has walked a
// repeat; the evidence supporting the two occurrences belongs to different
// molecules. The contig is cut at subnode granularity into the prefix
// (everything before the subnode holding the second occurrence) and the
// suffix (everything after the subnode holding the first occurrence), each
// evidence item is assigned to the side matching more of its support cells,
// and the dominant side survives. A repeat confined to a single subnode
// cannot be cut and drops the contig.

use std::hash::BuildHasherDefault;

use hashbrown::HashSet;
use rustc_hash::FxHasher;

use crate::evidence::{EvidenceTracker, KmerEvidence};
use crate::graph::{overlaps, Graph};
use crate::kmer::Kmer;
use crate::node::Subnode;

type FastHashSet<K> = HashSet<K, BuildHasherDefault<FxHasher>>;

/// Does the contig visit any primary or collapsed k-mer twice?
pub fn contains_kmer_repeat(graph: &Graph, contig: &[Subnode]) -> bool {
    let mut seen: FastHashSet<Kmer> = FastHashSet::default();
    for sn in contig {
        let Some(node) = graph.node(sn.node) else {
            continue;
        };
        for &km in &node.kmers {
            if !seen.insert(km) {
                return true;
            }
        }
        for &(_, km) in &node.collapsed {
            if !seen.insert(km) {
                return true;
            }
        }
    }
    false
}

/// Cut repeats out of the contig, keeping the dominant evidence partition
/// each time. Returns None when no repeat-free non-empty contig remains.
pub fn correct_misassigned_evidence(
    graph: &Graph,
    tracker: &EvidenceTracker,
    contig: &[Subnode],
) -> Option<Vec<Subnode>> {
    let mut contig: Vec<Subnode> = contig.to_vec();
    while contains_kmer_repeat(graph, &contig) {
        contig = cut_at_first_repeat(graph, tracker, &contig)?;
        if contig.is_empty() {
            return None;
        }
    }
    if contig.is_empty() {
        None
    } else {
        Some(contig)
    }
}

fn cut_at_first_repeat(
    graph: &Graph,
    tracker: &EvidenceTracker,
    contig: &[Subnode],
) -> Option<Vec<Subnode>> {
    let (first_sn, second_sn) = first_repeat_subnodes(graph, contig)?;
    if first_sn == second_sn {
        // repeat inside one subnode: nothing to cut at this granularity
        return None;
    }
    let prefix = &contig[..second_sn];
    let suffix = &contig[first_sn + 1..];

    let support = tracker.support(graph, contig);
    let mut prefix_weight = 0u64;
    let mut suffix_weight = 0u64;
    for &ev in &support {
        let p = matched_cells(graph, ev, prefix);
        let s = matched_cells(graph, ev, suffix);
        // ties go to the prefix
        if p >= s {
            prefix_weight += ev.total_weight();
        } else {
            suffix_weight += ev.total_weight();
        }
    }

    let keep_prefix = if prefix_weight != suffix_weight {
        prefix_weight > suffix_weight
    } else {
        kmer_count(graph, prefix) >= kmer_count(graph, suffix)
    };
    Some(if keep_prefix {
        prefix.to_vec()
    } else {
        suffix.to_vec()
    })
}

/// Subnode indices holding the first and second occurrence of the first
/// k-mer the contig revisits, in path order.
fn first_repeat_subnodes(graph: &Graph, contig: &[Subnode]) -> Option<(usize, usize)> {
    let mut seen: hashbrown::HashMap<Kmer, usize, BuildHasherDefault<FxHasher>> =
        hashbrown::HashMap::default();
    for (idx, sn) in contig.iter().enumerate() {
        let node = graph.node(sn.node)?;
        for &km in &node.kmers {
            match seen.get(&km) {
                Some(&prev_idx) => return Some((prev_idx, idx)),
                None => {
                    seen.insert(km, idx);
                }
            }
        }
        for &(_, km) in &node.collapsed {
            match seen.get(&km) {
                Some(&prev_idx) => return Some((prev_idx, idx)),
                None => {
                    seen.insert(km, idx);
                }
            }
        }
    }
    None
}

fn kmer_count(graph: &Graph, contig: &[Subnode]) -> usize {
    contig
        .iter()
        .filter_map(|sn| graph.node(sn.node).map(|n| n.len()))
        .sum()
}

/// How many of the evidence's support cells land on the candidate contig.
fn matched_cells(graph: &Graph, ev: &KmerEvidence, candidate: &[Subnode]) -> usize {
    let mut hits = 0usize;
    for cell in ev.support.iter().flatten() {
        'cell: for sn in candidate {
            let Some(node) = graph.node(sn.node) else {
                continue;
            };
            for (offset, &km) in node.kmers.iter().enumerate() {
                if km == cell.kmer
                    && overlaps(
                        cell.first_start,
                        cell.first_end,
                        sn.first_start + offset as i32,
                        sn.first_end + offset as i32,
                    )
                {
                    hits += 1;
                    break 'cell;
                }
            }
            for &(offset, km) in &node.collapsed {
                if km == cell.kmer
                    && overlaps(
                        cell.first_start,
                        cell.first_end,
                        sn.first_start + offset as i32,
                        sn.first_end + offset as i32,
                    )
                {
                    hits += 1;
                    break 'cell;
                }
            }
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::KmerSupportNode;
    use crate::kmer::pack;
    use crate::node::PathNodeInput;

    fn input(seq: &[u8], k: usize, w: u32, start: i32, end: i32) -> PathNodeInput {
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

    fn read_evidence(id: &str, seq: &[u8], k: usize, start: i32) -> KmerEvidence {
        let support = (0..=seq.len() - k)
            .map(|i| {
                Some(KmerSupportNode {
                    kmer: pack(&seq[i..i + k], k).unwrap(),
                    first_start: start + i as i32,
                    first_end: start + i as i32,
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
    fn detects_repeats_across_subnodes() {
        let mut g = Graph::new(4);
        let a = g.insert(input(b"ACGT", 4, 1, 10, 10));
        let b = g.insert(input(b"ACGT", 4, 1, 20, 20));
        let contig = vec![
            Subnode {
                node: a,
                first_start: 10,
                first_end: 10,
            },
            Subnode {
                node: b,
                first_start: 20,
                first_end: 20,
            },
        ];
        assert!(contains_kmer_repeat(&g, &contig));
        assert!(!contains_kmer_repeat(&g, &contig[..1]));
    }

    #[test]
    fn keeps_the_heavier_partition() {
        let mut g = Graph::new(4);
        // TTAC -> TACG -> ACGT | ACGT again later via a second subnode
        let a = g.insert(input(b"TTACGT", 4, 2, 10, 10));
        let b = g.insert(input(b"ACGT", 4, 1, 30, 30));
        let contig = vec![
            Subnode {
                node: a,
                first_start: 10,
                first_end: 10,
            },
            Subnode {
                node: b,
                first_start: 30,
                first_end: 30,
            },
        ];
        let mut t = EvidenceTracker::new();
        t.register(read_evidence("left1", b"TTACGT", 4, 10));
        t.register(read_evidence("left2", b"TTACGT", 4, 10));
        t.register(read_evidence("right", b"ACGT", 4, 30));
        let fixed = correct_misassigned_evidence(&g, &t, &contig).unwrap();
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].node, a);
    }

    #[test]
    fn repeat_inside_one_subnode_drops_the_contig() {
        let mut g = Graph::new(4);
        // AACG appears twice within a single chain
        let a = g.insert(input(b"AACGAACG", 4, 1, 10, 10));
        let contig = vec![Subnode {
            node: a,
            first_start: 10,
            first_end: 10,
        }];
        let t = EvidenceTracker::new();
        assert!(contains_kmer_repeat(&g, &contig));
        assert!(correct_misassigned_evidence(&g, &t, &contig).is_none());
    }
}
