// Reference anchor extension.
//
// A called contig is pinned to the reference by greedily walking from each
// end through reference nodes only, preferring the heavier neighbour.
// Interval narrowing follows the walk so the anchor subnodes stay position
// consistent with the contig they extend.

use crate::graph::Graph;
use crate::node::{NodeId, Subnode};

/// Extend backwards from the contig's first subnode through reference
/// predecessors, up to `max_kmers` k-mers. Returns the anchor subnodes in
/// path order (leftmost first), excluding the contig subnode itself.
pub fn extend_start(graph: &Graph, first: Subnode, max_kmers: usize) -> Vec<Subnode> {
    let mut rev: Vec<Subnode> = Vec::new();
    let mut cur = first;
    let mut taken = 0usize;
    while taken < max_kmers {
        let Some(next_hop) = best_reference_prev(graph, &cur) else {
            break;
        };
        taken += graph.node(next_hop.node).map(|n| n.len()).unwrap_or(0);
        rev.push(next_hop);
        cur = next_hop;
    }
    rev.reverse();
    rev
}

/// Extend forwards from the contig's last subnode through reference
/// successors, up to `max_kmers` k-mers.
pub fn extend_end(graph: &Graph, last: Subnode, max_kmers: usize) -> Vec<Subnode> {
    let mut out: Vec<Subnode> = Vec::new();
    let mut cur = last;
    let mut taken = 0usize;
    while taken < max_kmers {
        let Some(next_hop) = best_reference_next(graph, &cur) else {
            break;
        };
        taken += graph.node(next_hop.node).map(|n| n.len()).unwrap_or(0);
        out.push(next_hop);
        cur = next_hop;
    }
    out
}

type HopKey = (u64, i32, u64, NodeId);

/// Higher weight wins; ties go to the earlier first-start, then the smaller
/// k-mer, then the handle (unreachable while start intervals are disjoint).
#[inline]
fn hop_better(a: HopKey, b: HopKey) -> bool {
    a.0 > b.0 || (a.0 == b.0 && (a.1, a.2, a.3) < (b.1, b.2, b.3))
}

fn best_reference_prev(graph: &Graph, cur: &Subnode) -> Option<Subnode> {
    let node = graph.node(cur.node)?;
    let mut best: Option<(HopKey, Subnode)> = None;
    for &p in &node.prev {
        let Some(pn) = graph.node(p) else {
            continue;
        };
        if !pn.reference {
            continue;
        }
        let shift = pn.len() as i32;
        let start = pn.first_start.max(cur.first_start - shift);
        let end = pn.first_end.min(cur.first_end - shift);
        if start > end {
            continue;
        }
        let key = (pn.total_weight(), pn.first_start, pn.first_kmer(), p);
        if best.as_ref().map_or(true, |(b, _)| hop_better(key, *b)) {
            best = Some((
                key,
                Subnode {
                    node: p,
                    first_start: start,
                    first_end: end,
                },
            ));
        }
    }
    best.map(|(_, sub)| sub)
}

fn best_reference_next(graph: &Graph, cur: &Subnode) -> Option<Subnode> {
    let node = graph.node(cur.node)?;
    let shift = node.len() as i32;
    let mut best: Option<(HopKey, Subnode)> = None;
    for &s in &node.next {
        let Some(sn) = graph.node(s) else {
            continue;
        };
        if !sn.reference {
            continue;
        }
        let start = sn.first_start.max(cur.first_start + shift);
        let end = sn.first_end.min(cur.first_end + shift);
        if start > end {
            continue;
        }
        let key = (sn.total_weight(), sn.first_start, sn.first_kmer(), s);
        if best.as_ref().map_or(true, |(b, _)| hop_better(key, *b)) {
            best = Some((
                key,
                Subnode {
                    node: s,
                    first_start: start,
                    first_end: end,
                },
            ));
        }
    }
    best.map(|(_, sub)| sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::{pack, Kmer};
    use crate::node::PathNodeInput;

    fn input(seq: &[u8], k: usize, w: u32, start: i32, end: i32, reference: bool) -> PathNodeInput {
        let kmers: Vec<Kmer> = (0..=seq.len() - k)
            .map(|i| pack(&seq[i..i + k], k).unwrap())
            .collect();
        let weights = vec![w; kmers.len()];
        PathNodeInput {
            kmers,
            weights,
            first_start: start,
            first_end: end,
            reference,
            collapsed: Vec::new(),
        }
    }

    #[test]
    fn extends_through_reference_only() {
        let mut g = Graph::new(4);
        let r = g.insert(input(b"AAACG", 4, 3, 8, 8, true));
        let v = g.insert(input(b"ACGTT", 4, 2, 10, 10, false));
        let first = Subnode {
            node: v,
            first_start: 10,
            first_end: 10,
        };
        let anchor = extend_start(&g, first, 50);
        assert_eq!(anchor.len(), 1);
        assert_eq!(anchor[0].node, r);
        // non-reference predecessors are never anchors
        assert!(extend_end(&g, first, 50).is_empty());
    }

    #[test]
    fn prefers_heavier_reference_neighbour() {
        let mut g = Graph::new(4);
        let v = g.insert(input(b"ACGTT", 4, 2, 10, 10, false));
        let _light = g.insert(input(b"AAACG", 4, 1, 8, 8, true));
        let heavy = g.insert(input(b"GAACG", 4, 9, 8, 8, true));
        let first = Subnode {
            node: v,
            first_start: 10,
            first_end: 10,
        };
        let anchor = extend_start(&g, first, 50);
        assert_eq!(anchor.len(), 1);
        assert_eq!(anchor[0].node, heavy);
    }

    #[test]
    fn budget_bounds_reference_cycles() {
        let mut g = Graph::new(4);
        // AAAA self-loops; the budget must stop the walk
        let _r = g.insert(input(b"AAAA", 4, 1, 0, 100, true));
        let v = g.insert(input(b"AAAC", 4, 2, 50, 60, false));
        let first = Subnode {
            node: v,
            first_start: 50,
            first_end: 60,
        };
        let anchor = extend_start(&g, first, 5);
        assert!(anchor.len() <= 5);
        assert!(!anchor.is_empty());
    }
}
