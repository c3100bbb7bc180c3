// Dual index over live path nodes.
//
// Nodes are ordered by (first_start, first_kmer, id) for deterministic
// position scans, and every (node, offset) cell, primary and collapsed
// k-mers alike, is bucketed by k-mer value for adjacency resolution and
// evidence weight removal. The graph owns the arena; everything else holds
// NodeId handles.

use std::collections::BTreeSet;
use std::hash::BuildHasherDefault;

use hashbrown::HashMap;
use rustc_hash::FxHasher;
use smallvec::SmallVec;

use crate::kmer::{self, Kmer};
use crate::node::{KmerPathNode, NodeId, NodeStore, PathNodeInput};

type FastHashMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// One cell of the k-mer index: the k-mer at `offset` of `node` (or a
/// collapsed k-mer merged at that offset).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct KmerCell {
    pub node: NodeId,
    pub offset: u32,
    pub collapsed: bool,
}

pub struct Graph {
    pub k: usize,
    store: NodeStore,
    by_position: BTreeSet<(i32, Kmer, NodeId)>,
    by_kmer: FastHashMap<Kmer, SmallVec<[KmerCell; 2]>>,
    max_bucket: usize,
}

#[inline]
pub fn overlaps(a_start: i32, a_end: i32, b_start: i32, b_end: i32) -> bool {
    a_start <= b_end && b_start <= a_end
}

impl Graph {
    pub fn new(k: usize) -> Self {
        Graph {
            k,
            store: NodeStore::new(),
            by_position: BTreeSet::new(),
            by_kmer: FastHashMap::default(),
            max_bucket: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Largest k-mer bucket seen over the life of the graph.
    pub fn max_kmer_bucket(&self) -> usize {
        self.max_bucket
    }

    pub fn node(&self, id: NodeId) -> Option<&KmerPathNode> {
        self.store.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.store.contains(id)
    }

    /// First live node in position order.
    pub fn first(&self) -> Option<NodeId> {
        self.by_position.iter().next().map(|&(_, _, id)| id)
    }

    /// Live nodes ordered by (first_start, first_kmer).
    pub fn iter_by_position(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.by_position.iter().map(|&(_, _, id)| id)
    }

    /// Live nodes with first_start in [from, to], in position order.
    pub fn range_by_first_start(&self, from: i32, to: i32) -> impl Iterator<Item = NodeId> + '_ {
        self.by_position
            .range((from, Kmer::MIN, NodeId::MIN)..=(to, Kmer::MAX, NodeId::MAX))
            .map(|&(_, _, id)| id)
    }

    pub fn lookup_kmer(&self, km: Kmer) -> &[KmerCell] {
        self.by_kmer.get(&km).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn total_weight(&self) -> u64 {
        self.iter_by_position()
            .map(|id| self.store.get(id).map(|n| n.total_weight()).unwrap_or(0))
            .sum()
    }

    /// Insert a fully constructed node, resolving adjacency against the live
    /// graph: u→v exists iff v's first k-mer is a one-base extension of u's
    /// last k-mer and the intervals overlap after the unit shift.
    pub fn insert(&mut self, input: PathNodeInput) -> NodeId {
        let node = input.into_node();
        assert!(
            node.is_well_formed(self.k),
            "malformed path node at {}..={}",
            node.first_start,
            node.first_end
        );

        let prev = self.resolve_prev(&node);
        let next = self.resolve_next(&node);
        // a node is its own neighbour when its first k-mer extends its last
        // k-mer within the shifted interval (single-node repeat loop)
        let shift = node.len() as i32;
        let self_adjacent = kmer::successors(node.last_kmer(), self.k)
            .contains(&node.first_kmer())
            && overlaps(
                node.first_start + shift,
                node.first_end + shift,
                node.first_start,
                node.first_end,
            );

        let first_start = node.first_start;
        let first_kmer = node.first_kmer();
        let n_kmers = node.kmers.clone();
        let n_collapsed = node.collapsed.clone();

        let mut node = node;
        node.prev = prev.clone();
        node.next = next.clone();
        let id = self.store.insert(node);
        if self_adjacent {
            let n = self.store.get_mut(id).expect("just inserted");
            n.prev.push(id);
            n.next.push(id);
        }

        let inserted = self.by_position.insert((first_start, first_kmer, id));
        assert!(inserted, "duplicate node insertion");

        for (offset, &km) in n_kmers.iter().enumerate() {
            self.index(
                km,
                KmerCell {
                    node: id,
                    offset: offset as u32,
                    collapsed: false,
                },
            );
        }
        for &(offset, km) in &n_collapsed {
            self.index(
                km,
                KmerCell {
                    node: id,
                    offset,
                    collapsed: true,
                },
            );
        }

        // link the edges back from the neighbours
        for p in prev {
            if let Some(pn) = self.store.get_mut(p) {
                pn.next.push(id);
            }
        }
        for s in next {
            if let Some(sn) = self.store.get_mut(s) {
                sn.prev.push(id);
            }
        }
        id
    }

    fn index(&mut self, km: Kmer, cell: KmerCell) {
        let bucket = self.by_kmer.entry(km).or_default();
        bucket.push(cell);
        if bucket.len() > self.max_bucket {
            self.max_bucket = bucket.len();
        }
    }

    fn resolve_prev(&self, node: &KmerPathNode) -> SmallVec<[NodeId; 4]> {
        let mut out: SmallVec<[NodeId; 4]> = SmallVec::new();
        for cand in kmer::predecessors(node.first_kmer(), self.k) {
            for cell in self.lookup_kmer(cand) {
                if cell.collapsed {
                    continue;
                }
                let Some(p) = self.store.get(cell.node) else {
                    continue;
                };
                if cell.offset as usize != p.len() - 1 {
                    continue;
                }
                let shift = p.len() as i32;
                if overlaps(
                    p.first_start + shift,
                    p.first_end + shift,
                    node.first_start,
                    node.first_end,
                ) && !out.contains(&cell.node)
                {
                    out.push(cell.node);
                }
            }
        }
        out
    }

    fn resolve_next(&self, node: &KmerPathNode) -> SmallVec<[NodeId; 4]> {
        let mut out: SmallVec<[NodeId; 4]> = SmallVec::new();
        let shift = node.len() as i32;
        for cand in kmer::successors(node.last_kmer(), self.k) {
            for cell in self.lookup_kmer(cand) {
                if cell.collapsed || cell.offset != 0 {
                    continue;
                }
                let Some(s) = self.store.get(cell.node) else {
                    continue;
                };
                if overlaps(
                    node.first_start + shift,
                    node.first_end + shift,
                    s.first_start,
                    s.first_end,
                ) && !out.contains(&cell.node)
                {
                    out.push(cell.node);
                }
            }
        }
        out
    }

    /// Remove a node, unlinking it from both indexes and its neighbours.
    pub fn remove(&mut self, id: NodeId) -> KmerPathNode {
        let node = self.store.remove(id).expect("removing a dead node");
        let removed = self
            .by_position
            .remove(&(node.first_start, node.first_kmer(), id));
        assert!(removed, "node missing from position index");

        for (offset, &km) in node.kmers.iter().enumerate() {
            self.unindex(
                km,
                KmerCell {
                    node: id,
                    offset: offset as u32,
                    collapsed: false,
                },
            );
        }
        for &(offset, km) in &node.collapsed {
            self.unindex(
                km,
                KmerCell {
                    node: id,
                    offset,
                    collapsed: true,
                },
            );
        }

        for &p in &node.prev {
            if let Some(pn) = self.store.get_mut(p) {
                pn.next.retain(|x| *x != id);
            }
        }
        for &s in &node.next {
            if let Some(sn) = self.store.get_mut(s) {
                sn.prev.retain(|x| *x != id);
            }
        }
        node
    }

    fn unindex(&mut self, km: Kmer, cell: KmerCell) {
        if let Some(bucket) = self.by_kmer.get_mut(&km) {
            bucket.retain(|c| *c != cell);
            if bucket.is_empty() {
                self.by_kmer.remove(&km);
            }
        }
    }

    /// Debug invariant: nodes sharing a first k-mer have disjoint start
    /// intervals.
    pub fn sanity_check_disjoint_intervals(&self) -> bool {
        let mut spans: Vec<(Kmer, i32, i32)> = self
            .by_position
            .iter()
            .filter_map(|&(_, km, id)| {
                self.store.get(id).map(|n| (km, n.first_start, n.first_end))
            })
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            let (ak, _, ae) = pair[0];
            let (bk, bs, _) = pair[1];
            if ak == bk && bs <= ae {
                return false;
            }
        }
        true
    }

    /// Debug invariant: every indexed cell points at a live node and every
    /// edge is mirrored.
    pub fn sanity_check(&self) -> bool {
        for (_, bucket) in self.by_kmer.iter() {
            for cell in bucket {
                if !self.store.contains(cell.node) {
                    return false;
                }
            }
        }
        for id in self.iter_by_position() {
            let Some(n) = self.store.get(id) else {
                return false;
            };
            for &p in &n.prev {
                let Some(pn) = self.store.get(p) else {
                    return false;
                };
                if !pn.next.contains(&id) {
                    return false;
                }
            }
            for &s in &n.next {
                let Some(sn) = self.store.get(s) else {
                    return false;
                };
                if !sn.prev.contains(&id) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::pack;

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
    fn insert_resolves_adjacency_both_ways() {
        let mut g = Graph::new(4);
        // AACG,ACGT then CGTG extends ACGT by one base
        let a = g.insert(input(b"AACGT", 4, 1, 10, 12, false));
        let b = g.insert(input(b"CGTGG", 4, 1, 12, 14, false));
        let na = g.node(a).unwrap();
        let nb = g.node(b).unwrap();
        assert_eq!(na.next.as_slice(), &[b]);
        assert_eq!(nb.prev.as_slice(), &[a]);
        assert!(g.sanity_check());
    }

    #[test]
    fn adjacency_requires_interval_overlap() {
        let mut g = Graph::new(4);
        let a = g.insert(input(b"AACGT", 4, 1, 10, 10, false));
        // one-base extension but positioned far beyond the shifted interval
        let b = g.insert(input(b"CGTGG", 4, 1, 50, 50, false));
        assert!(g.node(a).unwrap().next.is_empty());
        assert!(g.node(b).unwrap().prev.is_empty());
    }

    #[test]
    fn remove_unlinks_neighbours_and_index() {
        let mut g = Graph::new(4);
        let a = g.insert(input(b"AACGT", 4, 1, 10, 12, false));
        let b = g.insert(input(b"CGTGG", 4, 1, 12, 14, false));
        let removed = g.remove(a);
        assert_eq!(removed.len(), 2);
        assert!(g.node(b).unwrap().prev.is_empty());
        assert!(g.lookup_kmer(pack(b"AACG", 4).unwrap()).is_empty());
        assert_eq!(g.len(), 1);
        assert!(g.sanity_check());
    }

    #[test]
    fn position_order_breaks_ties_by_kmer() {
        let mut g = Graph::new(4);
        let b = g.insert(input(b"TTTT", 4, 1, 10, 10, false));
        let a = g.insert(input(b"AAAA", 4, 1, 10, 10, false));
        let order: Vec<NodeId> = g.iter_by_position().collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn range_is_inclusive_on_both_ends() {
        let mut g = Graph::new(4);
        let a = g.insert(input(b"AACG", 4, 1, 10, 10, false));
        let b = g.insert(input(b"TGCA", 4, 1, 20, 20, false));
        let c = g.insert(input(b"GATT", 4, 1, 30, 30, false));
        assert_eq!(g.range_by_first_start(10, 20).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(g.range_by_first_start(11, 29).collect::<Vec<_>>(), vec![b]);
        assert_eq!(g.range_by_first_start(21, 40).collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn self_extending_node_gets_a_self_loop() {
        let mut g = Graph::new(4);
        // ACGT-CGTA-GTAC-TACG wraps back onto ACGT
        let id = g.insert(input(b"ACGTACG", 4, 1, 100, 111, false));
        let n = g.node(id).unwrap();
        assert_eq!(n.prev.as_slice(), &[id]);
        assert_eq!(n.next.as_slice(), &[id]);
        assert!(g.sanity_check());
        g.remove(id);
        assert!(g.is_empty());
    }

    #[test]
    fn collapsed_kmers_are_indexed_but_not_adjacent() {
        let mut g = Graph::new(4);
        let mut n = input(b"AACGT", 4, 1, 10, 12, false);
        let ck = pack(b"TACG", 4).unwrap();
        n.collapsed.push((0, ck));
        let id = g.insert(n);
        let cells = g.lookup_kmer(ck);
        assert_eq!(cells.len(), 1);
        assert!(cells[0].collapsed);
        assert_eq!(cells[0].node, id);
        // ACGA extends AACG's primary suffix, not the collapsed kmer
        g.insert(input(b"ACGA", 4, 1, 11, 13, false));
        assert!(g.sanity_check());
    }
}
