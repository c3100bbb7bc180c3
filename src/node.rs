// Path nodes and their arena.
//
// A KmerPathNode compresses a maximal linear chain of k-mers that share one
// support interval. Nodes live in a generational arena: adjacency lists hold
// NodeId handles, never owning links, so the cyclic adjacency induced by
// repeats needs no reference counting. Removing a node bumps the slot
// generation; stale handles held elsewhere (the memoized caller) resolve to
// None instead of a recycled node.

use smallvec::SmallVec;

use crate::kmer::{self, Kmer};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId {
    idx: u32,
    gen: u32,
}

impl NodeId {
    pub(crate) const MIN: NodeId = NodeId { idx: 0, gen: 0 };
    pub(crate) const MAX: NodeId = NodeId {
        idx: u32::MAX,
        gen: u32::MAX,
    };

    /// Stable printable identity, for exports and diagnostics.
    pub fn key(&self) -> u64 {
        ((self.gen as u64) << 32) | self.idx as u64
    }
}

pub type EdgeList = SmallVec<[NodeId; 4]>;

/// A maximal linear run of consecutive k-mers with per-offset weights and a
/// shared first-k-mer position interval.
#[derive(Clone, Debug)]
pub struct KmerPathNode {
    pub kmers: Vec<Kmer>,
    pub weights: Vec<u32>,
    pub first_start: i32,
    pub first_end: i32,
    pub reference: bool,
    /// K-mers merged into this node by upstream error correction, keyed by
    /// the offset of the primary k-mer they were merged with.
    pub collapsed: Vec<(u32, Kmer)>,
    pub prev: EdgeList,
    pub next: EdgeList,
}

impl KmerPathNode {
    pub fn len(&self) -> usize {
        self.kmers.len()
    }

    #[inline]
    pub fn first_kmer(&self) -> Kmer {
        self.kmers[0]
    }

    #[inline]
    pub fn last_kmer(&self) -> Kmer {
        self.kmers[self.kmers.len() - 1]
    }

    #[inline]
    pub fn kmer(&self, offset: usize) -> Kmer {
        self.kmers[offset]
    }

    #[inline]
    pub fn weight(&self, offset: usize) -> u32 {
        self.weights[offset]
    }

    pub fn total_weight(&self) -> u64 {
        self.weights.iter().map(|&w| w as u64).sum()
    }

    /// Score contribution of this node: reference nodes are not scored.
    pub fn score(&self) -> i64 {
        if self.reference {
            0
        } else {
            self.total_weight() as i64
        }
    }

    #[inline]
    pub fn last_start(&self) -> i32 {
        self.first_start + self.len() as i32 - 1
    }

    #[inline]
    pub fn last_end(&self) -> i32 {
        self.first_end + self.len() as i32 - 1
    }

    /// Start interval of the k-mer at `offset`.
    #[inline]
    pub fn interval_at(&self, offset: usize) -> (i32, i32) {
        (
            self.first_start + offset as i32,
            self.first_end + offset as i32,
        )
    }

    /// Check the chain is well formed: parallel weights, a non-empty run of
    /// genuine one-base extensions, an ordered interval.
    pub fn is_well_formed(&self, k: usize) -> bool {
        if self.kmers.is_empty()
            || self.kmers.len() != self.weights.len()
            || self.first_start > self.first_end
        {
            return false;
        }
        self.kmers
            .windows(2)
            .all(|w| kmer::suffix(w[0], k) == kmer::prefix(w[1]))
            && self.collapsed.iter().all(|&(o, _)| (o as usize) < self.len())
    }
}

/// Plain node data handed over by the upstream builder (or produced by a
/// split); adjacency is resolved by the graph on insertion.
#[derive(Clone, Debug)]
pub struct PathNodeInput {
    pub kmers: Vec<Kmer>,
    pub weights: Vec<u32>,
    pub first_start: i32,
    pub first_end: i32,
    pub reference: bool,
    pub collapsed: Vec<(u32, Kmer)>,
}

impl PathNodeInput {
    pub fn into_node(self) -> KmerPathNode {
        KmerPathNode {
            kmers: self.kmers,
            weights: self.weights,
            first_start: self.first_start,
            first_end: self.first_end,
            reference: self.reference,
            collapsed: self.collapsed,
            prev: EdgeList::new(),
            next: EdgeList::new(),
        }
    }
}

/// A path node restricted to a sub-interval of its first-k-mer positions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Subnode {
    pub node: NodeId,
    pub first_start: i32,
    pub first_end: i32,
}

impl Subnode {
    pub fn whole(id: NodeId, node: &KmerPathNode) -> Self {
        Subnode {
            node: id,
            first_start: node.first_start,
            first_end: node.first_end,
        }
    }
}

// ------------------------------
// Arena
// ------------------------------

struct Slot {
    gen: u32,
    node: Option<KmerPathNode>,
}

/// Generational slot arena for live path nodes.
pub struct NodeStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl NodeStore {
    pub fn new() -> Self {
        NodeStore {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn insert(&mut self, node: KmerPathNode) -> NodeId {
        self.live += 1;
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.node = Some(node);
            NodeId { idx, gen: slot.gen }
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                gen: 0,
                node: Some(node),
            });
            NodeId { idx, gen: 0 }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&KmerPathNode> {
        let slot = self.slots.get(id.idx as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut KmerPathNode> {
        let slot = self.slots.get_mut(id.idx as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Take the node out and tombstone the slot. The slot generation is
    /// bumped so outstanding handles go stale rather than aliasing a reuse.
    pub fn remove(&mut self, id: NodeId) -> Option<KmerPathNode> {
        let slot = self.slots.get_mut(id.idx as usize)?;
        if slot.gen != id.gen || slot.node.is_none() {
            return None;
        }
        slot.gen = slot.gen.wrapping_add(1);
        self.live -= 1;
        self.free.push(id.idx);
        slot.node.take()
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------
// Weight removal
// ------------------------------

/// Subtract per-offset weights from a removed node and return the surviving
/// segments as fresh inputs.
///
/// Offsets drained to zero are discarded; each maximal run of offsets with
/// weight remaining becomes one replacement node at its shifted interval.
/// Collapsed k-mers follow the segment holding their primary offset. For a
/// contiguous drained range this yields the left-survivor / removed-middle /
/// right-survivor split.
pub fn remove_weight(node: KmerPathNode, to_remove: &[u32]) -> Vec<PathNodeInput> {
    debug_assert!(to_remove.len() <= node.len());
    let len = node.len();
    let mut remaining: Vec<u32> = Vec::with_capacity(len);
    for offset in 0..len {
        let sub = to_remove.get(offset).copied().unwrap_or(0);
        remaining.push(node.weights[offset].saturating_sub(sub));
    }

    let mut out: Vec<PathNodeInput> = Vec::new();
    let mut seg_start: Option<usize> = None;
    for offset in 0..=len {
        let alive = offset < len && remaining[offset] > 0;
        match (seg_start, alive) {
            (None, true) => seg_start = Some(offset),
            (Some(start), false) => {
                out.push(segment(&node, &remaining, start, offset));
                seg_start = None;
            }
            _ => {}
        }
    }
    out
}

fn segment(node: &KmerPathNode, remaining: &[u32], start: usize, end: usize) -> PathNodeInput {
    let collapsed = node
        .collapsed
        .iter()
        .filter(|&&(o, _)| (o as usize) >= start && (o as usize) < end)
        .map(|&(o, km)| (o - start as u32, km))
        .collect();
    PathNodeInput {
        kmers: node.kmers[start..end].to_vec(),
        weights: remaining[start..end].to_vec(),
        first_start: node.first_start + start as i32,
        first_end: node.first_end + start as i32,
        reference: node.reference,
        collapsed,
    }
}
