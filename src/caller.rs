// Memoized best-contig caller.
//
// Memo entries are keyed by (node, narrowed first-k-mer start): the best
// scoring path known to end at that node with that forced start position.
// Extending an edge always strictly advances the start (the unit shift of
// the predecessor's length), so the dependency graph over keys is acyclic
// even though node adjacency is not: walking a repeat simply materialises
// one key per lap until the position interval is exhausted. A worklist
// ordered by start re-evaluates only dirtied keys; a changed entry dirties
// the keys its successors derive from it.
//
// Paths may start at a reference node and may terminate into one (the
// anchor bonus is added per reference end) but never traverse reference
// interior nodes; reference entries are always single-node sources.
//
// Two callers run over the same graph: the anchored caller with
// ANCHORED_SCORE and the unanchored caller with bonus 1. The driver
// broadcasts every structural change to both.

use std::collections::BTreeSet;
use std::hash::BuildHasherDefault;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use hashbrown::HashMap;
use rustc_hash::FxHasher;
use smallvec::SmallVec;

use crate::graph::Graph;
use crate::kmer::Kmer;
use crate::node::{NodeId, Subnode};

type FastHashMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Reference-anchored paths must outscore any realistic unanchored weight.
pub const ANCHORED_SCORE: i64 = 1 << 30;

/// Memo key: a node together with the narrowed start its path forces.
type MemoKey = (NodeId, i32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct MemoEntry {
    score: i64,
    prev: Option<MemoKey>,
    /// Narrowed first-k-mer end of this node on its best path; the start is
    /// the key.
    end: i32,
    path_first_start: i32,
    /// Path length in k-mers, for tie-breaking.
    path_len: u32,
    path_first_kmer: Kmer,
}

/// A fully scored candidate contig ending: a memoized path plus an optional
/// terminal reference sink.
#[derive(Clone, Copy)]
struct Candidate {
    score: i64,
    path_first_start: i32,
    path_len: u32,
    path_first_kmer: Kmer,
    end: MemoKey,
    end_interval: (i32, i32),
    sink: Option<(NodeId, i32, i32)>,
}

pub struct ContigCaller {
    bonus: i64,
    max_evidence_distance: i32,
    memo: FastHashMap<MemoKey, MemoEntry>,
    /// Starts with a live entry, per node; keeps predecessor enumeration
    /// cheap during recomputation.
    starts: FastHashMap<NodeId, SmallVec<[i32; 2]>>,
    dirty: BTreeSet<(i32, NodeId)>,
}

impl ContigCaller {
    pub fn new(bonus: i64, max_evidence_distance: i32) -> Self {
        ContigCaller {
            bonus,
            max_evidence_distance,
            memo: FastHashMap::default(),
            starts: FastHashMap::default(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    /// Notify the caller of a node inserted into the graph: its source key,
    /// plus every key its already-memoized predecessors can derive (late
    /// insertions and split survivors arrive after their neighbours).
    pub fn add(&mut self, graph: &Graph, id: NodeId) {
        let Some(node) = graph.node(id) else {
            return;
        };
        self.dirty.insert((node.first_start, id));
        for &p in &node.prev {
            let Some(pn) = graph.node(p) else {
                continue;
            };
            let Some(p_starts) = self.starts.get(&p) else {
                continue;
            };
            let shift = pn.len() as i32;
            let derived: SmallVec<[i32; 4]> = p_starts
                .iter()
                .map(|&sp| node.first_start.max(sp.saturating_add(shift)))
                .collect();
            for d in derived {
                self.dirty.insert((d, id));
            }
        }
    }

    /// Notify the caller of nodes about to leave the graph. Must run while
    /// the nodes are still present so their successors can be found.
    pub fn remove(&mut self, graph: &Graph, ids: &[NodeId]) {
        for &id in ids {
            let starts = self.starts.remove(&id).unwrap_or_default();
            for &s in &starts {
                self.memo.remove(&(id, s));
            }
            let Some(node) = graph.node(id) else {
                continue;
            };
            for &s in &starts {
                self.dirty.remove(&(s, id));
                self.dirty_successors(graph, id, s);
            }
            // the source key may be pending without an entry yet
            self.dirty.remove(&(node.first_start, id));
        }
    }

    /// Dirty every key a successor would derive from (id, s).
    fn dirty_successors(&mut self, graph: &Graph, id: NodeId, s: i32) {
        let Some(node) = graph.node(id) else {
            return;
        };
        let shift = node.len() as i32;
        let succs: Vec<(NodeId, i32)> = node
            .next
            .iter()
            .filter_map(|&m| {
                graph
                    .node(m)
                    .map(|mn| (m, mn.first_start.max(s.saturating_add(shift))))
            })
            .collect();
        for (m, derived) in succs {
            self.dirty.insert((derived, m));
        }
    }

    /// Re-evaluate dirty keys in ascending start order until stable. Every
    /// cascade strictly advances the start, so a single forward sweep
    /// converges.
    fn relax(&mut self, graph: &Graph) {
        while let Some(&(s, id)) = self.dirty.iter().next() {
            self.dirty.remove(&(s, id));
            if graph.node(id).is_none() {
                if let Some(starts) = self.starts.remove(&id) {
                    for &st in &starts {
                        self.memo.remove(&(id, st));
                    }
                }
                continue;
            }
            let fresh = self.compute(graph, id, s);
            let key = (id, s);
            match (self.memo.get(&key).copied(), fresh) {
                (Some(old), Some(new)) if old == new => {}
                (None, None) => {}
                (_, Some(new)) => {
                    if self.memo.insert(key, new).is_none() {
                        self.starts.entry(id).or_default().push(s);
                    }
                    self.dirty_successors(graph, id, s);
                }
                (Some(_), None) => {
                    self.memo.remove(&key);
                    if let Some(starts) = self.starts.get_mut(&id) {
                        starts.retain(|st| *st != s);
                    }
                    self.dirty_successors(graph, id, s);
                }
            }
        }
    }

    /// Best entry for key (id, s) given the current predecessor entries.
    fn compute(&self, graph: &Graph, id: NodeId, s: i32) -> Option<MemoEntry> {
        let node = graph.node(id).expect("computing a dead node");
        let mut best: Option<MemoEntry> = None;
        if s == node.first_start {
            best = Some(MemoEntry {
                score: if node.reference {
                    self.bonus
                } else {
                    node.score()
                },
                prev: None,
                end: node.first_end,
                path_first_start: node.first_start,
                path_len: node.len() as u32,
                path_first_kmer: node.first_kmer(),
            });
        }
        if node.reference {
            // reference nodes are only ever path sources
            return best;
        }
        for &p in &node.prev {
            let Some(pn) = graph.node(p) else {
                continue;
            };
            let Some(p_starts) = self.starts.get(&p) else {
                continue;
            };
            let shift = pn.len() as i32;
            for &sp in p_starts {
                if node.first_start.max(sp.saturating_add(shift)) != s {
                    continue;
                }
                let Some(pe) = self.memo.get(&(p, sp)) else {
                    continue;
                };
                let end = node.first_end.min(pe.end + shift);
                if s > end {
                    continue;
                }
                let cand = MemoEntry {
                    score: pe.score + node.score(),
                    prev: Some((p, sp)),
                    end,
                    path_first_start: pe.path_first_start,
                    path_len: pe.path_len + node.len() as u32,
                    path_first_kmer: pe.path_first_kmer,
                };
                if best.as_ref().map_or(true, |b| entry_better(&cand, b)) {
                    best = Some(cand);
                }
            }
        }
        best
    }

    /// The globally best contig, returned only once its final subnode ends
    /// before `frontier - max_evidence_distance`. A best path still inside
    /// the window could yet be extended, merged into, or outscored by
    /// pending input, so None forces the driver to load more.
    pub fn best_contig(&mut self, graph: &Graph, frontier: i32) -> Option<Vec<Subnode>> {
        self.relax(graph);
        let horizon = frontier as i64 - self.max_evidence_distance as i64;

        let mut best: Option<(Candidate, bool)> = None;
        for (&(id, s), e) in self.memo.iter() {
            let Some(node) = graph.node(id) else {
                continue;
            };
            if node.reference {
                continue;
            }
            let last_end = e.end as i64 + node.len() as i64 - 1;
            let cand = Candidate {
                score: e.score,
                path_first_start: e.path_first_start,
                path_len: e.path_len,
                path_first_kmer: e.path_first_kmer,
                end: (id, s),
                end_interval: (s, e.end),
                sink: None,
            };
            if best
                .as_ref()
                .map_or(true, |(b, _)| candidate_better(&cand, b))
            {
                best = Some((cand, last_end < horizon));
            }
            // terminating into a reference successor earns the anchor bonus
            let shift = node.len() as i32;
            for &m in &node.next {
                let Some(mn) = graph.node(m) else {
                    continue;
                };
                if !mn.reference {
                    continue;
                }
                let rs = mn.first_start.max(s + shift);
                let re = mn.first_end.min(e.end + shift);
                if rs > re {
                    continue;
                }
                let sink_last_end = re as i64 + mn.len() as i64 - 1;
                let cand = Candidate {
                    score: e.score + self.bonus,
                    path_first_start: e.path_first_start,
                    path_len: e.path_len + mn.len() as u32,
                    path_first_kmer: e.path_first_kmer,
                    end: (id, s),
                    end_interval: (s, e.end),
                    sink: Some((m, rs, re)),
                };
                if best
                    .as_ref()
                    .map_or(true, |(b, _)| candidate_better(&cand, b))
                {
                    best = Some((cand, last_end < horizon && sink_last_end < horizon));
                }
            }
        }
        match best {
            Some((cand, true)) => Some(self.traceback(graph, &cand)),
            _ => None,
        }
    }

    fn traceback(&self, graph: &Graph, cand: &Candidate) -> Vec<Subnode> {
        let mut rev: Vec<Subnode> = Vec::new();
        let mut cur = cand.end;
        loop {
            let e = self.memo.get(&cur).expect("broken memo chain");
            rev.push(Subnode {
                node: cur.0,
                first_start: cur.1,
                first_end: e.end,
            });
            match e.prev {
                Some(p) => cur = p,
                None => break,
            }
        }
        rev.reverse();
        let mut contig = rev;
        if let Some((m, rs, re)) = cand.sink {
            contig.push(Subnode {
                node: m,
                first_start: rs,
                first_end: re,
            });
        }
        // narrow backwards: committing to a successor constrains where each
        // predecessor can sit
        for i in (0..contig.len().saturating_sub(1)).rev() {
            let v = contig[i + 1];
            let u = &mut contig[i];
            let u_len = graph.node(u.node).expect("dead node in contig").len() as i32;
            u.first_start = u.first_start.max(v.first_start - u_len);
            u.first_end = u.first_end.min(v.first_end - u_len);
            debug_assert!(u.first_start <= u.first_end);
        }
        contig
    }

    /// Debug check: every live node ending before the finalisation horizon
    /// must carry at least its source entry.
    pub fn sanity_check_frontier(&mut self, graph: &Graph, frontier: i32) -> bool {
        self.relax(graph);
        let horizon = frontier as i64 - self.max_evidence_distance as i64;
        for id in graph.iter_by_position() {
            let Some(node) = graph.node(id) else {
                continue;
            };
            if (node.last_end() as i64) < horizon && !self.memo.contains_key(&(id, node.first_start))
            {
                return false;
            }
        }
        true
    }

    /// Debug check: the memo table matches `fresh`, a caller rebuilt from
    /// scratch over the same graph.
    pub fn sanity_check_matches(&mut self, graph: &Graph, fresh: &mut ContigCaller) -> bool {
        self.relax(graph);
        fresh.relax(graph);
        if self.memo.len() != fresh.memo.len() {
            return false;
        }
        self.memo
            .iter()
            .all(|(key, e)| fresh.memo.get(key) == Some(e))
    }

    /// Dump the memoization table as CSV for offline inspection.
    pub fn export_state(&self, graph: &Graph, path: &Path) -> anyhow::Result<()> {
        let fh = std::fs::File::create(path).with_context(|| format!("create {:?}", path))?;
        let mut w = std::io::BufWriter::new(fh);
        writeln!(
            w,
            "start,end,first_kmer,score,path_len,path_first_start,extends"
        )?;
        let mut rows: Vec<(i32, Kmer, NodeId)> = self
            .memo
            .keys()
            .filter_map(|&(id, s)| graph.node(id).map(|n| (s, n.first_kmer(), id)))
            .collect();
        rows.sort_unstable();
        for (s, km, id) in rows {
            let e = &self.memo[&(id, s)];
            writeln!(
                w,
                "{},{},{:#018x},{},{},{},{}",
                s,
                e.end,
                km,
                e.score,
                e.path_len,
                e.path_first_start,
                e.prev.is_some()
            )?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Strict "better than" over memo entries: higher score, then earlier path
/// start, then shorter path, then smaller first k-mer; the terminal end and
/// predecessor key make the order total.
fn entry_better(a: &MemoEntry, b: &MemoEntry) -> bool {
    (
        -a.score,
        a.path_first_start,
        a.path_len,
        a.path_first_kmer,
        a.end,
        a.prev,
    ) < (
        -b.score,
        b.path_first_start,
        b.path_len,
        b.path_first_kmer,
        b.end,
        b.prev,
    )
}

fn candidate_better(a: &Candidate, b: &Candidate) -> bool {
    (
        -a.score,
        a.path_first_start,
        a.path_len,
        a.path_first_kmer,
        a.end_interval,
        a.end,
        a.sink,
    ) < (
        -b.score,
        b.path_first_start,
        b.path_len,
        b.path_first_kmer,
        b.end_interval,
        b.end,
        b.sink,
    )
}
