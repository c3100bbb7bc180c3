// Contig assembly driver.
//
// Pulls position-ordered path nodes from the upstream builder, keeps the
// graph, the evidence tracker and the memoized callers in lockstep, and
// yields assembled records lazily. Each pull asks the anchored caller for a
// finalised best contig, loading input in batches until one exists; contigs
// are repeat-checked, stripped of their reference termini, anchored, scored
// into a record and their supporting evidence weight removed from the graph.
//
// Pathological tangles are handled by the unanchored caller: when repeated
// advancement produces no finalised contig, any oversized unanchored best
// path has its evidence removed wholesale and both callers are rebuilt from
// scratch (the change is too large to memoize incrementally).

use std::hash::BuildHasherDefault;
use std::iter::Peekable;

use hashbrown::HashMap;
use rustc_hash::FxHasher;
use tracing::{debug, error, info};

use crate::anchor;
use crate::caller::{ContigCaller, ANCHORED_SCORE};
use crate::evidence::{EvidenceTracker, KmerEvidence};
use crate::export;
use crate::graph::{overlaps, Graph};
use crate::kmer::{self, Kmer};
use crate::node::{self, NodeId, PathNodeInput, Subnode};
use crate::output::{Anchor, AssemblyKind, AssemblyRecord, Direction};
use crate::repair;
use crate::AssemblyConfig;

type FastHashMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Positional lag (in multiples of max_evidence_distance) before orphan
/// calling is attempted; orphaned subgraphs are uncommon, so this is high.
const ORPHAN_EVIDENCE_MULTIPLE: i64 = 128;

/// Advancements without a best contig before the misassembly identification
/// logic engages.
const LONGEST_PATH_REMOVAL_ADVANCEMENT_TRIGGER_COUNT: u32 = 2;

/// Outcome of one assembly step: the driver loops on Skip.
enum Step {
    Emitted(AssemblyRecord),
    Skip,
    Done,
}

/// Shape of the most recently called contig, for monitoring.
#[derive(Clone, Copy, Default, Debug)]
pub struct ContigStats {
    pub contig_nodes: usize,
    pub truncated_nodes: usize,
    pub contig_start_position: i32,
    pub start_anchor_nodes: usize,
    pub end_anchor_nodes: usize,
}

pub struct Assembler<I: Iterator<Item = PathNodeInput>> {
    cfg: AssemblyConfig,
    graph: Graph,
    tracker: EvidenceTracker,
    underlying: Peekable<I>,
    caller: Option<ContigCaller>,
    unanchored_caller: Option<ContigCaller>,
    last_admitted_start: i32,
    consumed: u64,
    contigs_called: u64,
    emitted_weight: u64,
    stats: ContigStats,
    export_count: u32,
    finished: bool,
}

impl<I: Iterator<Item = PathNodeInput>> Assembler<I> {
    pub fn new(cfg: AssemblyConfig, tracker: EvidenceTracker, input: I) -> anyhow::Result<Self> {
        cfg.validate()?;
        let graph = Graph::new(cfg.k);
        let mut a = Assembler {
            cfg,
            graph,
            tracker,
            underlying: input.peekable(),
            caller: None,
            unanchored_caller: None,
            last_admitted_start: i32::MIN,
            consumed: 0,
            contigs_called: 0,
            emitted_weight: 0,
            stats: ContigStats::default(),
            export_count: 0,
            finished: false,
        };
        a.initialise_caller();
        Ok(a)
    }

    fn initialise_caller(&mut self) {
        let mut c = ContigCaller::new(ANCHORED_SCORE, self.cfg.max_evidence_distance);
        for id in self.graph.iter_by_position().collect::<Vec<_>>() {
            c.add(&self.graph, id);
        }
        self.caller = Some(c);
    }

    fn initialise_unanchored_caller(&mut self) {
        // positive per-node weight required, so the bonus degenerates to 1
        let mut c = ContigCaller::new(1, self.cfg.max_evidence_distance);
        for id in self.graph.iter_by_position().collect::<Vec<_>>() {
            c.add(&self.graph, id);
        }
        self.unanchored_caller = Some(c);
    }

    fn next_position(&mut self) -> i32 {
        match self.underlying.peek() {
            Some(n) => n.first_start,
            None => i32::MAX,
        }
    }

    // ------------------------------
    // Input admission
    // ------------------------------

    /// Load the next batch: everything within the evidence window past the
    /// current frontier. Batching keeps memoization churn down.
    fn advance(&mut self) {
        let mut load_until = self.next_position();
        if load_until < i32::MAX {
            load_until = load_until.saturating_add(self.cfg.max_evidence_distance + 1);
        }
        self.remove_orphaned_reference_subgraphs();
        self.advance_to(load_until);
    }

    fn advance_to(&mut self, load_until: i32) {
        while let Some(peeked) = self.underlying.peek() {
            if peeked.first_start > load_until {
                break;
            }
            let input = self.underlying.next().expect("peeked input vanished");
            assert!(
                self.last_admitted_start <= input.first_start,
                "input out of order at {} after {} ({})",
                input.first_start,
                self.last_admitted_start,
                self.cfg.contig_name
            );
            self.last_admitted_start = input.first_start;
            let id = self.graph.insert(input);
            if self.cfg.sanity_checks {
                let n = self.graph.node(id).expect("just inserted");
                let sn = Subnode::whole(id, n);
                assert!(
                    self.tracker.matches_expected(&self.graph, &sn),
                    "inserted node weight does not match tracked evidence ({})",
                    self.cfg.contig_name
                );
            }
            if let Some(c) = self.caller.as_mut() {
                c.add(&self.graph, id);
            }
            if let Some(c) = self.unanchored_caller.as_mut() {
                c.add(&self.graph, id);
            }
            self.consumed += 1;
        }
    }

    // ------------------------------
    // Best contig search
    // ------------------------------

    fn is_misassembled(&self, contig: &[Subnode]) -> bool {
        let len = self.contig_kmer_count(contig) as f64;
        len > self.cfg.max_expected_breakend_length_multiple as f64
            * self.cfg.max_concordant_fragment_size as f64
    }

    fn contig_kmer_count(&self, contig: &[Subnode]) -> usize {
        contig
            .iter()
            .filter_map(|sn| self.graph.node(sn.node).map(|n| n.len()))
            .sum()
    }

    fn find_best_contig(&mut self) -> Option<Vec<Subnode>> {
        let np = self.next_position();
        // Some(empty) stands in for "no unanchored caller to wait on"
        let mut best_unanchored: Option<Vec<Subnode>> = match self.unanchored_caller.as_mut() {
            Some(c) => c.best_contig(&self.graph, np),
            None => Some(Vec::new()),
        };
        let mut best = self
            .caller
            .as_mut()
            .expect("anchored caller missing")
            .best_contig(&self.graph, np);
        let mut advance_count = 0u32;
        while self.underlying.peek().is_some() && (best_unanchored.is_none() || best.is_none()) {
            self.advance();
            advance_count += 1;
            // early abort in regions prone to misassembly
            if advance_count >= LONGEST_PATH_REMOVAL_ADVANCEMENT_TRIGGER_COUNT {
                if self.unanchored_caller.is_none() {
                    self.initialise_unanchored_caller();
                }
                let np = self.next_position();
                best_unanchored = self
                    .unanchored_caller
                    .as_mut()
                    .unwrap()
                    .best_contig(&self.graph, np);
                loop {
                    let Some(contig) = best_unanchored.clone() else {
                        break;
                    };
                    if !self.is_misassembled(&contig) {
                        break;
                    }
                    let first = contig.first().map(|sn| sn.first_start).unwrap_or(0);
                    let last = contig
                        .last()
                        .and_then(|sn| {
                            self.graph
                                .node(sn.node)
                                .map(|n| sn.first_end + n.len() as i32 - 1)
                        })
                        .unwrap_or(first);
                    info!(
                        "misassembled contig detected at {}:{}-{}; not assembling supporting reads",
                        self.cfg.contig_name, first, last
                    );
                    let evidence = self.tracker.untrack(&self.graph, &contig);
                    // too large a change to memoize incrementally; rebuild
                    self.caller = None;
                    self.unanchored_caller = None;
                    if evidence.is_empty() {
                        // unsupported tangle: remove the nodes themselves
                        self.remove_contig_nodes_directly(&contig);
                    } else {
                        self.remove_evidence(&evidence);
                    }
                    self.initialise_unanchored_caller();
                    let np = self.next_position();
                    best_unanchored = self
                        .unanchored_caller
                        .as_mut()
                        .unwrap()
                        .best_contig(&self.graph, np);
                }
                if self.caller.is_none() {
                    self.initialise_caller();
                }
            }
            let np = self.next_position();
            best = self
                .caller
                .as_mut()
                .expect("anchored caller missing")
                .best_contig(&self.graph, np);
        }
        if advance_count == 0 {
            // no advancement this pull: large-contig checking can switch off
            self.unanchored_caller = None;
        }
        if self.cfg.sanity_checks {
            let np = self.next_position();
            let ok = self
                .caller
                .as_mut()
                .unwrap()
                .sanity_check_frontier(&self.graph, np);
            assert!(ok, "memoization frontier check failed ({})", self.cfg.contig_name);
            assert!(
                self.verify_memoization(),
                "memoization does not match fresh recomputation ({})",
                self.cfg.contig_name
            );
        }
        if let Some(vis) = &self.cfg.visualisation {
            if vis.contig_memoization {
                self.export_count += 1;
                let path = vis.directory.join(format!(
                    "assembly.path.memoization.{}.{}.csv",
                    self.cfg.contig_name, self.export_count
                ));
                if let Err(e) = self
                    .caller
                    .as_ref()
                    .unwrap()
                    .export_state(&self.graph, &path)
                {
                    debug!("unable to export assembly path memoization to {:?}: {}", path, e);
                }
            }
        }
        best
    }

    fn verify_memoization(&mut self) -> bool {
        let mut fresh = ContigCaller::new(ANCHORED_SCORE, self.cfg.max_evidence_distance);
        for id in self.graph.iter_by_position().collect::<Vec<_>>() {
            fresh.add(&self.graph, id);
        }
        self.caller
            .as_mut()
            .expect("anchored caller missing")
            .sanity_check_matches(&self.graph, &mut fresh)
    }

    // ------------------------------
    // Contig calling
    // ------------------------------

    fn call_contig(&mut self, raw: Vec<Subnode>) -> Option<AssemblyRecord> {
        // reference termini only carry the anchoring bonus; the anchors
        // themselves are rebuilt by greedy extension below
        let mut contig = raw.clone();
        while contig
            .first()
            .and_then(|sn| self.graph.node(sn.node))
            .map_or(false, |n| n.reference)
        {
            contig.remove(0);
        }
        while contig
            .last()
            .and_then(|sn| self.graph.node(sn.node))
            .map_or(false, |n| n.reference)
        {
            contig.pop();
        }
        if repair::contains_kmer_repeat(&self.graph, &contig) {
            // this may break the contig at the repeated kmer
            match repair::correct_misassigned_evidence(&self.graph, &self.tracker, &contig) {
                Some(fixed) => contig = fixed,
                None => {
                    // nothing salvageable: drop the contig's evidence so the
                    // next pull makes progress
                    let evidence = self.tracker.untrack(&self.graph, &contig);
                    if evidence.is_empty() {
                        self.remove_contig_nodes_directly(&contig);
                    } else {
                        self.remove_evidence(&evidence);
                    }
                    return None;
                }
            }
        }
        if contig.is_empty() {
            return None;
        }
        let evidence = self.tracker.untrack(&self.graph, &contig);

        let contig_kmers = self.contig_kmer_count(&contig);
        let target_anchor_length = contig_kmers.max(self.cfg.max_anchor_length as usize);

        let first = contig[0];
        let last = *contig.last().expect("non-empty contig");
        let first_len = self.graph.node(first.node).map(|n| n.len()).unwrap_or(0);
        let start_budget =
            target_anchor_length + self.cfg.max_evidence_distance as usize + first_len;
        let starting_anchor = anchor::extend_start(&self.graph, first, start_budget);

        // load far enough ahead that the forward anchor is fully defined
        let last_len = self.graph.node(last.node).map(|n| n.len()).unwrap_or(0);
        let last_end = last.first_end + last_len as i32 - 1;
        self.advance_to(
            last_end
                .saturating_add(target_anchor_length as i32)
                .saturating_add(self.cfg.max_evidence_distance),
        );
        let end_budget = target_anchor_length + self.cfg.max_evidence_distance as usize + last_len;
        let ending_anchor = anchor::extend_end(&self.graph, last, end_budget);

        let record = self.build_record(
            &contig,
            &starting_anchor,
            &ending_anchor,
            &evidence,
            target_anchor_length,
        );

        self.stats = ContigStats {
            contig_nodes: contig.len(),
            truncated_nodes: raw.len().saturating_sub(contig.len()),
            contig_start_position: first.first_start,
            start_anchor_nodes: starting_anchor.len(),
            end_anchor_nodes: ending_anchor.len(),
        };

        if record.is_some() {
            self.export_assembly_graphs(&starting_anchor, &contig, &ending_anchor);
        }

        // remove all evidence contributing to this assembly from the graph
        if !evidence.is_empty() {
            self.remove_evidence(&evidence);
            if self.cfg.sanity_checks {
                assert!(
                    self.verify_memoization(),
                    "memoization does not match fresh recomputation after removal ({})",
                    self.cfg.contig_name
                );
            }
        } else {
            error!(
                "sanity check failure: found path with no support; attempting recovery by direct node removal ({})",
                self.cfg.contig_name
            );
            self.remove_contig_nodes_directly(&contig);
        }
        self.contigs_called += 1;
        record
    }

    fn build_record(
        &self,
        contig: &[Subnode],
        starting_anchor: &[Subnode],
        ending_anchor: &[Subnode],
        evidence: &[KmerEvidence],
        target_anchor_length: usize,
    ) -> Option<AssemblyRecord> {
        let k = self.cfg.k;
        let full: Vec<Subnode> = starting_anchor
            .iter()
            .chain(contig.iter())
            .chain(ending_anchor.iter())
            .copied()
            .collect();
        let mut kmers: Vec<Kmer> = Vec::new();
        let mut weights: Vec<u32> = Vec::new();
        for sn in &full {
            let n = self.graph.node(sn.node)?;
            kmers.extend_from_slice(&n.kmers);
            weights.extend_from_slice(&n.weights);
        }
        let bases = kmer::base_calls(&kmers, k);
        let quals = kmer::weights_to_quals(k, &weights);
        debug_assert_eq!(bases.len(), quals.len());

        let anchor_kmers = |anchor: &[Subnode]| -> usize {
            anchor
                .iter()
                .filter_map(|sn| self.graph.node(sn.node).map(|n| n.len()))
                .sum()
        };
        // left aligned anchor position; anchoring is a single base wide
        let start_anchor_bases = if starting_anchor.is_empty() {
            0
        } else {
            anchor_kmers(starting_anchor) + k - 1
        };
        let end_anchor_bases = if ending_anchor.is_empty() {
            0
        } else {
            anchor_kmers(ending_anchor) + k - 1
        };
        let start_trim = start_anchor_bases.saturating_sub(target_anchor_length);
        let end_trim = end_anchor_bases.saturating_sub(target_anchor_length);
        let bases = bases[start_trim..bases.len() - end_trim].to_vec();
        let quals = quals[start_trim..quals.len() - end_trim].to_vec();

        let start_anchor_position = starting_anchor.last().map(|sn| {
            let n_len = self
                .graph
                .node(sn.node)
                .map(|n| n.len() as i32)
                .unwrap_or(1);
            sn.first_start + n_len - 1 + k as i32 - 1
        });
        let end_anchor_position = ending_anchor.first().map(|sn| sn.first_start);

        let first_start = contig[0].first_start;
        let evidence_ids: Vec<String> = evidence.iter().map(|e| e.id.clone()).collect();

        let kind = match (start_anchor_position, end_anchor_position) {
            (None, None) => {
                if evidence.iter().any(|e| e.anchored) {
                    debug!(
                        "unanchored assembly at {}:{} contains anchored evidence",
                        self.cfg.contig_name, first_start
                    );
                }
                AssemblyKind::Unanchored {
                    breakend: crate::output::breakend_interval(evidence),
                }
            }
            (None, Some(pos)) => AssemblyKind::Anchored {
                direction: Direction::Backward,
                anchor: Anchor {
                    reference_index: self.cfg.reference_index,
                    position: pos,
                    anchor_bases: (end_anchor_bases - end_trim) as u32,
                },
            },
            (Some(pos), None) => AssemblyKind::Anchored {
                direction: Direction::Forward,
                anchor: Anchor {
                    reference_index: self.cfg.reference_index,
                    position: pos,
                    anchor_bases: (start_anchor_bases - start_trim) as u32,
                },
            },
            (Some(start_pos), Some(end_pos)) => {
                if start_anchor_bases - start_trim + (end_anchor_bases - end_trim) >= quals.len() {
                    // no unanchored bases: not a structural variant assembly
                    return None;
                }
                AssemblyKind::Breakpoint {
                    start_anchor: Anchor {
                        reference_index: self.cfg.reference_index,
                        position: start_pos,
                        anchor_bases: (start_anchor_bases - start_trim) as u32,
                    },
                    end_anchor: Anchor {
                        reference_index: self.cfg.reference_index,
                        position: end_pos,
                        anchor_bases: (end_anchor_bases - end_trim) as u32,
                    },
                }
            }
        };
        Some(AssemblyRecord {
            reference_index: self.cfg.reference_index,
            first_start,
            seq: bases,
            quals,
            kind,
            evidence_ids,
        })
    }

    fn export_assembly_graphs(
        &mut self,
        starting_anchor: &[Subnode],
        contig: &[Subnode],
        ending_anchor: &[Subnode],
    ) {
        let Some(vis) = &self.cfg.visualisation else {
            return;
        };
        let full: Vec<Subnode> = starting_anchor
            .iter()
            .chain(contig.iter())
            .chain(ending_anchor.iter())
            .copied()
            .collect();
        if vis.assembly_graph {
            let path = vis.directory.join(format!(
                "assembly.{}.{}.dot",
                self.cfg.contig_name, self.contigs_called
            ));
            if let Err(e) = export::export_dot(&self.graph, &full, &path) {
                debug!("error exporting assembly {:?}: {}", path, e);
            }
        }
        if vis.assembly_graph_full_size {
            let path = vis.directory.join(format!(
                "assembly.fullsize.{}.{}.dot",
                self.cfg.contig_name, self.contigs_called
            ));
            if let Err(e) = export::export_full_dot(&self.graph, &full, &path) {
                debug!("error exporting full size assembly {:?}: {}", path, e);
            }
        }
    }

    // ------------------------------
    // Weight removal
    // ------------------------------

    fn remove_contig_nodes_directly(&mut self, contig: &[Subnode]) {
        let mut ids: Vec<NodeId> = contig
            .iter()
            .map(|sn| sn.node)
            .filter(|&id| self.graph.contains(id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if let Some(c) = self.caller.as_mut() {
            c.remove(&self.graph, &ids);
        }
        if let Some(c) = self.unanchored_caller.as_mut() {
            c.remove(&self.graph, &ids);
        }
        for id in ids {
            let removed = self.graph.remove(id);
            self.emitted_weight += removed.total_weight();
        }
    }

    /// Subtract the weight of every support cell of the given evidence from
    /// the graph, splitting drained nodes and re-admitting the survivors.
    fn remove_evidence(&mut self, evidence: &[KmerEvidence]) {
        if evidence.is_empty() {
            return;
        }
        let np = self.next_position();
        let mut to_remove: FastHashMap<NodeId, Vec<u32>> = FastHashMap::default();
        for ev in evidence {
            for cell in ev.support.iter().flatten() {
                if cell.last_end() >= np {
                    error!(
                        "sanity check failure: evidence {} extending to {} removed when input at {}:{}",
                        ev.id,
                        cell.last_end(),
                        self.cfg.contig_name,
                        np
                    );
                    // try to recover anyway
                }
                for kc in self.graph.lookup_kmer(cell.kmer) {
                    let Some(n) = self.graph.node(kc.node) else {
                        continue;
                    };
                    let (s, e) = n.interval_at(kc.offset as usize);
                    if overlaps(cell.first_start, cell.first_end, s, e) {
                        let w = to_remove
                            .entry(kc.node)
                            .or_insert_with(|| vec![0u32; n.len()]);
                        w[kc.offset as usize] = w[kc.offset as usize].saturating_add(cell.weight);
                    }
                }
            }
        }
        let mut ids: Vec<NodeId> = to_remove.keys().copied().collect();
        ids.sort_unstable();
        if let Some(c) = self.caller.as_mut() {
            c.remove(&self.graph, &ids);
        }
        if let Some(c) = self.unanchored_caller.as_mut() {
            c.remove(&self.graph, &ids);
        }
        for id in ids {
            let weights = &to_remove[&id];
            let removed = self.graph.remove(id);
            let before = removed.total_weight();
            let survivors = node::remove_weight(removed, weights);
            let mut after = 0u64;
            let mut new_ids: Vec<NodeId> = Vec::with_capacity(survivors.len());
            for part in survivors {
                after += part.weights.iter().map(|&w| w as u64).sum::<u64>();
                new_ids.push(self.graph.insert(part));
            }
            self.emitted_weight += before - after;
            for nid in new_ids {
                if let Some(c) = self.caller.as_mut() {
                    c.add(&self.graph, nid);
                }
                if let Some(c) = self.unanchored_caller.as_mut() {
                    c.add(&self.graph, nid);
                }
            }
        }
        if self.cfg.sanity_checks {
            assert!(self.graph.sanity_check(), "graph inconsistent after removal");
            assert!(
                self.graph.sanity_check_disjoint_intervals(),
                "overlapping node intervals after removal"
            );
        }
    }

    // ------------------------------
    // Orphan removal
    // ------------------------------

    /// Remove reference-only islands that can never produce output.
    ///
    /// As non-reference contigs are called, reference subgraphs may be left
    /// behind with no overlapping non-reference k-mers; they are detected as
    /// position-contiguous clusters that are entirely reference and end well
    /// before the input frontier.
    fn remove_orphaned_reference_subgraphs(&mut self) {
        let np = self.next_position();
        let Some(first) = self.graph.first() else {
            return;
        };
        let first_start = self
            .graph
            .node(first)
            .map(|n| n.first_start)
            .unwrap_or(i32::MAX);
        if first_start as i64
            >= np as i64 - ORPHAN_EVIDENCE_MULTIPLE * self.cfg.max_evidence_distance as i64
        {
            return;
        }
        let horizon = np as i64 - self.cfg.max_evidence_distance as i64;

        let snapshot: Vec<NodeId> = self.graph.range_by_first_start(i32::MIN, np).collect();
        let mut orphaned: Vec<NodeId> = Vec::new();
        let mut cluster: Vec<NodeId> = Vec::new();
        let mut cluster_all_ref = true;
        let mut cluster_last_end = i64::MIN;
        for id in snapshot {
            let Some(n) = self.graph.node(id) else {
                continue;
            };
            if !cluster.is_empty() && (n.first_start as i64) > cluster_last_end + 1 {
                if cluster_all_ref && cluster_last_end < horizon {
                    orphaned.append(&mut cluster);
                } else {
                    cluster.clear();
                }
                cluster_all_ref = true;
                cluster_last_end = i64::MIN;
            }
            cluster_all_ref &= n.reference;
            cluster_last_end = cluster_last_end.max(n.last_end() as i64);
            cluster.push(id);
        }
        if cluster_all_ref && cluster_last_end < horizon {
            orphaned.append(&mut cluster);
        }
        if orphaned.is_empty() {
            return;
        }

        let subnodes: Vec<Subnode> = orphaned
            .iter()
            .filter_map(|&id| self.graph.node(id).map(|n| Subnode::whole(id, n)))
            .collect();
        let evidence = self.tracker.untrack(&self.graph, &subnodes);
        self.remove_evidence(&evidence);
        // safety check: did we remove them all?
        for id in orphaned {
            if self.graph.contains(id) {
                error!(
                    "sanity check failure: node not removed when clearing orphans ({} evidence found); attempting recovery by direct node removal ({})",
                    evidence.len(),
                    self.cfg.contig_name
                );
                if let Some(c) = self.caller.as_mut() {
                    c.remove(&self.graph, &[id]);
                }
                if let Some(c) = self.unanchored_caller.as_mut() {
                    c.remove(&self.graph, &[id]);
                }
                let removed = self.graph.remove(id);
                self.emitted_weight += removed.total_weight();
            }
        }
    }

    // ------------------------------
    // Monitoring
    // ------------------------------

    pub fn tracking_active_nodes(&self) -> usize {
        self.graph.len()
    }

    pub fn tracking_max_kmer_active_nodes(&self) -> usize {
        self.graph.max_kmer_bucket()
    }

    pub fn tracking_underlying_consumed(&self) -> u64 {
        self.consumed
    }

    pub fn tracking_input_position(&mut self) -> i32 {
        self.next_position()
    }

    pub fn tracking_first_position(&self) -> i32 {
        self.graph
            .first()
            .and_then(|id| self.graph.node(id))
            .map(|n| n.first_start)
            .unwrap_or(i32::MAX)
    }

    pub fn tracking_contigs_called(&self) -> u64 {
        self.contigs_called
    }

    pub fn tracking_last_contig(&self) -> ContigStats {
        self.stats
    }

    /// Support weight consumed by emitted or discarded contigs so far.
    pub fn emitted_weight(&self) -> u64 {
        self.emitted_weight
    }

    /// Support weight still live in the graph.
    pub fn remaining_weight(&self) -> u64 {
        self.graph.total_weight()
    }

    pub fn total_registered_weight(&self) -> u64 {
        self.tracker.total_registered_weight()
    }
}

impl<I: Iterator<Item = PathNodeInput>> Assembler<I> {
    fn step(&mut self) -> Step {
        let Some(best) = self.find_best_contig() else {
            // no more contigs
            if self.underlying.peek().is_some() {
                error!(
                    "sanity check failure: end of contigs called before all evidence loaded ({})",
                    self.cfg.contig_name
                );
            }
            self.remove_orphaned_reference_subgraphs();
            if !self.graph.is_empty() {
                error!(
                    "sanity check failure: non-empty graph with no contigs called ({})",
                    self.cfg.contig_name
                );
            }
            return Step::Done;
        };
        match self.call_contig(best) {
            Some(record) => Step::Emitted(record),
            // the contig was filtered out; go back for the next one
            None => Step::Skip,
        }
    }
}

impl<I: Iterator<Item = PathNodeInput>> Iterator for Assembler<I> {
    type Item = AssemblyRecord;

    fn next(&mut self) -> Option<AssemblyRecord> {
        if self.finished {
            return None;
        }
        loop {
            match self.step() {
                Step::Emitted(record) => return Some(record),
                Step::Skip => continue,
                Step::Done => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}
