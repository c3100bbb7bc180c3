// End-to-end assembly scenarios over literal k=4 graphs.

mod common;

use common::{path_node, read, run, simple_read, test_config};
use skarv::{AssemblyKind, Direction};

#[test]
fn single_anchored_breakend_forward() {
    let k = 4;
    let nodes = vec![
        // reference AAAA-AAAC, then the soft-clipped branch off AAAC
        path_node(k, "AAAAC", 10, 10, 2, true),
        path_node(k, "AACGTG", 12, 12, 2, false),
    ];
    let evidence = vec![
        simple_read(k, "r1", "AAAACGTG", 10, true),
        simple_read(k, "r2", "AAAACGTG", 10, true),
    ];
    let out = run(test_config(k, 10), nodes, evidence);

    assert_eq!(out.records.len(), 1);
    let rec = &out.records[0];
    assert_eq!(rec.seq, b"AAAACGTG".to_vec());
    assert_eq!(rec.quals.len(), rec.seq.len());
    assert_eq!(rec.first_start, 12);
    assert_eq!(rec.evidence_ids, vec!["r1".to_string(), "r2".to_string()]);
    match &rec.kind {
        AssemblyKind::Anchored { direction, anchor } => {
            assert_eq!(*direction, Direction::Forward);
            assert_eq!(anchor.reference_index, 0);
            assert_eq!(anchor.position, 14);
            assert_eq!(anchor.anchor_bases, 5);
        }
        other => panic!("expected a forward anchored breakend, got {:?}", other),
    }
    assert_eq!(out.contigs_called, 1);
    assert_eq!(out.active_nodes, 0);
    assert_eq!(out.emitted_weight, out.registered_weight);
}

#[test]
fn unanchored_breakend() {
    let k = 4;
    let nodes = vec![
        path_node(k, "TTGAC", 100, 100, 2, false),
        path_node(k, "GACCT", 102, 102, 2, false),
    ];
    let evidence = vec![
        read(k, "rp1", "TTGACCT", 100, 100, 1, (200, 205), false),
        read(k, "rp2", "TTGACCT", 100, 100, 1, (200, 205), false),
    ];
    let out = run(test_config(k, 10), nodes, evidence);

    assert_eq!(out.records.len(), 1);
    let rec = &out.records[0];
    assert_eq!(rec.seq, b"TTGACCT".to_vec());
    assert_eq!(rec.first_start, 100);
    match &rec.kind {
        AssemblyKind::Unanchored { breakend } => assert_eq!(*breakend, (200, 205)),
        other => panic!("expected an unanchored breakend, got {:?}", other),
    }
    assert_eq!(out.emitted_weight, out.registered_weight);
    assert_eq!(out.remaining_weight, 0);
}

#[test]
fn breakpoint_with_both_anchors() {
    let k = 4;
    let nodes = vec![
        path_node(k, "AAAAC", 10, 10, 2, true),
        path_node(k, "AACGTACGGTG", 12, 12, 2, false),
        path_node(k, "GTGAA", 20, 20, 2, true),
    ];
    let evidence = vec![
        simple_read(k, "r1", "AAAACGTACGGTGAA", 10, true),
        simple_read(k, "r2", "AAAACGTACGGTGAA", 10, true),
    ];
    let out = run(test_config(k, 10), nodes, evidence);

    assert_eq!(out.records.len(), 1);
    let rec = &out.records[0];
    assert_eq!(rec.seq, b"AAAACGTACGGTGAA".to_vec());
    assert_eq!(rec.first_start, 12);
    match &rec.kind {
        AssemblyKind::Breakpoint {
            start_anchor,
            end_anchor,
        } => {
            assert_eq!(start_anchor.position, 14);
            assert_eq!(start_anchor.anchor_bases, 5);
            assert_eq!(end_anchor.position, 20);
            assert_eq!(end_anchor.anchor_bases, 5);
        }
        other => panic!("expected a breakpoint, got {:?}", other),
    }
    assert_eq!(out.active_nodes, 0);
    assert_eq!(out.emitted_weight, out.registered_weight);
}

#[test]
fn fully_anchored_contig_is_dropped() {
    let k = 4;
    // one non-reference kmer between two anchors: anchors cover everything
    let nodes = vec![
        path_node(k, "AAAAC", 10, 10, 1, true),
        path_node(k, "AACG", 12, 12, 1, false),
        path_node(k, "ACGA", 13, 13, 1, true),
    ];
    let evidence = vec![simple_read(k, "r1", "AAAACGA", 10, true)];
    let out = run(test_config(k, 10), nodes, evidence);

    assert!(out.records.is_empty());
    // the contig was still called and its evidence consumed
    assert_eq!(out.contigs_called, 1);
    assert_eq!(out.active_nodes, 0);
    assert_eq!(out.emitted_weight, out.registered_weight);
}

#[test]
fn misassembly_suppression_in_cyclic_subgraph() {
    let k = 4;
    let mut cfg = test_config(k, 10);
    cfg.max_expected_breakend_length_multiple = 2.0;
    cfg.max_concordant_fragment_size = 10;

    let mut nodes = vec![
        // ACGT-CGTA-GTAC-TACG closes on itself across a wide interval; the
        // best unanchored walk unrolls far past the misassembly threshold
        path_node(k, "ACGTACG", 100, 200, 2, false),
    ];
    let mut evidence = vec![
        read(k, "c1", "ACGTACG", 100, 200, 1, (0, 0), false),
        read(k, "c2", "ACGTACG", 100, 200, 1, (0, 0), false),
    ];
    // trailing reference-only input keeps the frontier advancing
    let mut pos = 105;
    while pos <= 195 {
        nodes.push(path_node(k, "AGGC", pos, pos, 1, true));
        evidence.push(simple_read(k, &format!("f{}", pos), "AGGC", pos, true));
        pos += 5;
    }
    nodes.push(path_node(k, "AGGC", 300, 300, 1, true));
    evidence.push(simple_read(k, "f300", "AGGC", 300, true));

    let out = run(cfg, nodes, evidence);

    assert!(out.records.is_empty(), "misassembled region must not assemble");
    assert_eq!(out.contigs_called, 0);
    assert_eq!(out.active_nodes, 0);
    // all evidence was untracked and its weight drained from the graph
    assert_eq!(out.emitted_weight, out.registered_weight);
    assert_eq!(out.remaining_weight, 0);
}

#[test]
fn orphaned_reference_island_is_removed() {
    let k = 4;
    let nodes = vec![
        // reference-only island that never connects to anything
        path_node(k, "AGGC", 0, 0, 1, true),
        path_node(k, "CCTT", 3, 3, 1, true),
        // real unanchored event far past the orphan window
        path_node(k, "TTGAC", 1000, 1000, 2, false),
    ];
    let evidence = vec![
        simple_read(k, "i1", "AGGC", 0, true),
        simple_read(k, "i2", "CCTT", 3, true),
        read(k, "r1", "TTGAC", 1000, 1000, 1, (1100, 1105), false),
        read(k, "r2", "TTGAC", 1000, 1000, 1, (1100, 1105), false),
    ];
    let out = run(test_config(k, 5), nodes, evidence);

    assert_eq!(out.records.len(), 1);
    let rec = &out.records[0];
    assert_eq!(rec.seq, b"TTGAC".to_vec());
    assert_eq!(rec.first_start, 1000);
    // the island contributed to no output
    assert!(rec.evidence_ids.iter().all(|id| id.starts_with('r')));
    assert_eq!(out.contigs_called, 1);
    assert_eq!(out.active_nodes, 0);
    assert_eq!(out.emitted_weight, out.registered_weight);
}

#[test]
fn repeat_kmer_contig_is_split_deterministically() {
    let k = 4;
    let nodes = vec![
        // TACG reappears in the second node: the walk revisits a kmer
        path_node(k, "TTTACGT", 10, 10, 2, false),
        path_node(k, "CGTACG", 14, 14, 1, false),
    ];
    let evidence = vec![
        read(k, "a1", "TTTACGT", 10, 10, 1, (50, 55), false),
        read(k, "a2", "TTTACGT", 10, 10, 1, (50, 55), false),
        read(k, "b1", "CGTACG", 14, 14, 1, (60, 65), false),
    ];
    let out = run(test_config(k, 10), nodes, evidence);

    // the dominant partition (two reads, longer piece) is emitted first and
    // keeps exactly its own bases; the remainder assembles separately
    assert_eq!(out.records.len(), 2);
    assert_eq!(out.records[0].seq, b"TTTACGT".to_vec());
    assert_eq!(
        out.records[0].evidence_ids,
        vec!["a1".to_string(), "a2".to_string()]
    );
    assert_eq!(out.records[1].seq, b"CGTACG".to_vec());
    assert_eq!(out.records[1].evidence_ids, vec!["b1".to_string()]);
    assert!(out.records[0].first_start <= out.records[1].first_start);
    assert_eq!(out.emitted_weight, out.registered_weight);
}
