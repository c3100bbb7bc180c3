// Visualisation side-outputs.
//
// Diagnostic only: DOT renderings of the assembled subgraph or the whole
// loaded graph, written next to the memoization CSV dumps. Callers swallow
// failures at debug level; nothing here may influence the output stream.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::graph::Graph;
use crate::kmer;
use crate::node::{NodeId, Subnode};

/// Write the called contig and its graph neighbourhood in DOT format.
pub fn export_dot(graph: &Graph, contig: &[Subnode], path: &Path) -> Result<()> {
    let highlighted: Vec<NodeId> = contig.iter().map(|sn| sn.node).collect();
    write_dot(graph, &highlighted, path)
}

/// Write the entire loaded graph in DOT format.
pub fn export_full_dot(graph: &Graph, contig: &[Subnode], path: &Path) -> Result<()> {
    let highlighted: Vec<NodeId> = contig.iter().map(|sn| sn.node).collect();
    write_dot_nodes(graph, graph.iter_by_position().collect(), &highlighted, path)
}

fn write_dot(graph: &Graph, highlighted: &[NodeId], path: &Path) -> Result<()> {
    // the called subgraph: highlighted nodes plus their direct neighbours
    let mut nodes: Vec<NodeId> = highlighted.to_vec();
    for &id in highlighted {
        if let Some(n) = graph.node(id) {
            nodes.extend(n.prev.iter().copied());
            nodes.extend(n.next.iter().copied());
        }
    }
    nodes.sort_unstable();
    nodes.dedup();
    write_dot_nodes(graph, nodes, highlighted, path)
}

fn write_dot_nodes(
    graph: &Graph,
    mut nodes: Vec<NodeId>,
    highlighted: &[NodeId],
    path: &Path,
) -> Result<()> {
    nodes.sort_unstable();
    nodes.dedup();
    let fh = std::fs::File::create(path).with_context(|| format!("create {:?}", path))?;
    let mut w = std::io::BufWriter::new(fh);
    writeln!(w, "digraph assembly {{")?;
    writeln!(w, "  node [shape=box];")?;
    for &id in &nodes {
        let Some(n) = graph.node(id) else {
            continue;
        };
        let label = format!(
            "{} [{},{}] w={}{}",
            String::from_utf8_lossy(&kmer::unpack(n.first_kmer(), graph.k)),
            n.first_start,
            n.first_end,
            n.total_weight(),
            if n.reference { " ref" } else { "" }
        );
        let style = if highlighted.contains(&id) {
            " style=filled fillcolor=lightblue"
        } else {
            ""
        };
        writeln!(w, "  n{} [label=\"{}\"{}];", id.key(), label, style)?;
    }
    for &id in &nodes {
        let Some(n) = graph.node(id) else {
            continue;
        };
        for &s in &n.next {
            if nodes.binary_search(&s).is_ok() {
                writeln!(w, "  n{} -> n{};", id.key(), s.key())?;
            }
        }
    }
    writeln!(w, "}}")?;
    w.flush()?;
    Ok(())
}
