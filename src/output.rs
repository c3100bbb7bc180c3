// Assembly output records.
//
// A called contig becomes exactly one record: an unanchored breakend, a
// single-anchored breakend, or a breakpoint, depending on which ends carry a
// reference anchor. Records are fully constructed or not emitted at all.

use crate::evidence::KmerEvidence;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Forward,
    Backward,
}

/// A reference anchor: the pinned position and how many assembly bases lie
/// on the reference side of it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Anchor {
    pub reference_index: u32,
    pub position: i32,
    pub anchor_bases: u32,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AssemblyKind {
    /// No reference anchor on either side; the breakend position is the
    /// weighted consensus of the contributing evidence.
    Unanchored { breakend: (i32, i32) },
    /// Anchored on one side; Forward means the breakend extends past the
    /// anchored start, Backward past the anchored end.
    Anchored { direction: Direction, anchor: Anchor },
    /// Anchored on both sides: a candidate structural variant junction.
    Breakpoint { start_anchor: Anchor, end_anchor: Anchor },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssemblyRecord {
    pub reference_index: u32,
    /// First position of the called contig; outputs are non-decreasing in
    /// this field.
    pub first_start: i32,
    pub seq: Vec<u8>,
    pub quals: Vec<u8>,
    pub kind: AssemblyKind,
    pub evidence_ids: Vec<String>,
}

/// Deterministic breakend interval from the contributing evidence: the
/// earliest interval segment carrying the maximum total quality across the
/// individual breakend intervals.
pub fn breakend_interval(evidence: &[KmerEvidence]) -> (i32, i32) {
    // open at start, close past the end: coverage is piecewise constant
    // between events
    let mut events: Vec<(i32, f64)> = Vec::with_capacity(evidence.len() * 2);
    for ev in evidence {
        let (start, end) = ev.breakend;
        if start > end {
            continue;
        }
        events.push((start, ev.quality));
        events.push((end + 1, -ev.quality));
    }
    if events.is_empty() {
        return (0, 0);
    }
    events.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    const EPS: f64 = 1e-9;
    let mut best: Option<(f64, i32, i32)> = None;
    let mut coverage = 0.0f64;
    let mut i = 0;
    while i < events.len() {
        let pos = events[i].0;
        while i < events.len() && events[i].0 == pos {
            coverage += events[i].1;
            i += 1;
        }
        let seg_end = if i < events.len() { events[i].0 - 1 } else { pos };
        let raises = match best {
            Some((bc, _, _)) => coverage > bc + EPS,
            None => coverage > EPS,
        };
        if raises {
            best = Some((coverage, pos, seg_end));
        } else if let Some((bc, _, be)) = &mut best {
            // a contiguous plateau extends the best segment
            if (coverage - *bc).abs() <= EPS && *be + 1 == pos {
                *be = seg_end;
            }
        }
    }
    best.map(|(_, s, e)| (s, e.max(s))).unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(id: &str, breakend: (i32, i32), quality: f64) -> KmerEvidence {
        KmerEvidence {
            id: id.to_string(),
            support: Vec::new(),
            breakend,
            quality,
            anchored: false,
        }
    }

    #[test]
    fn breakend_interval_takes_max_coverage_segment() {
        let evs = vec![
            ev("a", (200, 205), 1.0),
            ev("b", (200, 205), 1.0),
            ev("c", (300, 310), 1.0),
        ];
        assert_eq!(breakend_interval(&evs), (200, 205));
    }

    #[test]
    fn breakend_interval_narrows_to_overlap() {
        let evs = vec![ev("a", (100, 110), 1.0), ev("b", (105, 120), 1.0)];
        assert_eq!(breakend_interval(&evs), (105, 110));
    }

    #[test]
    fn breakend_interval_prefers_heavier_quality() {
        let evs = vec![ev("a", (100, 110), 1.0), ev("b", (200, 210), 5.0)];
        assert_eq!(breakend_interval(&evs), (200, 210));
    }

    #[test]
    fn breakend_interval_ties_take_the_earliest() {
        let evs = vec![ev("a", (100, 110), 1.0), ev("b", (200, 210), 1.0)];
        assert_eq!(breakend_interval(&evs), (100, 110));
    }

    #[test]
    fn breakend_interval_empty_is_zeroed() {
        assert_eq!(breakend_interval(&[]), (0, 0));
    }
}
