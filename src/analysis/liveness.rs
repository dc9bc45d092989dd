//! Virtual register live ranges.
//!
//! Instructions are numbered in program order across all blocks. A register
//! is live from its first definition (or from the program start when it is
//! read before any definition) to its last access. A range that touches a
//! loop is widened to the whole `Do`..`While` span, since the back edge keeps
//! values alive across iterations.

use lanelegal_mir::{Opcode, Program};
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

/// Live range of one virtual register over linear instruction positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRange {
    /// Virtual register index
    pub nr: u32,
    /// First position at which the value is live
    pub start: usize,
    /// Last position at which the value is live
    pub end: usize,
    /// Positions writing the register
    pub defs: Vec<usize>,
    /// Positions reading the register
    pub uses: Vec<usize>,
}

impl LiveRange {
    fn new(nr: u32, start: usize) -> Self {
        Self {
            nr,
            start,
            end: start,
            defs: Vec::new(),
            uses: Vec::new(),
        }
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos <= self.end
    }
}

impl fmt::Display for LiveRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vgrf{}: [{}, {}]", self.nr, self.start, self.end)
    }
}

/// Compute live ranges for every virtual register the program accesses
pub fn compute_live_ranges(program: &Program) -> BTreeMap<u32, LiveRange> {
    let mut live_ranges: BTreeMap<u32, LiveRange> = BTreeMap::new();

    // First pass: definitions and uses
    for (pos, (_, inst)) in program.instructions().enumerate() {
        // Sources are read before the destination is written
        for nr in inst.use_vgrfs() {
            let range = live_ranges
                .entry(nr)
                .or_insert_with(|| LiveRange::new(nr, 0));
            range.end = pos;
            if range.uses.last() != Some(&pos) {
                range.uses.push(pos);
            }
        }
        if let Some(nr) = inst.def_vgrf() {
            let range = live_ranges
                .entry(nr)
                .or_insert_with(|| LiveRange::new(nr, pos));
            range.end = pos;
            range.defs.push(pos);
        }
    }

    // Second pass: widen across loops
    let loops = loop_spans(program);
    let mut changed = true;
    while changed {
        changed = false;
        for range in live_ranges.values_mut() {
            for &(head, tail) in &loops {
                if range.start <= tail && range.end >= head {
                    let start = range.start.min(head);
                    let end = range.end.max(tail);
                    if (start, end) != (range.start, range.end) {
                        trace!(nr = range.nr, head, tail, "range widened across loop");
                        range.start = start;
                        range.end = end;
                        changed = true;
                    }
                }
            }
        }
    }

    live_ranges
}

/// Linear positions of matching `Do`/`While` pairs
pub fn loop_spans(program: &Program) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    for (pos, (_, inst)) in program.instructions().enumerate() {
        match inst.opcode {
            Opcode::Do => open.push(pos),
            Opcode::While => {
                if let Some(head) = open.pop() {
                    spans.push((head, pos));
                }
            }
            _ => {}
        }
    }
    spans
}

/// Check if two live ranges interfere.
///
/// A range ending where another starts does not interfere: the instruction
/// at that position reads the old value before writing the new one.
pub fn ranges_interfere(range1: &LiveRange, range2: &LiveRange) -> bool {
    (range1.start < range2.end && range2.start < range1.end) || range1.start == range2.start
}

/// Live ranges of a whole program
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    ranges: BTreeMap<u32, LiveRange>,
}

impl Liveness {
    pub fn compute(program: &Program) -> Self {
        Self {
            ranges: compute_live_ranges(program),
        }
    }

    pub fn range(&self, nr: u32) -> Option<&LiveRange> {
        self.ranges.get(&nr)
    }

    /// Registers `a` and `b` hold values at the same time.
    /// Registers the program never touches interfere with nothing.
    pub fn interferes(&self, a: u32, b: u32) -> bool {
        match (self.ranges.get(&a), self.ranges.get(&b)) {
            (Some(ra), Some(rb)) => a != b && ranges_interfere(ra, rb),
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveRange> + '_ {
        self.ranges.values()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
