//! Virtual register compaction.
//!
//! Drops every register no operand references (retired registers included)
//! and renumbers the survivors densely, preserving their relative order.

use super::{Transform, TransformCategory, TransformLevel};
use crate::error::Result;
use lanelegal_mir::{AnalysisDeps, Operand, Program};
use lanelegal_platform::TargetCaps;
use tracing::{debug, instrument};

/// Statistics about register compaction
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompactStats {
    /// Registers dropped from the table
    pub registers_removed: usize,
    /// Surviving registers whose index changed
    pub registers_renumbered: usize,
    /// Table size after compaction
    pub registers_remaining: usize,
}

/// Register compaction transform
#[derive(Debug, Default, Clone, Copy)]
pub struct CompactRegisters;

impl Transform for CompactRegisters {
    fn name(&self) -> &'static str {
        "compact_registers"
    }

    fn description(&self) -> &'static str {
        "Removes unreferenced virtual registers and renumbers the rest densely"
    }

    fn category(&self) -> TransformCategory {
        TransformCategory::RegisterCompaction
    }

    fn level(&self) -> TransformLevel {
        TransformLevel::Stable
    }

    fn apply(&self, program: &mut Program, _caps: &TargetCaps) -> Result<bool> {
        self.apply_internal(program)
            .map(|stats| stats.registers_removed > 0 || stats.registers_renumbered > 0)
    }
}

impl CompactRegisters {
    #[instrument(skip_all, name = "compact_registers")]
    pub fn apply_internal(&self, program: &mut Program) -> Result<CompactStats> {
        let count = program.vgrfs.len();
        let mut referenced = vec![false; count];
        for (_, inst) in program.instructions() {
            for nr in inst.def_vgrf().into_iter().chain(inst.use_vgrfs()) {
                referenced[nr as usize] = true;
            }
        }

        let mut remap: Vec<Option<u32>> = vec![None; count];
        let mut sizes = Vec::new();
        let mut stats = CompactStats::default();
        for nr in 0..count {
            if referenced[nr] {
                let to = sizes.len() as u32;
                if to != nr as u32 {
                    stats.registers_renumbered += 1;
                }
                remap[nr] = Some(to);
                sizes.push(program.vgrfs.size(nr as u32));
            } else {
                stats.registers_removed += 1;
            }
        }
        stats.registers_remaining = sizes.len();

        if stats.registers_removed == 0 && stats.registers_renumbered == 0 {
            return Ok(stats);
        }

        program.for_each_operand_mut(|operand| {
            if let Operand::Vgrf(reg) = operand
                && let Some(to) = remap[reg.nr as usize]
            {
                reg.nr = to;
            }
        });
        program.vgrfs.reset_to(sizes);
        program.invalidate(AnalysisDeps::VARIABLES);

        debug!(
            removed = stats.registers_removed,
            remaining = stats.registers_remaining,
            "compacted registers"
        );
        Ok(stats)
    }
}
