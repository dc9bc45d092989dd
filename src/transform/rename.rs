//! Virtual register renaming.
//!
//! A full, unpredicated definition outside any conditional or loop region
//! kills everything previously stored in its register, so it can start a
//! new identity. The first such definition keeps the register; each later
//! one gets a fresh register and every following use is redirected to it.
//!
//! Planning is a pure scan over the program ([`RenamePlan::compute`]);
//! applying the plan allocates the fresh registers and rewrites operands.

use super::{Transform, TransformCategory, TransformLevel, register_limits};
use crate::error::Result;
use lanelegal_mir::{AnalysisDeps, InstrLoc, Instruction, MAX_SOURCES, Operand, Program};
use lanelegal_platform::TargetCaps;
use smallvec::SmallVec;
use tracing::{debug, instrument};

/// Statistics about register renaming
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenameStats {
    /// Fresh registers introduced
    pub registers_renamed: usize,
    /// Operands redirected to another register
    pub operands_rewritten: usize,
}

/// Operand rewrites for one instruction
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rewrite {
    loc: InstrLoc,
    dst: Option<u32>,
    srcs: SmallVec<[(usize, u32); MAX_SOURCES]>,
}

/// Renaming decisions for a whole program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    /// Index the first fresh register will receive
    pub first_fresh: u32,
    /// Unit sizes of the fresh registers, in allocation order
    pub fresh_sizes: Vec<u32>,
    /// Register each fresh register splits off from
    origins: Vec<u32>,
    rewrites: Vec<Rewrite>,
}

/// The instruction replaces the whole of its destination register
fn is_full_definition(program: &Program, inst: &Instruction, nr: u32) -> bool {
    inst.size_written == program.vgrfs.size_bytes(nr)
        && inst.dst.reg().map(|r| r.offset) == Some(0)
        && !inst.is_partial_write()
}

impl RenamePlan {
    /// Compute the renaming of `program` without modifying it
    pub fn compute(program: &Program) -> Self {
        let first_fresh = program.vgrfs.len() as u32;
        let mut remap: Vec<Option<u32>> = vec![None; program.vgrfs.len()];
        let mut fresh_sizes = Vec::new();
        let mut origins = Vec::new();
        let mut rewrites = Vec::new();

        let depths = program.nesting_depths();
        for ((loc, inst), depth) in program.instructions().zip(depths) {
            let mut rewrite = Rewrite {
                loc,
                dst: None,
                srcs: SmallVec::new(),
            };

            // Sources read the identity in effect before this instruction
            for (i, src) in inst.srcs.iter().enumerate() {
                if let Some(nr) = src.vgrf_nr()
                    && let Some(to) = remap[nr as usize]
                    && to != nr
                {
                    rewrite.srcs.push((i, to));
                }
            }

            if let Some(nr) = inst.def_vgrf() {
                let slot = &mut remap[nr as usize];
                if depth == 0 && is_full_definition(program, inst, nr) {
                    if slot.is_some() {
                        let fresh = first_fresh + fresh_sizes.len() as u32;
                        fresh_sizes.push(program.vgrfs.size(nr));
                        origins.push(nr);
                        *slot = Some(fresh);
                        rewrite.dst = Some(fresh);
                    } else {
                        *slot = Some(nr);
                    }
                } else if let Some(to) = *slot
                    && to != nr
                {
                    rewrite.dst = Some(to);
                }
            }

            if rewrite.dst.is_some() || !rewrite.srcs.is_empty() {
                rewrites.push(rewrite);
            }
        }

        Self {
            first_fresh,
            fresh_sizes,
            origins,
            rewrites,
        }
    }

    /// `(original, fresh)` pairs, in allocation order
    pub fn fresh_registers(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.origins
            .iter()
            .enumerate()
            .map(|(k, &nr)| (nr, self.first_fresh + k as u32))
    }

    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }

    /// Allocate the fresh registers and rewrite operands
    pub fn apply(&self, program: &mut Program) -> Result<RenameStats> {
        let mut stats = RenameStats::default();
        for (k, &size) in self.fresh_sizes.iter().enumerate() {
            let nr = program.vgrfs.allocate(size)?;
            assert_eq!(
                nr,
                self.first_fresh + k as u32,
                "register table changed between planning and applying"
            );
            stats.registers_renamed += 1;
        }

        for rewrite in &self.rewrites {
            let inst = &mut program.blocks[rewrite.loc.block].instructions[rewrite.loc.index];
            if let Some(to) = rewrite.dst
                && let Operand::Vgrf(reg) = &mut inst.dst
            {
                debug!(from = reg.nr, to, "renamed definition");
                reg.nr = to;
                stats.operands_rewritten += 1;
            }
            for &(i, to) in &rewrite.srcs {
                if let Operand::Vgrf(reg) = &mut inst.srcs[i] {
                    reg.nr = to;
                    stats.operands_rewritten += 1;
                }
            }
        }

        if !self.is_empty() {
            program.invalidate(AnalysisDeps::VARIABLES);
        }
        Ok(stats)
    }
}

/// Register renaming transform
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameRegisters;

impl Transform for RenameRegisters {
    fn name(&self) -> &'static str {
        "rename_registers"
    }

    fn description(&self) -> &'static str {
        "Gives independent full definitions outside control flow their own registers"
    }

    fn category(&self) -> TransformCategory {
        TransformCategory::RegisterRenaming
    }

    fn level(&self) -> TransformLevel {
        TransformLevel::Experimental
    }

    fn apply(&self, program: &mut Program, caps: &TargetCaps) -> Result<bool> {
        program.vgrfs.set_limits(register_limits(caps));
        self.apply_internal(program)
            .map(|stats| stats.operands_rewritten > 0)
    }
}

impl RenameRegisters {
    #[instrument(skip_all, name = "rename_registers")]
    pub fn apply_internal(&self, program: &mut Program) -> Result<RenameStats> {
        RenamePlan::compute(program).apply(program)
    }
}
