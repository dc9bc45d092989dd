//! Execution-width lowering.
//!
//! Instructions wider than their native width are split into `n` narrower
//! instances, each covering one contiguous lane group. Sources that cannot be
//! addressed by a lane offset are copied ("unzipped") into scratch registers
//! first; destinations that cannot be written group by group go through a
//! scratch register that is copied back ("zipped") after the last instance.
//!
//! Emitted instructions are checked again, so an instance that is still too
//! wide (or a copy that is itself too wide) is lowered on the next round.

use super::region::{is_periodic, passes_through};
use super::width::decide_width;
use super::{Transform, TransformCategory, TransformLevel, register_limits};
use crate::error::{LegalizeError, Result};
use lanelegal_mir::{
    AnalysisDeps, ArchReg, Instruction, MAX_SOURCES, Opcode, Operand, Program, VirtualRegTable,
    regions_overlap, units_for_bytes,
};
use lanelegal_platform::{Erratum, TargetCaps};
use smallvec::SmallVec;
use tracing::{debug, instrument, trace};

/// Bound on re-lowering of emitted instructions, `log2` of the widest width
pub const DEFAULT_MAX_ROUNDS: u32 = 5;

/// Statistics about width lowering
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LowerWidthStats {
    /// Instructions replaced by narrower instances
    pub instructions_lowered: usize,
    /// Operand-free instructions narrowed in place
    pub instructions_narrowed: usize,
    /// Instructions inserted, copies included
    pub instructions_emitted: usize,
    /// Scratch registers allocated for unzip and zip copies
    pub scratch_registers: usize,
    /// Copy instructions inserted
    pub copies_emitted: usize,
    /// Deepest re-lowering round reached
    pub max_round: u32,
}

/// Width lowering transform
#[derive(Debug, Clone, Copy)]
pub struct LowerWidth {
    max_rounds: u32,
}

impl Default for LowerWidth {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl Transform for LowerWidth {
    fn name(&self) -> &'static str {
        "lower_width"
    }

    fn description(&self) -> &'static str {
        "Splits instructions wider than the target's native width into narrower instances"
    }

    fn category(&self) -> TransformCategory {
        TransformCategory::Legalization
    }

    fn level(&self) -> TransformLevel {
        TransformLevel::Stable
    }

    fn apply(&self, program: &mut Program, caps: &TargetCaps) -> Result<bool> {
        self.apply_internal(program, caps)
            .map(|stats| stats.instructions_lowered > 0 || stats.instructions_narrowed > 0)
    }
}

impl LowerWidth {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }

    /// Lower every instruction of `program` to its native width
    #[instrument(skip_all, name = "lower_width")]
    pub fn apply_internal(
        &self,
        program: &mut Program,
        caps: &TargetCaps,
    ) -> Result<LowerWidthStats> {
        let mut stats = LowerWidthStats::default();
        program.vgrfs.set_limits(register_limits(caps));

        for block in 0..program.blocks.len() {
            // Lowering round that produced each instruction
            let mut rounds = vec![0u32; program.blocks[block].len()];
            let mut index = 0;

            while index < program.blocks[block].instructions.len() {
                let inst = &program.blocks[block].instructions[index];
                let width = decide_width(inst, caps);
                if width == inst.exec_size {
                    index += 1;
                    continue;
                }

                let round = rounds[index];
                if round >= self.max_rounds {
                    return Err(LegalizeError::LoweringDidNotConverge {
                        block,
                        index,
                        rounds: round,
                    });
                }

                if inst.dst.is_none() && inst.srcs.iter().all(Operand::is_none) {
                    debug!(block, index, opcode = %inst.opcode, from = inst.exec_size, to = width, "narrowed in place");
                    program.blocks[block].instructions[index].exec_size = width;
                    stats.instructions_narrowed += 1;
                    index += 1;
                    continue;
                }

                let inst = inst.clone();
                let replacement =
                    lower_instruction(&inst, width as u32, caps, &mut program.vgrfs, &mut stats)?;
                debug!(
                    block,
                    index,
                    opcode = %inst.opcode,
                    from = inst.exec_size,
                    to = width,
                    emitted = replacement.len(),
                    "lowered instruction"
                );

                stats.instructions_lowered += 1;
                stats.instructions_emitted += replacement.len();
                stats.max_round = stats.max_round.max(round + 1);
                let emitted = replacement.len();
                program.blocks[block]
                    .instructions
                    .splice(index..=index, replacement);
                rounds.splice(index..=index, std::iter::repeat_n(round + 1, emitted));
                // Emitted instructions are revisited starting at `index`
            }
        }

        if stats.instructions_lowered > 0 || stats.instructions_narrowed > 0 {
            program.invalidate(AnalysisDeps::ALL);
        }
        Ok(stats)
    }
}

/// Source `i` must be copied into a scratch register before being split
fn needs_src_copy(inst: &Instruction, i: usize, width: u32, caps: &TargetCaps) -> bool {
    if passes_through(inst, i) || inst.components_read(i) == 0 {
        return false;
    }
    let src = &inst.srcs[i];
    let addressable = is_periodic(src, width)
        || (inst.components_read(i) == 1 && width <= inst.exec_size as u32);
    !addressable || flag_hazard(inst, src, caps)
}

/// An earlier instance's flag write would be visible to a later instance
/// reading the same flag as data
fn flag_hazard(inst: &Instruction, src: &Operand, caps: &TargetCaps) -> bool {
    match (src, inst.flags_written()) {
        (Operand::Arch(ArchReg::Flag(read), _), Some(written)) => {
            *read == written || caps.has_erratum(Erratum::FlagSourceOverlap)
        }
        _ => false,
    }
}

/// The destination has to be assembled in a scratch register
fn needs_dst_temp(inst: &Instruction, width: u32, src_copy: &[bool]) -> bool {
    if inst.dst.reg().is_none() {
        return false;
    }
    let exec = inst.exec_size as u32;
    if inst.size_written > inst.dst.component_size(exec) || width > exec {
        return true;
    }
    inst.srcs.iter().enumerate().any(|(i, src)| {
        !src_copy[i]
            && regions_overlap(&inst.dst, inst.size_written, src, inst.size_read(i))
            && inst.dst != *src
    })
}

fn copy(dst: Operand, src: Operand, width: u32, group: u32, orig: &Instruction) -> Instruction {
    let mut mov = Instruction::new(Opcode::Mov, width as u8, dst, [src]).with_group(group as u8);
    mov.force_writemask_all = orig.force_writemask_all;
    mov
}

/// Replacement sequence for `inst` at `width` lanes: unzip copies, the
/// instances in ascending group order, then zip copies.
fn lower_instruction(
    inst: &Instruction,
    width: u32,
    caps: &TargetCaps,
    vgrfs: &mut VirtualRegTable,
    stats: &mut LowerWidthStats,
) -> Result<Vec<Instruction>> {
    let exec = inst.exec_size as u32;
    assert!(
        width > 0 && exec % width == 0,
        "{}: width {} does not divide the declared width",
        inst,
        width
    );
    let n = exec / width;
    let dst_comps = inst.dst_components();

    let src_copy: SmallVec<[bool; MAX_SOURCES]> = (0..inst.srcs.len())
        .map(|i| needs_src_copy(inst, i, width, caps))
        .collect();
    let dst_temp = needs_dst_temp(inst, width, &src_copy);
    assert!(
        !(inst.eot && dst_temp),
        "{}: end-of-thread instruction cannot be followed by zip copies",
        inst
    );

    let mut before = Vec::new();
    let mut instances = Vec::with_capacity(n as usize);
    let mut after = Vec::new();

    // Highest group first. Copies accumulate before the original position and
    // each instance lands right after it, which leaves the instances in
    // ascending group order.
    for j in (0..n).rev() {
        let lane0 = j * width;
        let group = inst.group as u32 + lane0;
        let mut split = inst.clone();
        split.exec_size = width as u8;
        split.group = group as u8;
        split.eot = inst.eot && j == n - 1;

        for (i, src) in inst.srcs.iter().enumerate() {
            if passes_through(inst, i) {
                continue;
            }
            split.srcs[i] = if src_copy[i] {
                let comps = inst.components_read(i);
                let ty = src
                    .ty()
                    .unwrap_or_else(|| panic!("{}: copied source {} has no type", inst, i));
                let tmp = vgrfs.allocate(units_for_bytes(comps * width * ty.size()))?;
                let tmp = Operand::vgrf(tmp, ty);
                for k in 0..comps {
                    before.push(copy(
                        tmp.component(width, k),
                        src.component(exec, k).horiz_offset(lane0),
                        width,
                        group,
                        inst,
                    ));
                }
                trace!(source = i, group, comps, "unzipped source");
                stats.scratch_registers += 1;
                stats.copies_emitted += comps as usize;
                tmp
            } else if is_periodic(src, width) {
                *src
            } else {
                src.horiz_offset(lane0)
            };
        }

        let dst_part = inst.dst.horiz_offset(lane0);
        if dst_temp {
            let ty = inst
                .dst
                .ty()
                .unwrap_or_else(|| panic!("{}: destination has no type", inst));
            let tmp = vgrfs.allocate(units_for_bytes(dst_comps * width * ty.size()))?;
            let tmp = Operand::vgrf(tmp, ty);
            if inst.predicate.is_some() {
                // Lanes the predicate disables keep the old destination value
                for k in 0..dst_comps {
                    before.push(copy(
                        tmp.component(width, k),
                        dst_part.component(exec, k),
                        width,
                        group,
                        inst,
                    ));
                }
                stats.copies_emitted += dst_comps as usize;
            }
            for k in 0..dst_comps {
                after.push(copy(
                    dst_part.component(exec, k),
                    tmp.component(width, k),
                    width,
                    group,
                    inst,
                ));
            }
            trace!(group, dst_comps, "zipped destination");
            stats.scratch_registers += 1;
            stats.copies_emitted += dst_comps as usize;
            split.dst = tmp;
        } else {
            split.dst = dst_part;
        }
        split.size_written = match split.dst {
            Operand::Vgrf(_) | Operand::Fixed(_) => dst_comps * split.dst.component_size(width),
            _ => 0,
        };

        instances.push(split);
    }
    instances.reverse();

    let mut replacement = before;
    replacement.extend(instances);
    replacement.extend(after);
    Ok(replacement)
}
