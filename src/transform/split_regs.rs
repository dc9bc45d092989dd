//! Virtual register splitting.
//!
//! Every unit boundary inside a virtual register is a candidate split point
//! unless some single access crosses it. Registers are cut at every
//! remaining candidate so the allocator sees the smallest independently
//! movable pieces. A register cut into several pieces is retired and every
//! piece gets a fresh index; a register that stays whole keeps its index.
//!
//! `Undef` declares a whole register undefined at once, so its own access
//! never pins boundaries. When its register is cut it is re-emitted once per
//! piece.

use super::{Transform, TransformCategory, TransformLevel, register_limits};
use crate::error::Result;
use lanelegal_mir::{
    AnalysisDeps, Instruction, Opcode, Operand, Program, RegRef, UNIT_BYTES,
};
use lanelegal_platform::TargetCaps;
use tracing::{debug, instrument};

/// Statistics about register splitting
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SplitStats {
    /// Registers cut into two or more pieces
    pub registers_split: usize,
    /// Fresh registers introduced for the pieces
    pub registers_created: usize,
    /// `Undef` instructions re-emitted per piece
    pub undefs_rewritten: usize,
}

/// Register splitting transform
#[derive(Debug, Default, Clone, Copy)]
pub struct SplitRegisters;

impl Transform for SplitRegisters {
    fn name(&self) -> &'static str {
        "split_registers"
    }

    fn description(&self) -> &'static str {
        "Splits virtual registers at unit boundaries no single access crosses"
    }

    fn category(&self) -> TransformCategory {
        TransformCategory::RegisterSplitting
    }

    fn level(&self) -> TransformLevel {
        TransformLevel::Stable
    }

    fn apply(&self, program: &mut Program, caps: &TargetCaps) -> Result<bool> {
        program.vgrfs.set_limits(register_limits(caps));
        self.apply_internal(program)
            .map(|stats| stats.registers_split > 0)
    }
}

/// Where one unit of an original register ends up
#[derive(Debug, Clone, Copy)]
struct Placement {
    nr: u32,
    unit: u32,
}

fn access_units(reg: &RegRef, size: u32) -> u32 {
    if size == 0 {
        0
    } else {
        (reg.offset % UNIT_BYTES + size).div_ceil(UNIT_BYTES)
    }
}

impl SplitRegisters {
    /// Split every register of `program` at its unused unit boundaries
    #[instrument(skip_all, name = "split_registers")]
    pub fn apply_internal(&self, program: &mut Program) -> Result<SplitStats> {
        let mut stats = SplitStats::default();
        let count = program.vgrfs.len();

        // First flattened slot of every register
        let mut base = Vec::with_capacity(count);
        let mut total = 0usize;
        for nr in 0..count as u32 {
            base.push(total);
            total += program.vgrfs.size(nr) as usize;
        }

        // A slot may start a new piece unless it is the first unit of its
        // register or some access crosses into it from the previous unit.
        let mut splittable = vec![true; total];
        for nr in 0..count as u32 {
            let first = base[nr as usize];
            let size = program.vgrfs.size(nr) as usize;
            if program.vgrfs.is_retired(nr) {
                splittable[first..first + size].fill(false);
            } else if size > 0 {
                splittable[first] = false;
            }
        }

        for (_, inst) in program.instructions() {
            if inst.opcode == Opcode::Undef {
                continue;
            }
            for (reg, size) in inst.vgrf_accesses() {
                let start = base[reg.nr as usize] + (reg.offset / UNIT_BYTES) as usize;
                let units = access_units(&reg, size) as usize;
                assert!(
                    start + units <= base[reg.nr as usize] + program.vgrfs.size(reg.nr) as usize,
                    "{}: access to vgrf{} outside its declared size",
                    inst,
                    reg.nr
                );
                for boundary in splittable.iter_mut().take(start + units).skip(start + 1) {
                    *boundary = false;
                }
            }
        }

        let mut placement = vec![Placement { nr: 0, unit: 0 }; total];
        let mut has_split = vec![false; count];
        for nr in 0..count as u32 {
            let first = base[nr as usize];
            let size = program.vgrfs.size(nr) as usize;
            let slots = first..first + size;

            let mut runs: Vec<(usize, usize)> = Vec::new();
            for slot in slots.clone() {
                match runs.last_mut() {
                    Some((_, len)) if !splittable[slot] => *len += 1,
                    _ => runs.push((slot, 1)),
                }
            }

            if runs.len() <= 1 {
                for slot in slots {
                    placement[slot] = Placement {
                        nr,
                        unit: (slot - first) as u32,
                    };
                }
                continue;
            }

            let mut pieces = Vec::with_capacity(runs.len());
            for (start, len) in runs {
                let piece = program.vgrfs.allocate(len as u32)?;
                for k in 0..len {
                    placement[start + k] = Placement {
                        nr: piece,
                        unit: k as u32,
                    };
                }
                pieces.push(len);
            }
            debug!(vgrf = nr, ?pieces, "split register");
            program.vgrfs.retire(nr);
            has_split[nr as usize] = true;
            stats.registers_split += 1;
            stats.registers_created += pieces.len();
        }

        if stats.registers_split == 0 {
            return Ok(stats);
        }

        let relocate = |reg: &mut RegRef| {
            if has_split[reg.nr as usize] {
                let slot = base[reg.nr as usize] + (reg.offset / UNIT_BYTES) as usize;
                let Placement { nr, unit } = placement[slot];
                reg.nr = nr;
                reg.offset = unit * UNIT_BYTES + reg.offset % UNIT_BYTES;
            }
        };

        for block in &mut program.blocks {
            let mut rewritten = Vec::with_capacity(block.instructions.len());
            for mut inst in block.instructions.drain(..) {
                if inst.opcode == Opcode::Undef
                    && let Operand::Vgrf(reg) = inst.dst
                    && has_split[reg.nr as usize]
                {
                    let pieces = split_undef(&inst, reg, &base, &placement, |nr| {
                        program.vgrfs.size(nr)
                    });
                    stats.undefs_rewritten += 1;
                    rewritten.extend(pieces);
                    continue;
                }

                if let Operand::Vgrf(reg) = &mut inst.dst {
                    relocate(reg);
                }
                for src in inst.srcs.iter_mut() {
                    if let Operand::Vgrf(reg) = src {
                        relocate(reg);
                    }
                }
                rewritten.push(inst);
            }
            block.instructions = rewritten;
        }

        program.invalidate(AnalysisDeps::ALL);
        Ok(stats)
    }
}

/// One `Undef` per piece covered by the original declaration
fn split_undef(
    inst: &Instruction,
    reg: RegRef,
    base: &[usize],
    placement: &[Placement],
    piece_size: impl Fn(u32) -> u32,
) -> Vec<Instruction> {
    assert!(
        reg.offset % UNIT_BYTES == 0 && inst.size_written % UNIT_BYTES == 0,
        "{}: undef must cover whole units",
        inst
    );
    let start = base[reg.nr as usize] + (reg.offset / UNIT_BYTES) as usize;
    let units = inst.size_written / UNIT_BYTES;

    let mut pieces = Vec::new();
    let mut done = 0;
    while done < units {
        let Placement { nr, unit } = placement[start + done as usize];
        let len = (piece_size(nr) - unit).min(units - done);
        let mut undef = inst.clone();
        undef.dst = Operand::Vgrf(RegRef {
            nr,
            offset: unit * UNIT_BYTES,
            ..reg
        });
        undef.size_written = len * UNIT_BYTES;
        pieces.push(undef);
        done += len;
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanelegal_mir::{ElementType, ProgramBuilder};

    fn mov(dst: Operand, src: Operand, exec: u8) -> Instruction {
        Instruction::new(Opcode::Mov, exec, dst, [src])
    }

    fn f(nr: u32, offset: u32) -> Operand {
        Operand::Vgrf(RegRef::new(nr, ElementType::F).with_offset(offset))
    }

    #[test]
    fn test_split_around_crossed_boundary() {
        // vgrf0 is read once across units 1 and 2
        let mut program = ProgramBuilder::new()
            .vgrfs(&[4, 2])
            .instr(mov(f(1, 0), f(0, 32), 16))
            .build();
        let stats = SplitRegisters.apply_internal(&mut program).unwrap();

        assert_eq!(stats.registers_split, 1);
        assert_eq!(stats.registers_created, 3);
        assert!(program.vgrfs.is_retired(0));
        assert!(!program.vgrfs.is_retired(1));
        assert_eq!(
            (2..5).map(|nr| program.vgrfs.size(nr)).collect::<Vec<_>>(),
            vec![1, 2, 1]
        );

        let inst = &program.blocks[0].instructions[0];
        assert_eq!(inst.srcs[0], f(3, 0));
        assert_eq!(inst.dst, f(1, 0));
    }

    #[test]
    fn test_whole_register_access_keeps_index() {
        let mut program = ProgramBuilder::new()
            .vgrfs(&[2, 2])
            .instr(mov(f(0, 0), f(1, 0), 16))
            .build();
        let before = program.clone();
        let stats = SplitRegisters.apply_internal(&mut program).unwrap();
        assert_eq!(stats, SplitStats::default());
        assert_eq!(program, before);
    }

    #[test]
    fn test_sub_unit_offsets_are_preserved() {
        let mut program = ProgramBuilder::new()
            .vgrfs(&[3, 1])
            .instr(mov(f(1, 0), f(0, 64 + 16), 4))
            .build();
        SplitRegisters.apply_internal(&mut program).unwrap();
        let src = program.blocks[0].instructions[0].srcs[0];
        // Unit 2 of vgrf0 is the third piece
        assert_eq!(src, f(4, 16));
        assert_eq!(program.vgrfs.size(4), 1);
    }

    #[test]
    fn test_undef_rewritten_per_piece() {
        let mut undef = Instruction::new(Opcode::Undef, 16, f(0, 0), []);
        undef.size_written = 4 * UNIT_BYTES;
        let mut program = ProgramBuilder::new()
            .vgrfs(&[4, 2])
            .instr(undef)
            .instr(mov(f(0, 32), f(1, 0), 16))
            .build();
        let stats = SplitRegisters.apply_internal(&mut program).unwrap();

        assert_eq!(stats.undefs_rewritten, 1);
        let insts = &program.blocks[0].instructions;
        assert_eq!(insts.len(), 4);
        let undefs: Vec<_> = insts[..3]
            .iter()
            .map(|i| (i.dst.vgrf_nr().unwrap(), i.size_written / UNIT_BYTES))
            .collect();
        assert_eq!(undefs, vec![(2, 1), (3, 2), (4, 1)]);
        assert_eq!(insts[3].dst, f(3, 0));
    }

    #[test]
    fn test_no_access_spans_two_pieces() {
        let mut program = ProgramBuilder::new()
            .vgrfs(&[6, 6])
            .instr(mov(f(1, 0), f(0, 0), 8))
            .instr(mov(f(1, 32), f(0, 32), 16))
            .instr(mov(f(1, 128), f(0, 160), 8))
            .build();
        SplitRegisters.apply_internal(&mut program).unwrap();
        for (_, inst) in program.instructions() {
            for (reg, size) in inst.vgrf_accesses() {
                assert!(reg.offset + size <= program.vgrfs.size_bytes(reg.nr));
            }
        }
    }
}
