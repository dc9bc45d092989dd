//! Sanity checks for programs entering and leaving the pipeline.
//!
//! These catch malformed input from instruction selection and bugs in the
//! passes. They never modify the program.

use super::width::decide_width;
use crate::error::{LegalizeError, Result};
use lanelegal_mir::{Instruction, MAX_EXEC_SIZE, Operand, Program, SourceKind};
use lanelegal_platform::TargetCaps;

/// Validate operand shapes, register references and control-flow nesting.
pub fn validate_program(program: &Program) -> Result<()> {
    for (loc, inst) in program.instructions() {
        let at = |msg: String| {
            LegalizeError::Validation(format!(
                "block {} instruction {} `{}`: {}",
                loc.block, loc.index, inst, msg
            ))
        };

        if inst.srcs.len() != inst.opcode.arity() {
            return Err(at(format!(
                "expected {} sources, found {}",
                inst.opcode.arity(),
                inst.srcs.len()
            )));
        }
        if !inst.exec_size.is_power_of_two() || inst.exec_size > MAX_EXEC_SIZE {
            return Err(at(format!("invalid execution size {}", inst.exec_size)));
        }
        if inst.group as u32 + inst.exec_size as u32 > MAX_EXEC_SIZE as u32 {
            return Err(at(format!("channel group {} out of range", inst.group)));
        }
        check_control_sources(inst).map_err(at)?;

        for (reg, size) in inst.vgrf_accesses() {
            if !program.vgrfs.contains(reg.nr) {
                return Err(at(format!("unknown register vgrf{}", reg.nr)));
            }
            if program.vgrfs.is_retired(reg.nr) {
                return Err(at(format!("reference to retired register vgrf{}", reg.nr)));
            }
            let limit = program.vgrfs.size_bytes(reg.nr);
            if reg.offset + size > limit {
                return Err(at(format!(
                    "access of {} bytes at offset {} exceeds vgrf{} ({} bytes)",
                    size, reg.offset, reg.nr, limit
                )));
            }
        }
    }

    validate_nesting(program)
}

/// Control slots must hold integer immediates; component counts must be set
fn check_control_sources(inst: &Instruction) -> std::result::Result<(), String> {
    for (i, src) in inst.srcs.iter().enumerate() {
        if inst.opcode.source_kind(i) != SourceKind::Control {
            continue;
        }
        match src {
            Operand::Imm(imm) if imm.as_u32().is_some() => {}
            other => return Err(format!("control source {} is not an integer ({})", i, other)),
        }
    }
    // A register payload argument has to contribute at least one component
    for (i, src) in inst.srcs.iter().enumerate() {
        if matches!(inst.opcode.source_kind(i), SourceKind::Components { .. })
            && src.reg().is_some()
            && inst.components_read(i) == 0
        {
            return Err(format!("source {} reads zero components ({})", i, src));
        }
    }
    Ok(())
}

fn validate_nesting(program: &Program) -> Result<()> {
    let mut depth = 0i64;
    for (loc, inst) in program.instructions() {
        if inst.opcode.opens_region() {
            depth += 1;
        } else if inst.opcode.closes_region() {
            depth -= 1;
            if depth < 0 {
                return Err(LegalizeError::Validation(format!(
                    "block {} instruction {}: `{}` closes a region that was never opened",
                    loc.block, loc.index, inst.opcode
                )));
            }
        }
    }
    if depth != 0 {
        return Err(LegalizeError::Validation(format!(
            "{} control-flow regions left open",
            depth
        )));
    }
    Ok(())
}

/// Check that every instruction already runs at its native width.
pub fn validate_widths(program: &Program, caps: &TargetCaps) -> Result<()> {
    for (loc, inst) in program.instructions() {
        let native = decide_width(inst, caps);
        if native != inst.exec_size {
            return Err(LegalizeError::Validation(format!(
                "block {} instruction {} `{}`: width {} exceeds native width {}",
                loc.block, loc.index, inst, inst.exec_size, native
            )));
        }
    }
    Ok(())
}
