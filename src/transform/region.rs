//! Operand region classification.
//!
//! Pure predicates the width rules and the split/zip rewriter use to decide
//! whether an operand can be shared between lowered instances, addressed by
//! lane offset, or has to be copied.

use lanelegal_mir::{Instruction, Operand, SourceKind, UNIT_BYTES, units_for_bytes};

/// Reading `operand` into any group of `width` lanes yields the same values
pub fn is_periodic(operand: &Operand, width: u32) -> bool {
    match operand {
        Operand::None | Operand::Arch(..) => true,
        Operand::Imm(imm) => width % imm.period() == 0,
        Operand::Vgrf(r) | Operand::Fixed(r) => r.stride == 0,
    }
}

/// Units touched by one component of `operand` at `width` lanes
pub fn footprint_units(operand: &Operand, width: u32) -> u32 {
    match operand.reg() {
        Some(r) => units_for_bytes(r.offset % UNIT_BYTES + r.component_size(width)),
        None => 0,
    }
}

/// Source `i` of `inst` is a count, selector or index rather than lane data
pub fn is_control_operand(inst: &Instruction, i: usize) -> bool {
    inst.is_control_source(i)
}

/// Source `i` is handed to every lowered instance unchanged
pub(crate) fn passes_through(inst: &Instruction, i: usize) -> bool {
    matches!(
        inst.opcode.source_kind(i),
        SourceKind::Control | SourceKind::IndirectRegion { .. }
    )
}
