//! Width decision engine.
//!
//! [`decide_width`] returns the widest power-of-two lane count, no larger
//! than the declared width, at which the target executes an instruction
//! natively. The opcode rule table selects which family of rules applies;
//! target differences come from the capability record.

use super::region::{footprint_units, is_control_operand};
use lanelegal_mir::{ElementType, Instruction, Operand, UNIT_BYTES, WidthRule, units_for_bytes};
use lanelegal_platform::{Erratum, TargetCaps};
use tracing::trace;

/// Maximum units a single direct region may span
const MAX_REGION_UNITS: u32 = 2;

/// Channels the accumulator holds
const ACCUMULATOR_LANES: u32 = 8;

/// Native width of `inst` on `caps`
pub fn decide_width(inst: &Instruction, caps: &TargetCaps) -> u8 {
    let exec = inst.exec_size as u32;
    let width = match inst.opcode.info().rule {
        WidthRule::Fixed(n) => exec.min(n as u32),
        WidthRule::Fpu => fpu_width(inst, caps),
        WidthRule::FixedOnOlderTargets(n) => {
            if caps.native_wide_math {
                fpu_width(inst, caps)
            } else {
                exec.min(n as u32)
            }
        }
        WidthRule::Message => message_width(inst, caps),
        WidthRule::IntDivide => fpu_width(inst, caps).min(8),
        WidthRule::IndirectMove => indirect_width(inst, caps),
        WidthRule::Declared => exec,
    };
    let width = prev_power_of_two(width.clamp(1, exec.max(1)));
    trace!(opcode = %inst.opcode, exec, width, "decided width");
    width as u8
}

fn prev_power_of_two(n: u32) -> u32 {
    1 << (31 - n.leading_zeros())
}

/// Elementwise arithmetic
fn fpu_width(inst: &Instruction, caps: &TargetCaps) -> u32 {
    let exec = inst.exec_size as u32;
    let mut max_width = exec;

    if !inst.force_writemask_all {
        max_width = max_width.min(caps.max_width as u32);
    }

    // A direct region may span at most two units; scale down by the factor
    // the widest operand exceeds that. Elementwise sources read one
    // component, the destination is taken at its declared size.
    let reg_count = inst
        .srcs
        .iter()
        .enumerate()
        .filter(|(i, _)| !is_control_operand(inst, *i))
        .map(|(_, src)| footprint_units(src, exec))
        .fold(inst.regs_written(), u32::max);
    if reg_count > MAX_REGION_UNITS {
        max_width = max_width.min(exec / reg_count.div_ceil(MAX_REGION_UNITS));
    }

    if caps.strict_region_span {
        max_width = max_width.min(strict_span_width(inst));
    }

    if !caps.supports_simd32 && !inst.force_writemask_all {
        max_width = max_width.min(16);
    }

    if (inst.cond_mod.is_some() || inst.opcode.is_3src()) && !caps.supports_wide_ternary {
        max_width = max_width.min(16);
    }

    if caps.mixed_float_simd8_only && is_mixed_float(inst) {
        max_width = max_width.min(8);
    }

    if inst.writes_accumulator {
        max_width = max_width.min(ACCUMULATOR_LANES);
    }

    max_width.min(errata_width(inst, caps))
}

/// When the destination spans several units every source must span as many,
/// except scalars and packed word sources feeding packed dword destinations.
fn strict_span_width(inst: &Instruction) -> u32 {
    let exec = inst.exec_size as u32;
    if inst.size_written <= UNIT_BYTES {
        return exec;
    }
    let dst_regs = units_for_bytes(inst.size_written);
    let mut max_width = exec;
    for (i, src) in inst.srcs.iter().enumerate() {
        if inst.is_control_source(i) {
            continue;
        }
        let size_read = inst.size_read(i);
        let scalar = src.is_uniform();
        let packed_word = inst.dst.ty().map(ElementType::size) == Some(4)
            && inst.dst.stride() == 1
            && src.ty().map(ElementType::size) == Some(2)
            && src.stride() == 1;
        if size_read != 0 && size_read < inst.size_written && !scalar && !packed_word {
            trace!(source = i, size_read, dst_regs, "source narrower than destination");
            max_width = max_width.min(exec / dst_regs);
        }
    }
    max_width
}

/// Full-precision float destination fed by a half-float source, or a packed
/// half-float destination fed by a full-precision source
fn is_mixed_float(inst: &Instruction) -> bool {
    let data_types = || {
        inst.srcs
            .iter()
            .enumerate()
            .filter(|(i, _)| !inst.is_control_source(*i))
            .filter_map(|(_, s)| s.ty())
    };
    match inst.dst.ty() {
        Some(ElementType::F) => data_types().any(|t| t == ElementType::HF),
        Some(ElementType::HF) if inst.dst.stride() == 1 => {
            data_types().any(|t| t == ElementType::F)
        }
        _ => false,
    }
}

fn errata_width(inst: &Instruction, caps: &TargetCaps) -> u32 {
    let exec = inst.exec_size as u32;
    let mut max_width = exec;

    if inst.size_written > UNIT_BYTES && !inst.force_writemask_all {
        let channels_per_unit = (exec / units_for_bytes(inst.size_written)).max(1);
        let exec_type_size = inst.exec_type_size();

        // Compressed halves advance by exactly 8 channels (4 for 8-byte types)
        if caps.has_erratum(Erratum::CompressedHalfSplit)
            && channels_per_unit != if exec_type_size == 8 { 4 } else { 8 }
        {
            max_width = max_width.min(channels_per_unit);
        }

        let dst_size = inst.dst.ty().map(ElementType::size).unwrap_or(0);
        if caps.has_erratum(Erratum::DoubleFloatSimd4) && (exec_type_size == 8 || dst_size == 8) {
            max_width = max_width.min(4);
        }
    }

    if caps.has_erratum(Erratum::OddFixedSourceAlignment) {
        for (i, src) in inst.srcs.iter().enumerate() {
            if let Operand::Fixed(r) = src
                && r.nr % 2 == 1
                && inst.size_read(i) > UNIT_BYTES
            {
                max_width = max_width.min(8);
            }
        }
    }

    max_width
}

/// External-unit messages: the payload length bounds the width
fn message_width(inst: &Instruction, caps: &TargetCaps) -> u32 {
    let payload: u32 = (0..inst.srcs.len())
        .filter(|&i| !inst.is_control_source(i))
        .map(|i| inst.components_read(i))
        .sum();
    let cap = if payload > caps.max_message_length / 2 {
        8
    } else {
        16
    };
    trace!(payload, cap, "message payload");
    (inst.exec_size as u32)
        .min(cap)
        .min(caps.max_width as u32)
}

/// Indirect moves are bounded by the address sub-registers and by the
/// destination fitting the indirect region limit
fn indirect_width(inst: &Instruction, caps: &TargetCaps) -> u32 {
    let max_size = if caps.address_subregisters >= 16 {
        2 * UNIT_BYTES
    } else {
        UNIT_BYTES
    };
    let dst_step = inst.dst.stride().max(1) as u32 * inst.dst.ty().map(ElementType::size).unwrap_or(1);
    (inst.exec_size as u32)
        .min(caps.address_subregisters)
        .min(max_size / dst_step)
}
