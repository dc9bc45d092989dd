//! Opcodes and the rule table describing them.
//!
//! Every opcode maps to one static [`OpcodeInfo`] entry: its class, its
//! source layout and the width rule the legalizer applies. Adding an opcode
//! means adding a variant and a table row; passes never switch on opcodes to
//! recover this information.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // Control flow
    If,
    Else,
    EndIf,
    Do,
    While,
    Break,
    Continue,
    // Synchronization
    Barrier,
    MemoryFence,
    // ALU
    Mov,
    Sel,
    Not,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Asr,
    Add,
    Mul,
    Avg,
    Frc,
    Rndd,
    Cmp,
    Mad,
    Lrp,
    Bfe,
    // Extended math
    Rcp,
    Rsq,
    Sqrt,
    Exp2,
    Log2,
    Sin,
    Cos,
    Pow,
    IntQuotient,
    IntRemainder,
    // Register-indirect move
    MovIndirect,
    // Whole-register initialization
    Undef,
    // Sampler messages
    Tex,
    Txl,
    Txd,
    Txf,
    TxfMs,
    // Data-port messages
    UntypedSurfaceRead,
    UntypedSurfaceWrite,
    FbWrite,
}

/// Broad opcode families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeClass {
    ControlFlow,
    Sync,
    Alu,
    Math,
    Indirect,
    Init,
    Message,
}

/// How the legalizer picks the native width of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthRule {
    /// Fixed hardware width, independent of operands
    Fixed(u8),
    /// Elementwise arithmetic region rules
    Fpu,
    /// Fixed width on targets without native wide math, `Fpu` otherwise
    FixedOnOlderTargets(u8),
    /// Payload-derived cap for external-unit messages
    Message,
    /// Integer division
    IntDivide,
    /// Bounded by address sub-registers
    IndirectMove,
    /// Declared width is always native
    Declared,
}

/// Role of one source slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// One lane-wise component
    Data,
    /// Not data; passes through every lowered instance unchanged
    Control,
    /// `factor * src[count_slot]` components per lane
    Components { count_slot: u8, factor: u8 },
    /// Region of `src[length_slot]` bytes addressed indirectly
    IndirectRegion { length_slot: u8 },
}

/// One row of the opcode table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub mnemonic: &'static str,
    pub class: OpcodeClass,
    pub rule: WidthRule,
    pub sources: &'static [SourceKind],
    pub side_effects: bool,
}

use SourceKind::{Control, Data};

const NO_SRCS: &[SourceKind] = &[];
const ONE: &[SourceKind] = &[Data];
const TWO: &[SourceKind] = &[Data, Data];
const THREE: &[SourceKind] = &[Data, Data, Data];

const TEX_SRCS: &[SourceKind] = &[
    SourceKind::Components {
        count_slot: 3,
        factor: 1,
    },
    Data,
    Data,
    Control,
    Control,
];
const TXD_SRCS: &[SourceKind] = &[
    SourceKind::Components {
        count_slot: 3,
        factor: 1,
    },
    SourceKind::Components {
        count_slot: 4,
        factor: 2,
    },
    Data,
    Control,
    Control,
];
const SURFACE_READ_SRCS: &[SourceKind] = &[Data, Control, Control];
const SURFACE_WRITE_SRCS: &[SourceKind] = &[
    Data,
    SourceKind::Components {
        count_slot: 3,
        factor: 1,
    },
    Control,
    Control,
];
const FB_WRITE_SRCS: &[SourceKind] = &[
    SourceKind::Components {
        count_slot: 4,
        factor: 1,
    },
    Data,
    Data,
    Control,
    Control,
];
const MOV_INDIRECT_SRCS: &[SourceKind] = &[
    SourceKind::IndirectRegion { length_slot: 2 },
    Data,
    Control,
];

const fn row(
    mnemonic: &'static str,
    class: OpcodeClass,
    rule: WidthRule,
    sources: &'static [SourceKind],
    side_effects: bool,
) -> OpcodeInfo {
    OpcodeInfo {
        mnemonic,
        class,
        rule,
        sources,
        side_effects,
    }
}

use OpcodeClass as C;
use WidthRule as R;

/// Control-flow markers evaluate their predicate over every declared channel,
/// so they are pinned to the declared width.
const CF: WidthRule = R::Fixed(32);
const MATH: WidthRule = R::FixedOnOlderTargets(8);

static OPCODE_TABLE: [OpcodeInfo; 47] = [
    row("if", C::ControlFlow, CF, NO_SRCS, false),
    row("else", C::ControlFlow, CF, NO_SRCS, false),
    row("endif", C::ControlFlow, CF, NO_SRCS, false),
    row("do", C::ControlFlow, CF, NO_SRCS, false),
    row("while", C::ControlFlow, CF, NO_SRCS, false),
    row("break", C::ControlFlow, CF, NO_SRCS, false),
    row("continue", C::ControlFlow, CF, NO_SRCS, false),
    row("barrier", C::Sync, R::Fixed(8), NO_SRCS, true),
    row("fence", C::Sync, R::Fixed(8), NO_SRCS, true),
    row("mov", C::Alu, R::Fpu, ONE, false),
    row("sel", C::Alu, R::Fpu, TWO, false),
    row("not", C::Alu, R::Fpu, ONE, false),
    row("and", C::Alu, R::Fpu, TWO, false),
    row("or", C::Alu, R::Fpu, TWO, false),
    row("xor", C::Alu, R::Fpu, TWO, false),
    row("shl", C::Alu, R::Fpu, TWO, false),
    row("shr", C::Alu, R::Fpu, TWO, false),
    row("asr", C::Alu, R::Fpu, TWO, false),
    row("add", C::Alu, R::Fpu, TWO, false),
    row("mul", C::Alu, R::Fpu, TWO, false),
    row("avg", C::Alu, R::Fpu, TWO, false),
    row("frc", C::Alu, R::Fpu, ONE, false),
    row("rndd", C::Alu, R::Fpu, ONE, false),
    row("cmp", C::Alu, R::Fpu, TWO, false),
    row("mad", C::Alu, R::Fpu, THREE, false),
    row("lrp", C::Alu, R::Fpu, THREE, false),
    row("bfe", C::Alu, R::Fpu, THREE, false),
    row("math.rcp", C::Math, MATH, ONE, false),
    row("math.rsq", C::Math, MATH, ONE, false),
    row("math.sqrt", C::Math, MATH, ONE, false),
    row("math.exp2", C::Math, MATH, ONE, false),
    row("math.log2", C::Math, MATH, ONE, false),
    row("math.sin", C::Math, MATH, ONE, false),
    row("math.cos", C::Math, MATH, ONE, false),
    row("math.pow", C::Math, MATH, TWO, false),
    row("math.intdiv", C::Math, R::IntDivide, TWO, false),
    row("math.intmod", C::Math, R::IntDivide, TWO, false),
    row("mov_indirect", C::Indirect, R::IndirectMove, MOV_INDIRECT_SRCS, false),
    row("undef", C::Init, R::Declared, NO_SRCS, false),
    row("tex", C::Message, R::Message, TEX_SRCS, false),
    row("txl", C::Message, R::Message, TEX_SRCS, false),
    row("txd", C::Message, R::Message, TXD_SRCS, false),
    row("txf", C::Message, R::Message, TEX_SRCS, false),
    row("txf_ms", C::Message, R::Message, TEX_SRCS, false),
    row("untyped_read", C::Message, R::Message, SURFACE_READ_SRCS, false),
    row("untyped_write", C::Message, R::Message, SURFACE_WRITE_SRCS, true),
    row("fb_write", C::Message, R::Message, FB_WRITE_SRCS, true),
];

impl Opcode {
    pub fn info(self) -> &'static OpcodeInfo {
        &OPCODE_TABLE[self as usize]
    }

    pub fn class(self) -> OpcodeClass {
        self.info().class
    }

    /// Number of sources this opcode takes
    pub fn arity(self) -> usize {
        self.info().sources.len()
    }

    pub fn source_kind(self, i: usize) -> SourceKind {
        self.info().sources[i]
    }

    pub fn has_side_effects(self) -> bool {
        self.info().side_effects
    }

    /// Three-source ("fused multiply-add" family) encoding
    pub fn is_3src(self) -> bool {
        matches!(self, Opcode::Mad | Opcode::Lrp | Opcode::Bfe)
    }

    pub fn opens_region(self) -> bool {
        matches!(self, Opcode::If | Opcode::Do)
    }

    pub fn closes_region(self) -> bool {
        matches!(self, Opcode::EndIf | Opcode::While)
    }

    pub fn is_message(self) -> bool {
        self.class() == OpcodeClass::Message
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info().mnemonic)
    }
}
