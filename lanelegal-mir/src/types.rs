/// Element types for virtual instructions
///
/// Every register operand carries one of these. The byte size drives operand
/// footprints and therefore the width decisions made downstream.
use std::fmt;

/// Size of one physical register unit in bytes.
pub const UNIT_BYTES: u32 = 32;

/// Largest execution width representable in an instruction.
pub const MAX_EXEC_SIZE: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    UB,
    B,
    UW,
    W,
    HF,
    UD,
    D,
    F,
    UQ,
    Q,
    DF,
}

impl ElementType {
    /// Size of one element in bytes
    pub fn size(self) -> u32 {
        match self {
            ElementType::UB | ElementType::B => 1,
            ElementType::UW | ElementType::W | ElementType::HF => 2,
            ElementType::UD | ElementType::D | ElementType::F => 4,
            ElementType::UQ | ElementType::Q | ElementType::DF => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElementType::HF | ElementType::F | ElementType::DF)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ElementType::B | ElementType::W | ElementType::D | ElementType::Q
        ) || self.is_float()
    }

    /// Unsigned integer type of the same size, used for raw copies.
    pub fn raw(self) -> ElementType {
        match self.size() {
            1 => ElementType::UB,
            2 => ElementType::UW,
            4 => ElementType::UD,
            _ => ElementType::UQ,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementType::UB => "ub",
            ElementType::B => "b",
            ElementType::UW => "uw",
            ElementType::W => "w",
            ElementType::HF => "hf",
            ElementType::UD => "ud",
            ElementType::D => "d",
            ElementType::F => "f",
            ElementType::UQ => "uq",
            ElementType::Q => "q",
            ElementType::DF => "df",
        };
        write!(f, "{}", s)
    }
}

/// Number of whole units needed to hold `bytes`.
pub fn units_for_bytes(bytes: u32) -> u32 {
    bytes.div_ceil(UNIT_BYTES)
}
