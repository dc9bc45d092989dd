//! Target capability records
//!
//! A [`TargetCaps`] value describes everything the width legalizer needs to
//! know about an execution unit: how many lanes it runs natively, which
//! encodings allow the full width, how long a message payload may be, and
//! which hardware errata force narrower execution.
//!
//! # Presets
//!
//! | Generation | max width | SIMD32 | wide ternary | native wide math | strict span | mixed float SIMD8 |
//! |------------|-----------|--------|--------------|------------------|-------------|-------------------|
//! | gen6       | 16        | ❌     | ❌           | ❌               | ✅          | ❌                |
//! | gen7       | 16        | ❌     | ❌           | ✅               | ✅          | ❌                |
//! | gen75      | 16        | ❌     | ❌           | ✅               | ✅          | ❌                |
//! | gen8       | 32        | ✅     | ❌           | ✅               | ❌          | ❌                |
//! | gen9       | 32        | ✅     | ❌           | ✅               | ❌          | ✅                |
//! | gen11      | 32        | ✅     | ❌           | ✅               | ❌          | ✅                |
//! | gen12      | 32        | ✅     | ✅           | ✅               | ❌          | ✅                |
//!
//! Individual fields can be overridden with the `with_*` methods:
//!
//! ```rust
//! use lanelegal_platform::{Erratum, Generation, TargetCaps};
//!
//! let caps = TargetCaps::for_generation(Generation::Gen9)
//!     .with_max_width(16)
//!     .with_erratum(Erratum::DoubleFloatSimd4);
//! assert_eq!(caps.max_width, 16);
//! assert!(caps.has_erratum(Erratum::DoubleFloatSimd4));
//! ```

use crate::target::Generation;
use std::fmt;
use std::str::FromStr;

/// Hardware defects that constrain execution width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Erratum {
    /// A flag written by one lane group can clobber a flag source still
    /// needed by a later group of the same instruction
    FlagSourceOverlap,

    /// Compressed instructions must be split so each half writes a single
    /// unit, unless the channels per unit equal the hardware half width
    CompressedHalfSplit,

    /// Operations on 8-byte types run at most 4 lanes
    DoubleFloatSimd4,

    /// Multi-unit fixed-register sources starting on an odd unit force 8 lanes
    OddFixedSourceAlignment,
}

impl Erratum {
    pub fn description(&self) -> &'static str {
        match self {
            Self::FlagSourceOverlap => "flag writes clobber flag sources across lane groups",
            Self::CompressedHalfSplit => "compressed halves must each write one unit",
            Self::DoubleFloatSimd4 => "8-byte operations limited to 4 lanes",
            Self::OddFixedSourceAlignment => "odd-aligned multi-unit fixed sources limited to 8 lanes",
        }
    }
}

impl fmt::Display for Erratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Capability record consumed by the width rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCaps {
    pub generation: Generation,
    /// Native lane ceiling
    pub max_width: u8,
    /// Wide compressed execution without forced write masks
    pub supports_simd32: bool,
    /// Three-source and flag-writing instructions may run above 16 lanes
    pub supports_wide_ternary: bool,
    /// Extended math runs at the full ALU width
    pub native_wide_math: bool,
    /// Longest message payload in units
    pub max_message_length: u32,
    /// Address sub-registers available to indirect moves
    pub address_subregisters: u32,
    /// Regions may not span two units unless both halves are uniform
    pub strict_region_span: bool,
    /// Mixed single/half float operations run at most 8 lanes
    pub mixed_float_simd8_only: bool,
    pub errata: Vec<Erratum>,
    /// Ceiling on the number of virtual registers
    pub max_registers: u32,
    /// Ceiling on the size of one virtual register in units
    pub max_register_units: u32,
}

impl TargetCaps {
    /// Capability preset for a named generation
    pub fn for_generation(generation: Generation) -> Self {
        let base = Self {
            generation,
            max_width: 16,
            supports_simd32: false,
            supports_wide_ternary: false,
            native_wide_math: true,
            max_message_length: 11,
            address_subregisters: 8,
            strict_region_span: true,
            mixed_float_simd8_only: false,
            errata: Vec::new(),
            max_registers: 1 << 16,
            max_register_units: 64,
        };

        match generation {
            Generation::Gen6 => Self {
                native_wide_math: false,
                errata: vec![
                    Erratum::CompressedHalfSplit,
                    Erratum::OddFixedSourceAlignment,
                ],
                ..base
            },
            Generation::Gen7 => Self {
                errata: vec![
                    Erratum::FlagSourceOverlap,
                    Erratum::CompressedHalfSplit,
                    Erratum::DoubleFloatSimd4,
                ],
                ..base
            },
            Generation::Gen75 => Self {
                errata: vec![Erratum::FlagSourceOverlap, Erratum::CompressedHalfSplit],
                ..base
            },
            Generation::Gen8 => Self {
                max_width: 32,
                supports_simd32: true,
                address_subregisters: 16,
                strict_region_span: false,
                errata: vec![Erratum::FlagSourceOverlap],
                ..base
            },
            Generation::Gen9 | Generation::Gen11 => Self {
                max_width: 32,
                supports_simd32: true,
                address_subregisters: 16,
                strict_region_span: false,
                mixed_float_simd8_only: true,
                errata: vec![Erratum::FlagSourceOverlap],
                ..base
            },
            Generation::Gen12 => Self {
                max_width: 32,
                supports_simd32: true,
                supports_wide_ternary: true,
                address_subregisters: 16,
                strict_region_span: false,
                mixed_float_simd8_only: true,
                ..base
            },
        }
    }

    pub fn has_erratum(&self, erratum: Erratum) -> bool {
        self.errata.contains(&erratum)
    }

    pub fn with_max_width(mut self, max_width: u8) -> Self {
        self.max_width = max_width;
        self
    }

    pub fn with_simd32(mut self, enabled: bool) -> Self {
        self.supports_simd32 = enabled;
        self
    }

    pub fn with_wide_ternary(mut self, enabled: bool) -> Self {
        self.supports_wide_ternary = enabled;
        self
    }

    pub fn with_native_wide_math(mut self, enabled: bool) -> Self {
        self.native_wide_math = enabled;
        self
    }

    pub fn with_max_message_length(mut self, units: u32) -> Self {
        self.max_message_length = units;
        self
    }

    pub fn with_address_subregisters(mut self, count: u32) -> Self {
        self.address_subregisters = count;
        self
    }

    pub fn with_strict_region_span(mut self, enabled: bool) -> Self {
        self.strict_region_span = enabled;
        self
    }

    pub fn with_mixed_float_simd8_only(mut self, enabled: bool) -> Self {
        self.mixed_float_simd8_only = enabled;
        self
    }

    pub fn with_erratum(mut self, erratum: Erratum) -> Self {
        if !self.has_erratum(erratum) {
            self.errata.push(erratum);
        }
        self
    }

    pub fn without_errata(mut self) -> Self {
        self.errata.clear();
        self
    }

    pub fn with_register_limits(mut self, max_registers: u32, max_register_units: u32) -> Self {
        self.max_registers = max_registers;
        self.max_register_units = max_register_units;
        self
    }
}

impl Default for TargetCaps {
    fn default() -> Self {
        Self::for_generation(Generation::Gen9)
    }
}

impl FromStr for TargetCaps {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Generation::from_str(s).map(Self::for_generation)
    }
}

impl fmt::Display for TargetCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (simd{}", self.generation, self.max_width)?;
        if !self.errata.is_empty() {
            write!(f, ", {} errata", self.errata.len())?;
        }
        write!(f, ")")
    }
}
