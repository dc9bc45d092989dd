//! Program transforms.
//!
//! Every pass implements [`Transform`]: it rewrites a [`Program`] in place
//! for one target and reports whether anything changed. Passes also expose
//! an `apply_internal` method returning a statistics record.
//!
//! - [`lower_width`] legalizes execution widths (always runs)
//! - [`split_regs`] subdivides virtual registers at unused unit boundaries
//! - [`rename`] gives fresh identities to independent full definitions
//! - [`compact`] removes unreferenced registers and renumbers the rest

pub mod compact;
pub mod lower_width;
pub mod region;
pub mod rename;
pub mod sanity;
pub mod split_regs;
pub mod width;

pub use compact::{CompactRegisters, CompactStats};
pub use lower_width::{LowerWidth, LowerWidthStats};
pub use region::{footprint_units, is_control_operand, is_periodic};
pub use rename::{RenamePlan, RenameRegisters, RenameStats};
pub use sanity::{validate_program, validate_widths};
pub use split_regs::{SplitRegisters, SplitStats};
pub use width::decide_width;

use crate::error::Result;
use lanelegal_mir::{Program, RegisterLimits};
use lanelegal_platform::TargetCaps;

/// Program transform
///
/// Transforms are composable and arranged by the pipeline driver; each one
/// takes exclusive ownership of the program for the duration of `apply`.
pub trait Transform: Default {
    /// Unique name for this transform
    fn name(&self) -> &'static str;

    /// Description of what this transform does
    fn description(&self) -> &'static str;

    /// Category of this transform
    fn category(&self) -> TransformCategory;

    /// Level of this transform
    fn level(&self) -> TransformLevel;

    /// Run the transform, returning whether the program changed
    fn apply(&self, program: &mut Program, caps: &TargetCaps) -> Result<bool>;
}

/// Stability level of a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransformLevel {
    /// Transform is deprecated and will be removed
    Deprecated,
    /// Transform is experimental and may change
    Experimental,
    /// Transform is well-tested
    Stable,
}

impl TransformLevel {
    /// Check if this level should be included at the given optimization level
    ///
    /// - `-O0`: No optional transforms
    /// - `-O1`: `Stable` transforms
    /// - `-O2`: `Stable` + `Experimental` transforms
    /// - `-O3`: All transforms (including `Deprecated`)
    pub fn is_enabled_at_opt_level(self, opt_level: u8) -> bool {
        match (self, opt_level) {
            (TransformLevel::Deprecated, 3..) => true,
            (TransformLevel::Experimental, 2..) => true,
            (TransformLevel::Stable, 1..) => true,
            _ => false,
        }
    }
}

/// Categories of transformations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformCategory {
    /// Brings instructions down to widths the target executes natively
    Legalization,
    /// Partitions registers into independently allocatable pieces
    RegisterSplitting,
    /// Separates unrelated lifetimes sharing a register
    RegisterRenaming,
    /// Removes gaps from the register index space
    RegisterCompaction,
}

/// Allocation ceilings taken from the capability record
pub fn register_limits(caps: &TargetCaps) -> RegisterLimits {
    RegisterLimits {
        max_registers: caps.max_registers,
        max_register_units: caps.max_register_units,
    }
}
